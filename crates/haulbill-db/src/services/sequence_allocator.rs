//! # Sequence Allocator
//!
//! Issues document numbers in contiguous, validated blocks.
//!
//! ## Allocation Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────────────┐     ┌───────────────┐     ┌──────────────────────┐  │
//! │   │ read counter │────►│ reserve_block │────►│ compare_and_swap     │  │
//! │   │ (or create)  │     │ + validation  │     │ WHERE version = v    │  │
//! │   └──────▲───────┘     └───────┬───────┘     └──────────┬───────────┘  │
//! │          │                     │ invalid                │              │
//! │          │                     ▼                        │ won  → block │
//! │          │              CoreError (no write)            │              │
//! │          │                                              │ lost         │
//! │          └──────────── backoff (5ms → 200ms) ◄──────────┘              │
//! │                        gives up after max_retries → ConcurrencyConflict │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A lost race re-reads the counter and reserves the whole block again, so
//! no number is issued twice and none is skipped.
//!
//! Seed and block cap are always taken from the allocator's configuration;
//! the values stored on the row are overwritten by the next successful swap.

use std::collections::HashMap;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::config::{AllocationSettings, HaulbillConfig};
use crate::error::{DbError, DbResult};
use crate::repository::sequence::SequenceRepository;
use haulbill_core::sequence::{reserve_block, SequenceBlock};
use haulbill_core::{Facility, SequenceSettings, SequenceType};

/// Contention-safe block allocator over the `sequences` table.
#[derive(Debug, Clone)]
pub struct SequenceAllocator {
    repo: SequenceRepository,
    settings: HashMap<SequenceType, SequenceSettings>,
    retry: AllocationSettings,
}

impl SequenceAllocator {
    pub fn new(repo: SequenceRepository, config: &HaulbillConfig) -> Self {
        let settings = SequenceType::ALL
            .into_iter()
            .map(|t| (t, config.sequence(t)))
            .collect();

        SequenceAllocator {
            repo,
            settings,
            retry: config.allocation.clone(),
        }
    }

    pub fn settings(&self, sequence_type: SequenceType) -> SequenceSettings {
        self.settings.get(&sequence_type).cloned().unwrap_or_default()
    }

    /// Reserves `count` numbers and returns them lazily formatted.
    ///
    /// `infix` / `suffix` override the configured values when given.
    pub async fn generate_sequence_numbers(
        &self,
        sequence_type: SequenceType,
        prefix: &str,
        count: i64,
        infix: Option<&str>,
        suffix: Option<&str>,
    ) -> DbResult<SequenceBlock> {
        let settings = self.settings(sequence_type);
        let mut format = settings.format_for(prefix);
        if let Some(infix) = infix {
            format.infix = infix.to_string();
        }
        if let Some(suffix) = suffix {
            format.suffix = suffix.to_string();
        }

        let mut backoff = self.create_backoff();
        let mut retries = 0u32;

        loop {
            let mut counter = self.repo.get_or_create(sequence_type, prefix, &settings).await?;
            counter.apply_settings(&settings);
            let reservation = reserve_block(&counter, count)?;

            if self.repo.compare_and_swap(&reservation.target, counter.version).await? {
                debug!(
                    sequence_type = %sequence_type,
                    prefix = %prefix,
                    first = reservation.first,
                    last = reservation.last,
                    retries,
                    "Reserved sequence block"
                );
                return Ok(reservation.into_block(format));
            }

            retries += 1;
            if retries > self.retry.max_retries {
                warn!(
                    sequence_type = %sequence_type,
                    prefix = %prefix,
                    retries,
                    "Giving up on sequence allocation"
                );
                return Err(DbError::conflict(
                    "SequenceCounter",
                    format!("{}/{}", sequence_type, prefix),
                ));
            }

            let wait = backoff.next_backoff().unwrap_or(self.retry.max_backoff());
            debug!(
                sequence_type = %sequence_type,
                prefix = %prefix,
                attempt = retries,
                wait_ms = wait.as_millis() as u64,
                "Sequence counter moved, retrying"
            );
            tokio::time::sleep(wait).await;
        }
    }

    /// Single number with the configured format.
    pub async fn next_number(&self, sequence_type: SequenceType, prefix: &str) -> DbResult<String> {
        self.generate_sequence_numbers(sequence_type, prefix, 1, None, None)
            .await?
            .next()
            .ok_or_else(|| DbError::Internal("empty sequence block".to_string()))
    }

    /// Ticket number for a facility: counter type from the facility type,
    /// site code as prefix.
    pub async fn ticket_number(&self, facility: &Facility) -> DbResult<String> {
        let sequence_type = SequenceType::for_facility(facility.facility_type);
        self.next_number(sequence_type, &facility.site_code).await
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.retry.initial_backoff(),
            max_interval: self.retry.max_backoff(),
            multiplier: 2.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();
        backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::test_db;
    use haulbill_core::{CoreError, FacilityType};
    use std::collections::BTreeSet;

    fn config_with_scale_ticket_suffix() -> HaulbillConfig {
        let mut config = HaulbillConfig::default();
        config.sequences.insert(
            "ScaleTicket".to_string(),
            SequenceSettings {
                suffix: "-LF".to_string(),
                ..SequenceSettings::default()
            },
        );
        config
    }

    #[tokio::test]
    async fn test_blocks_are_contiguous() {
        let db = test_db().await;
        let allocator = SequenceAllocator::new(db.sequences(), &config_with_scale_ticket_suffix());

        let first: Vec<String> = allocator
            .generate_sequence_numbers(SequenceType::ScaleTicket, "LF01", 3, None, None)
            .await
            .unwrap()
            .collect();
        let second: Vec<String> = allocator
            .generate_sequence_numbers(SequenceType::ScaleTicket, "LF01", 2, Some("-"), None)
            .await
            .unwrap()
            .collect();

        assert_eq!(first, vec!["LF0110001-LF", "LF0110002-LF", "LF0110003-LF"]);
        assert_eq!(second, vec!["LF01-10004-LF", "LF01-10005-LF"]);
    }

    #[tokio::test]
    async fn test_counters_are_per_type_and_prefix() {
        let db = test_db().await;
        let allocator = SequenceAllocator::new(db.sequences(), &HaulbillConfig::default());

        let landfill = Facility {
            id: "F1".to_string(),
            name: "Landfill".to_string(),
            site_code: "LF01".to_string(),
            facility_type: FacilityType::Landfill,
            country_code: "CA".to_string(),
            operating_day_cutoff: None,
        };
        let pipeline = Facility {
            facility_type: FacilityType::Pipeline,
            site_code: "PL01".to_string(),
            ..landfill.clone()
        };

        assert_eq!(allocator.ticket_number(&landfill).await.unwrap(), "LF0110001");
        assert_eq!(allocator.ticket_number(&pipeline).await.unwrap(), "PL0110001");
        assert_eq!(allocator.ticket_number(&landfill).await.unwrap(), "LF0110002");

        let work = db.sequences().get(SequenceType::WorkTicket, "PL01").await.unwrap();
        assert!(work.is_some());
    }

    #[tokio::test]
    async fn test_oversized_block_is_rejected_without_writing() {
        let db = test_db().await;
        let allocator = SequenceAllocator::new(db.sequences(), &HaulbillConfig::default());

        let err = allocator
            .generate_sequence_numbers(SequenceType::Invoice, "LF01", 51, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::SequenceBlockTooLarge { .. })));

        let counter = db.sequences().get(SequenceType::Invoice, "LF01").await.unwrap().unwrap();
        assert_eq!(counter.last_number, 10000);
        assert_eq!(counter.version, 0);
    }

    fn config_with_invoice_block(max_request_block_size: i64) -> HaulbillConfig {
        let mut config = HaulbillConfig::default();
        config.sequences.insert(
            "Invoice".to_string(),
            SequenceSettings {
                max_request_block_size,
                ..SequenceSettings::default()
            },
        );
        config
    }

    #[tokio::test]
    async fn test_block_cap_follows_current_configuration() {
        let db = test_db().await;

        // Counter created under the default cap of 50
        SequenceAllocator::new(db.sequences(), &HaulbillConfig::default())
            .next_number(SequenceType::Invoice, "LF01")
            .await
            .unwrap();

        let raised = SequenceAllocator::new(db.sequences(), &config_with_invoice_block(100));
        let block = raised
            .generate_sequence_numbers(SequenceType::Invoice, "LF01", 60, None, None)
            .await
            .unwrap();
        assert_eq!(block.len(), 60);

        let stored = db.sequences().get(SequenceType::Invoice, "LF01").await.unwrap().unwrap();
        assert_eq!(stored.last_number, 10061);
        assert_eq!(stored.max_request_block_size, 100);

        let lowered = SequenceAllocator::new(db.sequences(), &config_with_invoice_block(5));
        let err = lowered
            .generate_sequence_numbers(SequenceType::Invoice, "LF01", 40, None, None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::SequenceBlockTooLarge { requested: 40, max: 5 })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_allocation_issues_distinct_contiguous_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("alloc.db")).max_connections(4))
            .await
            .unwrap();

        let mut config = HaulbillConfig::default();
        config.allocation.max_retries = 200;
        let allocator = SequenceAllocator::new(db.sequences(), &config);

        // Create the counter up front so every task races on the update
        allocator.next_number(SequenceType::WorkTicket, "PL01").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let allocator = allocator.clone();
            handles.push(tokio::spawn(async move {
                let mut issued = Vec::new();
                for _ in 0..5 {
                    let block = allocator
                        .generate_sequence_numbers(SequenceType::WorkTicket, "PL01", 2, None, None)
                        .await
                        .unwrap();
                    issued.extend(block);
                }
                issued
            }));
        }

        let mut all = BTreeSet::new();
        for handle in handles {
            for number in handle.await.unwrap() {
                assert!(all.insert(number), "number issued twice");
            }
        }

        let expected: BTreeSet<String> = (10002..10082).map(|n| format!("PL01{}", n)).collect();
        assert_eq!(all, expected);
    }
}
