//! # Invoice Assigner
//!
//! Finds or creates the invoice a billed ticket belongs to.
//!
//! ## Find-or-create
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ticket + billing configuration                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  permutation id  ← invoice configuration splits                        │
//! │  legal entity    ← facility country                                    │
//! │  currency        ← customer account, else legal entity default         │
//! │  period          ← calendar month, open-ended for end-of-job approvals │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  find_open(key, load date) ── found ──► reuse                          │
//! │       │ none                                                            │
//! │       ▼                                                                 │
//! │  number from the Invoice sequence, prefixed by the site code           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  insert UnPosted, numbered ── UniqueViolation ──► another ticket       │
//! │                                created it, look up again                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::invoice::InvoiceKey;
use crate::services::sequence_allocator::SequenceAllocator;
use crate::services::FIND_OR_CREATE_ATTEMPTS;
use haulbill_core::period::invoice_period;
use haulbill_core::{BillingConfiguration, Invoice, InvoiceStatus, SequenceType, TruckTicket};

#[derive(Debug, Clone)]
pub struct InvoiceAssigner {
    db: Database,
    allocator: SequenceAllocator,
}

impl InvoiceAssigner {
    pub fn new(db: Database, allocator: SequenceAllocator) -> Self {
        InvoiceAssigner { db, allocator }
    }

    /// Invoice for the ticket under `config`, created when no live invoice
    /// of the same stream covers the load date.
    pub async fn get_truck_ticket_invoice(
        &self,
        ticket: &TruckTicket,
        config: &BillingConfiguration,
    ) -> DbResult<Invoice> {
        let reference = self.db.reference();
        let invoice_config = reference
            .get_invoice_configuration(&config.invoice_configuration_id)
            .await?;
        let facility = reference.get_facility(&ticket.facility_id).await?;
        let legal_entity = reference
            .legal_entity_for_country(&facility.country_code)
            .await?;
        let account = reference.get_account(&config.billing_customer_id).await?;

        let end_of_job = match &ticket.material_approval_id {
            Some(id) => {
                reference
                    .get_material_approval(id)
                    .await?
                    .enable_end_of_job_invoicing
            }
            None => false,
        };

        let key = InvoiceKey {
            facility_id: ticket.facility_id.clone(),
            billing_customer_id: config.billing_customer_id.clone(),
            invoice_configuration_id: invoice_config.id.clone(),
            invoice_permutation_id: invoice_config.permutation_id(ticket),
            currency: account
                .currency
                .unwrap_or_else(|| legal_entity.default_currency.clone()),
        };

        let invoices = self.db.invoices();
        let mut attempt = 0;
        loop {
            attempt += 1;

            if let Some(existing) = invoices.find_open(&key, ticket.load_date).await? {
                debug!(
                    ticket_id = %ticket.id,
                    invoice_id = %existing.id,
                    "Reusing open invoice"
                );
                return Ok(existing);
            }

            let period = invoice_period(ticket.load_date, end_of_job);
            let number = self
                .allocator
                .next_number(SequenceType::Invoice, &facility.site_code)
                .await?;
            let invoice = Invoice {
                id: uuid::Uuid::new_v4().to_string(),
                invoice_number: Some(number),
                facility_id: key.facility_id.clone(),
                billing_customer_id: key.billing_customer_id.clone(),
                invoice_configuration_id: key.invoice_configuration_id.clone(),
                invoice_permutation_id: key.invoice_permutation_id.clone(),
                currency: key.currency.clone(),
                legal_entity_id: legal_entity.id.clone(),
                status: InvoiceStatus::UnPosted,
                start_date: period.start,
                end_date: period.end,
                is_reversed: false,
                is_reversal: false,
                total_cents: 0,
                ticket_count: 0,
                created_at: Utc::now(),
            };

            match invoices.insert(&invoice).await {
                Ok(()) => {
                    info!(
                        ticket_id = %ticket.id,
                        invoice_id = %invoice.id,
                        invoice_number = ?invoice.invoice_number,
                        start_date = %invoice.start_date,
                        end_of_job,
                        "Created invoice"
                    );
                    return Ok(invoice);
                }
                Err(e) if e.is_unique_violation() && attempt < FIND_OR_CREATE_ATTEMPTS => {
                    debug!(
                        ticket_id = %ticket.id,
                        attempt,
                        unused_number = ?invoice.invoice_number,
                        "Invoice created concurrently, looking up again"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HaulbillConfig;
    use crate::pool::DbConfig;
    use crate::test_support::{
        billing_configuration, invoice_key, seed_reference_data, test_db, truck_ticket,
        unposted_invoice,
    };
    use chrono::NaiveDate;
    use haulbill_core::{Account, InvoiceConfiguration, SequenceSettings};
    use std::collections::BTreeSet;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn assigner(db: &Database) -> InvoiceAssigner {
        let allocator = SequenceAllocator::new(db.sequences(), &HaulbillConfig::default());
        InvoiceAssigner::new(db.clone(), allocator)
    }

    #[tokio::test]
    async fn test_creates_monthly_invoice_then_reuses_it() {
        let db = test_db().await;
        let refs = seed_reference_data(&db).await;
        let config = billing_configuration(&refs, "BC-1");
        let assigner = assigner(&db);

        let first = truck_ticket(&refs, "TT-1", "LF0110001");
        let invoice = assigner.get_truck_ticket_invoice(&first, &config).await.unwrap();

        assert_eq!(invoice.start_date, d(2023, 3, 1));
        assert_eq!(invoice.end_date, Some(d(2023, 3, 31)));
        assert_eq!(invoice.currency, "CAD");
        assert_eq!(invoice.legal_entity_id, refs.legal_entity_id);
        assert_eq!(invoice.invoice_number.as_deref(), Some("LF0110001"));

        let mut second = truck_ticket(&refs, "TT-2", "LF0110002");
        second.load_date = d(2023, 3, 29);
        let reused = assigner.get_truck_ticket_invoice(&second, &config).await.unwrap();
        assert_eq!(reused.id, invoice.id);
    }

    #[tokio::test]
    async fn test_elapsed_invoice_is_not_reused() {
        let db = test_db().await;
        let refs = seed_reference_data(&db).await;
        let key = invoice_key(&refs);
        let february = unposted_invoice(&refs, &key, d(2023, 2, 1), Some(d(2023, 2, 28)));
        db.invoices().insert(&february).await.unwrap();

        let ticket = truck_ticket(&refs, "TT-1", "LF0110001");
        let config = billing_configuration(&refs, "BC-1");
        let invoice = assigner(&db)
            .get_truck_ticket_invoice(&ticket, &config)
            .await
            .unwrap();

        assert_ne!(invoice.id, february.id);
        assert_eq!(invoice.start_date, d(2023, 3, 1));
    }

    #[tokio::test]
    async fn test_end_of_job_invoice_is_open_ended() {
        let db = test_db().await;
        let refs = seed_reference_data(&db).await;
        let config = billing_configuration(&refs, "BC-1");

        let mut ticket = truck_ticket(&refs, "TT-1", "LF0110001");
        ticket.material_approval_id = Some(refs.end_of_job_approval_id.clone());
        let invoice = assigner(&db)
            .get_truck_ticket_invoice(&ticket, &config)
            .await
            .unwrap();
        assert_eq!(invoice.start_date, d(2023, 3, 1));
        assert_eq!(invoice.end_date, None);

        // A later month still lands on the open-ended invoice
        let mut later = truck_ticket(&refs, "TT-2", "LF0110002");
        later.load_date = d(2023, 5, 10);
        let reused = assigner(&db)
            .get_truck_ticket_invoice(&later, &config)
            .await
            .unwrap();
        assert_eq!(reused.id, invoice.id);
    }

    #[tokio::test]
    async fn test_account_currency_and_permutation_split() {
        let db = test_db().await;
        let refs = seed_reference_data(&db).await;
        let reference = db.reference();

        reference
            .insert_account(&Account {
                id: "CUST-USD".to_string(),
                name: "US customer".to_string(),
                currency: Some("USD".to_string()),
            })
            .await
            .unwrap();
        reference
            .insert_invoice_configuration(&InvoiceConfiguration {
                id: "IC-SPLIT".to_string(),
                name: "By source location".to_string(),
                billing_customer_id: "CUST-USD".to_string(),
                split_by_facility: false,
                split_by_source_location: true,
                split_by_service_type: false,
                split_by_well_classification: false,
                split_by_substance: false,
            })
            .await
            .unwrap();

        let mut config = billing_configuration(&refs, "BC-USD");
        config.billing_customer_id = "CUST-USD".to_string();
        config.invoice_configuration_id = "IC-SPLIT".to_string();
        let assigner = assigner(&db);

        let sl1 = truck_ticket(&refs, "TT-1", "LF0110001");
        let mut sl2 = truck_ticket(&refs, "TT-2", "LF0110002");
        sl2.source_location_id = Some("SL-2".to_string());

        let a = assigner.get_truck_ticket_invoice(&sl1, &config).await.unwrap();
        let b = assigner.get_truck_ticket_invoice(&sl2, &config).await.unwrap();

        assert_eq!(a.currency, "USD");
        assert_eq!(a.invoice_permutation_id, "IC-SPLIT|sl=SL-1");
        assert_eq!(b.invoice_permutation_id, "IC-SPLIT|sl=SL-2");
        assert_ne!(a.id, b.id);
        assert_eq!(b.invoice_number.as_deref(), Some("LF0110002"));
    }

    #[tokio::test]
    async fn test_failed_numbering_leaves_no_invoice() {
        let db = test_db().await;
        let refs = seed_reference_data(&db).await;
        let config = billing_configuration(&refs, "BC-1");
        let ticket = truck_ticket(&refs, "TT-1", "LF0110001");

        let mut settings = HaulbillConfig::default();
        settings.sequences.insert(
            "Invoice".to_string(),
            SequenceSettings {
                max_request_block_size: 0,
                ..SequenceSettings::default()
            },
        );
        let allocator = SequenceAllocator::new(db.sequences(), &settings);
        let broken = InvoiceAssigner::new(db.clone(), allocator);

        assert!(broken.get_truck_ticket_invoice(&ticket, &config).await.is_err());
        assert!(db
            .invoices()
            .find_open(&invoice_key(&refs), ticket.load_date)
            .await
            .unwrap()
            .is_none());

        let invoice = assigner(&db)
            .get_truck_ticket_invoice(&ticket, &config)
            .await
            .unwrap();
        assert_eq!(invoice.invoice_number.as_deref(), Some("LF0110001"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_assignment_shares_one_invoice() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(DbConfig::new(dir.path().join("invoice.db")).max_connections(4))
            .await
            .unwrap();
        let refs = seed_reference_data(&db).await;
        let config = billing_configuration(&refs, "BC-1");

        let mut settings = HaulbillConfig::default();
        settings.allocation.max_retries = 200;
        let allocator = SequenceAllocator::new(db.sequences(), &settings);
        let assigner = InvoiceAssigner::new(db.clone(), allocator);

        let mut handles = Vec::new();
        for n in 0..6 {
            let assigner = assigner.clone();
            let config = config.clone();
            let ticket = truck_ticket(&refs, &format!("TT-{}", n), &format!("LF01{}", 10001 + n));
            handles.push(tokio::spawn(async move {
                assigner
                    .get_truck_ticket_invoice(&ticket, &config)
                    .await
                    .unwrap()
                    .id
            }));
        }

        let mut ids = BTreeSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 1);

        let stored = db
            .invoices()
            .find_open(&invoice_key(&refs), d(2023, 3, 5))
            .await
            .unwrap()
            .unwrap();
        assert!(ids.contains(&stored.id));
        assert!(stored.invoice_number.is_some());
    }
}
