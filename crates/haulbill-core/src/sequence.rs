//! # Sequence Counters
//!
//! Validation and formatting for block-allocated document numbers.
//!
//! ## Block Reservation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  counter (ScaleTicket, "LF01")   seed 10000   last 10004   max block 50 │
//! │                                                                         │
//! │  reserve_block(3):                                                      │
//! │    target.last_number = 10007                                           │
//! │    validate(original, target)                                           │
//! │      1. type unchanged            → SequenceTypeChanged                 │
//! │      2. prefix unchanged          → SequencePrefixChanged               │
//! │      3. 10007 >= seed             → SequenceBelowSeed                   │
//! │      4. 10007 - 10004 <= 50       → SequenceBlockTooLarge               │
//! │    block = 10005..=10007                                                │
//! │                                                                         │
//! │  formatted: prefix + infix + zero-padded number + suffix               │
//! │             "LF01" + ""    + "10005"            + "-LF"                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The storage side (read, validate, compare-and-swap, retry) lives in
//! `haulbill-db`; everything here is pure.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::FacilityType;

// =============================================================================
// Sequence Type
// =============================================================================

/// Document class a counter numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
pub enum SequenceType {
    ScaleTicket,
    WorkTicket,
    Invoice,
    LoadConfirmation,
}

impl SequenceType {
    pub const ALL: [SequenceType; 4] = [
        SequenceType::ScaleTicket,
        SequenceType::WorkTicket,
        SequenceType::Invoice,
        SequenceType::LoadConfirmation,
    ];

    /// Name used for the `[sequences.<name>]` configuration tables.
    pub fn config_key(&self) -> &'static str {
        match self {
            SequenceType::ScaleTicket => "ScaleTicket",
            SequenceType::WorkTicket => "WorkTicket",
            SequenceType::Invoice => "Invoice",
            SequenceType::LoadConfirmation => "LoadConfirmation",
        }
    }

    pub fn from_config_key(key: &str) -> Option<SequenceType> {
        SequenceType::ALL.into_iter().find(|t| t.config_key() == key)
    }

    /// Ticket counter for a facility: landfills issue scale tickets,
    /// every other facility type issues work tickets.
    pub fn for_facility(facility_type: FacilityType) -> SequenceType {
        match facility_type {
            FacilityType::Landfill => SequenceType::ScaleTicket,
            _ => SequenceType::WorkTicket,
        }
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

// =============================================================================
// Settings & Counter
// =============================================================================

/// Per-type numbering settings, read from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceSettings {
    pub seed: i64,
    pub infix: String,
    pub suffix: String,
    pub max_request_block_size: i64,
    /// Minimum digit count of the numeric part; 0 = no padding.
    pub padding: usize,
}

impl Default for SequenceSettings {
    fn default() -> Self {
        SequenceSettings {
            seed: 10000,
            infix: String::new(),
            suffix: String::new(),
            max_request_block_size: 50,
            padding: 0,
        }
    }
}

impl SequenceSettings {
    pub fn format_for(&self, prefix: &str) -> NumberFormat {
        NumberFormat {
            prefix: prefix.to_string(),
            infix: self.infix.clone(),
            suffix: self.suffix.clone(),
            padding: self.padding,
        }
    }
}

/// A stored counter row, one per (type, prefix).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SequenceCounter {
    pub id: String,
    pub sequence_type: SequenceType,
    pub prefix: String,
    pub last_number: i64,
    pub seed: i64,
    pub max_request_block_size: i64,
    /// Optimistic concurrency version, bumped on every write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl SequenceCounter {
    /// New counter positioned at its seed; the first issued number is
    /// `seed + 1`.
    pub fn new(sequence_type: SequenceType, prefix: &str, settings: &SequenceSettings) -> Self {
        SequenceCounter {
            id: uuid::Uuid::new_v4().to_string(),
            sequence_type,
            prefix: prefix.to_string(),
            last_number: settings.seed,
            seed: settings.seed,
            max_request_block_size: settings.max_request_block_size,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// Takes the seed floor and block cap from the current configuration.
    /// The stored row keeps whatever was configured at its last write.
    pub fn apply_settings(&mut self, settings: &SequenceSettings) {
        self.seed = settings.seed;
        self.max_request_block_size = settings.max_request_block_size;
    }
}

// =============================================================================
// Validation
// =============================================================================

/// Checks a counter mutation before it is committed.
///
/// Lowering `last_number` is accepted as long as it stays at or above the
/// seed; only forward jumps are bounded by the block size. Both bounds come
/// from `original`: a target cannot widen its own cap or lower its own seed.
pub fn validate_counter_update(
    original: &SequenceCounter,
    target: &SequenceCounter,
) -> CoreResult<()> {
    if original.sequence_type != target.sequence_type {
        return Err(CoreError::SequenceTypeChanged {
            original: original.sequence_type.to_string(),
            target: target.sequence_type.to_string(),
        });
    }

    if original.prefix != target.prefix {
        return Err(CoreError::SequencePrefixChanged {
            original: original.prefix.clone(),
            target: target.prefix.clone(),
        });
    }

    if target.last_number < original.seed {
        return Err(CoreError::SequenceBelowSeed {
            seed: original.seed,
            last_number: target.last_number,
        });
    }

    let delta = target.last_number.saturating_sub(original.last_number);
    if delta > original.max_request_block_size {
        return Err(CoreError::SequenceBlockTooLarge {
            requested: delta,
            max: original.max_request_block_size,
        });
    }

    Ok(())
}

/// A validated, not yet committed block of numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReservation {
    /// Counter state to write back.
    pub target: SequenceCounter,
    pub first: i64,
    pub last: i64,
}

impl BlockReservation {
    pub fn count(&self) -> i64 {
        self.last - self.first + 1
    }

    pub fn into_block(self, format: NumberFormat) -> SequenceBlock {
        SequenceBlock::new(format, self.first, self.last)
    }
}

/// Advances the counter by `count` and validates the result.
pub fn reserve_block(counter: &SequenceCounter, count: i64) -> CoreResult<BlockReservation> {
    if count <= 0 {
        return Err(CoreError::InvalidBlockCount(count));
    }
    let too_large = CoreError::SequenceBlockTooLarge {
        requested: count,
        max: counter.max_request_block_size,
    };
    if count > counter.max_request_block_size {
        return Err(too_large);
    }

    let mut target = counter.clone();
    target.last_number = counter.last_number.checked_add(count).ok_or(too_large)?;
    validate_counter_update(counter, &target)?;

    Ok(BlockReservation {
        first: counter.last_number + 1,
        last: target.last_number,
        target,
    })
}

// =============================================================================
// Formatting
// =============================================================================

/// How a numeric sequence value is rendered as a document number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NumberFormat {
    pub prefix: String,
    pub infix: String,
    pub suffix: String,
    pub padding: usize,
}

impl NumberFormat {
    pub fn format(&self, number: i64) -> String {
        format!(
            "{}{}{:0width$}{}",
            self.prefix,
            self.infix,
            number,
            self.suffix,
            width = self.padding
        )
    }
}

/// Lazily formatted numbers of one reserved block.
#[derive(Debug, Clone)]
pub struct SequenceBlock {
    format: NumberFormat,
    next: i64,
    last: i64,
}

impl SequenceBlock {
    pub fn new(format: NumberFormat, first: i64, last: i64) -> Self {
        SequenceBlock {
            format,
            next: first,
            last,
        }
    }
}

impl Iterator for SequenceBlock {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next > self.last {
            return None;
        }
        let number = self.format.format(self.next);
        self.next += 1;
        Some(number)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.last - self.next + 1).max(0) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SequenceBlock {}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter(last_number: i64) -> SequenceCounter {
        let mut c = SequenceCounter::new(
            SequenceType::ScaleTicket,
            "LF01",
            &SequenceSettings::default(),
        );
        c.last_number = last_number;
        c
    }

    #[test]
    fn test_validate_block_bounds() {
        let original = counter(10000);

        let mut ok = original.clone();
        ok.last_number = 10005;
        assert!(validate_counter_update(&original, &ok).is_ok());

        let mut below = original.clone();
        below.last_number = 9990;
        assert!(matches!(
            validate_counter_update(&original, &below),
            Err(CoreError::SequenceBelowSeed { seed: 10000, last_number: 9990 })
        ));

        let mut too_far = original.clone();
        too_far.last_number = 10061;
        assert!(matches!(
            validate_counter_update(&original, &too_far),
            Err(CoreError::SequenceBlockTooLarge { requested: 61, max: 50 })
        ));
    }

    #[test]
    fn test_validate_immutable_identity() {
        let original = counter(10000);

        let mut retyped = original.clone();
        retyped.sequence_type = SequenceType::WorkTicket;
        assert!(matches!(
            validate_counter_update(&original, &retyped),
            Err(CoreError::SequenceTypeChanged { .. })
        ));

        let mut renamed = original.clone();
        renamed.prefix = "LF02".to_string();
        assert!(matches!(
            validate_counter_update(&original, &renamed),
            Err(CoreError::SequencePrefixChanged { .. })
        ));
    }

    #[test]
    fn test_lowering_above_seed_is_allowed() {
        let original = counter(10040);
        let mut target = original.clone();
        target.last_number = 10010;
        assert!(validate_counter_update(&original, &target).is_ok());
    }

    #[test]
    fn test_reserve_block() {
        let c = counter(10004);
        let r = reserve_block(&c, 3).unwrap();
        assert_eq!((r.first, r.last, r.count()), (10005, 10007, 3));
        assert_eq!(r.target.last_number, 10007);

        assert!(matches!(reserve_block(&c, 0), Err(CoreError::InvalidBlockCount(0))));
        assert!(matches!(
            reserve_block(&c, 51),
            Err(CoreError::SequenceBlockTooLarge { .. })
        ));
    }

    #[test]
    fn test_target_cannot_widen_its_own_bounds() {
        let original = counter(10040);

        let mut wider = original.clone();
        wider.max_request_block_size = 1_000_000;
        wider.last_number = 10040 + 100_000;
        assert!(matches!(
            validate_counter_update(&original, &wider),
            Err(CoreError::SequenceBlockTooLarge { requested: 100_000, max: 50 })
        ));

        let mut reseeded = original.clone();
        reseeded.seed = 0;
        reseeded.last_number = 500;
        assert!(matches!(
            validate_counter_update(&original, &reseeded),
            Err(CoreError::SequenceBelowSeed { seed: 10000, last_number: 500 })
        ));
    }

    #[test]
    fn test_reserve_block_rejects_huge_counts_without_overflow() {
        let c = counter(10004);
        assert!(matches!(
            reserve_block(&c, i64::MAX),
            Err(CoreError::SequenceBlockTooLarge { requested: i64::MAX, max: 50 })
        ));

        let mut near_end = counter(i64::MAX - 1);
        near_end.max_request_block_size = i64::MAX;
        assert!(matches!(
            reserve_block(&near_end, 10),
            Err(CoreError::SequenceBlockTooLarge { requested: 10, .. })
        ));
    }

    #[test]
    fn test_apply_settings_overrides_stored_bounds() {
        let mut c = counter(10004);
        c.apply_settings(&SequenceSettings {
            max_request_block_size: 100,
            ..SequenceSettings::default()
        });
        assert_eq!(reserve_block(&c, 60).unwrap().last, 10064);

        c.apply_settings(&SequenceSettings {
            max_request_block_size: 5,
            ..SequenceSettings::default()
        });
        assert!(matches!(
            reserve_block(&c, 40),
            Err(CoreError::SequenceBlockTooLarge { requested: 40, max: 5 })
        ));
    }

    #[test]
    fn test_block_formatting_is_lazy_and_bounded() {
        let format = NumberFormat {
            prefix: "LF01".to_string(),
            infix: "-".to_string(),
            suffix: "-LF".to_string(),
            padding: 7,
        };
        let mut block = reserve_block(&counter(10000), 2).unwrap().into_block(format);
        assert_eq!(block.len(), 2);
        assert_eq!(block.next().as_deref(), Some("LF01-0010001-LF"));
        assert_eq!(block.next().as_deref(), Some("LF01-0010002-LF"));
        assert_eq!(block.next(), None);
    }

    #[test]
    fn test_sequence_type_for_facility() {
        assert_eq!(SequenceType::for_facility(FacilityType::Landfill), SequenceType::ScaleTicket);
        assert_eq!(SequenceType::for_facility(FacilityType::Pipeline), SequenceType::WorkTicket);
        assert_eq!(SequenceType::from_config_key("Invoice"), Some(SequenceType::Invoice));
        assert_eq!(SequenceType::from_config_key("invoice"), None);
    }
}
