//! # Error Types
//!
//! Domain-specific error types for haulbill-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  haulbill-core errors (this file)                                      │
//! │  ├── CoreError        - Billing rule violations                        │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  haulbill-db errors (separate crate)                                   │
//! │  └── DbError          - Store failures, wraps CoreError                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! An ambiguous or missing automated billing match is deliberately NOT an
//! error here; see [`crate::selection::AutomationOutcome`].

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core billing rule errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A sequence counter's type was changed after creation.
    #[error("Sequence type is immutable: {original} cannot become {target}")]
    SequenceTypeChanged { original: String, target: String },

    /// A sequence counter's prefix was changed after creation.
    #[error("Sequence prefix is immutable: '{original}' cannot become '{target}'")]
    SequencePrefixChanged { original: String, target: String },

    /// The last issued number would drop below the configured floor.
    ///
    /// ## When This Occurs
    /// - Manual re-seed of a counter to a value under its seed
    /// - Counter row created with a last number smaller than the seed
    #[error("Sequence block size violation: last number {last_number} is below seed {seed}")]
    SequenceBelowSeed { seed: i64, last_number: i64 },

    /// A single update advanced the counter by more than the allowed block.
    #[error("Sequence block size violation: requested {requested} numbers, maximum is {max}")]
    SequenceBlockTooLarge { requested: i64, max: i64 },

    /// A block reservation asked for zero or a negative amount of numbers.
    #[error("Sequence block count must be positive, got {0}")]
    InvalidBlockCount(i64),

    /// Two concurrent edits carry the same attachment id pointing at
    /// different files.
    ///
    /// ## User Workflow
    /// ```text
    /// Scale clerk uploads A (blob x) ──┐
    ///                                  ├──► same id, different blob
    /// Billing clerk edits A (blob y) ──┘
    ///      │
    ///      ▼
    /// AttachmentConflict { attachment_id: "A" } → surfaced, not guessed
    /// ```
    #[error("Attachment {attachment_id} was changed by two concurrent edits")]
    AttachmentConflict { attachment_id: String },

    /// Ticket is not in a state that allows the requested operation.
    #[error("Truck ticket {ticket_id} is {current_status}, cannot {operation}")]
    InvalidTicketStatus {
        ticket_id: String,
        current_status: String,
        operation: String,
    },

    /// A computed or supplied period is inconsistent.
    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (e.g., currency code, site code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
