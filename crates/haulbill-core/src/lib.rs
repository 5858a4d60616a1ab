//! # haulbill-core: Pure Billing Rules for Truck Tickets
//!
//! All the decision-making of the billing automation pipeline, as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Billing Automation Pipeline                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │             haulbill-db services (orchestrator, assigners)      │   │
//! │  │    approved ticket ──► config ──► invoice ──► LC ──► lines      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ plain function calls                   │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ haulbill-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────────┐         │   │
//! │  │   │ matching │ │ selection │ │  period  │ │ sequence │         │   │
//! │  │   │  scores  │ │  winner   │ │ windows  │ │  blocks  │         │   │
//! │  │   └──────────┘ └───────────┘ └──────────┘ └──────────┘         │   │
//! │  │   ┌──────────┐ ┌───────────┐ ┌──────────┐ ┌──────────┐         │   │
//! │  │   │  merge   │ │ workflow  │ │  money   │ │validation│         │   │
//! │  │   └──────────┘ └───────────┘ └──────────┘ └──────────┘         │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO LOGGING • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (TruckTicket, BillingConfiguration, Invoice, ...)
//! - [`matching`] - Weighted predicate evaluation and token filter
//! - [`selection`] - Manual and automated billing configuration selection
//! - [`period`] - Invoice / load confirmation windows, effective dates
//! - [`sequence`] - Counter validation, block reservation, number formatting
//! - [`merge`] - Concurrent ticket edit merge and the ticket update pipeline
//! - [`workflow`] - Ordered step pipeline and business context
//! - [`money`] - Integer-cent money for sales lines
//! - [`validation`] - Field checks
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use haulbill_core::period::{load_confirmation_period, invoice_period, LcPolicy};
//! use chrono::NaiveDate;
//!
//! let load_date = NaiveDate::from_ymd_opt(2023, 3, 5).unwrap();
//! let invoice = invoice_period(load_date, false);
//! let policy = LcPolicy { first_day_of_month: 16, ..LcPolicy::default() };
//!
//! let lc = load_confirmation_period(load_date, &policy, &invoice).unwrap();
//! assert_eq!(lc.end, NaiveDate::from_ymd_opt(2023, 3, 15).unwrap());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod matching;
pub mod merge;
pub mod money;
pub mod period;
pub mod selection;
pub mod sequence;
pub mod types;
pub mod validation;
pub mod workflow;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use matching::{Criterion, CriterionWeights, PredicateMatcher, PredicateScore};
pub use money::Money;
pub use selection::{AutomationOutcome, BillingConfigSelector, ConfigurationMatch};
pub use sequence::{SequenceCounter, SequenceSettings, SequenceType};
pub use types::*;
