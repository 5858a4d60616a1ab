//! # Billing Services
//!
//! Services join the pure rules of `haulbill-core` with repository lookups.
//!
//! ```text
//! SalesLineOrchestrator::process_ticket
//!   ├── BillingSelectorService      candidates → BillingConfigSelector
//!   ├── InvoiceAssigner             period → find-or-create (numbered on insert)
//!   ├── LoadConfirmationAssigner    sub-period → find-or-create (numbered on insert)
//!   └── one transaction: ticket-by-ticket LC + sales lines + running totals + ticket
//!
//! TicketService::create / update / void
//!   ├── SequenceAllocator           ticket numbers
//!   └── truck_ticket_pipeline()     merge + attachment types
//! ```

pub mod billing_selector;
pub mod invoice_assigner;
pub mod load_confirmation_assigner;
pub mod orchestrator;
pub mod sequence_allocator;
pub mod ticket_service;

pub use billing_selector::BillingSelectorService;
pub use invoice_assigner::InvoiceAssigner;
pub use load_confirmation_assigner::{LcAssignment, LoadConfirmationAssigner};
pub use orchestrator::{BillingOutcome, SalesLineOrchestrator, SalesLineRequest};
pub use sequence_allocator::SequenceAllocator;
pub use ticket_service::TicketService;

/// Attempts for a find-or-create before a persistent unique violation is
/// returned to the caller.
pub(crate) const FIND_OR_CREATE_ATTEMPTS: usize = 3;
