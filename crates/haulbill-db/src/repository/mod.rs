//! # Repository Module
//!
//! Store collaborators of the billing pipeline.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Service (allocator, assigners, orchestrator)                          │
//! │       │                                                                 │
//! │       │  db.invoices().find_open(&key, load_date)                      │
//! │       ▼                                                                 │
//! │  InvoiceRepository                                                     │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── find_open(&self, key, date)                                       │
//! │  ├── insert(&self, invoice)                                            │
//! │  └── add_totals_in(conn, id, cents, tickets)  ← joins a transaction    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ReferenceRepository`] - Facilities, accounts, legal entities, approvals
//! - [`BillingConfigurationRepository`] - Configurations with predicates
//! - [`TicketRepository`] - Truck tickets with version-tag checks
//! - [`InvoiceRepository`] - Invoices
//! - [`LoadConfirmationRepository`] - Load confirmations
//! - [`SequenceRepository`] - Sequence counters
//! - [`SalesLineRepository`] - Sales lines
//!
//! [`ReferenceRepository`]: reference::ReferenceRepository
//! [`BillingConfigurationRepository`]: billing_configuration::BillingConfigurationRepository
//! [`TicketRepository`]: ticket::TicketRepository
//! [`InvoiceRepository`]: invoice::InvoiceRepository
//! [`LoadConfirmationRepository`]: load_confirmation::LoadConfirmationRepository
//! [`SequenceRepository`]: sequence::SequenceRepository
//! [`SalesLineRepository`]: sales_line::SalesLineRepository

pub mod billing_configuration;
pub mod invoice;
pub mod load_confirmation;
pub mod reference;
pub mod sales_line;
pub mod sequence;
pub mod ticket;
