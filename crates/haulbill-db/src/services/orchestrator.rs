//! # Sales Line Orchestrator
//!
//! Bills approved truck tickets.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  process_ticket(ticket_id, lines)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  status == Approved?  ── no ──► InvalidTicketStatus                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  configuration: manual (already on the ticket) or automated selection  │
//! │       │  NoMatch / Ambiguous / manual config no longer applies         │
//! │       │    ──► Skipped { reason }, nothing written                     │
//! │       ▼                                                                 │
//! │  InvoiceAssigner ──► LoadConfirmationAssigner                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────── one transaction ───────────────────┐            │
//! │  │ INSERT ticket-by-ticket load confirmation (if any)     │            │
//! │  │ INSERT sales_lines (stamped with config/invoice/LC)    │            │
//! │  │ invoice totals += lines, ticket_count += 1             │            │
//! │  │ load confirmation totals += lines                      │            │
//! │  │ ticket → Invoiced (version-tag checked)                │            │
//! │  └────────────────────────────────────────────────────────┘            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use haulbill_core::validation::validate_positive_quantity;
use tracing::{info, warn};

use crate::config::HaulbillConfig;
use crate::error::{DbError, DbResult};
use crate::pool::Database;
use crate::repository::invoice::InvoiceRepository;
use crate::repository::load_confirmation::LoadConfirmationRepository;
use crate::repository::sales_line::SalesLineRepository;
use crate::repository::ticket::TicketRepository;
use crate::services::billing_selector::BillingSelectorService;
use crate::services::invoice_assigner::InvoiceAssigner;
use crate::services::load_confirmation_assigner::{LcAssignment, LoadConfirmationAssigner};
use crate::services::sequence_allocator::SequenceAllocator;
use haulbill_core::{
    AutomationOutcome, BillingConfiguration, CoreError, Money, SalesLine, TruckTicket,
    TruckTicketStatus,
};

/// A product charged on a ticket.
#[derive(Debug, Clone)]
pub struct SalesLineRequest {
    pub product_number: String,
    /// Quantity in thousandths of a unit.
    pub quantity_milli: i64,
    pub rate: Money,
}

/// What happened to one ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingOutcome {
    Billed {
        ticket_id: String,
        billing_configuration_id: String,
        invoice_id: String,
        load_confirmation_id: Option<String>,
        lines: usize,
        total: Money,
    },
    /// No configuration could be chosen automatically; nothing was written.
    Skipped { ticket_id: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct SalesLineOrchestrator {
    db: Database,
    selector: BillingSelectorService,
    invoices: InvoiceAssigner,
    load_confirmations: LoadConfirmationAssigner,
}

impl SalesLineOrchestrator {
    pub fn new(db: Database, config: &HaulbillConfig) -> Self {
        let allocator = SequenceAllocator::new(db.sequences(), config);
        SalesLineOrchestrator {
            selector: BillingSelectorService::new(db.billing_configurations(), config.matching),
            invoices: InvoiceAssigner::new(db.clone(), allocator.clone()),
            load_confirmations: LoadConfirmationAssigner::new(db.clone(), allocator),
            db,
        }
    }

    pub async fn process_ticket(
        &self,
        ticket_id: &str,
        requests: Vec<SalesLineRequest>,
    ) -> DbResult<BillingOutcome> {
        let ticket = self.db.tickets().get_by_id(ticket_id).await?;

        if ticket.status != TruckTicketStatus::Approved {
            return Err(CoreError::InvalidTicketStatus {
                ticket_id: ticket.id.clone(),
                current_status: ticket.status.to_string(),
                operation: "bill".to_string(),
            }
            .into());
        }
        for request in &requests {
            validate_positive_quantity("quantity", request.quantity_milli).map_err(CoreError::from)?;
        }

        let config = match self.resolve_configuration(&ticket).await? {
            Ok(config) => config,
            Err(reason) => {
                warn!(ticket_id = %ticket.id, reason = %reason, "Skipping ticket");
                return Ok(BillingOutcome::Skipped {
                    ticket_id: ticket.id,
                    reason,
                });
            }
        };

        let invoice = self.invoices.get_truck_ticket_invoice(&ticket, &config).await?;
        let assignment = self
            .load_confirmations
            .get_truck_ticket_load_confirmation(&ticket, &config, &invoice)
            .await?;
        let load_confirmation_id = assignment
            .as_ref()
            .map(|a| a.load_confirmation().id.clone());

        let lines: Vec<SalesLine> = requests
            .into_iter()
            .map(|r| {
                let mut line = SalesLine::priced(&ticket, r.product_number, r.quantity_milli, r.rate);
                line.billing_configuration_id = Some(config.id.clone());
                line.invoice_id = Some(invoice.id.clone());
                line.load_confirmation_id = load_confirmation_id.clone();
                line
            })
            .collect();
        let total: Money = lines.iter().map(SalesLine::total).sum();

        let expected_tag = ticket.version_tag.clone();
        let mut billed = ticket;
        billed.billing_configuration_id = Some(config.id.clone());
        billed.invoice_id = Some(invoice.id.clone());
        billed.load_confirmation_id = load_confirmation_id.clone();
        billed.status = TruckTicketStatus::Invoiced;
        billed.version_tag = Some(uuid::Uuid::new_v4().to_string());
        billed.updated_at = Utc::now();

        let mut tx = self.db.pool().begin().await?;
        if let Some(LcAssignment::TicketByTicket(lc)) = &assignment {
            LoadConfirmationRepository::insert_in(&mut tx, lc).await?;
        }
        for line in &lines {
            SalesLineRepository::insert_in(&mut tx, line).await?;
        }
        InvoiceRepository::add_totals_in(&mut tx, &invoice.id, total.cents(), 1).await?;
        if let Some(lc_id) = &load_confirmation_id {
            LoadConfirmationRepository::add_totals_in(&mut tx, lc_id, total.cents(), 1).await?;
        }
        TicketRepository::update_if_version_in(&mut tx, &billed, expected_tag.as_deref()).await?;
        tx.commit().await?;

        info!(
            ticket_id = %billed.id,
            billing_configuration_id = %config.id,
            invoice_id = %invoice.id,
            load_confirmation_id = ?load_confirmation_id,
            lines = lines.len(),
            total = %total,
            "Billed truck ticket"
        );

        Ok(BillingOutcome::Billed {
            ticket_id: billed.id,
            billing_configuration_id: config.id,
            invoice_id: invoice.id,
            load_confirmation_id,
            lines: lines.len(),
            total,
        })
    }

    /// Processes tickets one after another. A failing ticket does not stop
    /// the batch; its error is reported next to its id.
    pub async fn process_batch(
        &self,
        batch: Vec<(String, Vec<SalesLineRequest>)>,
    ) -> Vec<(String, DbResult<BillingOutcome>)> {
        let mut results = Vec::with_capacity(batch.len());
        for (ticket_id, requests) in batch {
            let result = self.process_ticket(&ticket_id, requests).await;
            if let Err(e) = &result {
                warn!(ticket_id = %ticket_id, error = %e, "Ticket billing failed");
            }
            results.push((ticket_id, result));
        }
        results
    }

    /// The manual configuration on the ticket wins as long as it still
    /// applies to the ticket; otherwise exactly one automated configuration
    /// must qualify. The inner `Err` is the skip reason.
    async fn resolve_configuration(
        &self,
        ticket: &TruckTicket,
    ) -> DbResult<Result<BillingConfiguration, String>> {
        if let Some(id) = &ticket.billing_configuration_id {
            return match self.db.billing_configurations().get_by_id(id).await {
                Ok(config) if config.applies_to(ticket) => Ok(Ok(config)),
                Ok(config) => Ok(Err(format!(
                    "billing configuration {} is disabled or does not cover ticket {}",
                    config.id, ticket.ticket_number
                ))),
                Err(DbError::NotFound { .. }) => {
                    Ok(Err(format!("billing configuration {} no longer exists", id)))
                }
                Err(e) => Err(e),
            };
        }

        match self.selector.select_automated_billing_configuration(ticket).await? {
            AutomationOutcome::Matched(config) => Ok(Ok(config)),
            outcome => Ok(Err(outcome.describe())),
        }
    }
}
