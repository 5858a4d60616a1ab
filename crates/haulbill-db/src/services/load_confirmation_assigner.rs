//! # Load Confirmation Assigner
//!
//! Finds or creates the load confirmation a billed ticket belongs to.
//!
//! ```text
//! load confirmations disabled ──► none
//! ticket-by-ticket delivery   ──► new LC, number = ticket number, never reused;
//!                                 stored by the billing transaction
//! batch delivery              ──► frequency window clipped to the invoice
//!                                 ──► reuse open LC of that window
//!                                     or number a new one and insert it
//! ```

use chrono::Utc;
use tracing::{debug, info};

use crate::error::DbResult;
use crate::pool::Database;
use crate::repository::load_confirmation::LcKey;
use crate::services::sequence_allocator::SequenceAllocator;
use crate::services::FIND_OR_CREATE_ATTEMPTS;
use haulbill_core::period::{load_confirmation_period, LcPeriod, LcPolicy, Period};
use haulbill_core::{
    BillingConfiguration, FieldTicketDeliveryMethod, Invoice, LoadConfirmation,
    LoadConfirmationStatus, SequenceType, TruckTicket, TICKET_BY_TICKET_LABEL,
};

/// Load confirmation a billed ticket goes on.
#[derive(Debug, Clone)]
pub enum LcAssignment {
    /// Stored batch load confirmation shared by the tickets of its period.
    Batch(LoadConfirmation),
    /// Not stored yet; inserted in the same transaction that bills the
    /// ticket, so a failed billing leaves nothing behind.
    TicketByTicket(LoadConfirmation),
}

impl LcAssignment {
    pub fn load_confirmation(&self) -> &LoadConfirmation {
        match self {
            LcAssignment::Batch(lc) | LcAssignment::TicketByTicket(lc) => lc,
        }
    }

    pub fn into_load_confirmation(self) -> LoadConfirmation {
        match self {
            LcAssignment::Batch(lc) | LcAssignment::TicketByTicket(lc) => lc,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadConfirmationAssigner {
    db: Database,
    allocator: SequenceAllocator,
}

impl LoadConfirmationAssigner {
    pub fn new(db: Database, allocator: SequenceAllocator) -> Self {
        LoadConfirmationAssigner { db, allocator }
    }

    /// Load confirmation for the ticket on `invoice`, or `None` when the
    /// configuration does not use load confirmations.
    pub async fn get_truck_ticket_load_confirmation(
        &self,
        ticket: &TruckTicket,
        config: &BillingConfiguration,
        invoice: &Invoice,
    ) -> DbResult<Option<LcAssignment>> {
        if !config.load_confirmations_enabled {
            debug!(
                ticket_id = %ticket.id,
                configuration_id = %config.id,
                "Load confirmations disabled"
            );
            return Ok(None);
        }

        let assignment = match config.field_ticket_delivery_method {
            FieldTicketDeliveryMethod::TicketByTicket => {
                LcAssignment::TicketByTicket(ticket_by_ticket(ticket, config, invoice))
            }
            FieldTicketDeliveryMethod::LoadConfirmationBatch => {
                LcAssignment::Batch(self.find_or_create_batch(ticket, config, invoice).await?)
            }
        };
        Ok(Some(assignment))
    }

    async fn find_or_create_batch(
        &self,
        ticket: &TruckTicket,
        config: &BillingConfiguration,
        invoice: &Invoice,
    ) -> DbResult<LoadConfirmation> {
        let policy = LcPolicy {
            frequency: config.load_confirmation_frequency,
            first_day_of_week: config.first_day_of_week,
            first_day_of_month: config.first_day_of_month,
        };
        let invoice_period = Period {
            start: invoice.start_date,
            end: invoice.end_date,
        };
        let period = load_confirmation_period(ticket.load_date, &policy, &invoice_period)?;
        let frequency = config.load_confirmation_frequency.as_str();

        let key = LcKey {
            billing_configuration_id: config.id.clone(),
            invoice_id: invoice.id.clone(),
            invoice_permutation_id: invoice.invoice_permutation_id.clone(),
            facility_id: invoice.facility_id.clone(),
            frequency: frequency.to_string(),
            start_date: period.start,
            end_date: period.end,
        };

        let facility = self.db.reference().get_facility(&invoice.facility_id).await?;
        let repo = self.db.load_confirmations();
        let mut attempt = 0;
        loop {
            attempt += 1;

            if let Some(existing) = repo.find_open(&key).await? {
                debug!(
                    ticket_id = %ticket.id,
                    load_confirmation_id = %existing.id,
                    "Reusing open load confirmation"
                );
                return Ok(existing);
            }

            let number = self
                .allocator
                .next_number(SequenceType::LoadConfirmation, &facility.site_code)
                .await?;
            let mut lc = new_load_confirmation(config, invoice, frequency, period);
            lc.number = Some(number);

            match repo.insert(&lc).await {
                Ok(()) => {
                    info!(
                        ticket_id = %ticket.id,
                        load_confirmation_id = %lc.id,
                        number = ?lc.number,
                        frequency = %frequency,
                        start_date = %lc.start_date,
                        end_date = %lc.end_date,
                        "Created load confirmation"
                    );
                    return Ok(lc);
                }
                Err(e) if e.is_unique_violation() && attempt < FIND_OR_CREATE_ATTEMPTS => {
                    debug!(
                        ticket_id = %ticket.id,
                        attempt,
                        unused_number = ?lc.number,
                        "Load confirmation created concurrently, looking up again"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// One load confirmation per ticket, numbered with the ticket number.
fn ticket_by_ticket(
    ticket: &TruckTicket,
    config: &BillingConfiguration,
    invoice: &Invoice,
) -> LoadConfirmation {
    let period = LcPeriod {
        start: ticket.load_date,
        end: ticket.load_date,
    };
    let mut lc = new_load_confirmation(config, invoice, TICKET_BY_TICKET_LABEL, period);
    lc.is_ticket_by_ticket = true;
    lc.number = Some(ticket.ticket_number.clone());
    lc
}

fn new_load_confirmation(
    config: &BillingConfiguration,
    invoice: &Invoice,
    frequency: &str,
    period: LcPeriod,
) -> LoadConfirmation {
    LoadConfirmation {
        id: uuid::Uuid::new_v4().to_string(),
        number: None,
        billing_configuration_id: config.id.clone(),
        invoice_id: invoice.id.clone(),
        invoice_permutation_id: invoice.invoice_permutation_id.clone(),
        facility_id: invoice.facility_id.clone(),
        frequency: frequency.to_string(),
        is_ticket_by_ticket: false,
        status: LoadConfirmationStatus::Open,
        start_date: period.start,
        end_date: period.end,
        is_reversed: false,
        is_reversal: false,
        total_cents: 0,
        ticket_count: 0,
        created_at: Utc::now(),
    }
}
