//! # Ticket Service
//!
//! Create, update and void truck tickets.
//!
//! ## Update Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  client edit (target, carries the tag it was based on)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  stored ticket (original) ── tag read here is the expected tag          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  truck_ticket_pipeline()                                               │
//! │    Validation  validate-volumes                                         │
//! │    PreSave     merge-concurrent-attachments  (tags differ)              │
//! │    PreSave     correct-attachment-types                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  effective date refresh (facility cutoff), new version tag              │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  UPDATE ... WHERE version_tag IS expected  ── 0 rows → conflict        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use tracing::{debug, info};

use crate::error::DbResult;
use crate::pool::Database;
use crate::services::sequence_allocator::SequenceAllocator;
use haulbill_core::merge::{truck_ticket_pipeline, TicketContext};
use haulbill_core::period::effective_date;
use haulbill_core::workflow::{BusinessContext, Pipeline, Stage};
use haulbill_core::{CoreError, Facility, TruckTicket, TruckTicketStatus};

fn new_version_tag() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn refresh_effective_date(ticket: &mut TruckTicket, facility: &Facility) {
    ticket.effective_date = Some(effective_date(
        ticket.time_out,
        ticket.load_date,
        facility.operating_day_cutoff,
    ));
}

#[derive(Debug, Clone)]
pub struct TicketService {
    db: Database,
    allocator: SequenceAllocator,
    pipeline: Pipeline<TicketContext>,
}

impl TicketService {
    pub fn new(db: Database, allocator: SequenceAllocator) -> Self {
        TicketService {
            db,
            allocator,
            pipeline: truck_ticket_pipeline(),
        }
    }

    /// Stores a new ticket. An empty ticket number is filled from the
    /// facility's sequence.
    pub async fn create(&self, ticket: TruckTicket) -> DbResult<TruckTicket> {
        let facility = self.db.reference().get_facility(&ticket.facility_id).await?;

        let mut ctx = BusinessContext::insert(ticket);
        self.pipeline.run_stages(&Stage::BEFORE_SAVE, &mut ctx)?;
        let mut ticket = ctx.target;

        if ticket.ticket_number.is_empty() {
            ticket.ticket_number = self.allocator.ticket_number(&facility).await?;
        }
        refresh_effective_date(&mut ticket, &facility);
        ticket.version_tag = Some(new_version_tag());
        ticket.created_at = Utc::now();
        ticket.updated_at = ticket.created_at;

        self.db.tickets().insert(&ticket).await?;

        info!(
            ticket_id = %ticket.id,
            ticket_number = %ticket.ticket_number,
            facility_id = %ticket.facility_id,
            "Created truck ticket"
        );
        Ok(ticket)
    }

    /// Saves an edit, merging it with whatever was stored since the edit's
    /// base version.
    pub async fn update(&self, target: TruckTicket) -> DbResult<TruckTicket> {
        let tickets = self.db.tickets();
        let original = tickets.get_by_id(&target.id).await?;

        if matches!(
            original.status,
            TruckTicketStatus::Void | TruckTicketStatus::Invoiced
        ) {
            return Err(CoreError::InvalidTicketStatus {
                ticket_id: original.id.clone(),
                current_status: original.status.to_string(),
                operation: "update".to_string(),
            }
            .into());
        }

        let expected_tag = original.version_tag.clone();
        let facility = self.db.reference().get_facility(&original.facility_id).await?;

        let mut ctx = BusinessContext::update(original, target);
        let ran = self.pipeline.run_stages(&Stage::BEFORE_SAVE, &mut ctx)?;
        debug!(ticket_id = %ctx.target.id, steps = ?ran, "Ticket update pipeline ran");

        let mut ticket = ctx.target;
        refresh_effective_date(&mut ticket, &facility);
        ticket.version_tag = Some(new_version_tag());
        ticket.updated_at = Utc::now();

        tickets
            .update_if_version(&ticket, expected_tag.as_deref())
            .await?;

        info!(ticket_id = %ticket.id, "Updated truck ticket");
        Ok(ticket)
    }

    pub async fn void(&self, ticket_id: &str) -> DbResult<TruckTicket> {
        let mut ticket = self.db.tickets().get_by_id(ticket_id).await?;

        if !ticket.status.can_void() {
            return Err(CoreError::InvalidTicketStatus {
                ticket_id: ticket.id.clone(),
                current_status: ticket.status.to_string(),
                operation: "void".to_string(),
            }
            .into());
        }

        let expected_tag = ticket.version_tag.clone();
        ticket.status = TruckTicketStatus::Void;
        ticket.version_tag = Some(new_version_tag());
        ticket.updated_at = Utc::now();

        self.db
            .tickets()
            .update_if_version(&ticket, expected_tag.as_deref())
            .await?;

        info!(ticket_id = %ticket.id, "Voided truck ticket");
        Ok(ticket)
    }
}
