//! # Truck Ticket Repository
//!
//! Persistence for truck tickets with optimistic version-tag checks.
//!
//! ## Optimistic Update
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  UPDATE truck_tickets SET ..., version_tag = :new                       │
//! │  WHERE id = :id AND version_tag IS :expected                            │
//! │                                                                         │
//! │  rows_affected = 1  → saved                                             │
//! │  rows_affected = 0  → someone else saved first → ConcurrencyConflict    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Attachments and volumes are stored as JSON text columns.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use std::collections::BTreeSet;
use tracing::debug;

use crate::error::{DbError, DbResult};
use haulbill_core::{Attachment, TruckTicket, TruckTicketStatus, Volumes};

#[derive(Debug, FromRow)]
struct TicketRecord {
    id: String,
    ticket_number: String,
    facility_id: String,
    country_code: String,
    source_location_id: Option<String>,
    stream: Option<String>,
    well_classification: Option<String>,
    service_type_id: Option<String>,
    substance_id: Option<String>,
    generator_id: String,
    billing_customer_id: String,
    material_approval_id: Option<String>,
    load_date: NaiveDate,
    time_out: Option<NaiveDateTime>,
    effective_date: Option<NaiveDate>,
    status: TruckTicketStatus,
    version_tag: Option<String>,
    attachments: String,
    volumes: String,
    billing_configuration_id: Option<String>,
    invoice_id: Option<String>,
    load_confirmation_id: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRecord> for TruckTicket {
    type Error = DbError;

    fn try_from(r: TicketRecord) -> DbResult<Self> {
        let attachments: Vec<Attachment> = serde_json::from_str(&r.attachments)?;
        let volumes: Volumes = serde_json::from_str(&r.volumes)?;

        Ok(TruckTicket {
            id: r.id,
            ticket_number: r.ticket_number,
            facility_id: r.facility_id,
            country_code: r.country_code,
            source_location_id: r.source_location_id,
            stream: r.stream,
            well_classification: r.well_classification,
            service_type_id: r.service_type_id,
            substance_id: r.substance_id,
            generator_id: r.generator_id,
            billing_customer_id: r.billing_customer_id,
            material_approval_id: r.material_approval_id,
            load_date: r.load_date,
            time_out: r.time_out,
            effective_date: r.effective_date,
            status: r.status,
            version_tag: r.version_tag,
            attachments,
            removed_attachment_ids: BTreeSet::new(),
            volumes,
            billing_configuration_id: r.billing_configuration_id,
            invoice_id: r.invoice_id,
            load_confirmation_id: r.load_confirmation_id,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

/// Repository for truck ticket database operations.
#[derive(Debug, Clone)]
pub struct TicketRepository {
    pool: SqlitePool,
}

impl TicketRepository {
    /// Creates a new TicketRepository.
    pub fn new(pool: SqlitePool) -> Self {
        TicketRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<TruckTicket> {
        let record = sqlx::query_as::<_, TicketRecord>("SELECT * FROM truck_tickets WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("TruckTicket", id))?;

        record.try_into()
    }

    pub async fn list_by_status(&self, status: TruckTicketStatus) -> DbResult<Vec<TruckTicket>> {
        let records = sqlx::query_as::<_, TicketRecord>(
            "SELECT * FROM truck_tickets WHERE status = ?1 ORDER BY load_date, ticket_number",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(TruckTicket::try_from).collect()
    }

    pub async fn insert(&self, ticket: &TruckTicket) -> DbResult<()> {
        debug!(id = %ticket.id, ticket_number = %ticket.ticket_number, "Inserting truck ticket");

        let attachments = serde_json::to_string(&ticket.attachments)?;
        let volumes = serde_json::to_string(&ticket.volumes)?;

        sqlx::query(
            r#"
            INSERT INTO truck_tickets (
                id, ticket_number, facility_id, country_code,
                source_location_id, stream, well_classification, service_type_id, substance_id,
                generator_id, billing_customer_id, material_approval_id,
                load_date, time_out, effective_date, status, version_tag,
                attachments, volumes,
                billing_configuration_id, invoice_id, load_confirmation_id,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4,
                ?5, ?6, ?7, ?8, ?9,
                ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17,
                ?18, ?19,
                ?20, ?21, ?22,
                ?23, ?24
            )
            "#,
        )
        .bind(&ticket.id)
        .bind(&ticket.ticket_number)
        .bind(&ticket.facility_id)
        .bind(&ticket.country_code)
        .bind(&ticket.source_location_id)
        .bind(&ticket.stream)
        .bind(&ticket.well_classification)
        .bind(&ticket.service_type_id)
        .bind(&ticket.substance_id)
        .bind(&ticket.generator_id)
        .bind(&ticket.billing_customer_id)
        .bind(&ticket.material_approval_id)
        .bind(ticket.load_date)
        .bind(ticket.time_out)
        .bind(ticket.effective_date)
        .bind(ticket.status)
        .bind(&ticket.version_tag)
        .bind(attachments)
        .bind(volumes)
        .bind(&ticket.billing_configuration_id)
        .bind(&ticket.invoice_id)
        .bind(&ticket.load_confirmation_id)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Saves every mutable column if the stored version tag still equals
    /// `expected_tag`.
    pub async fn update_if_version(
        &self,
        ticket: &TruckTicket,
        expected_tag: Option<&str>,
    ) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::update_if_version_in(&mut conn, ticket, expected_tag).await
    }

    /// Same as [`Self::update_if_version`], on a caller-owned connection or
    /// transaction.
    pub async fn update_if_version_in(
        conn: &mut SqliteConnection,
        ticket: &TruckTicket,
        expected_tag: Option<&str>,
    ) -> DbResult<()> {
        debug!(
            id = %ticket.id,
            status = %ticket.status,
            "Updating truck ticket"
        );

        let attachments = serde_json::to_string(&ticket.attachments)?;
        let volumes = serde_json::to_string(&ticket.volumes)?;

        let result = sqlx::query(
            r#"
            UPDATE truck_tickets SET
                source_location_id = ?1,
                stream = ?2,
                well_classification = ?3,
                service_type_id = ?4,
                substance_id = ?5,
                material_approval_id = ?6,
                load_date = ?7,
                time_out = ?8,
                effective_date = ?9,
                status = ?10,
                version_tag = ?11,
                attachments = ?12,
                volumes = ?13,
                billing_configuration_id = ?14,
                invoice_id = ?15,
                load_confirmation_id = ?16,
                updated_at = ?17
            WHERE id = ?18 AND version_tag IS ?19
            "#,
        )
        .bind(&ticket.source_location_id)
        .bind(&ticket.stream)
        .bind(&ticket.well_classification)
        .bind(&ticket.service_type_id)
        .bind(&ticket.substance_id)
        .bind(&ticket.material_approval_id)
        .bind(ticket.load_date)
        .bind(ticket.time_out)
        .bind(ticket.effective_date)
        .bind(ticket.status)
        .bind(&ticket.version_tag)
        .bind(attachments)
        .bind(volumes)
        .bind(&ticket.billing_configuration_id)
        .bind(&ticket.invoice_id)
        .bind(&ticket.load_confirmation_id)
        .bind(ticket.updated_at)
        .bind(&ticket.id)
        .bind(expected_tag)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::conflict("TruckTicket", ticket.id.as_str()));
        }
        Ok(())
    }
}
