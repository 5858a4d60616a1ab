//! # Invoice Repository
//!
//! Lookup, creation and running totals of invoices.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use haulbill_core::Invoice;

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, facility_id, billing_customer_id, invoice_configuration_id,
    invoice_permutation_id, currency, legal_entity_id, status, start_date, end_date,
    is_reversed, is_reversal, total_cents, ticket_count, created_at
"#;

/// Identity of the invoice stream a ticket belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceKey {
    pub facility_id: String,
    pub billing_customer_id: String,
    pub invoice_configuration_id: String,
    pub invoice_permutation_id: String,
    pub currency: String,
}

/// Repository for invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Invoice> {
        let sql = format!("SELECT {} FROM invoices WHERE id = ?1", INVOICE_COLUMNS);
        sqlx::query_as::<_, Invoice>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Invoice", id))
    }

    /// Live un-posted invoice of the stream whose period contains `load_date`.
    ///
    /// Reversed and reversal invoices never qualify; an invoice that ended
    /// before the load date is not returned.
    pub async fn find_open(&self, key: &InvoiceKey, load_date: NaiveDate) -> DbResult<Option<Invoice>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM invoices
            WHERE facility_id = ?1
              AND billing_customer_id = ?2
              AND invoice_configuration_id = ?3
              AND invoice_permutation_id = ?4
              AND currency = ?5
              AND status = 'un_posted'
              AND is_reversed = 0
              AND is_reversal = 0
              AND start_date <= ?6
              AND (end_date IS NULL OR end_date >= ?6)
            ORDER BY start_date DESC
            LIMIT 1
            "#,
            INVOICE_COLUMNS
        );

        let invoice = sqlx::query_as::<_, Invoice>(&sql)
            .bind(&key.facility_id)
            .bind(&key.billing_customer_id)
            .bind(&key.invoice_configuration_id)
            .bind(&key.invoice_permutation_id)
            .bind(&key.currency)
            .bind(load_date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(invoice)
    }

    /// Inserts a new invoice. Fails with `UniqueViolation` when a live
    /// invoice for the same stream and start date already exists.
    pub async fn insert(&self, invoice: &Invoice) -> DbResult<()> {
        debug!(
            id = %invoice.id,
            permutation = %invoice.invoice_permutation_id,
            start_date = %invoice.start_date,
            "Inserting invoice"
        );

        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, invoice_number, facility_id, billing_customer_id, invoice_configuration_id,
                invoice_permutation_id, currency, legal_entity_id, status, start_date, end_date,
                is_reversed, is_reversal, total_cents, ticket_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&invoice.id)
        .bind(&invoice.invoice_number)
        .bind(&invoice.facility_id)
        .bind(&invoice.billing_customer_id)
        .bind(&invoice.invoice_configuration_id)
        .bind(&invoice.invoice_permutation_id)
        .bind(&invoice.currency)
        .bind(&invoice.legal_entity_id)
        .bind(invoice.status)
        .bind(invoice.start_date)
        .bind(invoice.end_date)
        .bind(invoice.is_reversed)
        .bind(invoice.is_reversal)
        .bind(invoice.total_cents)
        .bind(invoice.ticket_count)
        .bind(invoice.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Adds sales line totals to the invoice's running totals.
    pub async fn add_totals_in(
        conn: &mut SqliteConnection,
        id: &str,
        total_cents: i64,
        tickets: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET total_cents = total_cents + ?1, ticket_count = ticket_count + ?2
            WHERE id = ?3
            "#,
        )
        .bind(total_cents)
        .bind(tickets)
        .bind(id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", id));
        }
        Ok(())
    }

    /// Marks an invoice posted; it no longer accepts tickets.
    pub async fn post(&self, id: &str) -> DbResult<()> {
        debug!(id = %id, "Posting invoice");

        let result = sqlx::query("UPDATE invoices SET status = 'posted' WHERE id = ?1 AND status = 'un_posted'")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Invoice", id));
        }
        Ok(())
    }
}
