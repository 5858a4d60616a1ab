//! # Load Confirmation Repository
//!
//! Lookup, creation and running totals of load confirmations.

use chrono::NaiveDate;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use haulbill_core::LoadConfirmation;

const LC_COLUMNS: &str = r#"
    lc.id, lc.number, lc.billing_configuration_id, lc.invoice_id, lc.invoice_permutation_id,
    lc.facility_id, lc.frequency, lc.is_ticket_by_ticket, lc.status, lc.start_date, lc.end_date,
    lc.is_reversed, lc.is_reversal, lc.total_cents, lc.ticket_count, lc.created_at
"#;

/// Everything an existing batch load confirmation must share with the
/// ticket to be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LcKey {
    pub billing_configuration_id: String,
    pub invoice_id: String,
    pub invoice_permutation_id: String,
    pub facility_id: String,
    pub frequency: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Repository for load confirmations.
#[derive(Debug, Clone)]
pub struct LoadConfirmationRepository {
    pool: SqlitePool,
}

impl LoadConfirmationRepository {
    /// Creates a new LoadConfirmationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        LoadConfirmationRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<LoadConfirmation> {
        let sql = format!("SELECT {} FROM load_confirmations lc WHERE lc.id = ?1", LC_COLUMNS);
        sqlx::query_as::<_, LoadConfirmation>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("LoadConfirmation", id))
    }

    /// Open batch load confirmation for exactly this period, on an
    /// un-posted invoice.
    pub async fn find_open(&self, key: &LcKey) -> DbResult<Option<LoadConfirmation>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM load_confirmations lc
            JOIN invoices i ON i.id = lc.invoice_id
            WHERE lc.billing_configuration_id = ?1
              AND lc.invoice_id = ?2
              AND lc.invoice_permutation_id = ?3
              AND lc.facility_id = ?4
              AND lc.frequency = ?5
              AND lc.start_date = ?6
              AND lc.end_date = ?7
              AND lc.status = 'open'
              AND lc.is_ticket_by_ticket = 0
              AND lc.is_reversed = 0
              AND lc.is_reversal = 0
              AND i.status = 'un_posted'
            LIMIT 1
            "#,
            LC_COLUMNS
        );

        let lc = sqlx::query_as::<_, LoadConfirmation>(&sql)
            .bind(&key.billing_configuration_id)
            .bind(&key.invoice_id)
            .bind(&key.invoice_permutation_id)
            .bind(&key.facility_id)
            .bind(&key.frequency)
            .bind(key.start_date)
            .bind(key.end_date)
            .fetch_optional(&self.pool)
            .await?;

        Ok(lc)
    }

    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<LoadConfirmation>> {
        let sql = format!(
            "SELECT {} FROM load_confirmations lc WHERE lc.invoice_id = ?1 ORDER BY lc.created_at, lc.id",
            LC_COLUMNS
        );
        let lcs = sqlx::query_as::<_, LoadConfirmation>(&sql)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(lcs)
    }

    /// Inserts a load confirmation. Fails with `UniqueViolation` when an
    /// open batch load confirmation for the same period exists, or a
    /// ticket-by-ticket one with the same number on the invoice.
    pub async fn insert(&self, lc: &LoadConfirmation) -> DbResult<()> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_in(&mut conn, lc).await
    }

    /// Same as [`Self::insert`], on a caller-owned connection or transaction.
    pub async fn insert_in(conn: &mut SqliteConnection, lc: &LoadConfirmation) -> DbResult<()> {
        debug!(
            id = %lc.id,
            invoice_id = %lc.invoice_id,
            frequency = %lc.frequency,
            start_date = %lc.start_date,
            "Inserting load confirmation"
        );

        sqlx::query(
            r#"
            INSERT INTO load_confirmations (
                id, number, billing_configuration_id, invoice_id, invoice_permutation_id,
                facility_id, frequency, is_ticket_by_ticket, status, start_date, end_date,
                is_reversed, is_reversal, total_cents, ticket_count, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&lc.id)
        .bind(&lc.number)
        .bind(&lc.billing_configuration_id)
        .bind(&lc.invoice_id)
        .bind(&lc.invoice_permutation_id)
        .bind(&lc.facility_id)
        .bind(&lc.frequency)
        .bind(lc.is_ticket_by_ticket)
        .bind(lc.status)
        .bind(lc.start_date)
        .bind(lc.end_date)
        .bind(lc.is_reversed)
        .bind(lc.is_reversal)
        .bind(lc.total_cents)
        .bind(lc.ticket_count)
        .bind(lc.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    pub async fn add_totals_in(
        conn: &mut SqliteConnection,
        id: &str,
        total_cents: i64,
        tickets: i64,
    ) -> DbResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE load_confirmations
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
            return Err(DbError::not_found("LoadConfirmation", id));
        }
        Ok(())
    }
}
