//! # Sales Line Repository

use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use haulbill_core::SalesLine;

/// Repository for sales lines.
#[derive(Debug, Clone)]
pub struct SalesLineRepository {
    pool: SqlitePool,
}

impl SalesLineRepository {
    /// Creates a new SalesLineRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SalesLineRepository { pool }
    }

    pub async fn list_for_ticket(&self, ticket_id: &str) -> DbResult<Vec<SalesLine>> {
        let lines = sqlx::query_as::<_, SalesLine>(
            r#"
            SELECT
                id, ticket_id, ticket_number, product_number, quantity_milli,
                rate_cents, total_cents, billing_configuration_id, invoice_id,
                load_confirmation_id, created_at
            FROM sales_lines
            WHERE ticket_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    pub async fn list_for_invoice(&self, invoice_id: &str) -> DbResult<Vec<SalesLine>> {
        let lines = sqlx::query_as::<_, SalesLine>(
            r#"
            SELECT
                id, ticket_id, ticket_number, product_number, quantity_milli,
                rate_cents, total_cents, billing_configuration_id, invoice_id,
                load_confirmation_id, created_at
            FROM sales_lines
            WHERE invoice_id = ?1
            ORDER BY created_at, id
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(lines)
    }

    /// Inserts a line on a caller-owned connection or transaction.
    pub async fn insert_in(conn: &mut SqliteConnection, line: &SalesLine) -> DbResult<()> {
        debug!(
            id = %line.id,
            ticket_id = %line.ticket_id,
            product_number = %line.product_number,
            total_cents = line.total_cents,
            "Inserting sales line"
        );

        sqlx::query(
            r#"
            INSERT INTO sales_lines (
                id, ticket_id, ticket_number, product_number, quantity_milli,
                rate_cents, total_cents, billing_configuration_id, invoice_id,
                load_confirmation_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&line.id)
        .bind(&line.ticket_id)
        .bind(&line.ticket_number)
        .bind(&line.product_number)
        .bind(line.quantity_milli)
        .bind(line.rate_cents)
        .bind(line.total_cents)
        .bind(&line.billing_configuration_id)
        .bind(&line.invoice_id)
        .bind(&line.load_confirmation_id)
        .bind(line.created_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
