//! # Sequence Repository
//!
//! Counter rows for document numbering.
//!
//! ## Compare-and-swap
//! ```text
//! UPDATE sequences
//! SET last_number = :new, version = version + 1
//! WHERE id = :id AND version = :read_version
//!
//! 1 row  → block is ours
//! 0 rows → another writer advanced the counter; re-read and retry
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use haulbill_core::sequence::validate_counter_update;
use haulbill_core::{SequenceCounter, SequenceSettings, SequenceType};

const COUNTER_COLUMNS: &str = r#"
    id, sequence_type, prefix, last_number, seed, max_request_block_size, version, updated_at
"#;

/// Repository for sequence counters.
#[derive(Debug, Clone)]
pub struct SequenceRepository {
    pool: SqlitePool,
}

impl SequenceRepository {
    /// Creates a new SequenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SequenceRepository { pool }
    }

    pub async fn get(&self, sequence_type: SequenceType, prefix: &str) -> DbResult<Option<SequenceCounter>> {
        let sql = format!(
            "SELECT {} FROM sequences WHERE sequence_type = ?1 AND prefix = ?2",
            COUNTER_COLUMNS
        );
        let counter = sqlx::query_as::<_, SequenceCounter>(&sql)
            .bind(sequence_type)
            .bind(prefix)
            .fetch_optional(&self.pool)
            .await?;

        Ok(counter)
    }

    /// Reads the counter, creating it at its seed when missing.
    pub async fn get_or_create(
        &self,
        sequence_type: SequenceType,
        prefix: &str,
        settings: &SequenceSettings,
    ) -> DbResult<SequenceCounter> {
        if let Some(counter) = self.get(sequence_type, prefix).await? {
            return Ok(counter);
        }

        let counter = SequenceCounter::new(sequence_type, prefix, settings);
        match self.insert(&counter).await {
            Ok(()) => {
                info!(
                    sequence_type = %sequence_type,
                    prefix = %prefix,
                    seed = counter.seed,
                    "Created sequence counter"
                );
                Ok(counter)
            }
            // Another writer created it first
            Err(e) if e.is_unique_violation() => self
                .get(sequence_type, prefix)
                .await?
                .ok_or_else(|| DbError::not_found("SequenceCounter", prefix)),
            Err(e) => Err(e),
        }
    }

    async fn insert(&self, counter: &SequenceCounter) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sequences (
                id, sequence_type, prefix, last_number, seed, max_request_block_size,
                version, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&counter.id)
        .bind(counter.sequence_type)
        .bind(&counter.prefix)
        .bind(counter.last_number)
        .bind(counter.seed)
        .bind(counter.max_request_block_size)
        .bind(counter.version)
        .bind(counter.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Writes `target` only if the stored version still equals
    /// `expected_version`. Returns whether the write happened.
    pub async fn compare_and_swap(&self, target: &SequenceCounter, expected_version: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE sequences
            SET last_number = ?1,
                seed = ?2,
                max_request_block_size = ?3,
                version = version + 1,
                updated_at = ?4
            WHERE id = ?5 AND version = ?6
            "#,
        )
        .bind(target.last_number)
        .bind(target.seed)
        .bind(target.max_request_block_size)
        .bind(Utc::now())
        .bind(&target.id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Manual edit of `last_number`, validated against the stored row
    /// before anything is written.
    ///
    /// The seed floor and block cap of the stored row bound the edit and are
    /// written back unchanged; they only change through configuration.
    pub async fn update_counter(&self, target: &SequenceCounter) -> DbResult<SequenceCounter> {
        let sql = format!("SELECT {} FROM sequences WHERE id = ?1", COUNTER_COLUMNS);
        let original = sqlx::query_as::<_, SequenceCounter>(&sql)
            .bind(&target.id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("SequenceCounter", target.id.as_str()))?;

        validate_counter_update(&original, target)?;

        let mut saved = original.clone();
        saved.last_number = target.last_number;

        debug!(
            id = %saved.id,
            from = original.last_number,
            to = saved.last_number,
            "Updating sequence counter"
        );

        if !self.compare_and_swap(&saved, original.version).await? {
            return Err(DbError::conflict("SequenceCounter", saved.id.as_str()));
        }

        saved.version = original.version + 1;
        Ok(saved)
    }
}
