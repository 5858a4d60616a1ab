//! # Reference Data Repository
//!
//! Facilities, accounts, legal entities, material approvals and invoice
//! configurations: the lookup collaborators of the billing pipeline.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use haulbill_core::{Account, Facility, InvoiceConfiguration, LegalEntity, MaterialApproval};

/// Repository for reference data.
#[derive(Debug, Clone)]
pub struct ReferenceRepository {
    pool: SqlitePool,
}

impl ReferenceRepository {
    /// Creates a new ReferenceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ReferenceRepository { pool }
    }

    // =========================================================================
    // Facilities
    // =========================================================================

    pub async fn get_facility(&self, id: &str) -> DbResult<Facility> {
        sqlx::query_as::<_, Facility>(
            r#"
            SELECT id, name, site_code, facility_type, country_code, operating_day_cutoff
            FROM facilities
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Facility", id))
    }

    pub async fn insert_facility(&self, facility: &Facility) -> DbResult<()> {
        debug!(id = %facility.id, site_code = %facility.site_code, "Inserting facility");

        sqlx::query(
            r#"
            INSERT INTO facilities (
                id, name, site_code, facility_type, country_code, operating_day_cutoff
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&facility.id)
        .bind(&facility.name)
        .bind(&facility.site_code)
        .bind(facility.facility_type)
        .bind(&facility.country_code)
        .bind(facility.operating_day_cutoff)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Accounts & legal entities
    // =========================================================================

    pub async fn get_account(&self, id: &str) -> DbResult<Account> {
        sqlx::query_as::<_, Account>("SELECT id, name, currency FROM accounts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Account", id))
    }

    pub async fn insert_account(&self, account: &Account) -> DbResult<()> {
        debug!(id = %account.id, "Inserting account");

        sqlx::query("INSERT INTO accounts (id, name, currency) VALUES (?1, ?2, ?3)")
            .bind(&account.id)
            .bind(&account.name)
            .bind(&account.currency)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Legal entity operating in the given country.
    pub async fn legal_entity_for_country(&self, country_code: &str) -> DbResult<LegalEntity> {
        sqlx::query_as::<_, LegalEntity>(
            r#"
            SELECT id, name, country_code, default_currency
            FROM legal_entities
            WHERE country_code = ?1
            "#,
        )
        .bind(country_code)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("LegalEntity", country_code))
    }

    pub async fn insert_legal_entity(&self, entity: &LegalEntity) -> DbResult<()> {
        debug!(id = %entity.id, country_code = %entity.country_code, "Inserting legal entity");

        sqlx::query(
            r#"
            INSERT INTO legal_entities (id, name, country_code, default_currency)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&entity.id)
        .bind(&entity.name)
        .bind(&entity.country_code)
        .bind(&entity.default_currency)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Material approvals
    // =========================================================================

    pub async fn get_material_approval(&self, id: &str) -> DbResult<MaterialApproval> {
        sqlx::query_as::<_, MaterialApproval>(
            "SELECT id, number, enable_end_of_job_invoicing FROM material_approvals WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("MaterialApproval", id))
    }

    pub async fn insert_material_approval(&self, approval: &MaterialApproval) -> DbResult<()> {
        debug!(id = %approval.id, number = %approval.number, "Inserting material approval");

        sqlx::query(
            r#"
            INSERT INTO material_approvals (id, number, enable_end_of_job_invoicing)
            VALUES (?1, ?2, ?3)
            "#,
        )
        .bind(&approval.id)
        .bind(&approval.number)
        .bind(approval.enable_end_of_job_invoicing)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // =========================================================================
    // Invoice configurations
    // =========================================================================

    pub async fn get_invoice_configuration(&self, id: &str) -> DbResult<InvoiceConfiguration> {
        sqlx::query_as::<_, InvoiceConfiguration>(
            r#"
            SELECT
                id, name, billing_customer_id,
                split_by_facility, split_by_source_location, split_by_service_type,
                split_by_well_classification, split_by_substance
            FROM invoice_configurations
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("InvoiceConfiguration", id))
    }

    pub async fn insert_invoice_configuration(&self, config: &InvoiceConfiguration) -> DbResult<()> {
        debug!(id = %config.id, "Inserting invoice configuration");

        sqlx::query(
            r#"
            INSERT INTO invoice_configurations (
                id, name, billing_customer_id,
                split_by_facility, split_by_source_location, split_by_service_type,
                split_by_well_classification, split_by_substance
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(&config.id)
        .bind(&config.name)
        .bind(&config.billing_customer_id)
        .bind(config.split_by_facility)
        .bind(config.split_by_source_location)
        .bind(config.split_by_service_type)
        .bind(config.split_by_well_classification)
        .bind(config.split_by_substance)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::{seed_reference_data, test_db};

    #[tokio::test]
    async fn test_reference_lookups() {
        let db = test_db().await;
        let refs = seed_reference_data(&db).await;
        let repo = db.reference();

        let facility = repo.get_facility(&refs.facility_id).await.unwrap();
        assert_eq!(facility.site_code, "LF01");

        let entity = repo.legal_entity_for_country("CA").await.unwrap();
        assert_eq!(entity.default_currency, "CAD");

        let account = repo.get_account(&refs.customer_id).await.unwrap();
        assert_eq!(account.currency, None);

        assert!(repo.get_facility("missing").await.is_err());
        assert!(repo.legal_entity_for_country("MX").await.is_err());
    }
}
