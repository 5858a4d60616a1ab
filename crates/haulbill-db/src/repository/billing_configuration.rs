//! # Billing Configuration Repository
//!
//! Billing configurations with their match predicates.
//!
//! ## Storage Layout
//! ```text
//! billing_configurations 1 ──── * match_predicates
//!                                  (state, value) per criterion:
//!                                  ('ignored', NULL) → Ignored
//!                                  ('wildcard', NULL) → Wildcard
//!                                  ('exact', 'SL-1')  → Exact("SL-1")
//! ```

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use haulbill_core::{
    BillingConfiguration, FieldTicketDeliveryMethod, LoadConfirmationFrequency, MatchCriterion,
    MatchPredicate,
};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, FromRow)]
struct ConfigurationRecord {
    id: String,
    name: String,
    facility_id: Option<String>,
    generator_id: String,
    billing_customer_id: String,
    invoice_configuration_id: String,
    is_enabled: bool,
    include_for_automation: bool,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    load_confirmations_enabled: bool,
    field_ticket_delivery_method: FieldTicketDeliveryMethod,
    load_confirmation_frequency: LoadConfirmationFrequency,
    first_day_of_week: i64,
    first_day_of_month: i64,
    created_at: DateTime<Utc>,
}

impl ConfigurationRecord {
    fn into_configuration(self, predicates: Vec<MatchPredicate>) -> BillingConfiguration {
        BillingConfiguration {
            id: self.id,
            name: self.name,
            facility_id: self.facility_id,
            generator_id: self.generator_id,
            billing_customer_id: self.billing_customer_id,
            invoice_configuration_id: self.invoice_configuration_id,
            is_enabled: self.is_enabled,
            include_for_automation: self.include_for_automation,
            start_date: self.start_date,
            end_date: self.end_date,
            load_confirmations_enabled: self.load_confirmations_enabled,
            field_ticket_delivery_method: self.field_ticket_delivery_method,
            load_confirmation_frequency: self.load_confirmation_frequency,
            first_day_of_week: weekday_from_index(self.first_day_of_week),
            first_day_of_month: self.first_day_of_month.clamp(1, 31) as u32,
            predicates,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct PredicateRecord {
    id: String,
    source_location_state: String,
    source_location_value: Option<String>,
    stream_state: String,
    stream_value: Option<String>,
    well_classification_state: String,
    well_classification_value: Option<String>,
    service_type_state: String,
    service_type_value: Option<String>,
    substance_state: String,
    substance_value: Option<String>,
    is_enabled: bool,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
}

impl PredicateRecord {
    fn into_predicate(self) -> DbResult<MatchPredicate> {
        Ok(MatchPredicate {
            source_location: decode_criterion(&self.source_location_state, self.source_location_value)?,
            stream: decode_criterion(&self.stream_state, self.stream_value)?,
            well_classification: decode_criterion(
                &self.well_classification_state,
                self.well_classification_value,
            )?,
            service_type: decode_criterion(&self.service_type_state, self.service_type_value)?,
            substance: decode_criterion(&self.substance_state, self.substance_value)?,
            id: self.id,
            is_enabled: self.is_enabled,
            start_date: self.start_date,
            end_date: self.end_date,
        })
    }
}

fn weekday_from_index(index: i64) -> Weekday {
    match index.rem_euclid(7) {
        0 => Weekday::Sun,
        1 => Weekday::Mon,
        2 => Weekday::Tue,
        3 => Weekday::Wed,
        4 => Weekday::Thu,
        5 => Weekday::Fri,
        _ => Weekday::Sat,
    }
}

fn encode_criterion(criterion: &MatchCriterion) -> (&'static str, Option<&str>) {
    match criterion {
        MatchCriterion::Ignored => ("ignored", None),
        MatchCriterion::Wildcard => ("wildcard", None),
        MatchCriterion::Exact(value) => ("exact", Some(value.as_str())),
    }
}

fn decode_criterion(state: &str, value: Option<String>) -> DbResult<MatchCriterion> {
    match (state, value) {
        ("ignored", _) => Ok(MatchCriterion::Ignored),
        ("wildcard", _) => Ok(MatchCriterion::Wildcard),
        ("exact", Some(value)) => Ok(MatchCriterion::Exact(value)),
        (state, _) => Err(DbError::Serialization(format!(
            "invalid match criterion state '{}'",
            state
        ))),
    }
}

const CONFIGURATION_COLUMNS: &str = r#"
    id, name, facility_id, generator_id, billing_customer_id, invoice_configuration_id,
    is_enabled, include_for_automation, start_date, end_date,
    load_confirmations_enabled, field_ticket_delivery_method, load_confirmation_frequency,
    first_day_of_week, first_day_of_month, created_at
"#;

const PREDICATE_COLUMNS: &str = r#"
    id,
    source_location_state, source_location_value,
    stream_state, stream_value,
    well_classification_state, well_classification_value,
    service_type_state, service_type_value,
    substance_state, substance_value,
    is_enabled, start_date, end_date
"#;

// =============================================================================
// Repository
// =============================================================================

/// Repository for billing configurations.
#[derive(Debug, Clone)]
pub struct BillingConfigurationRepository {
    pool: SqlitePool,
}

impl BillingConfigurationRepository {
    /// Creates a new BillingConfigurationRepository.
    pub fn new(pool: SqlitePool) -> Self {
        BillingConfigurationRepository { pool }
    }

    /// Inserts a configuration and its predicates in one transaction.
    pub async fn insert(&self, config: &BillingConfiguration) -> DbResult<()> {
        debug!(
            id = %config.id,
            predicates = config.predicates.len(),
            "Inserting billing configuration"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO billing_configurations (
                id, name, facility_id, generator_id, billing_customer_id,
                invoice_configuration_id, is_enabled, include_for_automation,
                start_date, end_date, load_confirmations_enabled,
                field_ticket_delivery_method, load_confirmation_frequency,
                first_day_of_week, first_day_of_month, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&config.id)
        .bind(&config.name)
        .bind(&config.facility_id)
        .bind(&config.generator_id)
        .bind(&config.billing_customer_id)
        .bind(&config.invoice_configuration_id)
        .bind(config.is_enabled)
        .bind(config.include_for_automation)
        .bind(config.start_date)
        .bind(config.end_date)
        .bind(config.load_confirmations_enabled)
        .bind(config.field_ticket_delivery_method)
        .bind(config.load_confirmation_frequency)
        .bind(config.first_day_of_week.num_days_from_sunday() as i64)
        .bind(config.first_day_of_month as i64)
        .bind(config.created_at)
        .execute(&mut *tx)
        .await?;

        for (position, predicate) in config.predicates.iter().enumerate() {
            let (sl_state, sl_value) = encode_criterion(&predicate.source_location);
            let (st_state, st_value) = encode_criterion(&predicate.stream);
            let (wc_state, wc_value) = encode_criterion(&predicate.well_classification);
            let (sv_state, sv_value) = encode_criterion(&predicate.service_type);
            let (sb_state, sb_value) = encode_criterion(&predicate.substance);

            sqlx::query(
                r#"
                INSERT INTO match_predicates (
                    id, billing_configuration_id, position,
                    source_location_state, source_location_value,
                    stream_state, stream_value,
                    well_classification_state, well_classification_value,
                    service_type_state, service_type_value,
                    substance_state, substance_value,
                    is_enabled, start_date, end_date
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                "#,
            )
            .bind(&predicate.id)
            .bind(&config.id)
            .bind(position as i64)
            .bind(sl_state)
            .bind(sl_value)
            .bind(st_state)
            .bind(st_value)
            .bind(wc_state)
            .bind(wc_value)
            .bind(sv_state)
            .bind(sv_value)
            .bind(sb_state)
            .bind(sb_value)
            .bind(predicate.is_enabled)
            .bind(predicate.start_date)
            .bind(predicate.end_date)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<BillingConfiguration> {
        let sql = format!("SELECT {} FROM billing_configurations WHERE id = ?1", CONFIGURATION_COLUMNS);
        let record = sqlx::query_as::<_, ConfigurationRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("BillingConfiguration", id))?;

        let mut loaded = self.attach_predicates(vec![record]).await?;
        loaded
            .pop()
            .ok_or_else(|| DbError::not_found("BillingConfiguration", id))
    }

    /// Enabled configurations for a generator at a facility, including
    /// configurations that apply to every facility.
    ///
    /// Date windows are not filtered here; selection does that against the
    /// ticket's billing date.
    pub async fn find_candidates(
        &self,
        facility_id: &str,
        generator_id: &str,
    ) -> DbResult<Vec<BillingConfiguration>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM billing_configurations
            WHERE is_enabled = 1
              AND generator_id = ?1
              AND (facility_id IS NULL OR facility_id = ?2)
            ORDER BY created_at DESC, id
            "#,
            CONFIGURATION_COLUMNS
        );
        let records = sqlx::query_as::<_, ConfigurationRecord>(&sql)
            .bind(generator_id)
            .bind(facility_id)
            .fetch_all(&self.pool)
            .await?;

        debug!(
            facility_id = %facility_id,
            generator_id = %generator_id,
            count = records.len(),
            "Loaded billing configuration candidates"
        );

        self.attach_predicates(records).await
    }

    async fn attach_predicates(
        &self,
        records: Vec<ConfigurationRecord>,
    ) -> DbResult<Vec<BillingConfiguration>> {
        let mut configs = Vec::with_capacity(records.len());
        let sql = format!(
            "SELECT {} FROM match_predicates WHERE billing_configuration_id = ?1 ORDER BY position, id",
            PREDICATE_COLUMNS
        );

        for record in records {
            let rows = sqlx::query_as::<_, PredicateRecord>(&sql)
                .bind(&record.id)
                .fetch_all(&self.pool)
                .await?;
            let predicates = rows
                .into_iter()
                .map(PredicateRecord::into_predicate)
                .collect::<DbResult<Vec<_>>>()?;
            configs.push(record.into_configuration(predicates));
        }

        Ok(configs)
    }
}
