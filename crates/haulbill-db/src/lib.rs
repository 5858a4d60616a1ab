//! # haulbill-db: Storage and Billing Services
//!
//! SQLite persistence for the billing pipeline, and the services that join
//! the pure rules of `haulbill-core` with store lookups.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Billing Automation Pipeline                        │
//! │                                                                         │
//! │  approved ticket                                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  haulbill-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   services/                     repository/                     │   │
//! │  │   ┌──────────────────────┐      ┌───────────────────────────┐  │   │
//! │  │   │ SalesLineOrchestrator│─────►│ BillingConfigurationRepo  │  │   │
//! │  │   │  ├ BillingSelector   │      │ InvoiceRepository         │  │   │
//! │  │   │  ├ InvoiceAssigner   │      │ LoadConfirmationRepository│  │   │
//! │  │   │  └ LcAssigner        │      │ TicketRepository          │  │   │
//! │  │   │ TicketService        │      │ SequenceRepository        │  │   │
//! │  │   │ SequenceAllocator    │      │ SalesLineRepository       │  │   │
//! │  │   └──────────────────────┘      │ ReferenceRepository       │  │   │
//! │  │                                 └─────────────┬─────────────┘  │   │
//! │  │   Database (pool.rs) ◄─────────────────────────┘                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (WAL) + migrations/sqlite/*.sql                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and repository access
//! - [`migrations`] - Embedded database migrations
//! - [`config`] - `billing.toml` loading
//! - [`error`] - Database error types
//! - [`repository`] - Store collaborators
//! - [`services`] - Allocator, assigners, ticket service, orchestrator
//!
//! ## Usage
//!
//! ```rust,ignore
//! use haulbill_db::{Database, HaulbillConfig};
//! use haulbill_db::services::orchestrator::SalesLineOrchestrator;
//!
//! let config = HaulbillConfig::load(None)?;
//! let db = Database::new(config.db_config()).await?;
//!
//! let orchestrator = SalesLineOrchestrator::new(db.clone(), &config);
//! let outcome = orchestrator.process_ticket("TT-1", lines).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod services;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::HaulbillConfig;
pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::billing_configuration::BillingConfigurationRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::load_confirmation::LoadConfirmationRepository;
pub use repository::reference::ReferenceRepository;
pub use repository::sales_line::SalesLineRepository;
pub use repository::sequence::SequenceRepository;
pub use repository::ticket::TicketRepository;

// =============================================================================
// Test Support
// =============================================================================

#[cfg(test)]
pub(crate) mod test_support {
    //! In-memory database and seeded reference data for repository and
    //! service tests.

    use chrono::{NaiveDate, Utc, Weekday};
    use std::collections::BTreeSet;

    use crate::pool::{Database, DbConfig};
    use crate::repository::invoice::InvoiceKey;
    use haulbill_core::{
        Account, BillingConfiguration, Facility, FacilityType, FieldTicketDeliveryMethod, Invoice,
        InvoiceConfiguration, InvoiceStatus, LegalEntity, LoadConfirmationFrequency,
        MaterialApproval, TruckTicket, TruckTicketStatus, Volumes,
    };

    /// Ids of the seeded reference rows.
    #[derive(Debug, Clone)]
    pub struct Refs {
        pub facility_id: String,
        pub customer_id: String,
        pub generator_id: String,
        pub legal_entity_id: String,
        pub invoice_configuration_id: String,
        /// Approval with end-of-job invoicing enabled.
        pub end_of_job_approval_id: String,
    }

    pub async fn test_db() -> Database {
        Database::new(DbConfig::in_memory())
            .await
            .expect("in-memory database")
    }

    /// One landfill in Canada, a generator, a billing customer without its
    /// own currency, and an invoice configuration without splits.
    pub async fn seed_reference_data(db: &Database) -> Refs {
        let repo = db.reference();

        repo.insert_legal_entity(&LegalEntity {
            id: "LE-CA".to_string(),
            name: "Haulbill Canada".to_string(),
            country_code: "CA".to_string(),
            default_currency: "CAD".to_string(),
        })
        .await
        .unwrap();

        repo.insert_facility(&Facility {
            id: "FAC-1".to_string(),
            name: "North Landfill".to_string(),
            site_code: "LF01".to_string(),
            facility_type: FacilityType::Landfill,
            country_code: "CA".to_string(),
            operating_day_cutoff: None,
        })
        .await
        .unwrap();

        for (id, name) in [("GEN-1", "Generator"), ("CUST-1", "Customer")] {
            repo.insert_account(&Account {
                id: id.to_string(),
                name: name.to_string(),
                currency: None,
            })
            .await
            .unwrap();
        }

        repo.insert_invoice_configuration(&InvoiceConfiguration {
            id: "IC-1".to_string(),
            name: "Monthly".to_string(),
            billing_customer_id: "CUST-1".to_string(),
            split_by_facility: false,
            split_by_source_location: false,
            split_by_service_type: false,
            split_by_well_classification: false,
            split_by_substance: false,
        })
        .await
        .unwrap();

        repo.insert_material_approval(&MaterialApproval {
            id: "MA-EOJ".to_string(),
            number: "MA-0001".to_string(),
            enable_end_of_job_invoicing: true,
        })
        .await
        .unwrap();

        Refs {
            facility_id: "FAC-1".to_string(),
            customer_id: "CUST-1".to_string(),
            generator_id: "GEN-1".to_string(),
            legal_entity_id: "LE-CA".to_string(),
            invoice_configuration_id: "IC-1".to_string(),
            end_of_job_approval_id: "MA-EOJ".to_string(),
        }
    }

    /// Enabled, automated, monthly batch load confirmations, no predicates.
    pub fn billing_configuration(refs: &Refs, id: &str) -> BillingConfiguration {
        BillingConfiguration {
            id: id.to_string(),
            name: format!("Config {}", id),
            facility_id: None,
            generator_id: refs.generator_id.clone(),
            billing_customer_id: refs.customer_id.clone(),
            invoice_configuration_id: refs.invoice_configuration_id.clone(),
            is_enabled: true,
            include_for_automation: true,
            start_date: None,
            end_date: None,
            load_confirmations_enabled: true,
            field_ticket_delivery_method: FieldTicketDeliveryMethod::LoadConfirmationBatch,
            load_confirmation_frequency: LoadConfirmationFrequency::Monthly,
            first_day_of_week: Weekday::Sun,
            first_day_of_month: 1,
            predicates: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// A `New` ticket loaded 2023-03-05 at the seeded facility.
    pub fn truck_ticket(refs: &Refs, id: &str, number: &str) -> TruckTicket {
        let now = Utc::now();
        TruckTicket {
            id: id.to_string(),
            ticket_number: number.to_string(),
            facility_id: refs.facility_id.clone(),
            country_code: "CA".to_string(),
            source_location_id: Some("SL-1".to_string()),
            stream: Some("landfill".to_string()),
            well_classification: Some("oil".to_string()),
            service_type_id: Some("SVC-1".to_string()),
            substance_id: Some("SUB-1".to_string()),
            generator_id: refs.generator_id.clone(),
            billing_customer_id: refs.customer_id.clone(),
            material_approval_id: None,
            load_date: NaiveDate::from_ymd_opt(2023, 3, 5).unwrap(),
            time_out: None,
            effective_date: None,
            status: TruckTicketStatus::New,
            version_tag: None,
            attachments: Vec::new(),
            removed_attachment_ids: BTreeSet::new(),
            volumes: Volumes::fixed(1.0, 2.0, 3.0),
            billing_configuration_id: None,
            invoice_id: None,
            load_confirmation_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn invoice_key(refs: &Refs) -> InvoiceKey {
        InvoiceKey {
            facility_id: refs.facility_id.clone(),
            billing_customer_id: refs.customer_id.clone(),
            invoice_configuration_id: refs.invoice_configuration_id.clone(),
            invoice_permutation_id: refs.invoice_configuration_id.clone(),
            currency: "CAD".to_string(),
        }
    }

    pub fn unposted_invoice(
        refs: &Refs,
        key: &InvoiceKey,
        start: NaiveDate,
        end: Option<NaiveDate>,
    ) -> Invoice {
        Invoice {
            id: uuid::Uuid::new_v4().to_string(),
            invoice_number: None,
            facility_id: key.facility_id.clone(),
            billing_customer_id: key.billing_customer_id.clone(),
            invoice_configuration_id: key.invoice_configuration_id.clone(),
            invoice_permutation_id: key.invoice_permutation_id.clone(),
            currency: key.currency.clone(),
            legal_entity_id: refs.legal_entity_id.clone(),
            status: InvoiceStatus::UnPosted,
            start_date: start,
            end_date: end,
            is_reversed: false,
            is_reversal: false,
            total_cents: 0,
            ticket_count: 0,
            created_at: Utc::now(),
        }
    }
}
