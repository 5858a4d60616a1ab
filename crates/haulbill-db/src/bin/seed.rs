//! # Demo Database Seeder
//!
//! Creates reference data, billing configurations and a batch of approved
//! truck tickets, then bills them through the orchestrator.
//!
//! ## Usage
//! ```bash
//! # 40 tickets into ./haulbill_dev.db
//! cargo run -p haulbill-db --bin seed
//!
//! # Custom amount, database and config file
//! cargo run -p haulbill-db --bin seed -- --tickets 200 --db ./data/haulbill.db --config ./billing.toml
//! ```
//!
//! ## Generated Data
//! - Legal entity for Canada (CAD)
//! - Landfill `LF01` (scale tickets) and pipeline terminal `PL01` (work
//!   tickets, 07:00 operating-day cutoff)
//! - A generator, a billing customer, one invoice configuration split by
//!   source location
//! - Two automated billing configurations: weekly batch load confirmations
//!   for source location `SL-1`, ticket-by-ticket delivery for `SL-2`
//! - Tickets spread over March 2023, alternating facilities and locations

use std::env;
use std::path::PathBuf;

use chrono::{Duration, NaiveDate, NaiveTime, Utc, Weekday};
use haulbill_core::{
    Account, BillingConfiguration, Criterion, Facility, FacilityType, FieldTicketDeliveryMethod,
    InvoiceConfiguration, LegalEntity, LoadConfirmationFrequency, MatchCriterion, MatchPredicate,
    Money, TruckTicket, TruckTicketStatus, Volumes,
};
use haulbill_db::services::{
    BillingOutcome, SalesLineOrchestrator, SalesLineRequest, SequenceAllocator, TicketService,
};
use haulbill_db::{Database, DbError, HaulbillConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const SOURCE_LOCATIONS: &[&str] = &["SL-1", "SL-2"];
const SUBSTANCES: &[&str] = &["SUB-SOIL", "SUB-SLUDGE", "SUB-WATER"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();

    let mut tickets: usize = 40;
    let mut db_path: Option<PathBuf> = None;
    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--tickets" | "-t" => {
                if i + 1 < args.len() {
                    tickets = args[i + 1].parse().unwrap_or(40);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Haulbill Demo Database Seeder");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -t, --tickets <N>     Number of tickets to create and bill (default: 40)");
                println!("  -d, --db <PATH>       Database file path (default: ./haulbill_dev.db)");
                println!("  -c, --config <PATH>   billing.toml to load");
                println!("  -h, --help            Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let mut config = HaulbillConfig::load(config_path)?;
    config.database.path = db_path.unwrap_or_else(|| PathBuf::from("./haulbill_dev.db"));

    println!("Haulbill Demo Database Seeder");
    println!("=============================");
    println!("Database: {}", config.database.path.display());
    println!("Tickets:  {}", tickets);
    println!();

    let db = Database::new(config.db_config()).await?;
    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    match db.reference().get_facility("FAC-LF01").await {
        Ok(_) => {
            println!("⚠ Database is already seeded");
            println!("  Delete the database file to regenerate.");
            return Ok(());
        }
        Err(DbError::NotFound { .. }) => {}
        Err(e) => return Err(e.into()),
    }

    seed_reference_data(&db).await?;
    println!("✓ Reference data and billing configurations created");

    let allocator = SequenceAllocator::new(db.sequences(), &config);
    let ticket_service = TicketService::new(db.clone(), allocator);
    let orchestrator = SalesLineOrchestrator::new(db.clone(), &config);

    let start = std::time::Instant::now();
    let mut batch = Vec::with_capacity(tickets);

    for n in 0..tickets {
        let created = ticket_service.create(demo_ticket(n)).await?;
        let mut approved = created.clone();
        approved.status = TruckTicketStatus::Approved;
        let approved = ticket_service.update(approved).await?;

        batch.push((approved.id.clone(), demo_lines(n)));
    }
    println!("✓ Created and approved {} tickets", tickets);

    let results = orchestrator.process_batch(batch).await;

    let mut billed = 0;
    let mut skipped = 0;
    let mut failed = 0;
    let mut total = Money::zero();
    for (ticket_id, result) in &results {
        match result {
            Ok(BillingOutcome::Billed { total: t, .. }) => {
                billed += 1;
                total += *t;
            }
            Ok(BillingOutcome::Skipped { reason, .. }) => {
                skipped += 1;
                println!("  skipped {}: {}", ticket_id, reason);
            }
            Err(e) => {
                failed += 1;
                eprintln!("  failed {}: {}", ticket_id, e);
            }
        }
    }

    info!(billed, skipped, failed, elapsed = ?start.elapsed(), "Seed billing run finished");

    println!();
    println!("✓ Billed {} tickets for {} ({} skipped, {} failed)", billed, total, skipped, failed);
    println!("  Elapsed: {:?}", start.elapsed());

    db.close().await;
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// `RUST_LOG` overrides the default `info,haulbill=debug,sqlx=warn`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,haulbill=debug,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn seed_reference_data(db: &Database) -> Result<(), DbError> {
    let reference = db.reference();

    reference
        .insert_legal_entity(&LegalEntity {
            id: "LE-CA".to_string(),
            name: "Haulbill Canada Ltd.".to_string(),
            country_code: "CA".to_string(),
            default_currency: "CAD".to_string(),
        })
        .await?;

    reference
        .insert_facility(&Facility {
            id: "FAC-LF01".to_string(),
            name: "North Landfill".to_string(),
            site_code: "LF01".to_string(),
            facility_type: FacilityType::Landfill,
            country_code: "CA".to_string(),
            operating_day_cutoff: None,
        })
        .await?;
    reference
        .insert_facility(&Facility {
            id: "FAC-PL01".to_string(),
            name: "East Pipeline Terminal".to_string(),
            site_code: "PL01".to_string(),
            facility_type: FacilityType::Pipeline,
            country_code: "CA".to_string(),
            operating_day_cutoff: NaiveTime::from_hms_opt(7, 0, 0),
        })
        .await?;

    for (id, name) in [("GEN-1", "Ridge Energy"), ("CUST-1", "Ridge Energy Billing")] {
        reference
            .insert_account(&Account {
                id: id.to_string(),
                name: name.to_string(),
                currency: None,
            })
            .await?;
    }

    reference
        .insert_invoice_configuration(&InvoiceConfiguration {
            id: "IC-1".to_string(),
            name: "Monthly by source location".to_string(),
            billing_customer_id: "CUST-1".to_string(),
            split_by_facility: true,
            split_by_source_location: true,
            split_by_service_type: false,
            split_by_well_classification: false,
            split_by_substance: false,
        })
        .await?;

    let configurations = [
        demo_configuration(
            "BC-SL1",
            "SL-1 weekly",
            FieldTicketDeliveryMethod::LoadConfirmationBatch,
            "SL-1",
        ),
        demo_configuration(
            "BC-SL2",
            "SL-2 ticket by ticket",
            FieldTicketDeliveryMethod::TicketByTicket,
            "SL-2",
        ),
    ];
    for configuration in &configurations {
        db.billing_configurations().insert(configuration).await?;
    }

    Ok(())
}

fn demo_configuration(
    id: &str,
    name: &str,
    delivery: FieldTicketDeliveryMethod,
    source_location: &str,
) -> BillingConfiguration {
    BillingConfiguration {
        id: id.to_string(),
        name: name.to_string(),
        facility_id: None,
        generator_id: "GEN-1".to_string(),
        billing_customer_id: "CUST-1".to_string(),
        invoice_configuration_id: "IC-1".to_string(),
        is_enabled: true,
        include_for_automation: true,
        start_date: None,
        end_date: None,
        load_confirmations_enabled: true,
        field_ticket_delivery_method: delivery,
        load_confirmation_frequency: LoadConfirmationFrequency::Weekly,
        first_day_of_week: Weekday::Mon,
        first_day_of_month: 1,
        predicates: vec![MatchPredicate::new(format!("P-{}", id))
            .with(Criterion::SourceLocation, MatchCriterion::exact(source_location))
            .with(Criterion::Stream, MatchCriterion::Wildcard)],
        created_at: Utc::now(),
    }
}

/// Ticket `n`: alternates facility and source location, one load per day
/// through March 2023.
fn demo_ticket(n: usize) -> TruckTicket {
    let now = Utc::now();
    let (facility_id, hour) = if n % 2 == 0 {
        ("FAC-LF01", 9)
    } else {
        ("FAC-PL01", 6)
    };
    let load_date = NaiveDate::from_ymd_opt(2023, 3, 1).unwrap_or_default()
        + Duration::days((n % 31) as i64);

    TruckTicket {
        id: Uuid::new_v4().to_string(),
        ticket_number: String::new(),
        facility_id: facility_id.to_string(),
        country_code: "CA".to_string(),
        source_location_id: Some(SOURCE_LOCATIONS[(n / 2) % SOURCE_LOCATIONS.len()].to_string()),
        stream: Some("landfill".to_string()),
        well_classification: Some("oil".to_string()),
        service_type_id: Some("SVC-DISPOSAL".to_string()),
        substance_id: Some(SUBSTANCES[n % SUBSTANCES.len()].to_string()),
        generator_id: "GEN-1".to_string(),
        billing_customer_id: "CUST-1".to_string(),
        material_approval_id: None,
        load_date,
        time_out: load_date.and_hms_opt(hour, 30, 0),
        effective_date: None,
        status: TruckTicketStatus::New,
        version_tag: None,
        attachments: Vec::new(),
        removed_attachment_ids: Default::default(),
        volumes: Volumes::fixed(2.0 + (n % 5) as f64, 8.0, 1.5),
        billing_configuration_id: None,
        invoice_id: None,
        load_confirmation_id: None,
        created_at: now,
        updated_at: now,
    }
}

fn demo_lines(n: usize) -> Vec<SalesLineRequest> {
    vec![
        SalesLineRequest {
            product_number: "DISPOSAL-T".to_string(),
            quantity_milli: 10_000 + (n as i64 % 7) * 1_250,
            rate: Money::from_cents(2_450),
        },
        SalesLineRequest {
            product_number: "ENV-FEE".to_string(),
            quantity_milli: 1_000,
            rate: Money::from_cents(1_500),
        },
    ]
}
