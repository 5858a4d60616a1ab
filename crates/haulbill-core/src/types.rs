//! # Domain Types
//!
//! Core domain types used throughout Haulbill.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌──────────────────────┐   ┌─────────────────┐  │
//! │  │   TruckTicket   │   │ BillingConfiguration │   │    Invoice      │  │
//! │  │  ─────────────  │   │  ──────────────────  │   │  ─────────────  │  │
//! │  │  ticket_number  │──►│  predicates[]        │──►│  start/end date │  │
//! │  │  load_date      │   │  include_for_auto    │   │  permutation    │  │
//! │  │  version_tag    │   │  LC policy fields    │   │  currency       │  │
//! │  │  attachments[]  │   └──────────────────────┘   └────────┬────────┘  │
//! │  └─────────────────┘                                       │           │
//! │                                                   ┌────────▼────────┐  │
//! │  ┌─────────────────┐   ┌─────────────────┐        │LoadConfirmation │  │
//! │  │ MatchPredicate  │   │ MatchCriterion  │        │  frequency      │  │
//! │  │  5 criteria     │──►│  Ignored        │        │  start/end date │  │
//! │  │  enabled/window │   │  Wildcard       │        └─────────────────┘  │
//! │  └─────────────────┘   │  Exact(value)   │                             │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity carries a UUID v4 `id`; tickets, invoices and load
//! confirmations additionally carry a human-readable document number issued
//! by the sequence allocator.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::matching::Criterion;
use crate::money::Money;

// =============================================================================
// Truck Ticket
// =============================================================================

/// The status of a truck ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum TruckTicketStatus {
    New,
    Open,
    Hold,
    Approved,
    /// Placeholder ticket created before the load arrives.
    Stub,
    Void,
    Invoiced,
}

impl Default for TruckTicketStatus {
    fn default() -> Self {
        TruckTicketStatus::New
    }
}

impl TruckTicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TruckTicketStatus::New => "new",
            TruckTicketStatus::Open => "open",
            TruckTicketStatus::Hold => "hold",
            TruckTicketStatus::Approved => "approved",
            TruckTicketStatus::Stub => "stub",
            TruckTicketStatus::Void => "void",
            TruckTicketStatus::Invoiced => "invoiced",
        }
    }

    /// Whether a ticket in this status may still be voided.
    pub fn can_void(&self) -> bool {
        !matches!(self, TruckTicketStatus::Void | TruckTicketStatus::Invoiced)
    }
}

impl fmt::Display for TruckTicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a scanned ticket document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentType {
    /// Kept by the facility.
    Internal,
    /// Shared with the customer.
    External,
}

/// A file attached to a truck ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub file_name: String,
    /// Storage location of the file contents.
    pub blob_path: String,
    pub attachment_type: AttachmentType,
}

/// How a ticket's volume cuts are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeUnit {
    /// Absolute volumes in m³.
    Fixed,
    /// Cuts as percentages of the total load; must add up to 100.
    Percentage,
}

/// Oil / water / solid cuts of a load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volumes {
    pub unit: VolumeUnit,
    pub oil: f64,
    pub water: f64,
    pub solid: f64,
}

impl Volumes {
    pub fn fixed(oil: f64, water: f64, solid: f64) -> Self {
        Volumes {
            unit: VolumeUnit::Fixed,
            oil,
            water,
            solid,
        }
    }

    pub fn total(&self) -> f64 {
        self.oil + self.water + self.solid
    }
}

impl Default for Volumes {
    fn default() -> Self {
        Volumes::fixed(0.0, 0.0, 0.0)
    }
}

/// A completed truck ticket: one load received at a facility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TruckTicket {
    pub id: String,
    /// Document number, empty until issued by the sequence allocator.
    pub ticket_number: String,
    pub facility_id: String,
    pub country_code: String,

    // Billing match inputs
    pub source_location_id: Option<String>,
    pub stream: Option<String>,
    pub well_classification: Option<String>,
    pub service_type_id: Option<String>,
    pub substance_id: Option<String>,

    /// Generator (waste owner) account.
    pub generator_id: String,
    pub billing_customer_id: String,
    pub material_approval_id: Option<String>,

    pub load_date: NaiveDate,
    pub time_out: Option<NaiveDateTime>,
    /// Operating day the ticket counts toward, see [`crate::period::effective_date`].
    pub effective_date: Option<NaiveDate>,

    pub status: TruckTicketStatus,
    /// Opaque concurrency token, replaced on every persisted update.
    pub version_tag: Option<String>,
    pub attachments: Vec<Attachment>,
    /// Attachment ids the editor removed on purpose. Never persisted.
    #[serde(default)]
    pub removed_attachment_ids: BTreeSet<String>,
    pub volumes: Volumes,

    // Billing assignment, filled by the sales line orchestrator
    pub billing_configuration_id: Option<String>,
    pub invoice_id: Option<String>,
    pub load_confirmation_id: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TruckTicket {
    /// Returns the ticket's value for a match criterion.
    pub fn criterion_value(&self, criterion: Criterion) -> Option<&str> {
        match criterion {
            Criterion::SourceLocation => self.source_location_id.as_deref(),
            Criterion::Stream => self.stream.as_deref(),
            Criterion::WellClassification => self.well_classification.as_deref(),
            Criterion::ServiceType => self.service_type_id.as_deref(),
            Criterion::Substance => self.substance_id.as_deref(),
        }
    }

    /// Date used for configuration windows: effective date, else load date.
    pub fn billing_date(&self) -> NaiveDate {
        self.effective_date.unwrap_or(self.load_date)
    }

    pub fn attachment_ids(&self) -> BTreeSet<&str> {
        self.attachments.iter().map(|a| a.id.as_str()).collect()
    }
}

// =============================================================================
// Match Predicates
// =============================================================================

/// Tri-state value of one predicate criterion.
///
/// ```text
/// Ignored      → criterion skipped: neither matches nor fails
/// Wildcard     → always matches, carries no specific value
/// Exact(value) → matches only when the ticket has exactly this value
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum MatchCriterion {
    Ignored,
    Wildcard,
    Exact(String),
}

impl Default for MatchCriterion {
    fn default() -> Self {
        MatchCriterion::Ignored
    }
}

impl MatchCriterion {
    pub fn exact(value: impl Into<String>) -> Self {
        MatchCriterion::Exact(value.into())
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, MatchCriterion::Ignored)
    }
}

/// One match rule of a billing configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPredicate {
    pub id: String,
    pub source_location: MatchCriterion,
    pub stream: MatchCriterion,
    pub well_classification: MatchCriterion,
    pub service_type: MatchCriterion,
    pub substance: MatchCriterion,
    pub is_enabled: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl MatchPredicate {
    /// Creates an enabled predicate with every criterion ignored.
    pub fn new(id: impl Into<String>) -> Self {
        MatchPredicate {
            id: id.into(),
            source_location: MatchCriterion::Ignored,
            stream: MatchCriterion::Ignored,
            well_classification: MatchCriterion::Ignored,
            service_type: MatchCriterion::Ignored,
            substance: MatchCriterion::Ignored,
            is_enabled: true,
            start_date: None,
            end_date: None,
        }
    }

    /// Builder-style setter for a single criterion.
    pub fn with(mut self, criterion: Criterion, value: MatchCriterion) -> Self {
        match criterion {
            Criterion::SourceLocation => self.source_location = value,
            Criterion::Stream => self.stream = value,
            Criterion::WellClassification => self.well_classification = value,
            Criterion::ServiceType => self.service_type = value,
            Criterion::Substance => self.substance = value,
        }
        self
    }

    pub fn criterion(&self, criterion: Criterion) -> &MatchCriterion {
        match criterion {
            Criterion::SourceLocation => &self.source_location,
            Criterion::Stream => &self.stream,
            Criterion::WellClassification => &self.well_classification,
            Criterion::ServiceType => &self.service_type,
            Criterion::Substance => &self.substance,
        }
    }

    /// True when every criterion is ignored; such a predicate never matches.
    pub fn is_empty(&self) -> bool {
        Criterion::ALL.iter().all(|c| self.criterion(*c).is_ignored())
    }

    /// Enabled and, if it has a validity window, the window covers `date`.
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.is_enabled && window_covers(self.start_date, self.end_date, date)
    }
}

pub(crate) fn window_covers(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    date: NaiveDate,
) -> bool {
    start.map_or(true, |s| s <= date) && end.map_or(true, |e| date <= e)
}

// =============================================================================
// Billing Configuration
// =============================================================================

/// How field tickets are delivered to the customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FieldTicketDeliveryMethod {
    /// One load confirmation per ticket, numbered with the ticket number.
    TicketByTicket,
    /// Tickets grouped into load confirmations per frequency period.
    LoadConfirmationBatch,
}

impl Default for FieldTicketDeliveryMethod {
    fn default() -> Self {
        FieldTicketDeliveryMethod::LoadConfirmationBatch
    }
}

/// Grouping period for batch load confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LoadConfirmationFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl Default for LoadConfirmationFrequency {
    fn default() -> Self {
        LoadConfirmationFrequency::Monthly
    }
}

impl LoadConfirmationFrequency {
    /// Label stored on the load confirmation.
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadConfirmationFrequency::Daily => "daily",
            LoadConfirmationFrequency::Weekly => "weekly",
            LoadConfirmationFrequency::Monthly => "monthly",
        }
    }
}

/// Label used for load confirmations issued one per ticket.
pub const TICKET_BY_TICKET_LABEL: &str = "ticket_by_ticket";

/// Rules that decide how a matched ticket is charged and grouped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfiguration {
    pub id: String,
    pub name: String,
    /// Facility this configuration is restricted to; `None` = all facilities.
    pub facility_id: Option<String>,
    pub generator_id: String,
    pub billing_customer_id: String,
    pub invoice_configuration_id: String,

    pub is_enabled: bool,
    pub include_for_automation: bool,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,

    pub load_confirmations_enabled: bool,
    pub field_ticket_delivery_method: FieldTicketDeliveryMethod,
    pub load_confirmation_frequency: LoadConfirmationFrequency,
    pub first_day_of_week: Weekday,
    /// Day that splits the month for monthly load confirmations (1 = no split).
    pub first_day_of_month: u32,

    pub predicates: Vec<MatchPredicate>,
    pub created_at: DateTime<Utc>,
}

impl BillingConfiguration {
    /// Whether this configuration can govern the given ticket at all.
    pub fn applies_to(&self, ticket: &TruckTicket) -> bool {
        self.is_enabled
            && self
                .facility_id
                .as_deref()
                .map_or(true, |f| f == ticket.facility_id)
            && self.generator_id == ticket.generator_id
            && window_covers(self.start_date, self.end_date, ticket.billing_date())
    }
}

/// Which ticket attributes split invoices of one invoice configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct InvoiceConfiguration {
    pub id: String,
    pub name: String,
    pub billing_customer_id: String,
    pub split_by_facility: bool,
    pub split_by_source_location: bool,
    pub split_by_service_type: bool,
    pub split_by_well_classification: bool,
    pub split_by_substance: bool,
}

impl InvoiceConfiguration {
    /// Deterministic permutation key for the ticket under this configuration.
    ///
    /// ## Example
    /// ```text
    /// split_by_source_location = true, split_by_substance = true
    /// ticket: source_location = SL-7, substance = <none>
    ///      │
    ///      ▼
    /// "IC-1|sl=SL-7|sub=-"
    /// ```
    pub fn permutation_id(&self, ticket: &TruckTicket) -> String {
        let mut key = self.id.clone();
        let mut push = |tag: &str, value: Option<&str>| {
            key.push('|');
            key.push_str(tag);
            key.push('=');
            key.push_str(value.unwrap_or("-"));
        };

        if self.split_by_facility {
            push("fac", Some(ticket.facility_id.as_str()));
        }
        if self.split_by_source_location {
            push("sl", ticket.source_location_id.as_deref());
        }
        if self.split_by_service_type {
            push("svc", ticket.service_type_id.as_deref());
        }
        if self.split_by_well_classification {
            push("wc", ticket.well_classification.as_deref());
        }
        if self.split_by_substance {
            push("sub", ticket.substance_id.as_deref());
        }
        key
    }
}

// =============================================================================
// Invoice
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    UnPosted,
    Posted,
    Void,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        InvoiceStatus::UnPosted
    }
}

/// An invoice covering one accounting period of one permutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Invoice {
    pub id: String,
    pub invoice_number: Option<String>,
    pub facility_id: String,
    pub billing_customer_id: String,
    pub invoice_configuration_id: String,
    pub invoice_permutation_id: String,
    pub currency: String,
    pub legal_entity_id: String,
    pub status: InvoiceStatus,
    pub start_date: NaiveDate,
    /// `None` = open-ended ("end of job") invoice.
    pub end_date: Option<NaiveDate>,
    pub is_reversed: bool,
    pub is_reversal: bool,
    pub total_cents: i64,
    pub ticket_count: i64,
    pub created_at: DateTime<Utc>,
}

impl Invoice {
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

// =============================================================================
// Load Confirmation
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum LoadConfirmationStatus {
    Open,
    PendingSignature,
    Posted,
    Rejected,
    Void,
}

impl Default for LoadConfirmationStatus {
    fn default() -> Self {
        LoadConfirmationStatus::Open
    }
}

/// A field-ticket bundle sent to the customer for sign-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LoadConfirmation {
    pub id: String,
    /// Ticket number for ticket-by-ticket delivery, allocated number otherwise.
    pub number: Option<String>,
    pub billing_configuration_id: String,
    pub invoice_id: String,
    pub invoice_permutation_id: String,
    pub facility_id: String,
    pub frequency: String,
    pub is_ticket_by_ticket: bool,
    pub status: LoadConfirmationStatus,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub is_reversed: bool,
    pub is_reversal: bool,
    pub total_cents: i64,
    pub ticket_count: i64,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Reference Data (facility, accounts, legal entities, approvals)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Landfill,
    Pipeline,
    Cavern,
    /// Salt water disposal well.
    Swd,
    /// Fluid service terminal.
    Fst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Facility {
    pub id: String,
    pub name: String,
    /// Short code used as document-number prefix.
    pub site_code: String,
    pub facility_type: FacilityType,
    pub country_code: String,
    /// Loads timed out before this time count toward the previous day.
    pub operating_day_cutoff: Option<NaiveTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Account {
    pub id: String,
    pub name: String,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LegalEntity {
    pub id: String,
    pub name: String,
    pub country_code: String,
    pub default_currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct MaterialApproval {
    pub id: String,
    pub number: String,
    pub enable_end_of_job_invoicing: bool,
}

// =============================================================================
// Sales Line
// =============================================================================

/// A priced line of a ticket, stamped with its billing assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct SalesLine {
    pub id: String,
    pub ticket_id: String,
    pub ticket_number: String,
    pub product_number: String,
    /// Quantity in thousandths of a unit (m³ or tonne).
    pub quantity_milli: i64,
    pub rate_cents: i64,
    pub total_cents: i64,
    pub billing_configuration_id: Option<String>,
    pub invoice_id: Option<String>,
    pub load_confirmation_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SalesLine {
    /// Creates an unassigned line and computes its total.
    pub fn priced(
        ticket: &TruckTicket,
        product_number: impl Into<String>,
        quantity_milli: i64,
        rate: Money,
    ) -> Self {
        SalesLine {
            id: uuid::Uuid::new_v4().to_string(),
            ticket_id: ticket.id.clone(),
            ticket_number: ticket.ticket_number.clone(),
            product_number: product_number.into(),
            quantity_milli,
            rate_cents: rate.cents(),
            total_cents: rate.multiply_thousandths(quantity_milli).cents(),
            billing_configuration_id: None,
            invoice_id: None,
            load_confirmation_id: None,
            created_at: Utc::now(),
        }
    }

    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}
