//! # Billing Configuration Selection Service
//!
//! Loads the candidate configurations of a ticket and hands them to
//! [`BillingConfigSelector`].

use tracing::debug;

use crate::error::DbResult;
use crate::repository::billing_configuration::BillingConfigurationRepository;
use haulbill_core::{
    AutomationOutcome, BillingConfigSelector, BillingConfiguration, ConfigurationMatch,
    CriterionWeights, PredicateMatcher, TruckTicket,
};

#[derive(Debug, Clone)]
pub struct BillingSelectorService {
    repo: BillingConfigurationRepository,
    selector: BillingConfigSelector,
}

impl BillingSelectorService {
    pub fn new(repo: BillingConfigurationRepository, weights: CriterionWeights) -> Self {
        BillingSelectorService {
            repo,
            selector: BillingConfigSelector::new(PredicateMatcher::new(weights)),
        }
    }

    async fn candidates(&self, ticket: &TruckTicket) -> DbResult<Vec<BillingConfiguration>> {
        self.repo
            .find_candidates(&ticket.facility_id, &ticket.generator_id)
            .await
    }

    /// Every enabled configuration covering the ticket, automated or not.
    pub async fn matching_billing_configurations(
        &self,
        ticket: &TruckTicket,
    ) -> DbResult<Vec<BillingConfiguration>> {
        let candidates = self.candidates(ticket).await?;
        Ok(self
            .selector
            .matching_billing_configurations(&candidates, ticket)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Best ranked configuration for manual assignment.
    pub async fn matching_billing_configuration(
        &self,
        ticket: &TruckTicket,
    ) -> DbResult<Option<(BillingConfiguration, ConfigurationMatch)>> {
        let candidates = self.candidates(ticket).await?;
        let Some(found) = self.selector.matching_billing_configuration(&candidates, ticket) else {
            debug!(ticket_id = %ticket.id, "No billing configuration matches");
            return Ok(None);
        };

        debug!(
            ticket_id = %ticket.id,
            configuration_id = %found.configuration_id,
            predicate_id = %found.predicate_id,
            weight = found.score.weight,
            matches = found.score.matches,
            "Ranked billing configuration"
        );

        let config = candidates
            .into_iter()
            .find(|c| c.id == found.configuration_id);
        Ok(config.map(|c| (c, found)))
    }

    /// The single fully qualifying automated configuration, if there is one.
    pub async fn select_automated_billing_configuration(
        &self,
        ticket: &TruckTicket,
    ) -> DbResult<AutomationOutcome> {
        let candidates = self.candidates(ticket).await?;
        let outcome = self
            .selector
            .select_automated_billing_configuration(&candidates, ticket);

        debug!(
            ticket_id = %ticket.id,
            candidates = candidates.len(),
            outcome = %outcome.describe(),
            "Automated billing configuration selection"
        );
        Ok(outcome)
    }
}
