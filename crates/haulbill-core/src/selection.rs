//! # Billing Configuration Selection
//!
//! Picks the billing configuration that governs a ticket.
//!
//! ## Two Modes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidates = enabled configs for ticket's facility + generator,       │
//! │               window covering the ticket's billing date                 │
//! │                                                                         │
//! │  Manual (UI)                        Automated (approval pipeline)      │
//! │  ─────────────────────────────      ─────────────────────────────────   │
//! │  ranked evaluate() per predicate    include_for_automation only         │
//! │  best = max weight                  conjunctive token filter            │
//! │       → max matches                 exactly one survivor → Matched      │
//! │       → newest config               zero → NoMatch                      │
//! │       → smallest config id          many → Ambiguous (never guessed)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::matching::{predicate_tokens, ticket_tokens, PredicateMatcher, PredicateScore};
use crate::types::{BillingConfiguration, MatchPredicate, TruckTicket};

/// The winning configuration/predicate pair of a ranked selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationMatch {
    pub configuration_id: String,
    pub predicate_id: String,
    pub score: PredicateScore,
}

/// Result of automated selection. Absence and ambiguity are reported, not
/// resolved.
#[derive(Debug, Clone)]
pub enum AutomationOutcome {
    Matched(BillingConfiguration),
    NoMatch,
    /// Ids of every configuration that qualified.
    Ambiguous(Vec<String>),
}

impl AutomationOutcome {
    pub fn matched(&self) -> Option<&BillingConfiguration> {
        match self {
            AutomationOutcome::Matched(config) => Some(config),
            _ => None,
        }
    }

    /// Short reason for logs and skipped-ticket reports.
    pub fn describe(&self) -> String {
        match self {
            AutomationOutcome::Matched(config) => format!("matched {}", config.id),
            AutomationOutcome::NoMatch => "no automated billing configuration".to_string(),
            AutomationOutcome::Ambiguous(ids) => {
                format!("ambiguous automated billing configuration: {}", ids.join(", "))
            }
        }
    }
}

/// Selects billing configurations for tickets.
#[derive(Debug, Clone, Copy, Default)]
pub struct BillingConfigSelector {
    matcher: PredicateMatcher,
}

impl BillingConfigSelector {
    pub fn new(matcher: PredicateMatcher) -> Self {
        BillingConfigSelector { matcher }
    }

    pub fn matcher(&self) -> &PredicateMatcher {
        &self.matcher
    }

    /// Every configuration that could govern the ticket, automation flag
    /// ignored.
    pub fn matching_billing_configurations<'a>(
        &self,
        configs: &'a [BillingConfiguration],
        ticket: &TruckTicket,
    ) -> Vec<&'a BillingConfiguration> {
        configs.iter().filter(|c| c.applies_to(ticket)).collect()
    }

    /// Ranked selection for manual matching.
    pub fn matching_billing_configuration(
        &self,
        configs: &[BillingConfiguration],
        ticket: &TruckTicket,
    ) -> Option<ConfigurationMatch> {
        let mut best: Option<(ConfigurationMatch, DateTime<Utc>)> = None;

        for config in self.matching_billing_configurations(configs, ticket) {
            let Some((predicate, score)) = self.best_predicate(config, ticket) else {
                continue;
            };
            let candidate = ConfigurationMatch {
                configuration_id: config.id.clone(),
                predicate_id: predicate.id.clone(),
                score,
            };

            let replace = match &best {
                None => true,
                Some((current, created_at)) => {
                    compare_matches(&candidate, config.created_at, current, *created_at)
                        == Ordering::Greater
                }
            };
            if replace {
                best = Some((candidate, config.created_at));
            }
        }

        best.map(|(m, _)| m)
    }

    /// Automated selection: exactly one fully qualifying configuration.
    pub fn select_automated_billing_configuration(
        &self,
        configs: &[BillingConfiguration],
        ticket: &TruckTicket,
    ) -> AutomationOutcome {
        let ticket_set = ticket_tokens(ticket);
        let date = ticket.billing_date();

        let mut qualifying: Vec<&BillingConfiguration> = self
            .matching_billing_configurations(configs, ticket)
            .into_iter()
            .filter(|c| c.include_for_automation)
            .filter(|c| {
                let candidates = c
                    .predicates
                    .iter()
                    .filter(|p| p.is_active_on(date))
                    .map(|p| (p.id.as_str(), predicate_tokens(p)));
                !self
                    .matcher
                    .evaluate_predicate_rank(candidates, &ticket_set)
                    .is_empty()
            })
            .collect();

        match qualifying.len() {
            0 => AutomationOutcome::NoMatch,
            1 => AutomationOutcome::Matched(qualifying.remove(0).clone()),
            _ => {
                let mut ids: Vec<String> = qualifying.iter().map(|c| c.id.clone()).collect();
                ids.sort();
                AutomationOutcome::Ambiguous(ids)
            }
        }
    }

    /// Highest-ranked active predicate of a configuration that matches at all.
    fn best_predicate<'a>(
        &self,
        config: &'a BillingConfiguration,
        ticket: &TruckTicket,
    ) -> Option<(&'a MatchPredicate, PredicateScore)> {
        let date = ticket.billing_date();
        config
            .predicates
            .iter()
            .filter(|p| p.is_active_on(date))
            .map(|p| (p, self.matcher.evaluate(ticket, p)))
            .filter(|(_, score)| score.is_match())
            .max_by(|(pa, sa), (pb, sb)| {
                sa.rank_key()
                    .cmp(&sb.rank_key())
                    .then_with(|| pb.id.cmp(&pa.id))
            })
    }
}

/// Greater = better: weight, matches, newer configuration, smaller id.
fn compare_matches(
    a: &ConfigurationMatch,
    a_created: DateTime<Utc>,
    b: &ConfigurationMatch,
    b_created: DateTime<Utc>,
) -> Ordering {
    a.score
        .rank_key()
        .cmp(&b.score.rank_key())
        .then_with(|| a_created.cmp(&b_created))
        .then_with(|| b.configuration_id.cmp(&a.configuration_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::Criterion;
    use crate::types::fixtures::{configuration, ticket};
    use crate::types::MatchCriterion;
    use chrono::Duration;

    fn predicate(id: &str, pairs: &[(Criterion, MatchCriterion)]) -> MatchPredicate {
        pairs
            .iter()
            .fold(MatchPredicate::new(id), |p, (c, v)| p.with(*c, v.clone()))
    }

    #[test]
    fn test_manual_selection_prefers_weight() {
        let t = ticket();
        let configs = vec![
            configuration(
                "BC-stream",
                vec![predicate("P-1", &[(Criterion::Stream, MatchCriterion::exact("landfill"))])],
            ),
            configuration(
                "BC-source",
                vec![predicate("P-2", &[(Criterion::SourceLocation, MatchCriterion::exact("SL-1"))])],
            ),
        ];

        let best = BillingConfigSelector::default()
            .matching_billing_configuration(&configs, &t)
            .unwrap();
        assert_eq!(best.configuration_id, "BC-source");
        assert_eq!(best.score.weight, 21);
    }

    #[test]
    fn test_manual_selection_tie_breaks() {
        let t = ticket();
        let p = || vec![predicate("P", &[(Criterion::ServiceType, MatchCriterion::Wildcard)])];

        let mut older = configuration("BC-old", p());
        older.created_at = Utc::now() - Duration::days(10);
        let newer = configuration("BC-new", p());

        let best = BillingConfigSelector::default()
            .matching_billing_configuration(&[older.clone(), newer.clone()], &t)
            .unwrap();
        assert_eq!(best.configuration_id, "BC-new");

        // Same creation time: smallest id wins
        let mut a = configuration("BC-a", p());
        let mut b = configuration("BC-b", p());
        a.created_at = older.created_at;
        b.created_at = older.created_at;
        let best = BillingConfigSelector::default()
            .matching_billing_configuration(&[b, a], &t)
            .unwrap();
        assert_eq!(best.configuration_id, "BC-a");
    }

    #[test]
    fn test_manual_selection_skips_disabled_and_out_of_window() {
        let t = ticket();
        let wildcard = || vec![predicate("P", &[(Criterion::Stream, MatchCriterion::Wildcard)])];

        let mut disabled = configuration("BC-disabled", wildcard());
        disabled.is_enabled = false;
        let mut expired = configuration("BC-expired", wildcard());
        expired.end_date = t.load_date.pred_opt();
        let mut disabled_predicate = configuration("BC-pred-off", wildcard());
        disabled_predicate.predicates[0].is_enabled = false;

        let selector = BillingConfigSelector::default();
        let configs = [disabled, expired, disabled_predicate];
        assert!(selector.matching_billing_configuration(&configs, &t).is_none());
    }

    #[test]
    fn test_automated_selection_requires_exactly_one() {
        let t = ticket();
        let exact_source = || {
            vec![predicate(
                "P",
                &[
                    (Criterion::SourceLocation, MatchCriterion::exact("SL-1")),
                    (Criterion::Stream, MatchCriterion::Wildcard),
                ],
            )]
        };
        let selector = BillingConfigSelector::default();

        let one = vec![configuration("BC-1", exact_source())];
        let outcome = selector.select_automated_billing_configuration(&one, &t);
        assert_eq!(outcome.matched().unwrap().id, "BC-1");

        let two = vec![configuration("BC-2", exact_source()), configuration("BC-1", exact_source())];
        match selector.select_automated_billing_configuration(&two, &t) {
            AutomationOutcome::Ambiguous(ids) => assert_eq!(ids, vec!["BC-1", "BC-2"]),
            other => panic!("expected ambiguous, got {:?}", other),
        }

        let none = vec![configuration(
            "BC-3",
            vec![predicate("P", &[(Criterion::Substance, MatchCriterion::exact("SUB-9"))])],
        )];
        assert!(matches!(
            selector.select_automated_billing_configuration(&none, &t),
            AutomationOutcome::NoMatch
        ));
    }

    #[test]
    fn test_automated_selection_ignores_manual_only_configs() {
        let t = ticket();
        let wildcard = || vec![predicate("P", &[(Criterion::Stream, MatchCriterion::Wildcard)])];
        let mut manual = configuration("BC-manual", wildcard());
        manual.include_for_automation = false;
        let auto = configuration("BC-auto", wildcard());

        let selector = BillingConfigSelector::default();
        let configs = [manual, auto];
        assert_eq!(selector.matching_billing_configurations(&configs, &t).len(), 2);

        let outcome = selector.select_automated_billing_configuration(&configs, &t);
        assert_eq!(outcome.matched().unwrap().id, "BC-auto");
    }
}
