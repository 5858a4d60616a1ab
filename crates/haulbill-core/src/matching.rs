//! # Predicate Matcher
//!
//! Scores one truck ticket against one billing match predicate.
//!
//! ## Ranked Evaluation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Criterion            Weight   Ignored    Wildcard    Exact(v)          │
//! │  ───────────────────  ──────   ───────    ────────    ────────────────  │
//! │  source location        21     skip       +1 / +21    +1 / +21 if v==t  │
//! │  stream                 13     skip       +1 / +13    +1 / +13 if v==t  │
//! │  well classification     8     skip       +1 / +8     +1 / +8  if v==t  │
//! │  service type            5     skip       +1 / +5     +1 / +5  if v==t  │
//! │  substance               3     skip       +1 / +3     +1 / +3  if v==t  │
//! │                                                                         │
//! │  Result: (matches, weight). All five ignored → (0, 0), never a match.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conjunctive Evaluation (automation)
//! Predicates and tickets are flattened into `"property:value"` tokens. A
//! candidate survives only when **every** one of its tokens is present in
//! the ticket's token set:
//!
//! ```text
//! predicate: [sourceLocation:SL-1, stream:*]
//! ticket:    {sourceLocation:*, sourceLocation:SL-1, stream:*, stream:water, ...}
//!            └── all present → candidate qualifies
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{MatchCriterion, MatchPredicate, TruckTicket};

/// Token value standing for "any value" of a criterion.
pub const WILDCARD_TOKEN: &str = "*";

// =============================================================================
// Criterion
// =============================================================================

/// The five ticket attributes a predicate can constrain, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Criterion {
    SourceLocation,
    Stream,
    WellClassification,
    ServiceType,
    Substance,
}

impl Criterion {
    /// Fixed evaluation order.
    pub const ALL: [Criterion; 5] = [
        Criterion::SourceLocation,
        Criterion::Stream,
        Criterion::WellClassification,
        Criterion::ServiceType,
        Criterion::Substance,
    ];

    /// Property name used in flattened match tokens.
    pub fn token_name(&self) -> &'static str {
        match self {
            Criterion::SourceLocation => "sourceLocation",
            Criterion::Stream => "stream",
            Criterion::WellClassification => "wellClassification",
            Criterion::ServiceType => "serviceType",
            Criterion::Substance => "substance",
        }
    }

    pub fn from_token_name(name: &str) -> Option<Criterion> {
        Criterion::ALL.into_iter().find(|c| c.token_name() == name)
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token_name())
    }
}

// =============================================================================
// Weights
// =============================================================================

/// Importance weight of each criterion when ranking predicates.
///
/// Defaults to 21 / 13 / 8 / 5 / 3. Loaded from the `[matching]` table of
/// `billing.toml`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CriterionWeights {
    pub source_location: u32,
    pub stream: u32,
    pub well_classification: u32,
    pub service_type: u32,
    pub substance: u32,
}

impl Default for CriterionWeights {
    fn default() -> Self {
        CriterionWeights {
            source_location: 21,
            stream: 13,
            well_classification: 8,
            service_type: 5,
            substance: 3,
        }
    }
}

impl CriterionWeights {
    pub fn weight(&self, criterion: Criterion) -> u32 {
        match criterion {
            Criterion::SourceLocation => self.source_location,
            Criterion::Stream => self.stream,
            Criterion::WellClassification => self.well_classification,
            Criterion::ServiceType => self.service_type,
            Criterion::Substance => self.substance,
        }
    }

    pub fn total(&self) -> u32 {
        Criterion::ALL.iter().map(|c| self.weight(*c)).sum()
    }
}

// =============================================================================
// Score
// =============================================================================

/// Outcome of evaluating one predicate against one ticket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PredicateScore {
    /// Number of criteria that matched (exact hit or wildcard).
    pub matches: u32,
    /// Sum of the matched criteria's weights.
    pub weight: u32,
}

impl PredicateScore {
    pub fn is_match(&self) -> bool {
        self.matches > 0
    }

    /// Ranking key: weight first, then number of matched criteria.
    pub fn rank_key(&self) -> (u32, u32) {
        (self.weight, self.matches)
    }
}

/// A candidate that passed the conjunctive token filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedCandidate<K> {
    pub key: K,
    pub score: PredicateScore,
}

// =============================================================================
// Matcher
// =============================================================================

/// Evaluates tickets against match predicates with a fixed weight table.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateMatcher {
    weights: CriterionWeights,
}

impl PredicateMatcher {
    pub fn new(weights: CriterionWeights) -> Self {
        PredicateMatcher { weights }
    }

    pub fn weights(&self) -> &CriterionWeights {
        &self.weights
    }

    /// Ranked, partial evaluation of one predicate.
    pub fn evaluate(&self, ticket: &TruckTicket, predicate: &MatchPredicate) -> PredicateScore {
        let mut score = PredicateScore::default();

        for criterion in Criterion::ALL {
            let hit = match predicate.criterion(criterion) {
                MatchCriterion::Ignored => continue,
                MatchCriterion::Wildcard => true,
                MatchCriterion::Exact(value) => {
                    ticket.criterion_value(criterion) == Some(value.as_str())
                }
            };

            if hit {
                score.matches += 1;
                score.weight += self.weights.weight(criterion);
            }
        }

        score
    }

    /// All-or-nothing filter over pre-flattened predicate tokens.
    ///
    /// Returns the candidates whose every token appears in `ticket_tokens`,
    /// each scored by the criteria its tokens name. Candidates without any
    /// token never qualify.
    pub fn evaluate_predicate_rank<K, I>(
        &self,
        candidates: I,
        ticket_tokens: &BTreeSet<String>,
    ) -> Vec<RankedCandidate<K>>
    where
        I: IntoIterator<Item = (K, Vec<String>)>,
    {
        candidates
            .into_iter()
            .filter(|(_, tokens)| {
                !tokens.is_empty() && tokens.iter().all(|t| ticket_tokens.contains(t))
            })
            .map(|(key, tokens)| {
                let score = self.score_tokens(&tokens);
                RankedCandidate { key, score }
            })
            .collect()
    }

    fn score_tokens(&self, tokens: &[String]) -> PredicateScore {
        let mut score = PredicateScore::default();
        for token in tokens {
            let criterion = token
                .split_once(':')
                .and_then(|(name, _)| Criterion::from_token_name(name));
            if let Some(criterion) = criterion {
                score.matches += 1;
                score.weight += self.weights.weight(criterion);
            }
        }
        score
    }
}

// =============================================================================
// Tokens
// =============================================================================

fn wildcard_token(criterion: Criterion) -> String {
    format!("{}:{}", criterion.token_name(), WILDCARD_TOKEN)
}

// The `=` marker keeps a literal "*" value apart from the wildcard token.
fn exact_token(criterion: Criterion, value: &str) -> String {
    format!("{}:={}", criterion.token_name(), value)
}

/// Flattens a predicate: wildcard → `prop:*`, exact → `prop:=value`,
/// ignored criteria produce no token.
pub fn predicate_tokens(predicate: &MatchPredicate) -> Vec<String> {
    Criterion::ALL
        .iter()
        .filter_map(|c| match predicate.criterion(*c) {
            MatchCriterion::Ignored => None,
            MatchCriterion::Wildcard => Some(wildcard_token(*c)),
            MatchCriterion::Exact(value) => Some(exact_token(*c, value)),
        })
        .collect()
}

/// Flattens a ticket: `prop:*` for every criterion plus `prop:=value` for
/// each attribute the ticket carries.
pub fn ticket_tokens(ticket: &TruckTicket) -> BTreeSet<String> {
    let mut tokens = BTreeSet::new();
    for criterion in Criterion::ALL {
        tokens.insert(wildcard_token(criterion));
        if let Some(value) = ticket.criterion_value(criterion) {
            tokens.insert(exact_token(criterion, value));
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::fixtures::ticket;

    fn all_wildcards() -> MatchPredicate {
        let mut p = MatchPredicate::new("P-1");
        for c in Criterion::ALL {
            p = p.with(c, MatchCriterion::Wildcard);
        }
        p
    }

    #[test]
    fn test_single_exact_criterion_scores_its_weight() {
        let t = ticket();
        let m = PredicateMatcher::default();
        let expected = [
            (Criterion::SourceLocation, 21),
            (Criterion::Stream, 13),
            (Criterion::WellClassification, 8),
            (Criterion::ServiceType, 5),
            (Criterion::Substance, 3),
        ];

        for (criterion, weight) in expected {
            let value = t.criterion_value(criterion).unwrap().to_string();
            let p = MatchPredicate::new("P").with(criterion, MatchCriterion::Exact(value));
            let score = m.evaluate(&t, &p);
            assert_eq!(score.matches, 1, "{}", criterion);
            assert_eq!(score.weight, weight, "{}", criterion);
        }
    }

    #[test]
    fn test_all_wildcards_score_fifty() {
        let score = PredicateMatcher::default().evaluate(&ticket(), &all_wildcards());
        assert_eq!(score, PredicateScore { matches: 5, weight: 50 });
    }

    #[test]
    fn test_all_ignored_never_matches() {
        let p = MatchPredicate::new("P");
        assert!(p.is_empty());
        let score = PredicateMatcher::default().evaluate(&ticket(), &p);
        assert_eq!(score, PredicateScore { matches: 0, weight: 0 });
        assert!(!score.is_match());
    }

    #[test]
    fn test_one_mismatch_drops_that_criterion_only() {
        let t = ticket();
        let m = PredicateMatcher::default();
        let p = all_wildcards().with(Criterion::WellClassification, MatchCriterion::exact("gas"));

        let score = m.evaluate(&t, &p);
        assert_eq!(score.matches, 4);
        assert_eq!(score.weight, 50 - 8);
    }

    #[test]
    fn test_exact_against_missing_ticket_value() {
        let mut t = ticket();
        t.substance_id = None;
        let p = MatchPredicate::new("P").with(Criterion::Substance, MatchCriterion::exact("SUB-1"));
        assert!(!PredicateMatcher::default().evaluate(&t, &p).is_match());
    }

    #[test]
    fn test_custom_weights() {
        let weights = CriterionWeights {
            source_location: 1,
            ..CriterionWeights::default()
        };
        let p = MatchPredicate::new("P").with(Criterion::SourceLocation, MatchCriterion::Wildcard);
        let score = PredicateMatcher::new(weights).evaluate(&ticket(), &p);
        assert_eq!(score.weight, 1);
    }

    #[test]
    fn test_tokens() {
        let p = MatchPredicate::new("P")
            .with(Criterion::SourceLocation, MatchCriterion::exact("SL-1"))
            .with(Criterion::Stream, MatchCriterion::Wildcard);
        assert_eq!(predicate_tokens(&p), vec!["sourceLocation:=SL-1", "stream:*"]);

        let tokens = ticket_tokens(&ticket());
        assert!(tokens.contains("sourceLocation:*"));
        assert!(tokens.contains("sourceLocation:=SL-1"));
        assert!(tokens.contains("substance:=SUB-1"));
        assert_eq!(tokens.len(), 10);
    }

    #[test]
    fn test_evaluate_predicate_rank_is_conjunctive() {
        let t = ticket();
        let m = PredicateMatcher::default();
        let ticket_set = ticket_tokens(&t);

        let hit = MatchPredicate::new("hit")
            .with(Criterion::SourceLocation, MatchCriterion::exact("SL-1"))
            .with(Criterion::Stream, MatchCriterion::Wildcard);
        let miss = MatchPredicate::new("miss")
            .with(Criterion::SourceLocation, MatchCriterion::exact("SL-1"))
            .with(Criterion::Substance, MatchCriterion::exact("SUB-9"));
        let empty = MatchPredicate::new("empty");

        let candidates = [&hit, &miss, &empty]
            .into_iter()
            .map(|p| (p.id.clone(), predicate_tokens(p)));
        let ranked = m.evaluate_predicate_rank(candidates, &ticket_set);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].key, "hit");
        assert_eq!(ranked[0].score, PredicateScore { matches: 2, weight: 34 });
    }

    #[test]
    fn test_literal_star_is_not_a_wildcard() {
        let t = ticket();
        let m = PredicateMatcher::default();
        let p = MatchPredicate::new("star").with(Criterion::Stream, MatchCriterion::exact("*"));

        assert_eq!(m.evaluate(&t, &p), PredicateScore::default());
        assert_eq!(predicate_tokens(&p), vec!["stream:=*"]);

        let ranked = m.evaluate_predicate_rank(
            [(p.id.clone(), predicate_tokens(&p))],
            &ticket_tokens(&t),
        );
        assert!(ranked.is_empty());

        // A ticket that really carries "*" still matches it exactly
        let mut starred = ticket();
        starred.stream = Some("*".to_string());
        let ranked = m.evaluate_predicate_rank(
            [(p.id.clone(), predicate_tokens(&p))],
            &ticket_tokens(&starred),
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].score, PredicateScore { matches: 1, weight: 13 });
    }
}
