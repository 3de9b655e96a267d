use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use quorum_models::{Action, AgreementJudgment, ModelOpinion, Signal, ValidationError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::warn;

/// Confidence assumed for majority opinions that stated none.
const UNSTATED_CONFIDENCE: Decimal = dec!(0.5);

/// Result of cross-checking several model opinions for one agent.
#[derive(Debug, Clone, PartialEq)]
pub struct OpinionReconciliation {
    pub judgment: AgreementJudgment,
    /// Human-readable summary of the verdict followed by one line per opinion.
    pub rationale: String,
    pub parsed_count: usize,
    pub unparseable_count: usize,
    pub unparseable_sources: Vec<String>,
    /// Mean stated confidence of the opinions backing the majority action.
    pub majority_confidence: Option<Decimal>,
}

/// Cross-check model opinions and produce an agreement judgment.
///
/// - No opinions at all: ratio 1.0, no majority ("no cross-validation performed").
/// - Opinions but none parseable: ratio 1.0, no majority ("no information, no penalty").
/// - Tie for the highest count: ratio 0, no majority (explicit disagreement).
///
/// Unparseable opinions never fail the call; they are excluded from the
/// counts and reported in `unparseable_sources`.
pub fn reconcile_opinions(opinions: &[ModelOpinion]) -> OpinionReconciliation {
    let mut counts: BTreeMap<Action, usize> = BTreeMap::new();
    let mut unparseable_sources = Vec::new();

    for opinion in opinions {
        match opinion.parsed_action() {
            Some(action) => *counts.entry(action).or_insert(0) += 1,
            None => {
                warn!(source = %opinion.source_id, "Unparseable model opinion excluded from agreement");
                unparseable_sources.push(opinion.source_id.clone());
            }
        }
    }

    let parsed_count: usize = counts.values().sum();
    let unparseable_count = unparseable_sources.len();

    let (judgment, verdict) = if opinions.is_empty() {
        (
            AgreementJudgment::unvalidated(),
            "No model opinions supplied; no cross-validation performed".to_string(),
        )
    } else if parsed_count == 0 {
        (
            AgreementJudgment::unvalidated(),
            format!(
                "{} model opinion(s), none parseable; agreement not assessed",
                opinions.len()
            ),
        )
    } else {
        judge(&counts, parsed_count, opinions.len(), unparseable_count)
    };

    let majority_confidence = judgment
        .majority_action
        .and_then(|majority| mean_confidence(opinions, majority));

    let mut lines = vec![verdict];
    lines.extend(opinions.iter().map(describe_opinion));

    OpinionReconciliation {
        judgment,
        rationale: lines.join("\n"),
        parsed_count,
        unparseable_count,
        unparseable_sources,
        majority_confidence,
    }
}

fn judge(
    counts: &BTreeMap<Action, usize>,
    parsed_count: usize,
    total: usize,
    unparseable_count: usize,
) -> (AgreementJudgment, String) {
    let top = counts.values().copied().max().unwrap_or(0);
    let leaders: Vec<Action> = counts
        .iter()
        .filter(|(_, count)| **count == top)
        .map(|(action, _)| *action)
        .collect();

    let header = format!("{total} model opinion(s) ({parsed_count} parsed, {unparseable_count} unparseable)");

    match leaders.as_slice() {
        [majority] => {
            let ratio = Decimal::from(top as u64) / Decimal::from(parsed_count as u64);
            (
                AgreementJudgment {
                    agreement_ratio: ratio.normalize(),
                    majority_action: Some(*majority),
                },
                format!("{header}: majority {majority} ({top}/{parsed_count} agree)"),
            )
        }
        tied => {
            let names: Vec<&str> = tied.iter().map(Action::as_str).collect();
            (
                AgreementJudgment {
                    agreement_ratio: Decimal::ZERO,
                    majority_action: None,
                },
                format!(
                    "{header}: no majority, {} tied at {top} each",
                    names.join("/")
                ),
            )
        }
    }
}

fn mean_confidence(opinions: &[ModelOpinion], majority: Action) -> Option<Decimal> {
    let stated: Vec<Decimal> = opinions
        .iter()
        .filter(|o| o.parsed_action() == Some(majority))
        .filter_map(|o| o.confidence)
        .map(|c| c.clamp(Decimal::ZERO, Decimal::ONE))
        .collect();
    if stated.is_empty() {
        return None;
    }
    let sum: Decimal = stated.iter().sum();
    Some((sum / Decimal::from(stated.len() as u64)).normalize())
}

fn describe_opinion(opinion: &ModelOpinion) -> String {
    match (opinion.parsed_action(), opinion.confidence) {
        (Some(action), Some(confidence)) => {
            format!("- {}: {action} ({confidence})", opinion.source_id)
        }
        (Some(action), None) => format!("- {}: {action}", opinion.source_id),
        (None, _) => format!("- {}: unparseable", opinion.source_id),
    }
}

impl OpinionReconciliation {
    /// The signal a multi-model agent emits from this reconciliation.
    ///
    /// Action is the majority (hold when there is none). Confidence is the
    /// majority's mean stated confidence scaled by the agreement ratio, or 0
    /// when no majority exists.
    pub fn to_signal(
        &self,
        agent_id: &str,
        as_of: DateTime<Utc>,
    ) -> Result<Signal, ValidationError> {
        let (action, confidence) = match self.judgment.majority_action {
            Some(action) => {
                let base = self.majority_confidence.unwrap_or(UNSTATED_CONFIDENCE);
                (action, (base * self.judgment.agreement_ratio).normalize())
            }
            None => (Action::Hold, Decimal::ZERO),
        };

        Ok(Signal::new(agent_id, action, confidence)?
            .with_rationale(self.rationale.clone())
            .with_metric("agreement_ratio", self.judgment.agreement_ratio)
            .with_metric("parsed_opinions", Decimal::from(self.parsed_count as u64))
            .with_metric(
                "unparseable_opinions",
                Decimal::from(self.unparseable_count as u64),
            )
            .with_timestamp(as_of))
    }
}
