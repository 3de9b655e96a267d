use quorum_models::{
    Action, ActionScores, AgreementLevel, ConsensusConfig, Signal, WeightTable,
};
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Consensus calculator output, before the risk overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct ProvisionalDecision {
    pub action: Action,
    /// Chosen action's normalized score, dampened when agreement is low.
    pub confidence: Decimal,
    pub scores: ActionScores,
    pub agreement_ratio: Decimal,
    pub agreement_level: AgreementLevel,
    pub dampened: bool,
    pub signal_count: usize,
}

/// Combine weighted signals into a provisional decision.
///
/// Scores are normalized by the weight mass of the agents actually present,
/// so an absent agent removes only its own contribution. Equal top scores
/// resolve to hold. The result depends only on the set of signals, never on
/// the order they are given in.
pub fn calculate(
    signals: &[&Signal],
    weights: &WeightTable,
    config: &ConsensusConfig,
) -> Result<ProvisionalDecision, EngineError> {
    if signals.is_empty() {
        return Err(EngineError::NoSignals);
    }

    let mut agent_weights: Vec<Decimal> = signals
        .iter()
        .map(|s| weights.weight_for(s.agent_id()))
        .collect();

    // Only relative weight matters. Bring weights into [0, 1] so the sums
    // below cannot overflow Decimal however large the table's values are.
    let largest = agent_weights.iter().copied().max().unwrap_or(Decimal::ZERO);
    if largest > Decimal::ONE {
        debug!(largest = %largest, "Rescaling agent weights");
        for weight in &mut agent_weights {
            *weight /= largest;
        }
    }
    let mut total_weight: Decimal = agent_weights.iter().sum();

    if total_weight.is_zero() {
        warn!(
            agents = signals.len(),
            "All present agents carry zero weight; weighting them equally"
        );
        agent_weights = vec![Decimal::ONE; signals.len()];
        total_weight = Decimal::from(signals.len() as u64);
    }

    let mut scores = ActionScores::default();
    for (signal, weight) in signals.iter().zip(&agent_weights) {
        *scores.get_mut(signal.action()) += *weight * signal.confidence();
    }
    for action in Action::ALL {
        let normalized = (scores.get(action) / total_weight).normalize();
        *scores.get_mut(action) = normalized;
    }

    let action = choose_action(&scores);
    let mut confidence = scores.get(action).clamp(Decimal::ZERO, Decimal::ONE);

    let matching = signals.iter().filter(|s| s.action() == action).count();
    let agreement_ratio =
        (Decimal::from(matching as u64) / Decimal::from(signals.len() as u64)).normalize();
    let agreement_level = agreement_level(agreement_ratio, config);

    let dampened = agreement_level == AgreementLevel::Low;
    if dampened {
        confidence = (confidence * config.low_agreement_dampening).normalize();
    }

    debug!(
        action = %action,
        confidence = %confidence,
        buy = %scores.buy,
        sell = %scores.sell,
        hold = %scores.hold,
        agreement = %agreement_ratio,
        "Consensus scored"
    );

    Ok(ProvisionalDecision {
        action,
        confidence,
        scores,
        agreement_ratio,
        agreement_level,
        dampened,
        signal_count: signals.len(),
    })
}

/// Strictly highest score wins; a tie at the top is resolved to hold.
fn choose_action(scores: &ActionScores) -> Action {
    let mut ranked = Action::ALL.map(|action| (action, scores.get(action)));
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    if ranked[0].1 == ranked[1].1 {
        Action::Hold
    } else {
        ranked[0].0
    }
}

pub fn agreement_level(ratio: Decimal, config: &ConsensusConfig) -> AgreementLevel {
    if ratio >= config.high_agreement {
        AgreementLevel::High
    } else if ratio >= config.medium_agreement {
        AgreementLevel::Medium
    } else {
        AgreementLevel::Low
    }
}
