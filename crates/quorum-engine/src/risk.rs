use quorum_models::{Action, RiskConfig, RiskMetrics, Signal};
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::consensus::ProvisionalDecision;

/// Risk overlay output.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskReview {
    pub action: Action,
    pub confidence: Decimal,
    pub risk_adjusted: bool,
    pub vetoed: bool,
    pub notes: Vec<String>,
}

/// Apply the veto and portfolio limits to a provisional decision.
///
/// Downgrade-only: the action never becomes buy unless it already was, and
/// the returned confidence is never above `provisional.confidence`.
/// `risk_metrics = None` means the data is unavailable and is treated as a
/// breach, never as known-safe.
pub fn apply(
    provisional: &ProvisionalDecision,
    risk_signal: Option<&Signal>,
    risk_metrics: Option<&RiskMetrics>,
    config: &RiskConfig,
) -> RiskReview {
    let mut action = provisional.action;
    let mut confidence = provisional.confidence;
    let mut notes = Vec::new();
    let mut vetoed = false;
    let mut penalized = false;

    if let Some(signal) = risk_signal {
        if signal.action() == Action::Sell && signal.confidence() > config.veto_threshold {
            vetoed = true;
            if action == Action::Buy {
                action = config.veto_action;
                confidence *= config.veto_penalty;
                info!(
                    risk_agent = %signal.agent_id(),
                    risk_confidence = %signal.confidence(),
                    downgraded_to = %action,
                    "Risk veto overrode buy"
                );
                notes.push(format!(
                    "Risk agent '{}' vetoed buy (sell at {} > {}); downgraded to {}",
                    signal.agent_id(),
                    signal.confidence(),
                    config.veto_threshold,
                    action
                ));
            } else {
                notes.push(format!(
                    "Risk agent '{}' veto active (sell at {}); {} left unchanged",
                    signal.agent_id(),
                    signal.confidence(),
                    action
                ));
            }
        }
    }

    match risk_metrics {
        None => {
            warn!("Risk data unavailable; applying maximum-risk penalty");
            notes.push("Risk data unavailable; treated as maximum risk".to_string());
            confidence *= config.breach_penalty;
            penalized = true;
        }
        Some(metrics) => {
            let breaches: Vec<String> = config
                .limits
                .iter()
                .filter_map(|(name, limit)| {
                    metrics
                        .get(name)
                        .filter(|value| *value > limit)
                        .map(|value| format!("{name} {value} exceeds limit {limit}"))
                })
                .collect();

            if !breaches.is_empty() {
                warn!(breaches = breaches.len(), "Portfolio risk limits breached");
                confidence *= config.breach_penalty;
                penalized = true;
                notes.extend(breaches);
            }
        }
    }

    let confidence = confidence
        .min(provisional.confidence)
        .clamp(Decimal::ZERO, Decimal::ONE)
        .normalize();
    let risk_adjusted =
        action != provisional.action || penalized || confidence < provisional.confidence;

    RiskReview {
        action,
        confidence,
        risk_adjusted,
        vetoed,
        notes,
    }
}
