use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::signal::{Action, Signal};

/// Coarse label for how many agents backed the chosen action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    High,
    Medium,
    Low,
}

/// Normalized weighted score per action.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ActionScores {
    pub buy: Decimal,
    pub sell: Decimal,
    pub hold: Decimal,
}

impl ActionScores {
    pub fn get(&self, action: Action) -> Decimal {
        match action {
            Action::Buy => self.buy,
            Action::Sell => self.sell,
            Action::Hold => self.hold,
        }
    }

    pub fn get_mut(&mut self, action: Action) -> &mut Decimal {
        match action {
            Action::Buy => &mut self.buy,
            Action::Sell => &mut self.sell,
            Action::Hold => &mut self.hold,
        }
    }
}

/// The adjudicated output of one analysis cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    pub action: Action,
    /// 0.0 to 1.0, after agreement dampening and risk penalties.
    pub confidence: Decimal,
    pub agreement_level: AgreementLevel,
    pub agreement_ratio: Decimal,
    /// True when the risk overlay changed the action or reduced confidence.
    pub risk_adjusted: bool,
    /// True when the risk agent's veto fired, whether or not it changed the action.
    pub vetoed: bool,
    /// Action and confidence as they left the consensus calculator.
    pub provisional_action: Action,
    pub provisional_confidence: Decimal,
    pub scores: ActionScores,
    pub risk_notes: Vec<String>,
    /// Every signal folded into this decision, ordered by agent id.
    pub contributing_signals: Vec<Signal>,
    /// False when expected agents were missing or stale signals were dropped.
    pub inputs_complete: bool,
    pub missing_agents: Vec<String>,
    pub stale_agents: Vec<String>,
    pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_decision() -> Decision {
        let technical = Signal::new("technical", Action::Buy, dec!(0.8))
            .unwrap()
            .with_rationale("RSI-14 at 28, oversold");
        let sentiment = Signal::new("sentiment", Action::Hold, dec!(0.6))
            .unwrap()
            .with_rationale("Neutral news flow");

        Decision {
            action: Action::Buy,
            confidence: dec!(0.4),
            agreement_level: AgreementLevel::Medium,
            agreement_ratio: dec!(0.5),
            risk_adjusted: false,
            vetoed: false,
            provisional_action: Action::Buy,
            provisional_confidence: dec!(0.4),
            scores: ActionScores {
                buy: dec!(0.4),
                sell: Decimal::ZERO,
                hold: dec!(0.3),
            },
            risk_notes: vec![],
            contributing_signals: vec![sentiment, technical],
            inputs_complete: true,
            missing_agents: vec![],
            stale_agents: vec![],
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn roundtrip_decision() {
        let decision = sample_decision();
        let json = serde_json::to_string(&decision).unwrap();
        let deserialized: Decision = serde_json::from_str(&json).unwrap();
        assert_eq!(decision, deserialized);
    }

    #[test]
    fn agreement_level_serialization() {
        assert_eq!(
            serde_json::to_string(&AgreementLevel::Medium).unwrap(),
            "\"medium\""
        );
    }

    #[test]
    fn scores_index_by_action() {
        let mut scores = ActionScores::default();
        *scores.get_mut(Action::Sell) += dec!(0.25);
        assert_eq!(scores.get(Action::Sell), dec!(0.25));
        assert_eq!(scores.get(Action::Buy), Decimal::ZERO);
    }
}
