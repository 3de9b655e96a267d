use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use quorum_engine::EngineError;
use quorum_models::risk::metric_names::{
    CASH_RATIO, CONCENTRATION_RISK, CORRELATION_RISK, PORTFOLIO_RISK, POSITION_RISK,
    POSITION_SIZE_FRACTION, SECTOR_RISK, VOLATILITY,
};
use quorum_models::{Action, AnalysisContext, RiskLevel, RiskMetrics, Signal};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::info;

use crate::agent::SignalAgent;
use crate::error::AgentError;
use crate::sources::RiskMetricsSource;

/// Component weights of the composite portfolio risk score.
const COMPOSITE_WEIGHTS: [(&str, Decimal); 5] = [
    (CONCENTRATION_RISK, dec!(0.25)),
    (SECTOR_RISK, dec!(0.20)),
    (POSITION_RISK, dec!(0.20)),
    (VOLATILITY, dec!(0.20)),
    (CORRELATION_RISK, dec!(0.15)),
];

/// How much a fully-cash portfolio discounts the composite.
const CASH_DISCOUNT: Decimal = dec!(0.3);

/// Position size before risk adjustment, as a fraction of portfolio value.
const BASE_POSITION_FRACTION: Decimal = dec!(0.05);

/// Weighted composite of the component metrics, discounted for cash and
/// capped at 1. Missing components count as 0.
pub fn portfolio_risk(metrics: &RiskMetrics) -> Decimal {
    let metric = |name: &str| metrics.get(name).copied().unwrap_or(Decimal::ZERO);

    let score: Decimal = COMPOSITE_WEIGHTS
        .iter()
        .map(|(name, weight)| metric(*name) * *weight)
        .sum();
    let cash_adjustment = Decimal::ONE - metric(CASH_RATIO) * CASH_DISCOUNT;

    (score * cash_adjustment).min(Decimal::ONE).normalize()
}

/// The risk agent's own recommendation for a given risk picture.
///
/// Above 0.8 the sell confidence is the portfolio risk itself, so it always
/// clears a veto threshold of 0.8.
pub fn risk_adjusted_action(
    portfolio_risk: Decimal,
    position_risk: Decimal,
    cash_ratio: Decimal,
) -> (Action, Decimal) {
    if portfolio_risk > dec!(0.8) {
        (Action::Sell, portfolio_risk.min(Decimal::ONE))
    } else if portfolio_risk > dec!(0.6) {
        if cash_ratio < dec!(0.2) {
            (Action::Sell, dec!(0.6))
        } else {
            (Action::Hold, dec!(0.4))
        }
    } else if portfolio_risk < dec!(0.3) && position_risk < dec!(0.4) {
        (Action::Buy, dec!(0.5))
    } else {
        (Action::Hold, dec!(0.3))
    }
}

/// Base position size scaled down for portfolio, position and cash risk.
pub fn position_size_fraction(
    portfolio_risk: Decimal,
    position_risk: Decimal,
    cash_ratio: Decimal,
) -> Decimal {
    let mut adjustment = Decimal::ONE;

    if portfolio_risk > dec!(0.6) {
        adjustment *= dec!(0.5);
    } else if portfolio_risk < dec!(0.3) {
        adjustment *= dec!(1.2);
    }

    if position_risk > dec!(0.6) {
        adjustment *= dec!(0.7);
    }

    if cash_ratio < dec!(0.1) {
        adjustment *= dec!(0.3);
    } else if cash_ratio > dec!(0.5) {
        adjustment *= dec!(1.1);
    }

    (BASE_POSITION_FRACTION * adjustment).normalize()
}

fn describe(metrics: &RiskMetrics, risk: Decimal) -> String {
    let metric = |name: &str| metrics.get(name).copied().unwrap_or(Decimal::ZERO);
    let mut parts = vec![format!(
        "Overall portfolio risk: {} ({})",
        RiskLevel::classify(risk),
        risk.round_dp(2)
    )];

    let concentration = metric(CONCENTRATION_RISK);
    if concentration > dec!(0.7) {
        parts.push("High portfolio concentration detected".to_string());
    } else if concentration < dec!(0.3) {
        parts.push("Portfolio well diversified".to_string());
    }

    if metric(SECTOR_RISK) > dec!(0.7) {
        parts.push("High sector concentration risk".to_string());
    }

    let volatility = metric(VOLATILITY);
    if volatility > dec!(0.7) {
        parts.push(format!("High volatility asset ({})", volatility.round_dp(2)));
    } else if volatility < dec!(0.3) {
        parts.push("Low volatility asset".to_string());
    }

    let cash = metric(CASH_RATIO);
    if cash < dec!(0.1) {
        parts.push("Very low cash reserves".to_string());
    } else if cash > dec!(0.5) {
        parts.push("Ample cash reserves".to_string());
    }

    parts.join(". ")
}

/// Emits the risk agent's signal from current portfolio metrics.
///
/// Its sell signals feed the engine's veto; it never votes.
pub struct PortfolioRiskAgent {
    agent_id: String,
    source: Arc<dyn RiskMetricsSource>,
}

impl PortfolioRiskAgent {
    pub fn new(agent_id: impl Into<String>, source: Arc<dyn RiskMetricsSource>) -> Self {
        Self {
            agent_id: agent_id.into(),
            source,
        }
    }
}

#[async_trait]
impl SignalAgent for PortfolioRiskAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn evaluate(&self, context: &AnalysisContext) -> Result<Signal, AgentError> {
        let metrics = self.source.current_risk_metrics().await?;
        if metrics.is_empty() {
            return Err(AgentError::Unavailable(
                "risk agent received no portfolio metrics".to_string(),
            ));
        }

        let risk = portfolio_risk(&metrics);
        let position = metrics.get(POSITION_RISK).copied().unwrap_or(Decimal::ZERO);
        let cash = metrics.get(CASH_RATIO).copied().unwrap_or(Decimal::ZERO);
        let (action, confidence) = risk_adjusted_action(risk, position, cash);
        let size = position_size_fraction(risk, position, cash);

        info!(
            agent = %self.agent_id,
            symbol = %context.symbol,
            portfolio_risk = %risk,
            level = %RiskLevel::classify(risk),
            action = %action,
            position_size = %size,
            "Risk assessed"
        );

        let signal = Signal::new(&self.agent_id, action, confidence)
            .map_err(EngineError::from)?
            .with_rationale(describe(&metrics, risk))
            .with_metrics(metrics)
            .with_metric(PORTFOLIO_RISK, risk)
            .with_metric(POSITION_SIZE_FRACTION, size)
            .with_timestamp(Utc::now());
        Ok(signal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticRiskMetrics;

    fn metrics(entries: &[(&str, Decimal)]) -> RiskMetrics {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn composite_matches_component_weights() {
        let m = metrics(&[
            (CONCENTRATION_RISK, dec!(0.4)),
            (SECTOR_RISK, dec!(0.5)),
            (POSITION_RISK, dec!(0.3)),
            (VOLATILITY, dec!(0.6)),
            (CORRELATION_RISK, dec!(0.2)),
            (CASH_RATIO, dec!(0.5)),
        ]);
        // 0.1 + 0.1 + 0.06 + 0.12 + 0.03 = 0.41, times (1 - 0.15)
        assert_eq!(portfolio_risk(&m), dec!(0.3485));
    }

    #[test]
    fn composite_is_capped() {
        let m = metrics(&[
            (CONCENTRATION_RISK, dec!(4)),
            (SECTOR_RISK, dec!(4)),
        ]);
        assert_eq!(portfolio_risk(&m), Decimal::ONE);
    }

    #[test]
    fn action_thresholds() {
        assert_eq!(
            risk_adjusted_action(dec!(0.85), dec!(0.5), dec!(0.5)),
            (Action::Sell, dec!(0.85))
        );
        assert_eq!(
            risk_adjusted_action(dec!(0.7), dec!(0.5), dec!(0.1)),
            (Action::Sell, dec!(0.6))
        );
        assert_eq!(
            risk_adjusted_action(dec!(0.7), dec!(0.5), dec!(0.4)),
            (Action::Hold, dec!(0.4))
        );
        assert_eq!(
            risk_adjusted_action(dec!(0.2), dec!(0.3), dec!(0.4)),
            (Action::Buy, dec!(0.5))
        );
        assert_eq!(
            risk_adjusted_action(dec!(0.2), dec!(0.5), dec!(0.4)),
            (Action::Hold, dec!(0.3))
        );
        assert_eq!(
            risk_adjusted_action(dec!(0.8), dec!(0.1), dec!(0.9)),
            (Action::Hold, dec!(0.4))
        );
    }

    #[test]
    fn strongest_sell_clears_default_veto_threshold() {
        let threshold = quorum_models::RiskConfig::default().veto_threshold;
        for risk in [dec!(0.81), dec!(0.9), Decimal::ONE] {
            let (action, confidence) = risk_adjusted_action(risk, dec!(0.5), dec!(0.5));
            assert_eq!(action, Action::Sell);
            assert!(confidence > threshold, "risk {risk}");
        }
    }

    #[test]
    fn position_size_multipliers() {
        let cases = [
            // (portfolio, position, cash, expected)
            (dec!(0.5), dec!(0.5), dec!(0.3), dec!(0.05)),
            (dec!(0.7), dec!(0.5), dec!(0.3), dec!(0.025)),
            (dec!(0.2), dec!(0.5), dec!(0.3), dec!(0.06)),
            (dec!(0.5), dec!(0.7), dec!(0.3), dec!(0.035)),
            (dec!(0.5), dec!(0.5), dec!(0.05), dec!(0.015)),
            (dec!(0.5), dec!(0.5), dec!(0.6), dec!(0.055)),
            (dec!(0.2), dec!(0.1), dec!(0.6), dec!(0.066)),
            (dec!(0.6), dec!(0.6), dec!(0.1), dec!(0.05)),
        ];
        for (portfolio, position, cash, expected) in cases {
            assert_eq!(
                position_size_fraction(portfolio, position, cash),
                expected,
                "portfolio {portfolio} position {position} cash {cash}"
            );
        }
    }

    #[tokio::test]
    async fn low_risk_portfolio_leans_buy() {
        let source = StaticRiskMetrics::new(metrics(&[
            (CONCENTRATION_RISK, dec!(0.2)),
            (VOLATILITY, dec!(0.2)),
            (POSITION_RISK, dec!(0.1)),
            (CASH_RATIO, dec!(0.6)),
        ]));
        let agent = PortfolioRiskAgent::new("risk", Arc::new(source));
        let signal = agent
            .evaluate(&AnalysisContext::new("AAPL", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(signal.agent_id(), "risk");
        assert_eq!(signal.action(), Action::Buy);
        assert!(signal.rationale().starts_with("Overall portfolio risk: Low"));
        assert!(signal.rationale().contains("Portfolio well diversified"));
        assert!(signal.metrics().contains_key(PORTFOLIO_RISK));
        assert_eq!(signal.metrics().get(CASH_RATIO), Some(&dec!(0.6)));
    }

    #[tokio::test]
    async fn extreme_risk_emits_confident_sell() {
        let source = StaticRiskMetrics::new(metrics(&[
            (CONCENTRATION_RISK, Decimal::ONE),
            (SECTOR_RISK, Decimal::ONE),
            (POSITION_RISK, Decimal::ONE),
            (VOLATILITY, Decimal::ONE),
            (CORRELATION_RISK, Decimal::ONE),
        ]));
        let agent = PortfolioRiskAgent::new("risk", Arc::new(source));
        let signal = agent
            .evaluate(&AnalysisContext::new("TSLA", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(signal.action(), Action::Sell);
        assert_eq!(signal.confidence(), Decimal::ONE);
        assert!(signal.rationale().contains("Very High"));
        // 0.05 * 0.5 (portfolio) * 0.7 (position) * 0.3 (no cash)
        assert_eq!(signal.metrics().get(POSITION_SIZE_FRACTION), Some(&dec!(0.00525)));
        assert!(signal.rationale().contains("High volatility asset"));
    }

    #[tokio::test]
    async fn no_metrics_is_unavailable() {
        let agent = PortfolioRiskAgent::new("risk", Arc::new(StaticRiskMetrics::new(RiskMetrics::new())));
        let result = agent
            .evaluate(&AnalysisContext::new("AAPL", serde_json::json!({})))
            .await;
        assert!(matches!(result, Err(AgentError::Unavailable(_))));
    }
}
