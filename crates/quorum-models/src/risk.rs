use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Portfolio risk metrics, keyed by metric name (e.g. "volatility").
///
/// Opaque to the engine beyond numeric comparison against configured limits.
pub type RiskMetrics = BTreeMap<String, Decimal>;

/// Well-known metric names written by the portfolio collaborator.
pub mod metric_names {
    pub const CASH_RATIO: &str = "cash_ratio";
    pub const CONCENTRATION_RISK: &str = "concentration_risk";
    pub const SECTOR_RISK: &str = "sector_risk";
    pub const POSITION_RISK: &str = "position_risk";
    pub const VOLATILITY: &str = "volatility";
    pub const CORRELATION_RISK: &str = "correlation_risk";
    pub const PORTFOLIO_RISK: &str = "portfolio_risk";
    /// Risk-adjusted share of portfolio value for a new position. Emitted
    /// by the risk agent; informational only.
    pub const POSITION_SIZE_FRACTION: &str = "position_size_fraction";
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl RiskLevel {
    pub fn classify(portfolio_risk: Decimal) -> Self {
        if portfolio_risk < dec!(0.3) {
            RiskLevel::Low
        } else if portfolio_risk < dec!(0.6) {
            RiskLevel::Medium
        } else if portfolio_risk < dec!(0.8) {
            RiskLevel::High
        } else {
            RiskLevel::VeryHigh
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::VeryHigh => "Very High",
        };
        f.write_str(label)
    }
}
