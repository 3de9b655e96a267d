use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::signal::Action;
use crate::weights::WeightTable;

/// Top-level configuration for QUORUM.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuorumConfig {
    pub engine: EngineConfig,
    /// Static weight table used when no dynamic weight source is configured.
    pub weights: WeightTable,
    pub cache: CacheConfig,
    pub agents: AgentsConfig,
}

/// Policy knobs for the consensus engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub consensus: ConsensusConfig,
    pub risk: RiskConfig,
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.consensus.validate()?;
        self.risk.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Agreement ratio at or above which agreement is "high".
    pub high_agreement: Decimal,
    /// Agreement ratio at or above which agreement is "medium".
    pub medium_agreement: Decimal,
    /// Confidence multiplier applied when agreement is "low". Must be below 1.
    pub low_agreement_dampening: Decimal,
    /// Signals older than this at decision time are dropped. None = no staleness check.
    pub max_signal_age_seconds: Option<u64>,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            high_agreement: dec!(0.75),
            medium_agreement: dec!(0.4),
            low_agreement_dampening: dec!(0.7),
            max_signal_age_seconds: None,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        check_unit_interval("consensus.high_agreement", self.high_agreement)?;
        check_unit_interval("consensus.medium_agreement", self.medium_agreement)?;
        if self.medium_agreement > self.high_agreement {
            return Err(ValidationError::Config(format!(
                "consensus.medium_agreement ({}) exceeds consensus.high_agreement ({})",
                self.medium_agreement, self.high_agreement
            )));
        }
        if self.low_agreement_dampening < Decimal::ZERO
            || self.low_agreement_dampening >= Decimal::ONE
        {
            return Err(ValidationError::Config(format!(
                "consensus.low_agreement_dampening must be in [0, 1), got {}",
                self.low_agreement_dampening
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RiskConfig {
    /// Agent whose signal feeds the veto instead of the vote.
    pub risk_agent_id: String,
    /// A risk sell signal with confidence strictly above this vetoes buys.
    pub veto_threshold: Decimal,
    /// What a vetoed buy becomes. Must be hold or sell.
    pub veto_action: Action,
    /// Confidence multiplier applied when the veto changes the action.
    pub veto_penalty: Decimal,
    /// Confidence multiplier applied when any limit is breached or risk data is missing.
    pub breach_penalty: Decimal,
    /// Upper limits per risk metric; a metric strictly above its limit is a breach.
    pub limits: BTreeMap<String, Decimal>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_agent_id: "risk".to_string(),
            veto_threshold: dec!(0.8),
            veto_action: Action::Hold,
            veto_penalty: dec!(0.5),
            breach_penalty: dec!(0.5),
            limits: BTreeMap::from([
                ("concentration_risk".to_string(), dec!(0.7)),
                ("volatility".to_string(), dec!(0.7)),
                ("portfolio_risk".to_string(), dec!(0.8)),
            ]),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.risk_agent_id.trim().is_empty() {
            return Err(ValidationError::Config(
                "risk.risk_agent_id must not be empty".to_string(),
            ));
        }
        check_unit_interval("risk.veto_threshold", self.veto_threshold)?;
        check_unit_interval("risk.veto_penalty", self.veto_penalty)?;
        check_unit_interval("risk.breach_penalty", self.breach_penalty)?;
        if self.veto_action == Action::Buy {
            return Err(ValidationError::Config(
                "risk.veto_action must be hold or sell".to_string(),
            ));
        }
        Ok(())
    }
}

fn check_unit_interval(name: &str, value: Decimal) -> Result<(), ValidationError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ValidationError::Config(format!(
            "{name} must be in [0, 1], got {value}"
        )));
    }
    Ok(())
}

/// Configuration for the cache reader layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Path to the shared SQLite cache file (written by data pipelines, read by QUORUM).
    pub sqlite_path: String,
    /// Maximum number of entries in the in-memory moka cache.
    pub memory_max_capacity: u64,
    /// Default TTL in seconds for moka entries (how long to keep a read in memory).
    pub memory_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "data/quorum_cache.db".to_string(),
            memory_max_capacity: 10_000,
            memory_ttl_seconds: 60,
        }
    }
}

/// Configuration for the agent orchestration layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentsConfig {
    /// Deadline for a whole cycle in seconds; late agents are dropped.
    pub cycle_timeout_seconds: u64,
    /// Per-agent timeout in seconds.
    pub agent_timeout_seconds: u64,
    /// Model used by panels that do not list their own.
    pub default_model: String,
    /// When set, a validator model summarizes each panel's opinions.
    pub validator_model: Option<String>,
    /// Run the portfolio risk agent alongside the panels.
    pub risk_agent_enabled: bool,
    pub panels: Vec<PanelConfig>,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            cycle_timeout_seconds: 120,
            agent_timeout_seconds: 45,
            default_model: "claude-3-5-haiku-latest".to_string(),
            validator_model: None,
            risk_agent_enabled: true,
            panels: vec![
                PanelConfig {
                    agent_id: "technical".to_string(),
                    domain: "technical".to_string(),
                    models: vec![],
                    enabled: true,
                },
                PanelConfig {
                    agent_id: "sentiment".to_string(),
                    domain: "sentiment".to_string(),
                    models: vec![],
                    enabled: true,
                },
            ],
        }
    }
}

/// A multi-model agent: one prompt, several models, reconciled into one signal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PanelConfig {
    pub agent_id: String,
    pub domain: String,
    /// Models to query. Empty = `AgentsConfig::default_model` only.
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_quorum_config() {
        let config = QuorumConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: QuorumConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }

    #[test]
    fn default_engine_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn dampening_of_one_is_rejected() {
        let config = ConsensusConfig {
            low_agreement_dampening: Decimal::ONE,
            ..ConsensusConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::Config(_))));
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let config = ConsensusConfig {
            high_agreement: dec!(0.3),
            medium_agreement: dec!(0.6),
            ..ConsensusConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn veto_action_buy_is_rejected() {
        let config = RiskConfig {
            veto_action: Action::Buy,
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn penalty_above_one_is_rejected() {
        let config = RiskConfig {
            breach_penalty: dec!(1.2),
            ..RiskConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_from_toml() {
        let toml_str = r#"
[engine.consensus]
high_agreement = "0.8"
medium_agreement = "0.5"
low_agreement_dampening = "0.6"
max_signal_age_seconds = 900

[engine.risk]
risk_agent_id = "risk"
veto_threshold = "0.75"
veto_action = "sell"

[engine.risk.limits]
volatility = "0.65"

[weights]
fallback_weight = "0.25"

[weights.agents]
technical = "0.6"
sentiment = "0.4"

[cache]
sqlite_path = "/tmp/test_cache.db"
memory_max_capacity = 5000
memory_ttl_seconds = 30

[agents]
cycle_timeout_seconds = 60
agent_timeout_seconds = 20
default_model = "claude-3-5-haiku-latest"

[[agents.panels]]
agent_id = "technical"
domain = "technical"
models = ["claude-3-5-haiku-latest", "claude-sonnet-4-5-20250929"]

[[agents.panels]]
agent_id = "sentiment"
domain = "sentiment"
enabled = false
"#;

        let config: QuorumConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.consensus.high_agreement, dec!(0.8));
        assert_eq!(config.engine.consensus.max_signal_age_seconds, Some(900));
        assert_eq!(config.engine.risk.veto_action, Action::Sell);
        assert_eq!(config.engine.risk.limits.len(), 1);
        // Unset fields keep their defaults.
        assert_eq!(config.engine.risk.breach_penalty, dec!(0.5));
        assert_eq!(config.weights.weight_for("technical"), dec!(0.6));
        assert_eq!(config.weights.weight_for("macro"), dec!(0.25));
        assert_eq!(config.cache.sqlite_path, "/tmp/test_cache.db");
        assert_eq!(config.agents.panels.len(), 2);
        assert_eq!(config.agents.panels[0].models.len(), 2);
        assert!(!config.agents.panels[1].enabled);
        assert!(config.agents.risk_agent_enabled);
        assert!(config.engine.validate().is_ok());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let config: QuorumConfig = toml::from_str("").unwrap();
        assert_eq!(config, QuorumConfig::default());
    }
}
