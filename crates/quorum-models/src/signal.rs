use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;

/// Trading action. Closed set; anything else is rejected at parse time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Buy, Action::Sell, Action::Hold];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Buy => "buy",
            Action::Sell => "sell",
            Action::Hold => "hold",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Action::Buy),
            "sell" => Ok(Action::Sell),
            "hold" => Ok(Action::Hold),
            other => Err(ValidationError::InvalidSignal(format!(
                "unknown action '{other}' (expected buy, sell or hold)"
            ))),
        }
    }
}

/// Clamp a confidence into [0, 1], logging when the input was out of range.
pub fn clamp_confidence(source: &str, confidence: Decimal) -> Decimal {
    let clamped = confidence.clamp(Decimal::ZERO, Decimal::ONE);
    if clamped != confidence {
        warn!(source = %source, confidence = %confidence, clamped = %clamped, "Confidence out of range, clamped");
    }
    clamped
}

/// A single agent's opinion for one analysis cycle.
///
/// Fields are private: a `Signal` is validated once at construction and not
/// mutated afterwards. Deserialization goes through the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SignalRecord")]
pub struct Signal {
    agent_id: String,
    action: Action,
    confidence: Decimal,
    rationale: String,
    metrics: BTreeMap<String, Decimal>,
    timestamp: DateTime<Utc>,
}

impl Signal {
    /// Create a signal stamped with the current time.
    ///
    /// Fails on an empty `agent_id`; an out-of-range confidence is clamped.
    pub fn new(
        agent_id: impl Into<String>,
        action: Action,
        confidence: Decimal,
    ) -> Result<Self, ValidationError> {
        let agent_id = agent_id.into();
        if agent_id.trim().is_empty() {
            return Err(ValidationError::InvalidSignal(
                "agent_id must not be empty".to_string(),
            ));
        }
        let confidence = clamp_confidence(&agent_id, confidence);
        Ok(Self {
            agent_id,
            action,
            confidence,
            rationale: String::new(),
            metrics: BTreeMap::new(),
            timestamp: Utc::now(),
        })
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = rationale.into();
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: Decimal) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_metrics(mut self, metrics: BTreeMap<String, Decimal>) -> Self {
        self.metrics.extend(metrics);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn confidence(&self) -> Decimal {
        self.confidence
    }

    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    pub fn metrics(&self) -> &BTreeMap<String, Decimal> {
        &self.metrics
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// How old the signal is at `as_of`. Negative if it is stamped in the future.
    pub fn age(&self, as_of: DateTime<Utc>) -> Duration {
        as_of - self.timestamp
    }

    /// Re-check the construction invariants.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.agent_id.trim().is_empty() {
            return Err(ValidationError::InvalidSignal(
                "agent_id must not be empty".to_string(),
            ));
        }
        if self.confidence < Decimal::ZERO || self.confidence > Decimal::ONE {
            return Err(ValidationError::InvalidSignal(format!(
                "confidence {} for agent {} outside [0, 1]",
                self.confidence, self.agent_id
            )));
        }
        Ok(())
    }
}

/// Wire shape of a signal before validation.
#[derive(Debug, Deserialize)]
struct SignalRecord {
    agent_id: String,
    action: String,
    confidence: Decimal,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    metrics: BTreeMap<String, Decimal>,
    #[serde(default = "Utc::now")]
    timestamp: DateTime<Utc>,
}

impl TryFrom<SignalRecord> for Signal {
    type Error = ValidationError;

    fn try_from(record: SignalRecord) -> Result<Self, Self::Error> {
        let action: Action = record.action.parse()?;
        Ok(Signal::new(record.agent_id, action, record.confidence)?
            .with_rationale(record.rationale)
            .with_metrics(record.metrics)
            .with_timestamp(record.timestamp))
    }
}
