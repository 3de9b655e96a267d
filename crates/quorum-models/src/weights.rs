use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Per-agent voting weights.
///
/// Weights are non-negative and need not sum to 1; the consensus calculator
/// normalizes over the agents present in a cycle. Agents without an entry get
/// `fallback_weight`, which is always strictly positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WeightTableRecord")]
pub struct WeightTable {
    agents: BTreeMap<String, Decimal>,
    fallback_weight: Decimal,
}

impl WeightTable {
    pub fn new(fallback_weight: Decimal) -> Result<Self, ValidationError> {
        if fallback_weight <= Decimal::ZERO {
            return Err(ValidationError::InvalidWeight {
                agent_id: "<fallback>".to_string(),
                weight: fallback_weight,
            });
        }
        Ok(Self {
            agents: BTreeMap::new(),
            fallback_weight,
        })
    }

    pub fn from_map(
        agents: BTreeMap<String, Decimal>,
        fallback_weight: Decimal,
    ) -> Result<Self, ValidationError> {
        agents
            .into_iter()
            .try_fold(Self::new(fallback_weight)?, |table, (agent_id, weight)| {
                table.with_weight(agent_id, weight)
            })
    }

    pub fn with_weight(
        mut self,
        agent_id: impl Into<String>,
        weight: Decimal,
    ) -> Result<Self, ValidationError> {
        let agent_id = agent_id.into();
        if weight < Decimal::ZERO {
            return Err(ValidationError::InvalidWeight { agent_id, weight });
        }
        self.agents.insert(agent_id, weight);
        Ok(self)
    }

    pub fn weight_for(&self, agent_id: &str) -> Decimal {
        self.agents
            .get(agent_id)
            .copied()
            .unwrap_or(self.fallback_weight)
    }

    pub fn fallback_weight(&self) -> Decimal {
        self.fallback_weight
    }

    pub fn agents(&self) -> &BTreeMap<String, Decimal> {
        &self.agents
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self {
            agents: BTreeMap::from([
                ("technical".to_string(), dec!(0.5)),
                ("sentiment".to_string(), dec!(0.5)),
            ]),
            fallback_weight: dec!(0.5),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WeightTableRecord {
    #[serde(default)]
    agents: BTreeMap<String, Decimal>,
    #[serde(default = "default_fallback_weight")]
    fallback_weight: Decimal,
}

fn default_fallback_weight() -> Decimal {
    dec!(0.5)
}

impl TryFrom<WeightTableRecord> for WeightTable {
    type Error = ValidationError;

    fn try_from(record: WeightTableRecord) -> Result<Self, Self::Error> {
        Self::from_map(record.agents, record.fallback_weight)
    }
}
