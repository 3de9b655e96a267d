use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Invalid weight {weight} for agent {agent_id}")]
    InvalidWeight { agent_id: String, weight: Decimal },

    #[error("Invalid configuration: {0}")]
    Config(String),
}
