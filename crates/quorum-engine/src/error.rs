use quorum_models::ValidationError;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("No signals supplied: at least one agent signal is required")]
    NoSignals,

    #[error("Invalid weight {weight} for agent {agent_id}")]
    InvalidWeight { agent_id: String, weight: Decimal },

    #[error("Invalid engine configuration: {0}")]
    Config(String),
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::InvalidSignal(msg) => EngineError::InvalidSignal(msg),
            ValidationError::InvalidWeight { agent_id, weight } => {
                EngineError::InvalidWeight { agent_id, weight }
            }
            ValidationError::Config(msg) => EngineError::Config(msg),
        }
    }
}
