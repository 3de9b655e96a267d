use async_trait::async_trait;
use quorum_models::{AnalysisContext, Signal};

use crate::error::AgentError;

/// An independent analyst that turns the cycle context into one signal.
///
/// Implementations must be cheap to share across tasks; the orchestrator
/// calls `evaluate` from a spawned task and may drop the future at any
/// await point when the cycle is cancelled or times out.
#[async_trait]
pub trait SignalAgent: Send + Sync {
    /// Stable id; the emitted signal must carry the same `agent_id`.
    fn agent_id(&self) -> &str;

    async fn evaluate(&self, context: &AnalysisContext) -> Result<Signal, AgentError>;
}
