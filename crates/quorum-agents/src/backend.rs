use async_trait::async_trait;
use quorum_models::ModelOpinion;

use crate::error::AgentError;
use crate::prompts::ModelPrompt;

/// A language model provider a panel can query.
///
/// A response that arrives but cannot be interpreted should come back as an
/// unparseable `ModelOpinion`, not an error; errors are for transport
/// failures (spawn, timeout, non-zero exit).
#[async_trait]
pub trait ModelBackend: Send + Sync {
    fn source_id(&self) -> &str;

    async fn query(&self, prompt: &ModelPrompt, model_id: &str)
        -> Result<ModelOpinion, AgentError>;
}

/// Produces free-text commentary on a panel's opinions. The text is
/// appended to the agent's rationale and never parsed.
#[async_trait]
pub trait OpinionValidator: Send + Sync {
    async fn validate(
        &self,
        prompt: &ModelPrompt,
        opinions: &[ModelOpinion],
    ) -> Result<String, AgentError>;
}
