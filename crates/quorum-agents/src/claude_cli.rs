use std::time::Duration;

use async_trait::async_trait;
use quorum_models::ModelOpinion;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::backend::{ModelBackend, OpinionValidator};
use crate::error::AgentError;
use crate::parser::parse_opinion;
use crate::prompts::{validation_prompt, validator_system_prompt, ModelPrompt};

/// Configuration for a Claude CLI invocation.
#[derive(Debug, Clone)]
pub struct ClaudeCliConfig {
    pub model: String,
    pub timeout: Duration,
}

impl Default for ClaudeCliConfig {
    fn default() -> Self {
        Self {
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(45),
        }
    }
}

/// Invoke the `claude` CLI with a system prompt and user prompt.
/// Returns the raw stdout text. The child is killed if the future is dropped.
pub async fn invoke_claude(
    system_prompt: &str,
    user_prompt: &str,
    config: &ClaudeCliConfig,
) -> Result<String, AgentError> {
    debug!(model = %config.model, "Invoking claude CLI");

    let result = tokio::time::timeout(config.timeout, async {
        Command::new("claude")
            .args([
                "-p",
                user_prompt,
                "--system-prompt",
                system_prompt,
                "--model",
                &config.model,
                "--output-format",
                "text",
            ])
            .kill_on_drop(true)
            .output()
            .await
    })
    .await
    .map_err(|_| AgentError::Timeout(config.timeout.as_secs()))?
    .map_err(|e| AgentError::Cli(format!("Failed to spawn claude: {e}")))?;

    if !result.status.success() {
        let stderr = String::from_utf8_lossy(&result.stderr);
        warn!(status = %result.status, stderr = %stderr, "Claude CLI failed");
        return Err(AgentError::Cli(format!(
            "claude exited {}: {}",
            result.status, stderr
        )));
    }

    let stdout = String::from_utf8_lossy(&result.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(AgentError::Cli("Claude returned empty response".to_string()));
    }

    Ok(stdout)
}

/// Check if the `claude` CLI is available on the system.
pub async fn check_cli_available() -> bool {
    match Command::new("claude").arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// Panel backend that shells out to the Claude CLI, one process per query.
pub struct ClaudeCliBackend {
    timeout: Duration,
}

impl ClaudeCliBackend {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl ModelBackend for ClaudeCliBackend {
    fn source_id(&self) -> &str {
        "claude"
    }

    async fn query(
        &self,
        prompt: &ModelPrompt,
        model_id: &str,
    ) -> Result<ModelOpinion, AgentError> {
        let config = ClaudeCliConfig {
            model: model_id.to_string(),
            timeout: self.timeout,
        };
        let raw = invoke_claude(&prompt.system, &prompt.user, &config).await?;
        Ok(parse_opinion(&format!("{}:{model_id}", self.source_id()), &raw))
    }
}

/// Validator that asks one Claude model to review a panel's answers.
pub struct ClaudeCliValidator {
    config: ClaudeCliConfig,
}

impl ClaudeCliValidator {
    pub fn new(config: ClaudeCliConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl OpinionValidator for ClaudeCliValidator {
    async fn validate(
        &self,
        prompt: &ModelPrompt,
        opinions: &[ModelOpinion],
    ) -> Result<String, AgentError> {
        let user_prompt = validation_prompt(prompt, opinions);
        let text = invoke_claude(&validator_system_prompt(), &user_prompt, &self.config).await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ClaudeCliConfig::default();
        assert_eq!(config.model, "claude-3-5-haiku-latest");
        assert_eq!(config.timeout, Duration::from_secs(45));
    }

    #[test]
    fn backend_source_id() {
        let backend = ClaudeCliBackend::new(Duration::from_secs(5));
        assert_eq!(backend.source_id(), "claude");
    }
}
