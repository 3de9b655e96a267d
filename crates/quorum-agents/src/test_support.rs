//! Mock collaborators for exercising panels and the orchestrator without
//! the Claude CLI.
//!
//! `MockAgent`, `MockBackend` and `MockValidator` return canned answers.
//! `ScenarioBackend` reads the market data in the prompt and answers the
//! way the technical prompt instructs, in a different output style per
//! model id, so scenario tests also cover the opinion parser.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use quorum_models::{Action, AnalysisContext, ModelOpinion, RiskMetrics, Signal, WeightTable};
use rust_decimal::Decimal;

use crate::agent::SignalAgent;
use crate::backend::{ModelBackend, OpinionValidator};
use crate::error::AgentError;
use crate::parser::parse_opinion;
use crate::prompts::ModelPrompt;
use crate::sources::{RiskMetricsSource, WeightSource};

#[derive(Debug, Clone)]
enum Behaviour {
    Respond(Action, Decimal),
    Fail,
    Panic,
    Mislabel(String),
}

/// Signal agent with a fixed answer and an optional delay.
pub struct MockAgent {
    agent_id: String,
    behaviour: Behaviour,
    delay: Option<Duration>,
}

impl MockAgent {
    pub fn responding(agent_id: &str, action: Action, confidence: Decimal) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            behaviour: Behaviour::Respond(action, confidence),
            delay: None,
        }
    }

    pub fn failing(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            behaviour: Behaviour::Fail,
            delay: None,
        }
    }

    pub fn panicking(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            behaviour: Behaviour::Panic,
            delay: None,
        }
    }

    /// Reports under `emitted_as` instead of its own id.
    pub fn mislabelled(agent_id: &str, emitted_as: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            behaviour: Behaviour::Mislabel(emitted_as.to_string()),
            delay: None,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SignalAgent for MockAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn evaluate(&self, _context: &AnalysisContext) -> Result<Signal, AgentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behaviour {
            Behaviour::Respond(action, confidence) => {
                Ok(Signal::new(&self.agent_id, *action, *confidence)
                    .map_err(quorum_engine::EngineError::from)?
                    .with_rationale(format!("Mock {} analysis", self.agent_id)))
            }
            Behaviour::Fail => Err(AgentError::Unavailable("mock failure".to_string())),
            Behaviour::Panic => panic!("mock agent {} panicked", self.agent_id),
            Behaviour::Mislabel(other) => Ok(Signal::new(other, Action::Buy, Decimal::ONE)
                .map_err(quorum_engine::EngineError::from)?),
        }
    }
}

/// Model backend with one canned raw answer per model id. Unknown model
/// ids and models registered with [`MockBackend::fail`] return a CLI error.
pub struct MockBackend {
    source_id: String,
    answers: HashMap<String, Option<String>>,
}

impl MockBackend {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            answers: HashMap::new(),
        }
    }

    pub fn respond(mut self, model_id: &str, raw: &str) -> Self {
        self.answers
            .insert(model_id.to_string(), Some(raw.to_string()));
        self
    }

    pub fn fail(mut self, model_id: &str) -> Self {
        self.answers.insert(model_id.to_string(), None);
        self
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn query(
        &self,
        _prompt: &ModelPrompt,
        model_id: &str,
    ) -> Result<ModelOpinion, AgentError> {
        match self.answers.get(model_id) {
            Some(Some(raw)) => Ok(parse_opinion(
                &format!("{}:{model_id}", self.source_id),
                raw,
            )),
            _ => Err(AgentError::Cli(format!("mock model {model_id} unavailable"))),
        }
    }
}

/// Validator returning fixed text, or failing.
pub struct MockValidator {
    text: Option<String>,
}

impl MockValidator {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }

    pub fn failing() -> Self {
        Self { text: None }
    }
}

#[async_trait]
impl OpinionValidator for MockValidator {
    async fn validate(
        &self,
        _prompt: &ModelPrompt,
        _opinions: &[ModelOpinion],
    ) -> Result<String, AgentError> {
        self.text
            .clone()
            .ok_or_else(|| AgentError::Cli("mock validator failure".to_string()))
    }
}

/// Weight and risk source that always fails.
pub struct FailingSource;

#[async_trait]
impl WeightSource for FailingSource {
    async fn weights_for(&self, _context: &AnalysisContext) -> Result<WeightTable, AgentError> {
        Err(AgentError::Unavailable("mock weight source down".to_string()))
    }
}

#[async_trait]
impl RiskMetricsSource for FailingSource {
    async fn current_risk_metrics(&self) -> Result<RiskMetrics, AgentError> {
        Err(AgentError::Unavailable("mock portfolio service down".to_string()))
    }
}

/// Backend that reads RSI from the prompt's market data and answers per
/// the technical prompt's rules.
///
/// Output style depends on the model id: `"json"` answers with a bare JSON
/// object, `"fenced"` wraps it in a markdown block, anything else answers in
/// prose with a single action keyword and no confidence.
pub struct ScenarioBackend;

impl ScenarioBackend {
    fn rsi(prompt: &ModelPrompt) -> Option<f64> {
        let body: serde_json::Value = serde_json::from_str(&prompt.user).ok()?;
        let symbol = body.get("symbol")?.as_str()?;
        let value = body
            .get("market_data")?
            .get(format!("indicator:rsi_14:{symbol}"))?
            .get("value")?;
        match value {
            serde_json::Value::Array(values) => values.last()?.as_f64(),
            other => other.as_f64(),
        }
    }

    fn call(rsi: Option<f64>) -> (Action, f64, String) {
        match rsi {
            Some(r) if r < 20.0 => (Action::Buy, 0.8, format!("RSI {r:.0}, extremely oversold")),
            Some(r) if r < 30.0 => (Action::Buy, 0.65, format!("RSI {r:.0}, oversold")),
            Some(r) if r > 80.0 => (Action::Sell, 0.8, format!("RSI {r:.0}, extremely overbought")),
            Some(r) if r > 70.0 => (Action::Sell, 0.65, format!("RSI {r:.0}, overbought")),
            Some(r) => (Action::Hold, 0.4, format!("RSI {r:.0}, neutral zone")),
            None => (Action::Hold, 0.2, "No indicator data available".to_string()),
        }
    }
}

#[async_trait]
impl ModelBackend for ScenarioBackend {
    fn source_id(&self) -> &str {
        "scenario"
    }

    async fn query(
        &self,
        prompt: &ModelPrompt,
        model_id: &str,
    ) -> Result<ModelOpinion, AgentError> {
        let (action, confidence, rationale) = Self::call(Self::rsi(prompt));
        let json = serde_json::json!({
            "action": action,
            "confidence": format!("{confidence}"),
            "rationale": rationale,
        });
        let raw = match model_id {
            "json" => json.to_string(),
            "fenced" => format!("Here is my assessment:\n```json\n{json:#}\n```"),
            _ => format!("{rationale}. My recommendation is to {action}."),
        };
        Ok(parse_opinion(&format!("scenario:{model_id}"), &raw))
    }
}
