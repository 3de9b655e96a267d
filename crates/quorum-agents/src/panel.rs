use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use quorum_engine::{reconcile_opinions, CyclePhase, EngineError};
use quorum_models::{AnalysisContext, ModelOpinion, Signal};
use rust_decimal::Decimal;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::agent::SignalAgent;
use crate::backend::{ModelBackend, OpinionValidator};
use crate::error::AgentError;
use crate::prompts::{system_prompt_for, user_prompt, ModelPrompt};

/// One (backend, model) pair queried by a panel.
#[derive(Clone)]
pub struct PanelMember {
    pub backend: Arc<dyn ModelBackend>,
    pub model_id: String,
}

impl PanelMember {
    pub fn new(backend: Arc<dyn ModelBackend>, model_id: impl Into<String>) -> Self {
        Self {
            backend,
            model_id: model_id.into(),
        }
    }

    fn label(&self) -> String {
        format!("{}:{}", self.backend.source_id(), self.model_id)
    }
}

/// A signal agent that asks several models the same question and emits the
/// reconciled majority.
pub struct ModelPanelAgent {
    agent_id: String,
    domain: String,
    system_prompt: String,
    members: Vec<PanelMember>,
    validator: Option<Arc<dyn OpinionValidator>>,
}

impl ModelPanelAgent {
    pub fn new(
        agent_id: impl Into<String>,
        domain: impl Into<String>,
        members: Vec<PanelMember>,
    ) -> Result<Self, AgentError> {
        let agent_id = agent_id.into();
        let domain = domain.into();
        let system_prompt = system_prompt_for(&domain).ok_or_else(|| {
            AgentError::Unavailable(format!("No system prompt for domain: {domain}"))
        })?;
        if members.is_empty() {
            return Err(AgentError::Unavailable(format!(
                "Panel {agent_id} has no models configured"
            )));
        }
        Ok(Self {
            agent_id,
            domain,
            system_prompt,
            members,
            validator: None,
        })
    }

    pub fn with_validator(mut self, validator: Arc<dyn OpinionValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Query every member concurrently. Transport failures and panics become
    /// unparseable opinions so the audit trail keeps one entry per member,
    /// in member order.
    async fn collect_opinions(&self, prompt: &ModelPrompt) -> Vec<ModelOpinion> {
        let mut tasks = JoinSet::new();
        for (index, member) in self.members.iter().enumerate() {
            let member = member.clone();
            let prompt = prompt.clone();
            tasks.spawn(async move {
                let started = Instant::now();
                let result = member.backend.query(&prompt, &member.model_id).await;
                (index, result, started.elapsed())
            });
        }

        let mut slots: Vec<Option<ModelOpinion>> = vec![None; self.members.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(opinion), elapsed)) => {
                    debug!(
                        agent = %self.agent_id,
                        source = %opinion.source_id,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Model answered"
                    );
                    slots[index] = Some(opinion);
                }
                Ok((index, Err(e), elapsed)) => {
                    let label = self.members[index].label();
                    warn!(
                        agent = %self.agent_id,
                        source = %label,
                        error = %e,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Model query failed"
                    );
                    slots[index] = Some(ModelOpinion::unparseable(label, format!("query failed: {e}")));
                }
                Err(e) => warn!(agent = %self.agent_id, error = %e, "Model query task panicked"),
            }
        }

        slots
            .into_iter()
            .zip(&self.members)
            .map(|(slot, member)| {
                slot.unwrap_or_else(|| ModelOpinion::unparseable(member.label(), "query task panicked"))
            })
            .collect()
    }
}

#[async_trait]
impl SignalAgent for ModelPanelAgent {
    fn agent_id(&self) -> &str {
        &self.agent_id
    }

    async fn evaluate(&self, context: &AnalysisContext) -> Result<Signal, AgentError> {
        let prompt = ModelPrompt {
            system: self.system_prompt.clone(),
            user: user_prompt(context)?,
        };

        let opinions = self.collect_opinions(&prompt).await;

        debug!(
            phase = %CyclePhase::ReconcilingOpinions,
            agent = %self.agent_id,
            opinions = opinions.len(),
            "Cycle phase"
        );
        let reconciliation = reconcile_opinions(&opinions);

        let mut signal = reconciliation
            .to_signal(&self.agent_id, Utc::now())
            .map_err(EngineError::from)?
            .with_metric("models_queried", Decimal::from(opinions.len() as u64));

        if let Some(validator) = &self.validator {
            if reconciliation.parsed_count > 0 {
                match validator.validate(&prompt, &opinions).await {
                    Ok(text) => {
                        let rationale = format!("{}\n\nValidator review:\n{text}", signal.rationale());
                        signal = signal.with_rationale(rationale);
                    }
                    Err(e) => warn!(agent = %self.agent_id, error = %e, "Validator failed; continuing without review"),
                }
            }
        }

        info!(
            agent = %self.agent_id,
            action = %signal.action(),
            confidence = %signal.confidence(),
            agreement = %reconciliation.judgment.agreement_ratio,
            unparseable = reconciliation.unparseable_count,
            "Panel reconciled"
        );

        Ok(signal)
    }
}
