//! QUORUM - consensus and signal-reconciliation engine
//!
//! Combines buy/sell/hold signals from independent analysis agents into one
//! weighted, agreement-aware, risk-checked decision.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use quorum::models::{Action, QuorumConfig, Signal};
//! use quorum::engine::ConsensusEngine;
//! use quorum::agents::{Orchestrator, SignalAgent};
//! use quorum::cache::{CacheReader, SqliteReader};
//! ```

pub use quorum_agents as agents;
pub use quorum_cache as cache;
pub use quorum_engine as engine;
pub use quorum_models as models;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use quorum_agents::claude_cli::ClaudeCliConfig;
use quorum_agents::panel::PanelMember;
use quorum_agents::{
    CachedRiskMetrics, CachedWeights, ClaudeCliBackend, ClaudeCliValidator, ModelBackend,
    ModelPanelAgent, OpinionValidator, Orchestrator, PortfolioRiskAgent, SignalAgent,
    StaticWeights, WeightSource,
};
use quorum_cache::CacheReader;
use quorum_engine::{reconcile_opinions, ConsensusEngine, CyclePhase, EngineError};
use quorum_models::{Decision, ModelOpinion, QuorumConfig, RiskMetrics, Signal, WeightTable};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Build an Orchestrator from configuration.
///
/// Panels query the Claude CLI. When the shared cache opens, weights and
/// risk metrics come from it and the portfolio risk agent runs; otherwise
/// the static weight table is used and every cycle is decided with risk
/// data unavailable.
pub fn build_orchestrator(config: &QuorumConfig) -> Result<Orchestrator, anyhow::Error> {
    let engine =
        ConsensusEngine::new(config.engine.clone()).context("Invalid engine configuration")?;

    let cache = match CacheReader::from_config(&config.cache) {
        Ok(reader) => Some(Arc::new(reader)),
        Err(e) => {
            warn!(
                path = %config.cache.sqlite_path,
                error = %e,
                "Cache unavailable; running without market data or risk metrics"
            );
            None
        }
    };

    let agent_timeout = Duration::from_secs(config.agents.agent_timeout_seconds);
    let backend: Arc<dyn ModelBackend> = Arc::new(ClaudeCliBackend::new(agent_timeout));
    let validator: Option<Arc<dyn OpinionValidator>> =
        config.agents.validator_model.as_ref().map(|model| {
            Arc::new(ClaudeCliValidator::new(ClaudeCliConfig {
                model: model.clone(),
                timeout: agent_timeout,
            })) as Arc<dyn OpinionValidator>
        });

    let mut agents: Vec<Arc<dyn SignalAgent>> = Vec::new();
    for panel in config.agents.panels.iter().filter(|p| p.enabled) {
        let models = if panel.models.is_empty() {
            vec![config.agents.default_model.clone()]
        } else {
            panel.models.clone()
        };
        let members = models
            .into_iter()
            .map(|model| PanelMember::new(Arc::clone(&backend), model))
            .collect();
        let mut agent = ModelPanelAgent::new(&panel.agent_id, &panel.domain, members)
            .with_context(|| format!("Failed to build panel {}", panel.agent_id))?;
        if let Some(validator) = &validator {
            agent = agent.with_validator(Arc::clone(validator));
        }
        agents.push(Arc::new(agent));
    }

    let weights: Arc<dyn WeightSource> = match &cache {
        Some(cache) => Arc::new(CachedWeights::new(Arc::clone(cache), config.weights.clone())),
        None => Arc::new(StaticWeights::new(config.weights.clone())),
    };

    let risk_agent_id = config.engine.risk.risk_agent_id.clone();
    let risk_source = cache
        .as_ref()
        .map(|cache| Arc::new(CachedRiskMetrics::new(Arc::clone(cache))));
    if config.agents.risk_agent_enabled {
        match &risk_source {
            Some(source) => agents.push(Arc::new(PortfolioRiskAgent::new(
                risk_agent_id,
                source.clone(),
            ))),
            None => warn!("Risk agent enabled but no cache to read portfolio metrics from"),
        }
    }

    info!(agents = agents.len(), cache = cache.is_some(), "Orchestrator built");

    let mut orchestrator = Orchestrator::new(agents, engine, weights, &config.agents);
    if let Some(source) = risk_source {
        orchestrator = orchestrator.with_risk_metrics(source);
    }
    if let Some(cache) = cache {
        orchestrator = orchestrator.with_cache(cache);
    }
    Ok(orchestrator)
}

/// One cycle's materialized inputs, as read by `quorum reconcile`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleInput {
    #[serde(default)]
    pub signals: Vec<Signal>,
    /// Absent means the portfolio collaborator could not supply metrics.
    #[serde(default)]
    pub risk_metrics: Option<RiskMetrics>,
    /// Absent means the configured weight table.
    #[serde(default)]
    pub weights: Option<WeightTable>,
    #[serde(default)]
    pub expected_agents: Vec<String>,
    /// Raw model opinions per agent, reconciled into that agent's signal.
    #[serde(default)]
    pub opinions: BTreeMap<String, Vec<ModelOpinion>>,
    pub as_of: Option<DateTime<Utc>>,
}

/// Decide one cycle from pre-collected inputs.
///
/// Each agent may appear once, either as a signal or as a set of opinions.
pub fn reconcile_cycle_input(
    input: CycleInput,
    config: &QuorumConfig,
) -> Result<Decision, EngineError> {
    let engine = ConsensusEngine::new(config.engine.clone())?;
    let as_of = input.as_of.unwrap_or_else(Utc::now);

    let mut signals = BTreeMap::new();
    for signal in input.signals {
        let agent_id = signal.agent_id().to_string();
        if signals.insert(agent_id.clone(), signal).is_some() {
            return Err(EngineError::InvalidSignal(format!(
                "duplicate signal for agent '{agent_id}'"
            )));
        }
    }

    for (agent_id, opinions) in &input.opinions {
        if signals.contains_key(agent_id) {
            return Err(EngineError::InvalidSignal(format!(
                "agent '{agent_id}' supplied both a signal and model opinions"
            )));
        }
        debug!(
            phase = %CyclePhase::ReconcilingOpinions,
            agent = %agent_id,
            opinions = opinions.len(),
            "Cycle phase"
        );
        let signal = reconcile_opinions(opinions).to_signal(agent_id, as_of)?;
        signals.insert(agent_id.clone(), signal);
    }

    let weights = input.weights.unwrap_or_else(|| config.weights.clone());
    engine.reconcile_at(
        signals,
        input.risk_metrics.as_ref(),
        &weights,
        &input.expected_agents,
        as_of,
    )
}
