use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use quorum_cache::CacheReader;
use quorum_engine::{ConsensusEngine, CyclePhase};
use quorum_models::{AgentsConfig, AnalysisContext, Decision, RiskMetrics, Signal, WeightTable};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::agent::SignalAgent;
use crate::error::AgentError;
use crate::sources::{RiskMetricsSource, WeightSource};

/// Runs one analysis cycle: fans out to every agent, gathers what arrives
/// before the deadline, and hands the signals to the consensus engine.
pub struct Orchestrator {
    agents: Vec<Arc<dyn SignalAgent>>,
    engine: ConsensusEngine,
    weights: Arc<dyn WeightSource>,
    risk_metrics: Option<Arc<dyn RiskMetricsSource>>,
    cache: Option<Arc<CacheReader>>,
    agent_timeout: Duration,
    cycle_timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        agents: Vec<Arc<dyn SignalAgent>>,
        engine: ConsensusEngine,
        weights: Arc<dyn WeightSource>,
        config: &AgentsConfig,
    ) -> Self {
        Self {
            agents,
            engine,
            weights,
            risk_metrics: None,
            cache: None,
            agent_timeout: Duration::from_secs(config.agent_timeout_seconds),
            cycle_timeout: Duration::from_secs(config.cycle_timeout_seconds),
        }
    }

    /// Portfolio collaborator consulted by the risk overlay. Without one,
    /// every cycle is decided with risk data unavailable.
    pub fn with_risk_metrics(mut self, source: Arc<dyn RiskMetricsSource>) -> Self {
        self.risk_metrics = Some(source);
        self
    }

    /// Shared cache used to build the market-data snapshot in [`Orchestrator::evaluate`].
    pub fn with_cache(mut self, cache: Arc<CacheReader>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_timeouts(mut self, agent_timeout: Duration, cycle_timeout: Duration) -> Self {
        self.agent_timeout = agent_timeout;
        self.cycle_timeout = cycle_timeout;
        self
    }

    pub fn agent_ids(&self) -> Vec<String> {
        self.agents
            .iter()
            .map(|a| a.agent_id().to_string())
            .collect()
    }

    /// Build a context for `symbol` from the cache snapshot and run a cycle
    /// that is never cancelled externally.
    pub async fn evaluate(&self, symbol: &str) -> Result<Decision, AgentError> {
        let market_data = match &self.cache {
            Some(cache) => cache.build_context_snapshot(symbol).unwrap_or_else(|e| {
                warn!(symbol, error = %e, "Cache snapshot failed; agents get no market data");
                serde_json::json!({})
            }),
            None => serde_json::json!({}),
        };
        let context = AnalysisContext::new(symbol, market_data);
        self.run_cycle(context, CancellationToken::new()).await
    }

    /// Run one cycle.
    ///
    /// Each agent gets `agent_timeout`; the whole collection phase gets
    /// `cycle_timeout`. When the deadline passes or `cancel` fires, agents
    /// still running are aborted and consensus runs on the signals already
    /// received; the aborted agents appear in `missing_agents`.
    pub async fn run_cycle(
        &self,
        context: AnalysisContext,
        cancel: CancellationToken,
    ) -> Result<Decision, AgentError> {
        let start = Instant::now();
        let expected = self.agent_ids();
        info!(
            cycle = %context.cycle_id,
            symbol = %context.symbol,
            agents = expected.len(),
            "Starting cycle"
        );

        let context = Arc::new(context);
        debug!(phase = %CyclePhase::CollectingSignals, cycle = %context.cycle_id, "Cycle phase");
        let signals = self.collect_signals(&context, &cancel).await;

        let weights = match self.weights.weights_for(&context).await {
            Ok(table) => table,
            Err(e) => {
                warn!(error = %e, "Weight source failed; using default weights");
                WeightTable::default()
            }
        };
        let risk_metrics = self.fetch_risk_metrics().await;

        let decision = self.engine.reconcile_at(
            signals,
            risk_metrics.as_ref(),
            &weights,
            &expected,
            Utc::now(),
        )?;

        info!(
            cycle = %context.cycle_id,
            symbol = %context.symbol,
            action = %decision.action,
            confidence = %decision.confidence,
            complete = decision.inputs_complete,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Cycle complete"
        );
        Ok(decision)
    }

    async fn collect_signals(
        &self,
        context: &Arc<AnalysisContext>,
        cancel: &CancellationToken,
    ) -> BTreeMap<String, Signal> {
        let agent_timeout = self.agent_timeout;
        let mut tasks = JoinSet::new();
        for agent in &self.agents {
            let agent = Arc::clone(agent);
            let context = Arc::clone(context);
            tasks.spawn(async move {
                let started = Instant::now();
                let result = match tokio::time::timeout(agent_timeout, agent.evaluate(&context)).await
                {
                    Ok(result) => result,
                    Err(_) => Err(AgentError::Timeout(agent_timeout.as_secs())),
                };
                (agent.agent_id().to_string(), result, started.elapsed())
            });
        }

        let deadline = tokio::time::sleep(self.cycle_timeout);
        tokio::pin!(deadline);

        let mut signals = BTreeMap::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(pending = tasks.len(), "Cycle cancelled; reconciling signals received so far");
                    break;
                }
                _ = &mut deadline => {
                    warn!(
                        pending = tasks.len(),
                        timeout_s = self.cycle_timeout.as_secs(),
                        "Cycle deadline reached; reconciling signals received so far"
                    );
                    break;
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((agent_id, Ok(signal), elapsed))) => {
                        if signal.agent_id() != agent_id {
                            warn!(
                                agent = %agent_id,
                                emitted_as = %signal.agent_id(),
                                "Agent emitted a signal under another id; discarding"
                            );
                            continue;
                        }
                        info!(
                            agent = %agent_id,
                            action = %signal.action(),
                            confidence = %signal.confidence(),
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Agent reported"
                        );
                        signals.insert(agent_id, signal);
                    }
                    Some(Ok((agent_id, Err(e), elapsed))) => {
                        warn!(
                            agent = %agent_id,
                            error = %e,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Agent unavailable"
                        );
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Agent task panicked");
                    }
                }
            }
        }

        tasks.abort_all();
        signals
    }

    async fn fetch_risk_metrics(&self) -> Option<RiskMetrics> {
        let source = self.risk_metrics.as_ref()?;
        match source.current_risk_metrics().await {
            Ok(metrics) => Some(metrics),
            Err(e) => {
                warn!(error = %e, "Risk data unavailable; overlay will assume maximum risk");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticWeights;
    use crate::test_support::MockAgent;
    use quorum_models::{Action, EngineConfig};
    use rust_decimal_macros::dec;

    fn orchestrator(agents: Vec<Arc<dyn SignalAgent>>) -> Orchestrator {
        Orchestrator::new(
            agents,
            ConsensusEngine::new(EngineConfig::default()).unwrap(),
            Arc::new(StaticWeights::new(WeightTable::default())),
            &AgentsConfig::default(),
        )
    }

    #[test]
    fn timeouts_come_from_config() {
        let orch = orchestrator(vec![]);
        assert_eq!(orch.agent_timeout, Duration::from_secs(45));
        assert_eq!(orch.cycle_timeout, Duration::from_secs(120));
    }

    #[test]
    fn agent_ids_in_registration_order() {
        let orch = orchestrator(vec![
            Arc::new(MockAgent::responding("technical", Action::Buy, dec!(0.5))),
            Arc::new(MockAgent::responding("sentiment", Action::Hold, dec!(0.5))),
        ]);
        assert_eq!(orch.agent_ids(), vec!["technical", "sentiment"]);
    }

    #[tokio::test]
    async fn no_agents_is_no_signals() {
        let result = orchestrator(vec![]).evaluate("AAPL").await;
        assert!(matches!(
            result,
            Err(AgentError::Engine(quorum_engine::EngineError::NoSignals))
        ));
    }

    #[tokio::test]
    async fn mislabelled_signal_is_discarded() {
        let orch = orchestrator(vec![
            Arc::new(MockAgent::mislabelled("technical", "sentiment")),
            Arc::new(MockAgent::responding("sentiment", Action::Sell, dec!(0.6))),
        ]);
        let decision = orch.evaluate("AAPL").await.unwrap();
        assert_eq!(decision.missing_agents, vec!["technical".to_string()]);
        assert_eq!(decision.action, Action::Sell);
    }
}
