use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use quorum_models::{Decision, EngineConfig, RiskMetrics, Signal, WeightTable};
use tracing::{debug, info, warn};

use crate::consensus;
use crate::error::EngineError;
use crate::risk;

/// Phases of a single analysis cycle, in order. Used for tracing only; no
/// state survives between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CyclePhase {
    CollectingSignals,
    /// Logged where opinions become a signal, before the engine sees it;
    /// `reconcile_at` never logs it.
    ReconcilingOpinions,
    Scoring,
    AgreementEval,
    RiskReview,
    Decision,
}

impl fmt::Display for CyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CyclePhase::CollectingSignals => "COLLECTING_SIGNALS",
            CyclePhase::ReconcilingOpinions => "RECONCILING_OPINIONS",
            CyclePhase::Scoring => "SCORING",
            CyclePhase::AgreementEval => "AGREEMENT_EVAL",
            CyclePhase::RiskReview => "RISK_REVIEW",
            CyclePhase::Decision => "DECISION",
        };
        f.write_str(name)
    }
}

/// Stateless reconciliation engine. Holds only its validated policy.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    config: EngineConfig,
}

impl ConsensusEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Reconcile one cycle's signals into a decision, as of now.
    ///
    /// `risk_metrics = None` means the portfolio collaborator could not
    /// supply them; the risk overlay then assumes maximum risk.
    pub fn reconcile(
        &self,
        signals: BTreeMap<String, Signal>,
        risk_metrics: Option<&RiskMetrics>,
        weights: &WeightTable,
    ) -> Result<Decision, EngineError> {
        self.reconcile_at(signals, risk_metrics, weights, &[], Utc::now())
    }

    /// Reconcile with an explicit clock and the list of agents that were
    /// expected to report. Agents in `expected_agents` without a signal are
    /// reported as missing and mark the decision incomplete.
    pub fn reconcile_at(
        &self,
        signals: BTreeMap<String, Signal>,
        risk_metrics: Option<&RiskMetrics>,
        weights: &WeightTable,
        expected_agents: &[String],
        as_of: DateTime<Utc>,
    ) -> Result<Decision, EngineError> {
        debug!(phase = %CyclePhase::CollectingSignals, signals = signals.len(), "Cycle phase");

        for (key, signal) in &signals {
            signal.validate()?;
            if key != signal.agent_id() {
                return Err(EngineError::InvalidSignal(format!(
                    "signal keyed as '{key}' was emitted by '{}'",
                    signal.agent_id()
                )));
            }
        }

        let missing_agents: Vec<String> = expected_agents
            .iter()
            .filter(|agent| !signals.contains_key(agent.as_str()))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let (fresh, stale_agents) = self.split_stale(signals, as_of);

        let risk_agent_id = self.config.risk.risk_agent_id.as_str();
        let risk_signal = fresh.get(risk_agent_id);
        let voters: Vec<&Signal> = fresh
            .iter()
            .filter(|(agent, _)| agent.as_str() != risk_agent_id)
            .map(|(_, signal)| signal)
            .collect();

        debug!(phase = %CyclePhase::Scoring, voters = voters.len(), "Cycle phase");
        let provisional = consensus::calculate(&voters, weights, &self.config.consensus)?;
        debug!(
            phase = %CyclePhase::AgreementEval,
            ratio = %provisional.agreement_ratio,
            level = ?provisional.agreement_level,
            "Cycle phase"
        );

        debug!(phase = %CyclePhase::RiskReview, risk_signal = risk_signal.is_some(), "Cycle phase");
        let review = risk::apply(&provisional, risk_signal, risk_metrics, &self.config.risk);

        let inputs_complete = missing_agents.is_empty() && stale_agents.is_empty();
        if !inputs_complete {
            warn!(
                missing = ?missing_agents,
                stale = ?stale_agents,
                "Decision built from incomplete inputs"
            );
        }

        info!(
            phase = %CyclePhase::Decision,
            action = %review.action,
            confidence = %review.confidence,
            agreement = ?provisional.agreement_level,
            risk_adjusted = review.risk_adjusted,
            "Decision reached"
        );

        Ok(Decision {
            action: review.action,
            confidence: review.confidence,
            agreement_level: provisional.agreement_level,
            agreement_ratio: provisional.agreement_ratio,
            risk_adjusted: review.risk_adjusted,
            vetoed: review.vetoed,
            provisional_action: provisional.action,
            provisional_confidence: provisional.confidence,
            scores: provisional.scores,
            risk_notes: review.notes,
            contributing_signals: fresh.into_values().collect(),
            inputs_complete,
            missing_agents,
            stale_agents,
            decided_at: as_of,
        })
    }

    /// Drop signals older than the configured maximum age.
    fn split_stale(
        &self,
        signals: BTreeMap<String, Signal>,
        as_of: DateTime<Utc>,
    ) -> (BTreeMap<String, Signal>, Vec<String>) {
        let Some(max_age) = self.config.consensus.max_signal_age_seconds else {
            return (signals, Vec::new());
        };
        let max_age = Duration::seconds(i64::try_from(max_age).unwrap_or(i64::MAX));

        let (fresh, stale): (BTreeMap<_, _>, BTreeMap<_, _>) = signals
            .into_iter()
            .partition(|(_, signal)| signal.age(as_of) <= max_age);

        for (agent, signal) in &stale {
            warn!(agent = %agent, timestamp = %signal.timestamp(), "Dropping stale signal");
        }
        (fresh, stale.into_keys().collect())
    }
}
