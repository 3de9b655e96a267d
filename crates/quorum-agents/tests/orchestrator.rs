//! End-to-end cycle tests: mock and scenario agents through the orchestrator
//! into the consensus engine, with an in-memory cache behind the sources.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Duration as ChronoDuration, Utc};
use quorum_agents::panel::PanelMember;
use quorum_agents::test_support::{FailingSource, MockAgent, ScenarioBackend};
use quorum_agents::{
    CachedRiskMetrics, CachedWeights, ModelBackend, ModelPanelAgent, Orchestrator,
    PortfolioRiskAgent, SignalAgent, StaticRiskMetrics, StaticWeights,
};
use quorum_cache::{CacheReader, SqliteReader};
use quorum_engine::ConsensusEngine;
use quorum_models::cache_schema::key_patterns;
use quorum_models::{
    Action, AgentsConfig, AgreementLevel, AnalysisContext, CacheCategory, CacheRow, EngineConfig,
    RiskMetrics, WeightTable,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio_util::sync::CancellationToken;

fn row(key: String, category: CacheCategory, symbol: Option<&str>, value_json: &str) -> CacheRow {
    let now = Utc::now();
    CacheRow {
        key,
        category: category.as_str().to_string(),
        value_json: value_json.to_string(),
        source: "test".to_string(),
        symbol: symbol.map(str::to_string),
        created_at: now.to_rfc3339(),
        expires_at: (now + ChronoDuration::hours(1)).to_rfc3339(),
        updated_at: now.to_rfc3339(),
    }
}

fn setup_cache(rows: Vec<CacheRow>) -> Arc<CacheReader> {
    let sqlite = SqliteReader::open_in_memory().unwrap();
    for r in &rows {
        sqlite.insert(r).unwrap();
    }
    Arc::new(CacheReader::new(sqlite, 100, Duration::from_secs(60)))
}

fn engine() -> ConsensusEngine {
    ConsensusEngine::new(EngineConfig::default()).unwrap()
}

fn orchestrator(agents: Vec<Arc<dyn SignalAgent>>) -> Orchestrator {
    Orchestrator::new(
        agents,
        engine(),
        Arc::new(StaticWeights::new(WeightTable::default())),
        &AgentsConfig::default(),
    )
    .with_risk_metrics(Arc::new(StaticRiskMetrics::new(RiskMetrics::new())))
}

fn context() -> AnalysisContext {
    AnalysisContext::new("AAPL", serde_json::json!({}))
}

#[tokio::test]
async fn two_agents_reach_the_reference_decision() {
    let orch = orchestrator(vec![
        Arc::new(MockAgent::responding("technical", Action::Buy, dec!(0.8))),
        Arc::new(MockAgent::responding("sentiment", Action::Hold, dec!(0.6))),
    ]);

    let decision = orch.run_cycle(context(), CancellationToken::new()).await.unwrap();
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.confidence, dec!(0.4));
    assert_eq!(decision.agreement_level, AgreementLevel::Medium);
    assert!(!decision.risk_adjusted);
    assert!(decision.inputs_complete);
}

#[tokio::test]
async fn completion_order_does_not_change_the_decision() {
    let fast_first = orchestrator(vec![
        Arc::new(MockAgent::responding("technical", Action::Buy, dec!(0.7))),
        Arc::new(
            MockAgent::responding("sentiment", Action::Sell, dec!(0.4))
                .after(Duration::from_millis(50)),
        ),
    ]);
    let slow_first = orchestrator(vec![
        Arc::new(
            MockAgent::responding("technical", Action::Buy, dec!(0.7))
                .after(Duration::from_millis(50)),
        ),
        Arc::new(MockAgent::responding("sentiment", Action::Sell, dec!(0.4))),
    ]);

    let a = fast_first.run_cycle(context(), CancellationToken::new()).await.unwrap();
    let b = slow_first.run_cycle(context(), CancellationToken::new()).await.unwrap();
    assert_eq!(a.action, b.action);
    assert_eq!(a.confidence, b.confidence);
    assert_eq!(a.scores, b.scores);
}

#[tokio::test]
async fn failed_and_panicked_agents_are_missing() {
    let orch = orchestrator(vec![
        Arc::new(MockAgent::responding("technical", Action::Sell, dec!(0.7))),
        Arc::new(MockAgent::failing("sentiment")),
        Arc::new(MockAgent::panicking("macro")),
    ]);

    let decision = orch.run_cycle(context(), CancellationToken::new()).await.unwrap();
    assert_eq!(decision.action, Action::Sell);
    assert!(!decision.inputs_complete);
    assert_eq!(
        decision.missing_agents,
        vec!["macro".to_string(), "sentiment".to_string()]
    );
}

#[tokio::test]
async fn slow_agent_times_out() {
    let orch = orchestrator(vec![
        Arc::new(MockAgent::responding("technical", Action::Buy, dec!(0.6))),
        Arc::new(
            MockAgent::responding("sentiment", Action::Sell, dec!(0.9))
                .after(Duration::from_secs(30)),
        ),
    ])
    .with_timeouts(Duration::from_millis(100), Duration::from_secs(5));

    let started = Instant::now();
    let decision = orch.run_cycle(context(), CancellationToken::new()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.missing_agents, vec!["sentiment".to_string()]);
}

#[tokio::test]
async fn cycle_deadline_yields_partial_consensus() {
    let orch = orchestrator(vec![
        Arc::new(MockAgent::responding("technical", Action::Sell, dec!(0.6))),
        Arc::new(
            MockAgent::responding("sentiment", Action::Buy, dec!(0.9))
                .after(Duration::from_secs(30)),
        ),
    ])
    .with_timeouts(Duration::from_secs(60), Duration::from_millis(200));

    let decision = orch.run_cycle(context(), CancellationToken::new()).await.unwrap();
    assert_eq!(decision.action, Action::Sell);
    assert!(!decision.inputs_complete);
    assert_eq!(decision.missing_agents, vec!["sentiment".to_string()]);
}

#[tokio::test]
async fn cancellation_yields_partial_consensus() {
    let orch = orchestrator(vec![
        Arc::new(MockAgent::responding("technical", Action::Hold, dec!(0.5))),
        Arc::new(
            MockAgent::responding("sentiment", Action::Buy, dec!(0.9))
                .after(Duration::from_secs(30)),
        ),
    ]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let decision = orch.run_cycle(context(), cancel).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(decision.action, Action::Hold);
    assert_eq!(decision.missing_agents, vec!["sentiment".to_string()]);
}

#[tokio::test]
async fn cancelled_before_any_signal_is_an_error() {
    let orch = orchestrator(vec![Arc::new(
        MockAgent::responding("technical", Action::Buy, dec!(0.9)).after(Duration::from_secs(30)),
    )]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(orch.run_cycle(context(), cancel).await.is_err());
}

#[tokio::test]
async fn failing_sources_degrade_conservatively() {
    let orch = Orchestrator::new(
        vec![
            Arc::new(MockAgent::responding("technical", Action::Buy, dec!(0.8))) as Arc<dyn SignalAgent>,
            Arc::new(MockAgent::responding("sentiment", Action::Buy, dec!(0.6))),
        ],
        engine(),
        Arc::new(FailingSource),
        &AgentsConfig::default(),
    )
    .with_risk_metrics(Arc::new(FailingSource));

    let decision = orch.run_cycle(context(), CancellationToken::new()).await.unwrap();
    assert_eq!(decision.action, Action::Buy);
    assert!(decision.risk_adjusted);
    assert_eq!(decision.confidence, dec!(0.35));
    assert!(decision.risk_notes.iter().any(|n| n.contains("unavailable")));
}

#[tokio::test]
async fn risk_agent_vetoes_under_default_config() {
    let cache = setup_cache(
        [
            ("concentration_risk", "0.95"),
            ("sector_risk", "0.9"),
            ("position_risk", "0.9"),
            ("volatility", "0.95"),
            ("correlation_risk", "0.9"),
            ("cash_ratio", "0.05"),
        ]
        .into_iter()
        .map(|(name, value)| {
            row(
                key_patterns::risk_metric(name),
                CacheCategory::RiskMetric,
                None,
                &format!(r#"{{"value": "{value}"}}"#),
            )
        })
        .collect(),
    );
    let risk_source = Arc::new(CachedRiskMetrics::new(Arc::clone(&cache)));

    let orch = Orchestrator::new(
        vec![
            Arc::new(MockAgent::responding("technical", Action::Buy, dec!(0.8))) as Arc<dyn SignalAgent>,
            Arc::new(MockAgent::responding("sentiment", Action::Buy, dec!(0.7))),
            Arc::new(PortfolioRiskAgent::new("risk", risk_source.clone())),
        ],
        engine(),
        Arc::new(CachedWeights::new(Arc::clone(&cache), WeightTable::default())),
        &AgentsConfig::default(),
    )
    .with_risk_metrics(risk_source)
    .with_cache(cache);

    let decision = orch.evaluate("AAPL").await.unwrap();
    assert_eq!(decision.provisional_action, Action::Buy);
    assert_ne!(decision.action, Action::Buy);
    assert!(decision.vetoed);
    assert!(decision.risk_adjusted);
    assert!(decision.confidence <= decision.provisional_confidence);
    assert_eq!(decision.contributing_signals.len(), 3);
    // The risk agent does not vote.
    assert_eq!(decision.scores.sell, Decimal::ZERO);

    let risk = decision
        .contributing_signals
        .iter()
        .find(|s| s.agent_id() == "risk")
        .unwrap();
    assert_eq!(risk.action(), Action::Sell);
    assert!(risk.confidence() > dec!(0.8));
    assert!(risk.metrics().contains_key("position_size_fraction"));
}

#[tokio::test]
async fn scenario_panels_read_cached_market_data() {
    let cache = setup_cache(vec![
        row(
            key_patterns::indicator("rsi_14", "AAPL"),
            CacheCategory::Indicator,
            Some("AAPL"),
            r#"{"value": [41.0, 33.5, 24.0]}"#,
        ),
        row(
            key_patterns::quote("AAPL"),
            CacheCategory::MarketData,
            Some("AAPL"),
            r#"{"price": 171.3}"#,
        ),
        row(
            key_patterns::agent_weight("technical"),
            CacheCategory::AgentWeight,
            None,
            r#"{"value": 0.7}"#,
        ),
        row(
            key_patterns::agent_weight("sentiment"),
            CacheCategory::AgentWeight,
            None,
            r#"{"value": 0.3}"#,
        ),
    ]);

    let backend = Arc::new(ScenarioBackend) as Arc<dyn ModelBackend>;
    let technical = ModelPanelAgent::new(
        "technical",
        "technical",
        vec![
            PanelMember::new(Arc::clone(&backend), "json"),
            PanelMember::new(Arc::clone(&backend), "fenced"),
            PanelMember::new(Arc::clone(&backend), "prose"),
        ],
    )
    .unwrap();

    let orch = Orchestrator::new(
        vec![
            Arc::new(technical) as Arc<dyn SignalAgent>,
            Arc::new(MockAgent::responding("sentiment", Action::Hold, dec!(0.5))),
        ],
        engine(),
        Arc::new(CachedWeights::new(Arc::clone(&cache), WeightTable::default())),
        &AgentsConfig::default(),
    )
    .with_risk_metrics(Arc::new(StaticRiskMetrics::new(RiskMetrics::new())))
    .with_cache(cache);

    let decision = orch.evaluate("AAPL").await.unwrap();
    // Panel: three buys, mean stated confidence 0.65, full agreement.
    // Weighted: 0.7 * 0.65 = 0.455 against 0.3 * 0.5 for hold.
    assert_eq!(decision.action, Action::Buy);
    assert_eq!(decision.scores.buy, dec!(0.455));
    assert_eq!(decision.scores.hold, dec!(0.15));
    assert!(decision.inputs_complete);

    let technical = decision
        .contributing_signals
        .iter()
        .find(|s| s.agent_id() == "technical")
        .unwrap();
    assert_eq!(technical.metrics().get("agreement_ratio"), Some(&Decimal::ONE));
    assert!(technical.rationale().contains("scenario:prose: buy"));
}
