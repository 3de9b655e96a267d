pub mod agent;
pub mod backend;
pub mod claude_cli;
pub mod error;
pub mod orchestrator;
pub mod panel;
pub mod parser;
pub mod prompts;
pub mod risk_agent;
pub mod sources;

pub mod test_support;

pub use agent::SignalAgent;
pub use backend::{ModelBackend, OpinionValidator};
pub use claude_cli::{ClaudeCliBackend, ClaudeCliValidator};
pub use error::AgentError;
pub use orchestrator::Orchestrator;
pub use panel::ModelPanelAgent;
pub use risk_agent::PortfolioRiskAgent;
pub use sources::{
    CachedRiskMetrics, CachedWeights, RiskMetricsSource, StaticRiskMetrics, StaticWeights,
    WeightSource,
};
