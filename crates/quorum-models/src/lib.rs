pub mod cache_schema;
pub mod config;
pub mod context;
pub mod decision;
pub mod error;
pub mod opinion;
pub mod risk;
pub mod signal;
pub mod weights;

pub use cache_schema::{CacheCategory, CacheRow};
pub use config::{
    AgentsConfig, CacheConfig, ConsensusConfig, EngineConfig, PanelConfig, QuorumConfig,
    RiskConfig,
};
pub use context::AnalysisContext;
pub use decision::{ActionScores, AgreementLevel, Decision};
pub use error::ValidationError;
pub use opinion::{AgreementJudgment, ModelOpinion, ParseStatus};
pub use risk::{RiskLevel, RiskMetrics};
pub use signal::{Action, Signal};
pub use weights::WeightTable;
