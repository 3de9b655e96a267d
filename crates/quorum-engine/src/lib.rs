//! Consensus & signal-reconciliation core.
//!
//! Everything in this crate is synchronous and side-effect free: agents,
//! model backends and data sources live in `quorum-agents`; this crate only
//! turns already-materialized signals into a [`Decision`].
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use quorum_engine::ConsensusEngine;
//! use quorum_models::{Action, EngineConfig, RiskMetrics, Signal, WeightTable};
//! use rust_decimal_macros::dec;
//!
//! let engine = ConsensusEngine::new(EngineConfig::default()).unwrap();
//! let signals = BTreeMap::from([
//!     ("technical".to_string(), Signal::new("technical", Action::Buy, dec!(0.8)).unwrap()),
//!     ("sentiment".to_string(), Signal::new("sentiment", Action::Hold, dec!(0.6)).unwrap()),
//! ]);
//! let decision = engine
//!     .reconcile(signals, Some(&RiskMetrics::new()), &WeightTable::default())
//!     .unwrap();
//! assert_eq!(decision.action, Action::Buy);
//! ```
//!
//! [`Decision`]: quorum_models::Decision

pub mod consensus;
pub mod engine;
pub mod error;
pub mod reconciler;
pub mod risk;

pub use consensus::ProvisionalDecision;
pub use engine::{ConsensusEngine, CyclePhase};
pub use error::EngineError;
pub use reconciler::{reconcile_opinions, OpinionReconciliation};
pub use risk::RiskReview;
