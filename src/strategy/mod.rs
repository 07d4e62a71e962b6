//! Strategy plugin contract and registry.
//!
//! Contains:
//! - The lifecycle/stats trait and the three execution capabilities
//! - Per-strategy configuration and the market applicability rule
//! - Lenient decoding of strategy-reported statistics
//! - The registry holding handles and mutable configs
//! - A deterministic paper strategy for simulation
//! - A switchable scripted strategy for tests

mod config;
pub mod paper;
mod registry;
pub mod scripted;
mod stats;
mod traits;

pub use config::{
    clamp_allocation_percent, clamp_priority, RiskTolerance, StrategyCategory, StrategyConfig,
    MAX_PRIORITY, MIN_PRIORITY,
};
pub use paper::PaperStrategy;
pub use registry::{StrategyHandle, StrategyRegistry};
pub use scripted::ScriptedStrategy;
pub use stats::StrategyStats;
pub use traits::{
    CapabilityKind, ExecutionCapability, ExecutionReport, Opportunity, OpportunityScanner,
    RunningState, Strategy, TradeExecutor,
};
