//! # Strategy Orchestrator
//!
//! Feedback-controlled capital allocation and admission control for
//! multiple trading strategies sharing one capital pool.
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `error`: Typed construction and lookup errors
//! - `market`: Market analysis input and regime classification
//! - `strategy`: Strategy plugin contract, configs and registry
//! - `orchestrator`: Tracker, allocator, scheduler, stats and lifecycle
//! - `persistence`: SQLite snapshots of orchestrator stats
//! - `utils`: Shared utilities and decimal arithmetic

pub mod config;
pub mod error;
pub mod market;
pub mod orchestrator;
pub mod persistence;
pub mod strategy;
pub mod utils;

pub use config::Config;
pub use error::OrchestratorError;
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorStats, OrchestratorStatus};
