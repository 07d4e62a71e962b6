//! Strategy plugin contract.
//!
//! Every strategy implements [`Strategy`] for its lifecycle and stats, and
//! declares exactly one [`ExecutionCapability`] at registration. The
//! capability is resolved once and never re-checked.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::stats::StrategyStats;

/// Lifecycle and stats surface shared by all strategies.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// Start the strategy. Starting an already running strategy must not fail.
    async fn start(&self) -> anyhow::Result<()>;

    /// Stop the strategy. Stopping an already stopped strategy must not fail.
    async fn stop(&self) -> anyhow::Result<()>;

    /// Best-effort statistics snapshot.
    async fn stats(&self) -> anyhow::Result<StrategyStats>;
}

/// A trading opportunity surfaced by a scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub expected_profit: Decimal,
}

/// Result value returned by an executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub description: String,
    pub profit: Option<Decimal>,
}

/// Strategies dispatched by scanning; a non-empty scan counts as success.
#[async_trait]
pub trait OpportunityScanner: Send + Sync {
    async fn scan(&self) -> anyhow::Result<Vec<Opportunity>>;
}

/// Strategies dispatched by executing; any `Some` result counts as success.
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn execute(&self) -> anyhow::Result<Option<ExecutionReport>>;
}

/// Strategies dispatched by starting them; a not-running to running
/// transition counts as success.
pub trait RunningState: Send + Sync {
    fn is_running(&self) -> bool;
}

/// The single execution capability a strategy declares at registration.
#[derive(Clone)]
pub enum ExecutionCapability {
    Scanner(Arc<dyn OpportunityScanner>),
    Executor(Arc<dyn TradeExecutor>),
    SelfStarting(Arc<dyn RunningState>),
}

impl ExecutionCapability {
    pub fn kind(&self) -> CapabilityKind {
        match self {
            ExecutionCapability::Scanner(_) => CapabilityKind::Scanner,
            ExecutionCapability::Executor(_) => CapabilityKind::Executor,
            ExecutionCapability::SelfStarting(_) => CapabilityKind::SelfStarting,
        }
    }
}

impl fmt::Debug for ExecutionCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExecutionCapability::{}", self.kind())
    }
}

/// Tag of an [`ExecutionCapability`], usable in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Scanner,
    Executor,
    SelfStarting,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapabilityKind::Scanner => write!(f, "Scanner"),
            CapabilityKind::Executor => write!(f, "Executor"),
            CapabilityKind::SelfStarting => write!(f, "SelfStarting"),
        }
    }
}
