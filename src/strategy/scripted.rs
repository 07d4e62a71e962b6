//! Scripted strategy for exercising the orchestrator in tests.
//!
//! Every behaviour is a switch that can be flipped while the strategy is
//! registered, and every call is counted.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::stats::StrategyStats;
use super::traits::{
    CapabilityKind, ExecutionCapability, ExecutionReport, Opportunity, OpportunityScanner,
    RunningState, Strategy, TradeExecutor,
};

/// Switchable test strategy.
#[derive(Default)]
pub struct ScriptedStrategy {
    name: String,
    running: AtomicBool,
    // Switches
    pub fail_dispatch: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_stats: AtomicBool,
    /// Scan or execute yields nothing
    pub come_up_empty: AtomicBool,
    /// Active trades reported through stats
    pub active_trades: AtomicU32,
    /// Trade record reported through stats
    pub reported_stats: RwLock<Option<StrategyStats>>,
    /// Delay applied to start()
    pub start_delay: RwLock<Option<Duration>>,
    /// Delay applied to stats()
    pub stats_delay: RwLock<Option<Duration>>,
    /// Delay applied to dispatch calls
    pub dispatch_delay: RwLock<Option<Duration>>,
    /// Delay applied to stop()
    pub stop_delay: RwLock<Option<Duration>>,
    // Counters
    pub dispatch_count: AtomicU64,
    pub start_count: AtomicU64,
    pub stop_count: AtomicU64,
}

impl ScriptedStrategy {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            ..Default::default()
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capability(self: &Arc<Self>, kind: CapabilityKind) -> ExecutionCapability {
        match kind {
            CapabilityKind::Scanner => ExecutionCapability::Scanner(self.clone()),
            CapabilityKind::Executor => ExecutionCapability::Executor(self.clone()),
            CapabilityKind::SelfStarting => ExecutionCapability::SelfStarting(self.clone()),
        }
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatch_count.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> u64 {
        self.start_count.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> u64 {
        self.stop_count.load(Ordering::SeqCst)
    }

    /// Count a dispatch, honour the delay and failure switches, and report
    /// whether it produced anything.
    async fn dispatch(&self) -> Result<bool> {
        self.dispatch_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.dispatch_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_dispatch.load(Ordering::SeqCst) {
            bail!("{} dispatch failed", self.name);
        }

        Ok(!self.come_up_empty.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl Strategy for ScriptedStrategy {
    async fn start(&self) -> Result<()> {
        self.start_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.start_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.stop_count.fetch_add(1, Ordering::SeqCst);

        let delay = *self.stop_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.running.store(false, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            bail!("{} stop failed", self.name);
        }
        Ok(())
    }

    async fn stats(&self) -> Result<StrategyStats> {
        let delay = *self.stats_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_stats.load(Ordering::SeqCst) {
            bail!("{} stats unavailable", self.name);
        }

        let mut stats = self.reported_stats.read().await.clone().unwrap_or_default();
        stats.active_trades = Some(self.active_trades.load(Ordering::SeqCst));
        Ok(stats)
    }
}

#[async_trait]
impl OpportunityScanner for ScriptedStrategy {
    async fn scan(&self) -> Result<Vec<Opportunity>> {
        if !self.dispatch().await? {
            return Ok(Vec::new());
        }

        Ok(vec![Opportunity {
            id: format!("{}-{}", self.name, self.dispatches()),
            expected_profit: rust_decimal::Decimal::ONE,
        }])
    }
}

#[async_trait]
impl TradeExecutor for ScriptedStrategy {
    async fn execute(&self) -> Result<Option<ExecutionReport>> {
        if !self.dispatch().await? {
            return Ok(None);
        }

        Ok(Some(ExecutionReport {
            description: format!("{} executed", self.name),
            profit: None,
        }))
    }
}

impl RunningState for ScriptedStrategy {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
