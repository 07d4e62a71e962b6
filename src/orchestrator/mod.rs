//! The orchestrator: lifecycle, periodic loops and the admin surface.
//!
//! Contains:
//! - Performance tracking and scoring
//! - Capital allocation under per-strategy and global caps
//! - Admission-controlled execution scheduling
//! - Stats aggregation
//! - Cancellable periodic loops

mod allocator;
mod periodic;
mod scheduler;
mod stats;
mod tracker;

pub use allocator::{allocate, combined_score, raw_allocation, AllocationCandidate, CapitalAllocator};
pub use periodic::PeriodicTask;
pub use scheduler::{DispatchOutcome, ExecutionBook, ExecutionScheduler, TickOutcome};
pub use stats::{OrchestratorStats, StatsAggregator, StrategyPerformance};
pub use tracker::{
    base_risk_score, performance_score, risk_score, PerformanceTracker, TrackerMetrics,
    NEUTRAL_PERFORMANCE_SCORE,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AllocationConfig, Config, OrchestratorConfig, ScoringConfig};
use crate::error::{OrchestratorError, Result};
use crate::market::{MarketAnalysisProvider, MarketCondition, MarketConditionClassifier};
use crate::strategy::{
    CapabilityKind, ExecutionCapability, Strategy, StrategyConfig, StrategyRegistry,
};

/// One-time setup run while the orchestrator is starting.
#[async_trait]
pub trait WarmupHook: Send + Sync {
    fn name(&self) -> &str;

    async fn warm_up(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorStatus {
    Stopped,
    Starting,
    Active,
    Stopping,
}

impl fmt::Display for OrchestratorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrchestratorStatus::Stopped => write!(f, "Stopped"),
            OrchestratorStatus::Starting => write!(f, "Starting"),
            OrchestratorStatus::Active => write!(f, "Active"),
            OrchestratorStatus::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Loops of one Active period.
struct RunningLoops {
    shutdown: CancellationToken,
    tasks: Vec<PeriodicTask>,
}

struct Inner {
    config: OrchestratorConfig,
    registry: StrategyRegistry,
    classifier: MarketConditionClassifier,
    tracker: PerformanceTracker,
    allocator: CapitalAllocator,
    scheduler: ExecutionScheduler,
    warmups: Vec<Arc<dyn WarmupHook>>,
    /// Written only by the classifier tick
    market: RwLock<MarketCondition>,
    /// Written only by the admin surface
    total_capital: RwLock<Decimal>,
    status: RwLock<OrchestratorStatus>,
    /// Serialises start and stop
    lifecycle: Mutex<Option<RunningLoops>>,
}

/// Coordinates registered strategies over a shared capital pool.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

/// Collects collaborators and strategies before an [`Orchestrator`] exists.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    allocation: AllocationConfig,
    scoring: ScoringConfig,
    provider: Option<Arc<dyn MarketAnalysisProvider>>,
    registry: StrategyRegistry,
    warmups: Vec<Arc<dyn WarmupHook>>,
}

impl OrchestratorBuilder {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.orchestrator.clone(),
            allocation: config.allocation.clone(),
            scoring: config.scoring.clone(),
            provider: None,
            registry: StrategyRegistry::new(),
            warmups: Vec::new(),
        }
    }

    pub fn market_provider(&mut self, provider: Arc<dyn MarketAnalysisProvider>) -> &mut Self {
        self.provider = Some(provider);
        self
    }

    pub fn warmup(&mut self, hook: Arc<dyn WarmupHook>) -> &mut Self {
        self.warmups.push(hook);
        self
    }

    pub fn register(
        &mut self,
        config: StrategyConfig,
        strategy: Arc<dyn Strategy>,
        capability: ExecutionCapability,
    ) -> Result<&mut Self> {
        self.registry.register(config, strategy, capability)?;
        Ok(self)
    }

    pub fn build(self) -> Result<Orchestrator> {
        let provider = self
            .provider
            .ok_or(OrchestratorError::MissingCollaborator("market analysis provider"))?;

        if self.config.min_total_capital <= Decimal::ZERO {
            return Err(OrchestratorError::InvalidConfig(
                "min_total_capital must be positive".to_string(),
            ));
        }

        let mut registry = self.registry;
        let tracker = PerformanceTracker::new(
            self.scoring,
            self.config.dispatch_timeout(),
            registry.registered_configs().iter(),
        );
        let allocator =
            CapitalAllocator::new(self.allocation, self.config.zero_inapplicable_allocations);
        let scheduler = ExecutionScheduler::new(
            self.config.global_cooldown(),
            self.config.dispatch_timeout(),
            self.config.fallthrough_on_failure,
        );
        let total_capital = self.config.total_capital.max(self.config.min_total_capital);

        info!(
            strategies = registry.len(),
            %total_capital,
            "Orchestrator built"
        );

        let classifier_timeout = self.config.dispatch_timeout();
        Ok(Orchestrator {
            inner: Arc::new(Inner {
                config: self.config,
                registry,
                classifier: MarketConditionClassifier::new(provider, classifier_timeout),
                tracker,
                allocator,
                scheduler,
                warmups: self.warmups,
                market: RwLock::new(MarketCondition::conservative()),
                total_capital: RwLock::new(total_capital),
                status: RwLock::new(OrchestratorStatus::Stopped),
                lifecycle: Mutex::new(None),
            }),
        })
    }
}

impl Orchestrator {
    pub fn builder(config: &Config) -> OrchestratorBuilder {
        OrchestratorBuilder::new(config)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Warm up collaborators, start non-self-starting strategies, classify
    /// once and launch the periodic loops.
    ///
    /// Each warmup and strategy start is bounded by the start timeout, and
    /// the first classification by the dispatch timeout, so a hanging
    /// collaborator delays activation but never blocks it. Calling this
    /// while active only logs a warning.
    pub async fn start(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        if lifecycle.is_some() {
            warn!("Orchestrator already active, ignoring start");
            return;
        }

        self.set_status(OrchestratorStatus::Starting).await;
        if self.inner.registry.is_empty() {
            warn!("Starting with no registered strategies");
        }

        let start_timeout = self.inner.config.start_timeout();
        for hook in &self.inner.warmups {
            match timeout(start_timeout, hook.warm_up()).await {
                Ok(Ok(())) => debug!(hook = hook.name(), "Warmup complete"),
                Ok(Err(e)) => warn!(hook = hook.name(), error = %e, "Warmup failed, continuing"),
                Err(_) => warn!(hook = hook.name(), ?start_timeout, "Warmup timed out, continuing"),
            }
        }

        let starts = self
            .inner
            .registry
            .handles()
            .iter()
            .filter(|h| h.capability.kind() != CapabilityKind::SelfStarting)
            .map(|handle| async move {
                match timeout(start_timeout, handle.strategy.start()).await {
                    Ok(Ok(())) => debug!(strategy = %handle.name, "Strategy started"),
                    Ok(Err(e)) => {
                        warn!(strategy = %handle.name, error = %e, "Strategy failed to start")
                    }
                    Err(_) => {
                        warn!(strategy = %handle.name, ?start_timeout, "Strategy start timed out")
                    }
                }
            });
        join_all(starts).await;

        self.classify_tick().await;

        let shutdown = CancellationToken::new();
        let config = &self.inner.config;
        let tasks = vec![
            self.spawn_loop("classifier", config.classifier_interval(), &shutdown, |o| async move {
                o.classify_tick().await;
            }),
            self.spawn_loop("tracker", config.tracker_interval(), &shutdown, |o| async move {
                o.track_tick().await;
            }),
            self.spawn_loop("orchestration", config.tick_interval(), &shutdown, |o| async move {
                o.orchestration_tick(Utc::now()).await;
            }),
        ];

        *lifecycle = Some(RunningLoops { shutdown, tasks });
        self.set_status(OrchestratorStatus::Active).await;

        info!(
            strategies = self.inner.registry.len(),
            tick = ?config.tick_interval(),
            "✅ Orchestrator active"
        );
    }

    /// Cancel the loops, then stop every strategy in parallel.
    ///
    /// Idempotent. Strategy failures and timeouts are logged and do not
    /// prevent the others from stopping.
    pub async fn stop(&self) {
        let mut lifecycle = self.inner.lifecycle.lock().await;
        let Some(running) = lifecycle.take() else {
            debug!("Orchestrator already stopped");
            return;
        };

        self.set_status(OrchestratorStatus::Stopping).await;
        info!("🛑 Stopping orchestrator");

        running.shutdown.cancel();
        let grace = self.inner.config.stop_timeout();
        for task in running.tasks {
            debug!(task = task.name(), "Joining loop");
            task.join(grace).await;
        }

        let stops = self.inner.registry.handles().iter().map(|handle| async move {
            match timeout(grace, handle.strategy.stop()).await {
                Ok(Ok(())) => debug!(strategy = %handle.name, "Strategy stopped"),
                Ok(Err(e)) => warn!(strategy = %handle.name, error = %e, "Strategy stop failed"),
                Err(_) => error!(strategy = %handle.name, ?grace, "Strategy stop timed out"),
            }
        });
        join_all(stops).await;

        self.set_status(OrchestratorStatus::Stopped).await;
        info!("Orchestrator stopped");
    }

    pub async fn status(&self) -> OrchestratorStatus {
        *self.inner.status.read().await
    }

    async fn set_status(&self, status: OrchestratorStatus) {
        *self.inner.status.write().await = status;
        debug!(%status, "Orchestrator status changed");
    }

    fn spawn_loop<F, Fut>(
        &self,
        name: &'static str,
        interval: std::time::Duration,
        shutdown: &CancellationToken,
        work: F,
    ) -> PeriodicTask
    where
        F: Fn(Orchestrator) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let this = self.clone();
        PeriodicTask::spawn(name, interval, shutdown.clone(), move || work(this.clone()))
    }

    // =========================================================================
    // Ticks
    // =========================================================================

    /// Refresh the market regime. Never fails.
    pub async fn classify_tick(&self) -> MarketCondition {
        let condition = self.inner.classifier.refresh().await;
        *self.inner.market.write().await = condition;
        condition
    }

    /// Pull stats from every strategy and rescore it.
    pub async fn track_tick(&self) {
        self.inner.tracker.refresh(&self.inner.registry).await;
    }

    /// Recompute every allocation now.
    pub async fn rebalance(&self, now: DateTime<Utc>) -> HashMap<String, Decimal> {
        let configs = self.inner.registry.configs().await;
        let metrics = self.inner.tracker.snapshot().await;
        let allocations = self.inner.allocator.snapshot().await;
        let market = *self.inner.market.read().await;
        let total_capital = *self.inner.total_capital.read().await;

        let candidates: Vec<AllocationCandidate> = self
            .inner
            .registry
            .handles()
            .iter()
            .filter_map(|handle| {
                let config = configs.get(&handle.name)?;
                let metrics = metrics.get(&handle.name)?;
                Some(AllocationCandidate {
                    name: handle.name.clone(),
                    enabled: config.enabled,
                    applicable: config.is_applicable(&market),
                    priority: config.priority,
                    performance_score: metrics.performance_score,
                    win_rate: metrics.win_rate,
                    risk_score: metrics.risk_score,
                    max_capital_allocation_percent: config.max_capital_allocation_percent,
                    previous: allocations.get(&handle.name).copied().unwrap_or(Decimal::ZERO),
                })
            })
            .collect();

        self.inner.allocator.rebalance(&candidates, total_capital, now).await
    }

    /// One scheduling pass against the current allocations and regime.
    pub async fn schedule_tick(&self, now: DateTime<Utc>) -> TickOutcome {
        let allocations = self.inner.allocator.snapshot().await;
        let market = *self.inner.market.read().await;

        self.inner
            .scheduler
            .tick(now, &self.inner.registry, &allocations, &market)
            .await
    }

    /// Rebalance if the interval has elapsed, then schedule.
    pub async fn orchestration_tick(&self, now: DateTime<Utc>) -> TickOutcome {
        if self
            .inner
            .allocator
            .is_due(now, self.inner.config.rebalance_interval())
            .await
        {
            self.rebalance(now).await;
        }

        self.schedule_tick(now).await
    }

    // =========================================================================
    // Admin surface
    // =========================================================================

    pub async fn set_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        self.inner.registry.set_enabled(name, enabled).await
    }

    /// Set a strategy's priority, clamped into `[1, 10]`.
    pub async fn set_priority(&self, name: &str, priority: i64) -> Result<u8> {
        self.inner.registry.set_priority(name, priority).await
    }

    pub async fn strategy_config(&self, name: &str) -> Result<StrategyConfig> {
        self.inner.registry.config(name).await
    }

    pub async fn replace_config(&self, name: &str, config: StrategyConfig) -> Result<StrategyConfig> {
        self.inner.registry.replace_config(name, config).await
    }

    /// Set total capital, raised to the configured floor. Returns the stored value.
    pub async fn set_total_capital(&self, capital: Decimal) -> Decimal {
        let clamped = capital.max(self.inner.config.min_total_capital);
        *self.inner.total_capital.write().await = clamped;
        info!(requested = %capital, total_capital = %clamped, "Total capital set");
        clamped
    }

    pub async fn total_capital(&self) -> Decimal {
        *self.inner.total_capital.read().await
    }

    pub async fn market_condition(&self) -> MarketCondition {
        *self.inner.market.read().await
    }

    /// Full per-strategy performance map.
    pub async fn performance(&self) -> BTreeMap<String, StrategyPerformance> {
        let metrics = self.inner.tracker.snapshot().await;
        let allocations = self.inner.allocator.snapshot().await;
        let book = self.inner.scheduler.book().await;

        metrics
            .into_iter()
            .map(|(name, metrics)| {
                let record = StrategyPerformance {
                    metrics,
                    capital_allocated: allocations.get(&name).copied().unwrap_or(Decimal::ZERO),
                    last_execution_time: book.last_execution.get(&name).copied(),
                    active_trades: book.active_trades.get(&name).copied().unwrap_or(0),
                };
                (name, record)
            })
            .collect()
    }

    pub async fn stats(&self) -> OrchestratorStats {
        let total_capital = *self.inner.total_capital.read().await;
        StatsAggregator::aggregate(total_capital, &self.performance().await)
    }

    pub fn strategy_names(&self) -> Vec<String> {
        self.inner.registry.names()
    }
}
