//! Execution scheduler: admission control for strategy dispatch.
//!
//! Each tick dispatches at most one strategy. Candidates are tried in
//! priority order and must have capital, be out of their own cooldown,
//! match the market, and have room for another trade.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::market::MarketCondition;
use crate::strategy::{CapabilityKind, ExecutionCapability, StrategyHandle, StrategyRegistry};

/// Scheduler-owned bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct ExecutionBook {
    pub last_global_execution: Option<DateTime<Utc>>,
    pub last_execution: HashMap<String, DateTime<Utc>>,
    /// Last active trade count each strategy reported
    pub active_trades: HashMap<String, u32>,
}

/// Summary of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub strategy: String,
    pub capability: CapabilityKind,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// What a scheduler tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The global cooldown had not elapsed; nothing was considered.
    GlobalCooldown,
    /// No strategy was eligible or none produced anything.
    Idle,
    Dispatched(DispatchOutcome),
    /// A dispatch errored or timed out.
    Failed { strategy: String, reason: String },
}

impl TickOutcome {
    pub fn dispatched(&self) -> Option<&DispatchOutcome> {
        match self {
            TickOutcome::Dispatched(outcome) => Some(outcome),
            _ => None,
        }
    }
}

pub struct ExecutionScheduler {
    global_cooldown: chrono::Duration,
    dispatch_timeout: Duration,
    fallthrough_on_failure: bool,
    book: RwLock<ExecutionBook>,
}

impl ExecutionScheduler {
    pub fn new(
        global_cooldown: chrono::Duration,
        dispatch_timeout: Duration,
        fallthrough_on_failure: bool,
    ) -> Self {
        Self {
            global_cooldown,
            dispatch_timeout,
            fallthrough_on_failure,
            book: RwLock::new(ExecutionBook::default()),
        }
    }

    /// Run one admission-control pass.
    pub async fn tick(
        &self,
        now: DateTime<Utc>,
        registry: &StrategyRegistry,
        allocations: &HashMap<String, Decimal>,
        market: &MarketCondition,
    ) -> TickOutcome {
        let book = self.book.read().await.clone();

        if let Some(last) = book.last_global_execution {
            if now - last < self.global_cooldown {
                debug!(since_last = %(now - last), "Global cooldown active, skipping tick");
                return TickOutcome::GlobalCooldown;
            }
        }

        let configs = registry.configs().await;
        let mut candidates: Vec<_> = registry
            .handles()
            .iter()
            .filter_map(|handle| {
                configs
                    .get(&handle.name)
                    .filter(|config| config.enabled)
                    .map(|config| (handle, config))
            })
            .collect();
        candidates.sort_by_key(|(_, config)| Reverse(config.priority));

        let mut last_failure = None;

        for (handle, config) in candidates {
            let name = handle.name.as_str();

            let allocated = allocations.get(name).copied().unwrap_or(Decimal::ZERO);
            if allocated <= Decimal::ZERO {
                debug!(strategy = %name, "Skipped: no capital allocated");
                continue;
            }

            if let Some(last) = book.last_execution.get(name) {
                if now - *last < config.cooldown() {
                    debug!(strategy = %name, "Skipped: in cooldown");
                    continue;
                }
            }

            if !config.is_applicable(market) {
                debug!(strategy = %name, %market, "Skipped: not applicable to market");
                continue;
            }

            let active = self.refresh_active_trades(handle).await;
            if active >= config.max_concurrent_trades {
                debug!(strategy = %name, active, max = config.max_concurrent_trades, "Skipped: at trade limit");
                continue;
            }

            match timeout(self.dispatch_timeout, dispatch(handle)).await {
                Ok(Ok(Some(detail))) => {
                    let mut book = self.book.write().await;
                    book.last_execution.insert(name.to_string(), now);
                    book.last_global_execution = Some(now);
                    drop(book);

                    let outcome = DispatchOutcome {
                        strategy: name.to_string(),
                        capability: handle.capability.kind(),
                        detail,
                        at: now,
                    };
                    info!(
                        strategy = %outcome.strategy,
                        capability = %outcome.capability,
                        detail = %outcome.detail,
                        %allocated,
                        "🚀 [DISPATCH] Strategy dispatched"
                    );
                    return TickOutcome::Dispatched(outcome);
                }
                Ok(Ok(None)) => {
                    debug!(strategy = %name, "Dispatch produced nothing");
                }
                Ok(Err(e)) => {
                    warn!(strategy = %name, error = %e, "Dispatch failed");
                    last_failure = Some((name.to_string(), e.to_string()));
                    if !self.fallthrough_on_failure {
                        break;
                    }
                }
                Err(_) => {
                    warn!(strategy = %name, timeout = ?self.dispatch_timeout, "Dispatch timed out");
                    last_failure = Some((name.to_string(), "dispatch timed out".to_string()));
                    if !self.fallthrough_on_failure {
                        break;
                    }
                }
            }
        }

        match last_failure {
            Some((strategy, reason)) => TickOutcome::Failed { strategy, reason },
            None => {
                debug!("No strategy dispatched this tick");
                TickOutcome::Idle
            }
        }
    }

    /// Read the strategy's active trade count into the book.
    ///
    /// Falls back to the last known count when stats are unavailable.
    async fn refresh_active_trades(&self, handle: &StrategyHandle) -> u32 {
        let reported = match timeout(self.dispatch_timeout, handle.strategy.stats()).await {
            Ok(Ok(stats)) => stats.active_trades,
            Ok(Err(e)) => {
                debug!(strategy = %handle.name, error = %e, "Stats unavailable for trade limit check");
                None
            }
            Err(_) => None,
        };

        let mut book = self.book.write().await;
        match reported {
            Some(active) => {
                book.active_trades.insert(handle.name.clone(), active);
                active
            }
            None => book.active_trades.get(&handle.name).copied().unwrap_or(0),
        }
    }

    pub async fn book(&self) -> ExecutionBook {
        self.book.read().await.clone()
    }
}

/// Dispatch through the declared capability.
///
/// `Ok(None)` means the call succeeded but produced nothing.
async fn dispatch(handle: &StrategyHandle) -> anyhow::Result<Option<String>> {
    match &handle.capability {
        ExecutionCapability::Scanner(scanner) => {
            let opportunities = scanner.scan().await?;
            Ok((!opportunities.is_empty())
                .then(|| format!("{} opportunities found", opportunities.len())))
        }
        ExecutionCapability::Executor(executor) => {
            Ok(executor.execute().await?.map(|report| report.description))
        }
        ExecutionCapability::SelfStarting(state) => {
            let was_running = state.is_running();
            handle.strategy.start().await?;
            Ok((!was_running && state.is_running()).then(|| "started".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Level, RegimeTag, Sentiment, Trend};
    use crate::strategy::{ScriptedStrategy, StrategyConfig};
    use std::collections::BTreeSet;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    // ===== Test Helpers =====

    fn bull() -> MarketCondition {
        MarketCondition {
            trend: Trend::Bull,
            volatility: Level::Medium,
            liquidity: Level::High,
            sentiment: Sentiment::Bullish,
            risk_level: Level::Low,
        }
    }

    fn bear() -> MarketCondition {
        MarketCondition {
            trend: Trend::Bear,
            sentiment: Sentiment::Bearish,
            ..bull()
        }
    }

    fn scheduler() -> ExecutionScheduler {
        ExecutionScheduler::new(
            chrono::Duration::seconds(15),
            Duration::from_millis(200),
            false,
        )
    }

    fn setup(
        entries: &[(&str, u8, CapabilityKind)],
    ) -> (StrategyRegistry, Vec<Arc<ScriptedStrategy>>, HashMap<String, Decimal>) {
        let mut registry = StrategyRegistry::new();
        let mut strategies = Vec::new();
        let mut allocations = HashMap::new();

        for (name, priority, kind) in entries {
            let strategy = ScriptedStrategy::new(*name);
            registry
                .register(
                    StrategyConfig {
                        priority: *priority,
                        ..StrategyConfig::new(*name)
                    },
                    strategy.clone(),
                    strategy.capability(*kind),
                )
                .unwrap();
            allocations.insert(name.to_string(), Decimal::from(1000));
            strategies.push(strategy);
        }

        (registry, strategies, allocations)
    }

    // ===== Admission Tests =====

    #[tokio::test]
    async fn test_one_dispatch_per_tick() {
        let (registry, strategies, allocations) = setup(&[
            ("low", 3, CapabilityKind::Scanner),
            ("high", 8, CapabilityKind::Executor),
        ]);
        let scheduler = scheduler();

        let outcome = scheduler.tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(outcome.dispatched().map(|o| o.strategy.as_str()), Some("high"));
        assert_eq!(strategies[1].dispatches(), 1);
        assert_eq!(strategies[0].dispatches(), 0);
    }

    #[tokio::test]
    async fn test_global_cooldown_blocks_tick() {
        let (registry, strategies, allocations) = setup(&[
            ("a", 8, CapabilityKind::Scanner),
            ("b", 5, CapabilityKind::Scanner),
        ]);
        let scheduler = scheduler();
        let now = Utc::now();

        scheduler.tick(now, &registry, &allocations, &bull()).await;
        let outcome = scheduler
            .tick(now + chrono::Duration::seconds(10), &registry, &allocations, &bull())
            .await;

        assert_eq!(outcome, TickOutcome::GlobalCooldown);
        assert_eq!(strategies[0].dispatches() + strategies[1].dispatches(), 1);
    }

    #[tokio::test]
    async fn test_strategy_cooldown_respected() {
        let (registry, strategies, allocations) = setup(&[
            ("a", 8, CapabilityKind::Scanner),
            ("b", 5, CapabilityKind::Scanner),
        ]);
        let scheduler = scheduler();
        let now = Utc::now();

        // a (cooldown 60s) at t=0, b at t=20, a again only from t=60
        let first = scheduler.tick(now, &registry, &allocations, &bull()).await;
        let second = scheduler
            .tick(now + chrono::Duration::seconds(20), &registry, &allocations, &bull())
            .await;
        let third = scheduler
            .tick(now + chrono::Duration::seconds(40), &registry, &allocations, &bull())
            .await;
        let fourth = scheduler
            .tick(now + chrono::Duration::seconds(60), &registry, &allocations, &bull())
            .await;

        assert_eq!(first.dispatched().unwrap().strategy, "a");
        assert_eq!(second.dispatched().unwrap().strategy, "b");
        assert_eq!(third, TickOutcome::Idle);
        assert_eq!(fourth.dispatched().unwrap().strategy, "a");
        assert_eq!(strategies[0].dispatches(), 2);
        assert_eq!(strategies[1].dispatches(), 1);
    }

    #[tokio::test]
    async fn test_zero_allocation_skipped() {
        let (registry, strategies, mut allocations) = setup(&[
            ("broke", 9, CapabilityKind::Scanner),
            ("funded", 2, CapabilityKind::Scanner),
        ]);
        allocations.insert("broke".to_string(), Decimal::ZERO);

        let outcome = scheduler().tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(outcome.dispatched().unwrap().strategy, "funded");
        assert_eq!(strategies[0].dispatches(), 0);
    }

    #[tokio::test]
    async fn test_disabled_strategy_skipped() {
        let (registry, strategies, allocations) = setup(&[("off", 9, CapabilityKind::Scanner)]);
        registry.set_enabled("off", false).await.unwrap();

        let outcome = scheduler().tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(outcome, TickOutcome::Idle);
        assert_eq!(strategies[0].dispatches(), 0);
    }

    #[tokio::test]
    async fn test_trend_flip_skips_on_next_tick() {
        let (registry, strategies, allocations) = setup(&[("bull-only", 9, CapabilityKind::Scanner)]);
        let mut config = registry.config("bull-only").await.unwrap();
        config.applicable_market_conditions = BTreeSet::from([RegimeTag::Bull]);
        config.cooldown_period_secs = 0;
        registry.replace_config("bull-only", config).await.unwrap();

        let scheduler = scheduler();
        let now = Utc::now();

        let first = scheduler.tick(now, &registry, &allocations, &bull()).await;
        let second = scheduler
            .tick(now + chrono::Duration::seconds(30), &registry, &allocations, &bear())
            .await;

        assert!(first.dispatched().is_some());
        assert_eq!(second, TickOutcome::Idle);
        assert_eq!(strategies[0].dispatches(), 1);
    }

    #[tokio::test]
    async fn test_trade_limit_reached() {
        let (registry, strategies, allocations) = setup(&[
            ("busy", 9, CapabilityKind::Executor),
            ("idle", 1, CapabilityKind::Executor),
        ]);
        strategies[0].active_trades.store(1, Ordering::SeqCst);
        let scheduler = scheduler();

        let outcome = scheduler.tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(outcome.dispatched().unwrap().strategy, "idle");
        assert_eq!(scheduler.book().await.active_trades["busy"], 1);
    }

    #[tokio::test]
    async fn test_unreadable_stats_keep_last_trade_count() {
        let (registry, strategies, allocations) = setup(&[
            ("busy", 9, CapabilityKind::Executor),
            ("idle", 1, CapabilityKind::Executor),
        ]);
        strategies[0].active_trades.store(1, Ordering::SeqCst);
        let scheduler = scheduler();
        let now = Utc::now();

        let first = scheduler.tick(now, &registry, &allocations, &bull()).await;
        assert_eq!(first.dispatched().unwrap().strategy, "idle");

        // busy would be free now, but its stats cannot be read
        strategies[0].active_trades.store(0, Ordering::SeqCst);
        strategies[0].fail_stats.store(true, Ordering::SeqCst);
        let second = scheduler
            .tick(now + chrono::Duration::seconds(20), &registry, &allocations, &bull())
            .await;
        assert_eq!(second, TickOutcome::Idle);

        strategies[0].fail_stats.store(false, Ordering::SeqCst);
        *strategies[0].stats_delay.write().await = Some(Duration::from_secs(3600));
        let third = scheduler
            .tick(now + chrono::Duration::seconds(40), &registry, &allocations, &bull())
            .await;
        assert_eq!(third, TickOutcome::Idle);

        assert_eq!(strategies[0].dispatches(), 0);
        assert_eq!(scheduler.book().await.active_trades["busy"], 1);
    }

    // ===== Dispatch Tests =====

    #[tokio::test]
    async fn test_empty_result_tries_next_strategy() {
        let (registry, strategies, allocations) = setup(&[
            ("empty", 9, CapabilityKind::Scanner),
            ("full", 5, CapabilityKind::Executor),
        ]);
        strategies[0].come_up_empty.store(true, Ordering::SeqCst);
        let scheduler = scheduler();

        let outcome = scheduler.tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(outcome.dispatched().unwrap().strategy, "full");
        assert_eq!(strategies[0].dispatches(), 1);
        // an empty scan does not start the cooldown
        assert!(!scheduler.book().await.last_execution.contains_key("empty"));
    }

    #[tokio::test]
    async fn test_failure_stops_tick_without_fallthrough() {
        let (registry, strategies, allocations) = setup(&[
            ("broken", 9, CapabilityKind::Scanner),
            ("healthy", 5, CapabilityKind::Scanner),
        ]);
        strategies[0].fail_dispatch.store(true, Ordering::SeqCst);
        let scheduler = scheduler();

        let outcome = scheduler.tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert!(matches!(outcome, TickOutcome::Failed { ref strategy, .. } if strategy == "broken"));
        assert_eq!(strategies[1].dispatches(), 0);
        assert!(scheduler.book().await.last_global_execution.is_none());
    }

    #[tokio::test]
    async fn test_failure_falls_through_when_enabled() {
        let (registry, strategies, allocations) = setup(&[
            ("broken", 9, CapabilityKind::Scanner),
            ("healthy", 5, CapabilityKind::Scanner),
        ]);
        strategies[0].fail_dispatch.store(true, Ordering::SeqCst);
        let scheduler = ExecutionScheduler::new(
            chrono::Duration::seconds(15),
            Duration::from_millis(200),
            true,
        );

        let outcome = scheduler.tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(outcome.dispatched().unwrap().strategy, "healthy");
    }

    #[tokio::test]
    async fn test_hanging_dispatch_times_out() {
        let (registry, strategies, allocations) = setup(&[("slow", 9, CapabilityKind::Executor)]);
        *strategies[0].dispatch_delay.write().await = Some(Duration::from_secs(5));
        let scheduler = scheduler();

        let outcome = scheduler.tick(Utc::now(), &registry, &allocations, &bull()).await;

        assert_eq!(
            outcome,
            TickOutcome::Failed {
                strategy: "slow".to_string(),
                reason: "dispatch timed out".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_self_starting_succeeds_once() {
        let (registry, strategies, allocations) = setup(&[("daemon", 9, CapabilityKind::SelfStarting)]);
        let scheduler = ExecutionScheduler::new(
            chrono::Duration::zero(),
            Duration::from_millis(200),
            false,
        );
        let mut config = registry.config("daemon").await.unwrap();
        config.cooldown_period_secs = 0;
        registry.replace_config("daemon", config).await.unwrap();

        let now = Utc::now();
        let first = scheduler.tick(now, &registry, &allocations, &bull()).await;
        let second = scheduler
            .tick(now + chrono::Duration::seconds(1), &registry, &allocations, &bull())
            .await;

        assert_eq!(first.dispatched().unwrap().detail, "started");
        // already running, so starting again is not a new dispatch
        assert_eq!(second, TickOutcome::Idle);
        assert_eq!(strategies[0].starts(), 2);
    }
}
