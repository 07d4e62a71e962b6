//! Performance tracking: pulls strategy stats and derives bounded scores.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::ScoringConfig;
use crate::strategy::{StrategyConfig, StrategyRegistry, StrategyStats};
use crate::utils::clamp_decimal;

/// Score assigned before a strategy has reported anything.
pub const NEUTRAL_PERFORMANCE_SCORE: Decimal = dec!(50);

/// Tracker-owned fields of a strategy's performance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerMetrics {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub total_profit: Decimal,
    /// Win rate in percent (0-100)
    pub win_rate: Decimal,
    pub avg_profit_per_trade: Decimal,
    /// Average execution time in milliseconds
    pub avg_execution_time: Decimal,
    /// Risk score (0.0-1.0)
    pub risk_score: Decimal,
    /// Performance score (0-100)
    pub performance_score: Decimal,
    /// Current drawdown in percent
    pub current_drawdown: Decimal,
    pub max_drawdown: Decimal,
}

impl TrackerMetrics {
    pub fn neutral(base_risk: Decimal) -> Self {
        Self {
            total_trades: 0,
            successful_trades: 0,
            total_profit: Decimal::ZERO,
            win_rate: Decimal::ZERO,
            avg_profit_per_trade: Decimal::ZERO,
            avg_execution_time: Decimal::ZERO,
            risk_score: clamp_decimal(base_risk, Decimal::ZERO, Decimal::ONE),
            performance_score: NEUTRAL_PERFORMANCE_SCORE,
            current_drawdown: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
        }
    }

    /// Fold a stats report into the record and rescore it.
    ///
    /// Absent fields keep their previous value. Trade counters never
    /// decrease and successes never exceed the total. Negative drawdowns are
    /// read as zero, and arithmetic saturates rather than overflowing.
    pub fn apply(&mut self, stats: &StrategyStats, base_risk: Decimal) {
        if let Some(total) = stats.total_trades {
            self.total_trades = self.total_trades.max(total);
        }
        if let Some(successful) = stats.successful_trades {
            self.successful_trades = self.successful_trades.max(successful);
        }
        self.successful_trades = self.successful_trades.min(self.total_trades);

        if let Some(profit) = stats.total_profit {
            self.total_profit = profit;
        }
        if let Some(time) = stats.avg_execution_time {
            self.avg_execution_time = time;
        }
        if let Some(drawdown) = stats.current_drawdown {
            self.current_drawdown = drawdown.max(Decimal::ZERO);
        }
        if let Some(drawdown) = stats.max_drawdown {
            self.max_drawdown = drawdown.max(Decimal::ZERO);
        }

        if self.total_trades > 0 {
            let total = Decimal::from(self.total_trades);
            self.win_rate = Decimal::from(self.successful_trades) / total * Decimal::ONE_HUNDRED;
            self.avg_profit_per_trade = self.total_profit / total;
        }

        self.risk_score = risk_score(base_risk, self.win_rate, self.current_drawdown);
        self.performance_score = performance_score(self);
    }
}

/// Risk score of a strategy before any trading feedback.
pub fn base_risk_score(config: &StrategyConfig, scoring: &ScoringConfig) -> Decimal {
    let score = scoring
        .base_risk
        .saturating_mul(config.risk_tolerance.multiplier())
        .saturating_mul(scoring.category_multiplier(config.category));
    clamp_decimal(score, Decimal::ZERO, Decimal::ONE)
}

pub fn risk_score(base_risk: Decimal, win_rate: Decimal, current_drawdown: Decimal) -> Decimal {
    let win_rate_adj = if win_rate > dec!(80) {
        dec!(0.9)
    } else if win_rate < dec!(40) {
        dec!(1.3)
    } else {
        Decimal::ONE
    };

    let drawdown_adj = if current_drawdown > dec!(10) {
        dec!(1.5)
    } else {
        Decimal::ONE
    };

    let score = base_risk.saturating_mul(win_rate_adj).saturating_mul(drawdown_adj);
    clamp_decimal(score, Decimal::ZERO, Decimal::ONE)
}

/// Composite 0-100 score. Expects `risk_score` to be current.
pub fn performance_score(metrics: &TrackerMetrics) -> Decimal {
    let profit_term = if metrics.avg_profit_per_trade > Decimal::ZERO {
        metrics.avg_profit_per_trade.saturating_mul(dec!(5)).min(dec!(25))
    } else {
        dec!(-20)
    };
    let volume_term = (Decimal::from(metrics.total_trades) * dec!(0.5)).min(dec!(15));
    let win_term = clamp_decimal(metrics.win_rate, Decimal::ZERO, Decimal::ONE_HUNDRED)
        / Decimal::ONE_HUNDRED
        * dec!(30);
    let risk_term = clamp_decimal(metrics.risk_score, Decimal::ZERO, Decimal::ONE) * dec!(20);

    let score = (dec!(50) + win_term + profit_term + volume_term - risk_term)
        .saturating_sub(metrics.current_drawdown.saturating_mul(dec!(2)));

    clamp_decimal(score, Decimal::ZERO, dec!(100))
}

/// Owns the tracker fields of every strategy's performance record.
pub struct PerformanceTracker {
    scoring: ScoringConfig,
    /// Upper bound on one strategy's stats() call
    stats_timeout: Duration,
    metrics: RwLock<HashMap<String, TrackerMetrics>>,
}

impl PerformanceTracker {
    /// Seed neutral metrics for every configured strategy.
    pub fn new<'a>(
        scoring: ScoringConfig,
        stats_timeout: Duration,
        configs: impl IntoIterator<Item = &'a StrategyConfig>,
    ) -> Self {
        let metrics = configs
            .into_iter()
            .map(|config| {
                let base = base_risk_score(config, &scoring);
                (config.name.clone(), TrackerMetrics::neutral(base))
            })
            .collect();

        Self {
            scoring,
            stats_timeout,
            metrics: RwLock::new(metrics),
        }
    }

    /// Pull stats from every registered strategy and rescore it.
    ///
    /// A failing or hanging stats accessor leaves that strategy's record
    /// untouched.
    pub async fn refresh(&self, registry: &StrategyRegistry) {
        for handle in registry.handles() {
            let stats = match timeout(self.stats_timeout, handle.strategy.stats()).await {
                Ok(Ok(stats)) => stats,
                Ok(Err(e)) => {
                    warn!(strategy = %handle.name, error = %e, "Stats unavailable, keeping previous metrics");
                    continue;
                }
                Err(_) => {
                    warn!(strategy = %handle.name, timeout = ?self.stats_timeout, "Stats timed out, keeping previous metrics");
                    continue;
                }
            };

            let base_risk = match registry.config(&handle.name).await {
                Ok(config) => base_risk_score(&config, &self.scoring),
                Err(_) => continue,
            };

            let mut metrics = self.metrics.write().await;
            let entry = metrics
                .entry(handle.name.clone())
                .or_insert_with(|| TrackerMetrics::neutral(base_risk));
            entry.apply(&stats, base_risk);

            debug!(
                strategy = %handle.name,
                trades = entry.total_trades,
                win_rate = %entry.win_rate.round_dp(2),
                risk = %entry.risk_score.round_dp(3),
                score = %entry.performance_score.round_dp(2),
                "Performance updated"
            );
        }
    }

    pub async fn metrics(&self, name: &str) -> Option<TrackerMetrics> {
        self.metrics.read().await.get(name).cloned()
    }

    pub async fn snapshot(&self) -> HashMap<String, TrackerMetrics> {
        self.metrics.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::{
        CapabilityKind, RiskTolerance, ScriptedStrategy, StrategyCategory,
    };
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    // ===== Test Helpers =====

    fn stats(total: u64, successful: u64, profit: Decimal) -> StrategyStats {
        StrategyStats {
            total_trades: Some(total),
            successful_trades: Some(successful),
            total_profit: Some(profit),
            ..Default::default()
        }
    }

    fn tracked(
        strategy: &Arc<ScriptedStrategy>,
        stats_timeout: Duration,
    ) -> (StrategyRegistry, PerformanceTracker) {
        let mut registry = StrategyRegistry::new();
        registry
            .register(
                StrategyConfig::new(strategy.name()),
                strategy.clone(),
                strategy.capability(CapabilityKind::Executor),
            )
            .unwrap();
        let tracker = PerformanceTracker::new(
            ScoringConfig::default(),
            stats_timeout,
            registry.registered_configs().iter(),
        );
        (registry, tracker)
    }

    // ===== Base Risk Tests =====

    #[test]
    fn test_base_risk_scales_with_tolerance_and_category() {
        let scoring = ScoringConfig::default();

        let medium = StrategyConfig::new("m");
        assert_eq!(base_risk_score(&medium, &scoring), dec!(0.5));

        let low_stable = StrategyConfig {
            risk_tolerance: RiskTolerance::Low,
            category: StrategyCategory::Stablecoin,
            ..StrategyConfig::new("s")
        };
        assert_eq!(base_risk_score(&low_stable, &scoring), dec!(0.28));

        let high_hop = StrategyConfig {
            risk_tolerance: RiskTolerance::High,
            category: StrategyCategory::MultiHop,
            ..StrategyConfig::new("h")
        };
        assert_eq!(base_risk_score(&high_hop, &scoring), dec!(0.9));
    }

    // ===== Scoring Tests =====

    #[test]
    fn test_risk_score_adjustments() {
        assert_eq!(risk_score(dec!(0.5), dec!(60), dec!(0)), dec!(0.5));
        assert_eq!(risk_score(dec!(0.5), dec!(90), dec!(0)), dec!(0.45));
        assert_eq!(risk_score(dec!(0.5), dec!(20), dec!(0)), dec!(0.65));
        assert_eq!(risk_score(dec!(0.5), dec!(60), dec!(12)), dec!(0.75));
        // 0.9 * 1.3 * 1.5 saturates
        assert_eq!(risk_score(dec!(0.9), dec!(10), dec!(50)), Decimal::ONE);
    }

    #[test]
    fn test_apply_scores_new_report() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(&stats(10, 8, dec!(20)), dec!(0.5));

        assert_eq!(metrics.win_rate, dec!(80));
        assert_eq!(metrics.avg_profit_per_trade, dec!(2));
        assert_eq!(metrics.risk_score, dec!(0.5));
        // 50 + 24 + 10 + 5 - 10 - 0
        assert_eq!(metrics.performance_score, dec!(79));
    }

    #[test]
    fn test_losing_strategy_is_penalised() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(&stats(4, 1, dec!(-8)), dec!(0.5));

        assert_eq!(metrics.win_rate, dec!(25));
        assert_eq!(metrics.risk_score, dec!(0.65));
        // 50 + 7.5 - 20 + 2 - 13
        assert_eq!(metrics.performance_score, dec!(26.5));
    }

    #[test]
    fn test_scores_stay_bounded() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(
            &StrategyStats {
                current_drawdown: Some(dec!(80)),
                ..stats(2, 0, dec!(-500))
            },
            dec!(0.9),
        );
        assert_eq!(metrics.performance_score, Decimal::ZERO);
        assert_eq!(metrics.risk_score, Decimal::ONE);

        let mut metrics = TrackerMetrics::neutral(dec!(0.1));
        metrics.apply(&stats(1000, 1000, dec!(1_000_000)), dec!(0.1));
        assert_eq!(metrics.performance_score, dec!(100));
        assert!(metrics.risk_score >= Decimal::ZERO);
    }

    #[test]
    fn test_absent_fields_keep_previous_values() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(&stats(10, 6, dec!(30)), dec!(0.5));

        metrics.apply(
            &StrategyStats {
                total_trades: Some(12),
                ..Default::default()
            },
            dec!(0.5),
        );

        assert_eq!(metrics.total_trades, 12);
        assert_eq!(metrics.successful_trades, 6);
        assert_eq!(metrics.total_profit, dec!(30));
        assert_eq!(metrics.win_rate, dec!(50));
    }

    #[test]
    fn test_counters_never_decrease() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(&stats(10, 6, dec!(30)), dec!(0.5));
        metrics.apply(&stats(3, 1, dec!(30)), dec!(0.5));

        assert_eq!(metrics.total_trades, 10);
        assert_eq!(metrics.successful_trades, 6);
    }

    #[test]
    fn test_successes_capped_at_total() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(&stats(5, 9, dec!(10)), dec!(0.5));

        assert_eq!(metrics.successful_trades, 5);
        assert_eq!(metrics.win_rate, dec!(100));
    }

    #[test]
    fn test_zero_trades_leaves_rates_unchanged() {
        let mut metrics = TrackerMetrics::neutral(dec!(0.5));
        metrics.apply(&StrategyStats::default(), dec!(0.5));

        assert_eq!(metrics.win_rate, Decimal::ZERO);
        assert_eq!(metrics.avg_profit_per_trade, Decimal::ZERO);
        // a 0% win rate still carries the low win rate risk adjustment
        assert_eq!(metrics.risk_score, dec!(0.65));
        // 50 + 0 - 20 + 0 - 13
        assert_eq!(metrics.performance_score, dec!(17));
    }

    // ===== Tracker Tests =====

    #[tokio::test]
    async fn test_tracker_seeds_neutral_defaults() {
        let configs = vec![
            StrategyConfig::new("a"),
            StrategyConfig {
                risk_tolerance: RiskTolerance::High,
                ..StrategyConfig::new("b")
            },
        ];
        let tracker = PerformanceTracker::new(
            ScoringConfig::default(),
            Duration::from_secs(1),
            configs.iter(),
        );

        let a = tracker.metrics("a").await.unwrap();
        assert_eq!(a.performance_score, dec!(50));
        assert_eq!(a.risk_score, dec!(0.5));

        let b = tracker.metrics("b").await.unwrap();
        assert_eq!(b.risk_score, dec!(0.75));
        assert!(tracker.metrics("c").await.is_none());
    }

    #[tokio::test]
    async fn test_refresh_folds_reported_stats() {
        let strategy = ScriptedStrategy::new("reporter");
        *strategy.reported_stats.write().await = Some(stats(10, 8, dec!(20)));
        let (registry, tracker) = tracked(&strategy, Duration::from_secs(1));

        tracker.refresh(&registry).await;

        let metrics = tracker.metrics("reporter").await.unwrap();
        assert_eq!(metrics.total_trades, 10);
        assert_eq!(metrics.performance_score, dec!(79));
    }

    #[tokio::test]
    async fn test_failed_stats_keep_previous_metrics() {
        let strategy = ScriptedStrategy::new("flaky");
        *strategy.reported_stats.write().await = Some(stats(10, 7, dec!(20)));
        let (registry, tracker) = tracked(&strategy, Duration::from_secs(1));

        tracker.refresh(&registry).await;
        let before = tracker.metrics("flaky").await.unwrap();
        assert_eq!(before.total_trades, 10);

        *strategy.reported_stats.write().await = Some(stats(20, 20, dec!(500)));
        strategy.fail_stats.store(true, Ordering::SeqCst);
        tracker.refresh(&registry).await;

        assert_eq!(tracker.metrics("flaky").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_hanging_stats_time_out() {
        let strategy = ScriptedStrategy::new("stuck");
        *strategy.stats_delay.write().await = Some(Duration::from_secs(3600));
        let (registry, tracker) = tracked(&strategy, Duration::from_millis(50));

        let refreshed =
            tokio::time::timeout(Duration::from_secs(5), tracker.refresh(&registry)).await;

        assert!(refreshed.is_ok());
        let metrics = tracker.metrics("stuck").await.unwrap();
        assert_eq!(metrics, TrackerMetrics::neutral(dec!(0.5)));
    }

    #[tokio::test]
    async fn test_extreme_report_saturates() {
        let strategy = ScriptedStrategy::new("wild");
        *strategy.reported_stats.write().await = Some(StrategyStats {
            current_drawdown: Some(Decimal::MAX),
            max_drawdown: Some(Decimal::MAX),
            ..stats(1, 0, Decimal::MAX)
        });
        let (registry, tracker) = tracked(&strategy, Duration::from_secs(1));

        tracker.refresh(&registry).await;

        let metrics = tracker.metrics("wild").await.unwrap();
        assert_eq!(metrics.avg_profit_per_trade, Decimal::MAX);
        // 0.5 * 1.3 * 1.5
        assert_eq!(metrics.risk_score, dec!(0.975));
        assert_eq!(metrics.performance_score, Decimal::ZERO);

        let mut negative = TrackerMetrics::neutral(dec!(0.5));
        negative.apply(
            &StrategyStats {
                current_drawdown: Some(Decimal::MIN),
                ..stats(u64::MAX, u64::MAX, Decimal::MIN)
            },
            Decimal::MAX,
        );
        assert_eq!(negative.current_drawdown, Decimal::ZERO);
        assert_eq!(negative.risk_score, Decimal::ONE);
        assert!(negative.performance_score >= Decimal::ZERO);
        assert!(negative.performance_score <= dec!(100));
    }
}
