//! Orchestrator-level statistics derived from per-strategy performance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::tracker::TrackerMetrics;
use crate::utils::{percent_of, safe_div};

/// Full performance record of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    #[serde(flatten)]
    pub metrics: TrackerMetrics,
    pub capital_allocated: Decimal,
    pub last_execution_time: Option<DateTime<Utc>>,
    pub active_trades: u32,
}

/// Aggregated view across all strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorStats {
    pub total_capital: Decimal,
    pub allocated_capital: Decimal,
    pub available_capital: Decimal,
    pub total_profit: Decimal,
    pub total_trades: u64,
    pub active_trades: u64,
    pub best_performing_strategy: Option<String>,
    pub worst_performing_strategy: Option<String>,
    /// Win rate across all trades in percent
    pub overall_win_rate: Decimal,
    /// Return on total capital divided by average risk score
    pub risk_adjusted_return: Decimal,
}

pub struct StatsAggregator;

impl StatsAggregator {
    /// Roll per-strategy records into orchestrator totals.
    ///
    /// Ties for best and worst resolve to the first name in order.
    pub fn aggregate(
        total_capital: Decimal,
        performance: &BTreeMap<String, StrategyPerformance>,
    ) -> OrchestratorStats {
        let decimal_total = |field: fn(&StrategyPerformance) -> Decimal| {
            performance
                .values()
                .map(field)
                .fold(Decimal::ZERO, Decimal::saturating_add)
        };
        let count_total = |field: fn(&StrategyPerformance) -> u64| {
            performance.values().map(field).fold(0u64, u64::saturating_add)
        };

        let allocated_capital = decimal_total(|p| p.capital_allocated);
        let total_profit = decimal_total(|p| p.metrics.total_profit);
        let total_trades = count_total(|p| p.metrics.total_trades);
        let successful_trades = count_total(|p| p.metrics.successful_trades);
        let active_trades = count_total(|p| u64::from(p.active_trades));

        let mut best: Option<(&String, Decimal)> = None;
        let mut worst: Option<(&String, Decimal)> = None;
        for (name, p) in performance {
            let score = p.metrics.performance_score;
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((name, score));
            }
            if worst.map_or(true, |(_, s)| score < s) {
                worst = Some((name, score));
            }
        }

        let overall_win_rate =
            percent_of(Decimal::from(successful_trades), Decimal::from(total_trades));

        let avg_risk = safe_div(
            decimal_total(|p| p.metrics.risk_score),
            Decimal::from(performance.len()),
        );
        let return_ratio = safe_div(total_profit, total_capital);
        let risk_adjusted_return = if avg_risk > Decimal::ZERO {
            safe_div(return_ratio, avg_risk)
        } else {
            return_ratio
        };

        OrchestratorStats {
            total_capital,
            allocated_capital,
            available_capital: total_capital
                .saturating_sub(allocated_capital)
                .max(Decimal::ZERO),
            total_profit,
            total_trades,
            active_trades,
            best_performing_strategy: best.map(|(name, _)| name.clone()),
            worst_performing_strategy: worst.map(|(name, _)| name.clone()),
            overall_win_rate,
            risk_adjusted_return,
        }
    }
}
