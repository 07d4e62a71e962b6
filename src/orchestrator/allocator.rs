//! Capital allocation across competing strategies.
//!
//! Each rebalance ranks enabled strategies by a blend of performance and
//! priority, sizes each one from its score, win rate and risk, then fits
//! the result under the per-strategy and global caps.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::AllocationConfig;
use crate::utils::fraction_of;

/// Everything the allocator needs to know about one strategy.
#[derive(Debug, Clone)]
pub struct AllocationCandidate {
    pub name: String,
    pub enabled: bool,
    /// Applicable to the current market condition
    pub applicable: bool,
    pub priority: u8,
    pub performance_score: Decimal,
    pub win_rate: Decimal,
    pub risk_score: Decimal,
    pub max_capital_allocation_percent: Decimal,
    /// Allocation left by the previous pass
    pub previous: Decimal,
}

/// Ranking key: performance blended with priority on the same 0-100 scale.
pub fn combined_score(candidate: &AllocationCandidate, config: &AllocationConfig) -> Decimal {
    candidate.performance_score * config.performance_weight
        + Decimal::from(candidate.priority) * Decimal::TEN * config.priority_weight
}

/// Allocation a strategy earns before caps, floored at `min_share`.
pub fn raw_allocation(
    candidate: &AllocationCandidate,
    total_capital: Decimal,
    config: &AllocationConfig,
) -> Decimal {
    let mut raw = (candidate.performance_score / Decimal::ONE_HUNDRED)
        .saturating_mul(total_capital.saturating_mul(config.base_share));

    if candidate.win_rate > config.high_win_rate {
        raw = raw.saturating_mul(config.high_win_rate_boost);
    } else if candidate.win_rate < config.low_win_rate {
        raw = raw.saturating_mul(config.low_win_rate_penalty);
    }

    raw = raw.saturating_mul(Decimal::ONE - candidate.risk_score * config.risk_discount);

    raw.max(total_capital.saturating_mul(config.min_share))
}

/// Compute a full allocation map.
///
/// Disabled strategies get zero. Inapplicable strategies keep their previous
/// allocation (clamped to the caps) unless `zero_inapplicable` is set, and
/// that stale amount is reserved before the ranked pass so the global cap
/// always holds.
pub fn allocate(
    candidates: &[AllocationCandidate],
    total_capital: Decimal,
    config: &AllocationConfig,
    zero_inapplicable: bool,
) -> HashMap<String, Decimal> {
    let budget = total_capital.saturating_mul(config.max_utilization);
    let mut allocations = HashMap::with_capacity(candidates.len());
    let mut running_total = Decimal::ZERO;

    let mut ranked: Vec<&AllocationCandidate> = candidates.iter().filter(|c| c.enabled).collect();
    ranked.sort_by(|a, b| combined_score(b, config).cmp(&combined_score(a, config)));

    for candidate in candidates.iter().filter(|c| !c.enabled) {
        allocations.insert(candidate.name.clone(), Decimal::ZERO);
    }

    for candidate in ranked.iter().filter(|c| !c.applicable) {
        let kept = if zero_inapplicable {
            Decimal::ZERO
        } else {
            let per_strategy_cap =
                fraction_of(candidate.max_capital_allocation_percent, total_capital);
            candidate
                .previous
                .min(per_strategy_cap)
                .min((budget - running_total).max(Decimal::ZERO))
                .max(Decimal::ZERO)
        };

        debug!(strategy = %candidate.name, kept = %kept, "Not applicable, allocation left as is");
        running_total = running_total.saturating_add(kept);
        allocations.insert(candidate.name.clone(), kept);
    }

    for candidate in ranked.iter().filter(|c| c.applicable) {
        let raw = raw_allocation(candidate, total_capital, config);
        let per_strategy_cap = fraction_of(candidate.max_capital_allocation_percent, total_capital);
        let mut cap = raw.min(per_strategy_cap);

        if running_total.saturating_add(cap) > budget {
            cap = (budget - running_total).max(Decimal::ZERO);
        }

        debug!(
            strategy = %candidate.name,
            score = %combined_score(candidate, config).round_dp(2),
            raw = %raw.round_dp(2),
            allocated = %cap.round_dp(2),
            "Capital allocated"
        );

        running_total = running_total.saturating_add(cap);
        allocations.insert(candidate.name.clone(), cap);
    }

    allocations
}

/// Owns `capital_allocated` for every strategy.
pub struct CapitalAllocator {
    config: AllocationConfig,
    zero_inapplicable: bool,
    allocations: RwLock<HashMap<String, Decimal>>,
    last_rebalance: RwLock<Option<DateTime<Utc>>>,
}

impl CapitalAllocator {
    pub fn new(config: AllocationConfig, zero_inapplicable: bool) -> Self {
        Self {
            config,
            zero_inapplicable,
            allocations: RwLock::new(HashMap::new()),
            last_rebalance: RwLock::new(None),
        }
    }

    /// Whether `interval` has elapsed since the last pass (or none has run).
    pub async fn is_due(&self, now: DateTime<Utc>, interval: chrono::Duration) -> bool {
        match *self.last_rebalance.read().await {
            Some(last) => now - last >= interval,
            None => true,
        }
    }

    /// Recompute and store every allocation.
    pub async fn rebalance(
        &self,
        candidates: &[AllocationCandidate],
        total_capital: Decimal,
        now: DateTime<Utc>,
    ) -> HashMap<String, Decimal> {
        let allocations = allocate(candidates, total_capital, &self.config, self.zero_inapplicable);
        let allocated: Decimal = allocations.values().copied().sum();

        *self.allocations.write().await = allocations.clone();
        *self.last_rebalance.write().await = Some(now);

        info!(
            %total_capital,
            allocated = %allocated.round_dp(2),
            strategies = allocations.values().filter(|a| **a > Decimal::ZERO).count(),
            "⚖️ [REBALANCE] Capital reallocated"
        );

        allocations
    }

    pub async fn snapshot(&self) -> HashMap<String, Decimal> {
        self.allocations.read().await.clone()
    }
}
