//! Per-strategy configuration and the market applicability rule.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::market::{Level, MarketCondition, RegimeTag};
use crate::utils::saturating_seconds;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 10;

/// How much risk a strategy is allowed to carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTolerance {
    Low,
    #[default]
    Medium,
    High,
}

impl RiskTolerance {
    /// Multiplier applied to the base risk score.
    pub fn multiplier(&self) -> Decimal {
        match self {
            RiskTolerance::Low => dec!(0.7),
            RiskTolerance::Medium => dec!(1.0),
            RiskTolerance::High => dec!(1.5),
        }
    }
}

/// Strategy family, used to scale the base risk score per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyCategory {
    #[default]
    General,
    /// Multi-hop or otherwise complex routing (e.g. triangular arbitrage)
    MultiHop,
    /// Statistical / correlation models
    Statistical,
    /// Stablecoin pairs
    Stablecoin,
}

/// Configuration record for one registered strategy.
///
/// Set at registration and mutable through the admin surface afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Dispatch priority (1-10, higher first)
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Maximum share of total capital this strategy may hold (0-100]
    #[serde(default = "default_max_capital_allocation_percent")]
    pub max_capital_allocation_percent: Decimal,
    #[serde(default)]
    pub risk_tolerance: RiskTolerance,
    #[serde(default = "default_applicable_market_conditions")]
    pub applicable_market_conditions: BTreeSet<RegimeTag>,
    /// Minimum expected profit per opportunity, passed through to the strategy
    #[serde(default)]
    pub min_profit_threshold: Decimal,
    /// Minimum seconds between two dispatches of this strategy
    #[serde(default = "default_cooldown_period_secs")]
    pub cooldown_period_secs: u64,
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: u32,
    #[serde(default)]
    pub category: StrategyCategory,
}

fn default_enabled() -> bool {
    true
}

fn default_priority() -> u8 {
    5
}

fn default_max_capital_allocation_percent() -> Decimal {
    Decimal::new(20, 0) // 20% of total capital
}

fn default_applicable_market_conditions() -> BTreeSet<RegimeTag> {
    [RegimeTag::Bull, RegimeTag::Bear, RegimeTag::Sideways]
        .into_iter()
        .collect()
}

fn default_cooldown_period_secs() -> u64 {
    60
}

fn default_max_concurrent_trades() -> u32 {
    1
}

impl StrategyConfig {
    /// A config with every field at its default.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: default_enabled(),
            priority: default_priority(),
            max_capital_allocation_percent: default_max_capital_allocation_percent(),
            risk_tolerance: RiskTolerance::default(),
            applicable_market_conditions: default_applicable_market_conditions(),
            min_profit_threshold: Decimal::ZERO,
            cooldown_period_secs: default_cooldown_period_secs(),
            max_concurrent_trades: default_max_concurrent_trades(),
            category: StrategyCategory::default(),
        }
    }

    /// Clamp out-of-range fields to the nearest valid value.
    pub fn normalized(mut self) -> Self {
        self.priority = clamp_priority(i64::from(self.priority));
        self.max_capital_allocation_percent =
            clamp_allocation_percent(self.max_capital_allocation_percent);
        self
    }

    pub fn cooldown(&self) -> Duration {
        saturating_seconds(self.cooldown_period_secs)
    }

    /// Whether this strategy may act under `market`.
    ///
    /// The current trend must be declared; a declared `stable` additionally
    /// requires low volatility and a declared `volatile` requires high
    /// volatility. The three checks are independent and ANDed.
    pub fn is_applicable(&self, market: &MarketCondition) -> bool {
        let conditions = &self.applicable_market_conditions;

        let trend_ok = conditions.contains(&RegimeTag::from(market.trend));
        let stable_ok =
            !conditions.contains(&RegimeTag::Stable) || market.volatility == Level::Low;
        let volatile_ok =
            !conditions.contains(&RegimeTag::Volatile) || market.volatility == Level::High;

        trend_ok && stable_ok && volatile_ok
    }
}

/// Clamp an admin-supplied priority into `[1, 10]`.
pub fn clamp_priority(priority: i64) -> u8 {
    priority.clamp(i64::from(MIN_PRIORITY), i64::from(MAX_PRIORITY)) as u8
}

/// Clamp a capital percentage into `(0, 100]`; non-positive inputs become 1%.
pub fn clamp_allocation_percent(percent: Decimal) -> Decimal {
    if percent <= Decimal::ZERO {
        Decimal::ONE
    } else {
        percent.min(dec!(100))
    }
}
