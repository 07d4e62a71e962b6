//! Configuration management for the strategy orchestrator.
//!
//! Loads settings from environment variables and config files.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use crate::market::RegimeTag;
use crate::strategy::{CapabilityKind, RiskTolerance, StrategyCategory, StrategyConfig};
use crate::utils::saturating_seconds;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Loop intervals, cooldowns and capital
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    /// Capital allocation weights and caps
    #[serde(default)]
    pub allocation: AllocationConfig,
    /// Risk scoring parameters
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// SQLite snapshot settings
    #[serde(default)]
    pub persistence: PersistenceConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Strategies run by the paper deployment
    #[serde(default = "default_paper_strategies")]
    pub strategies: Vec<PaperStrategyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Scheduler tick interval in seconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Market classifier interval in seconds
    #[serde(default = "default_classifier_interval")]
    pub classifier_interval_secs: u64,
    /// Performance tracker interval in seconds
    #[serde(default = "default_tracker_interval")]
    pub tracker_interval_secs: u64,
    /// Capital rebalance interval in seconds (checked inside the scheduler tick)
    #[serde(default = "default_rebalance_interval")]
    pub rebalance_interval_secs: u64,
    /// Minimum seconds between any two dispatches
    #[serde(default = "default_global_cooldown")]
    pub global_cooldown_secs: u64,
    /// Upper bound on a single dispatch call in seconds
    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,
    /// Upper bound on each warmup and strategy start() in seconds
    #[serde(default = "default_start_timeout")]
    pub start_timeout_secs: u64,
    /// Upper bound on a single strategy stop() in seconds
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_secs: u64,
    /// Try the next strategy in the same tick after a failed dispatch
    #[serde(default)]
    pub fallthrough_on_failure: bool,
    /// Zero the allocation of strategies that are not applicable on a rebalance
    #[serde(default)]
    pub zero_inapplicable_allocations: bool,
    /// Initial total capital in base currency
    #[serde(default = "default_total_capital")]
    pub total_capital: Decimal,
    /// Floor applied when total capital is set
    #[serde(default = "default_min_total_capital")]
    pub min_total_capital: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// Maximum share of total capital allocated across all strategies (0.0-1.0)
    #[serde(default = "default_max_utilization")]
    pub max_utilization: Decimal,
    /// Share of total capital a perfect score earns before adjustments
    #[serde(default = "default_base_share")]
    pub base_share: Decimal,
    /// Per-strategy floor as a share of total capital
    #[serde(default = "default_min_share")]
    pub min_share: Decimal,
    /// Weight of performance score in the ranking
    #[serde(default = "default_performance_weight")]
    pub performance_weight: Decimal,
    /// Weight of priority (x10) in the ranking
    #[serde(default = "default_priority_weight")]
    pub priority_weight: Decimal,
    /// Win rate (percent) above which allocation is boosted
    #[serde(default = "default_high_win_rate")]
    pub high_win_rate: Decimal,
    /// Win rate (percent) below which allocation is cut
    #[serde(default = "default_low_win_rate")]
    pub low_win_rate: Decimal,
    #[serde(default = "default_high_win_rate_boost")]
    pub high_win_rate_boost: Decimal,
    #[serde(default = "default_low_win_rate_penalty")]
    pub low_win_rate_penalty: Decimal,
    /// Allocation discount per unit of risk score
    #[serde(default = "default_risk_discount")]
    pub risk_discount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Risk score of a medium-tolerance general strategy
    #[serde(default = "default_base_risk")]
    pub base_risk: Decimal,
    #[serde(default = "default_general_multiplier")]
    pub general_multiplier: Decimal,
    #[serde(default = "default_multi_hop_multiplier")]
    pub multi_hop_multiplier: Decimal,
    #[serde(default = "default_statistical_multiplier")]
    pub statistical_multiplier: Decimal,
    #[serde(default = "default_stablecoin_multiplier")]
    pub stablecoin_multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_persistence_enabled")]
    pub enabled: bool,
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Seconds between stats snapshots
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
    /// Most recent snapshots kept; older ones are pruned after each write
    #[serde(default = "default_keep_snapshots")]
    pub keep_snapshots: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_directory")]
    pub directory: String,
    #[serde(default = "default_log_file_prefix")]
    pub file_prefix: String,
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

/// A paper strategy and the capability it is dispatched through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperStrategyConfig {
    #[serde(flatten)]
    pub strategy: StrategyConfig,
    pub capability: CapabilityKind,
    /// Share of simulated trades that win (0-100)
    #[serde(default = "default_paper_win_rate")]
    pub win_rate_pct: u32,
    #[serde(default = "default_paper_profit_per_win")]
    pub profit_per_win: Decimal,
    #[serde(default = "default_paper_loss_per_trade")]
    pub loss_per_trade: Decimal,
}

// Default value functions
fn default_tick_interval() -> u64 {
    30
}

fn default_classifier_interval() -> u64 {
    60
}

fn default_tracker_interval() -> u64 {
    30
}

fn default_rebalance_interval() -> u64 {
    300 // 5 minutes
}

fn default_global_cooldown() -> u64 {
    15
}

fn default_dispatch_timeout() -> u64 {
    20
}

fn default_start_timeout() -> u64 {
    30
}

fn default_stop_timeout() -> u64 {
    10
}

fn default_total_capital() -> Decimal {
    Decimal::new(10_000, 0)
}

fn default_min_total_capital() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_max_utilization() -> Decimal {
    Decimal::new(90, 2) // 0.90
}

fn default_base_share() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

fn default_min_share() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_performance_weight() -> Decimal {
    Decimal::new(7, 1) // 0.7
}

fn default_priority_weight() -> Decimal {
    Decimal::new(3, 1) // 0.3
}

fn default_high_win_rate() -> Decimal {
    Decimal::new(70, 0)
}

fn default_low_win_rate() -> Decimal {
    Decimal::new(30, 0)
}

fn default_high_win_rate_boost() -> Decimal {
    Decimal::new(13, 1) // 1.3x
}

fn default_low_win_rate_penalty() -> Decimal {
    Decimal::new(7, 1) // 0.7x
}

fn default_risk_discount() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_base_risk() -> Decimal {
    Decimal::new(5, 1) // 0.5
}

fn default_general_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_multi_hop_multiplier() -> Decimal {
    Decimal::new(12, 1) // 1.2x for multi-leg routes
}

fn default_statistical_multiplier() -> Decimal {
    Decimal::new(11, 1) // 1.1x for model risk
}

fn default_stablecoin_multiplier() -> Decimal {
    Decimal::new(8, 1) // 0.8x for pegged pairs
}

fn default_persistence_enabled() -> bool {
    true
}

fn default_db_path() -> String {
    "data/orchestrator.db".to_string()
}

fn default_snapshot_interval() -> u64 {
    300
}

fn default_keep_snapshots() -> u64 {
    2016 // one week at the default interval
}

fn default_log_directory() -> String {
    "logs".to_string()
}

fn default_log_file_prefix() -> String {
    "orchestrator.log".to_string()
}

fn default_paper_win_rate() -> u32 {
    60
}

fn default_paper_profit_per_win() -> Decimal {
    Decimal::new(10, 0)
}

fn default_paper_loss_per_trade() -> Decimal {
    Decimal::new(6, 0)
}

fn default_paper_strategies() -> Vec<PaperStrategyConfig> {
    let tags = |list: &[RegimeTag]| list.iter().copied().collect::<BTreeSet<_>>();

    vec![
        PaperStrategyConfig {
            strategy: StrategyConfig {
                priority: 8,
                max_capital_allocation_percent: Decimal::new(25, 0),
                category: StrategyCategory::MultiHop,
                cooldown_period_secs: 60,
                applicable_market_conditions: tags(&[
                    RegimeTag::Bull,
                    RegimeTag::Bear,
                    RegimeTag::Sideways,
                ]),
                ..StrategyConfig::new("triangular-arbitrage")
            },
            capability: CapabilityKind::Scanner,
            win_rate_pct: 70,
            profit_per_win: Decimal::new(12, 0),
            loss_per_trade: Decimal::new(8, 0),
        },
        PaperStrategyConfig {
            strategy: StrategyConfig {
                priority: 6,
                max_capital_allocation_percent: Decimal::new(20, 0),
                risk_tolerance: RiskTolerance::Low,
                category: StrategyCategory::Stablecoin,
                cooldown_period_secs: 120,
                applicable_market_conditions: tags(&[RegimeTag::Sideways, RegimeTag::Stable]),
                ..StrategyConfig::new("stablecoin-spread")
            },
            capability: CapabilityKind::Executor,
            win_rate_pct: 85,
            profit_per_win: Decimal::new(3, 0),
            loss_per_trade: Decimal::new(2, 0),
        },
        PaperStrategyConfig {
            strategy: StrategyConfig {
                priority: 4,
                max_capital_allocation_percent: Decimal::new(15, 0),
                risk_tolerance: RiskTolerance::High,
                category: StrategyCategory::Statistical,
                cooldown_period_secs: 300,
                applicable_market_conditions: tags(&[
                    RegimeTag::Bull,
                    RegimeTag::Bear,
                    RegimeTag::Volatile,
                ]),
                ..StrategyConfig::new("volatility-breakout")
            },
            capability: CapabilityKind::SelfStarting,
            win_rate_pct: 45,
            profit_per_win: Decimal::new(25, 0),
            loss_per_trade: Decimal::new(15, 0),
        },
    ]
}

impl OrchestratorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn classifier_interval(&self) -> Duration {
        Duration::from_secs(self.classifier_interval_secs)
    }

    pub fn tracker_interval(&self) -> Duration {
        Duration::from_secs(self.tracker_interval_secs)
    }

    pub fn rebalance_interval(&self) -> chrono::Duration {
        saturating_seconds(self.rebalance_interval_secs)
    }

    pub fn global_cooldown(&self) -> chrono::Duration {
        saturating_seconds(self.global_cooldown_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl ScoringConfig {
    /// Risk multiplier for a strategy category.
    pub fn category_multiplier(&self, category: StrategyCategory) -> Decimal {
        match category {
            StrategyCategory::General => self.general_multiplier,
            StrategyCategory::MultiHop => self.multi_hop_multiplier,
            StrategyCategory::Statistical => self.statistical_multiplier,
            StrategyCategory::Stablecoin => self.stablecoin_multiplier,
        }
    }
}

impl Config {
    /// Load configuration from environment variables and config files.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("ORCH"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        let o = &self.orchestrator;

        anyhow::ensure!(
            o.tick_interval_secs > 0
                && o.classifier_interval_secs > 0
                && o.tracker_interval_secs > 0
                && o.rebalance_interval_secs > 0,
            "loop intervals must be positive"
        );

        anyhow::ensure!(
            o.dispatch_timeout_secs > 0 && o.start_timeout_secs > 0 && o.stop_timeout_secs > 0,
            "dispatch, start and stop timeouts must be positive"
        );

        anyhow::ensure!(
            o.min_total_capital > Decimal::ZERO,
            "min_total_capital must be positive"
        );

        anyhow::ensure!(
            self.allocation.max_utilization > Decimal::ZERO
                && self.allocation.max_utilization <= Decimal::ONE,
            "max_utilization must be between 0 and 1"
        );

        anyhow::ensure!(
            self.allocation.min_share >= Decimal::ZERO
                && self.allocation.min_share <= self.allocation.max_utilization,
            "min_share must be between 0 and max_utilization"
        );

        let mut names = HashSet::new();
        for paper in &self.strategies {
            anyhow::ensure!(
                names.insert(paper.strategy.name.as_str()),
                "duplicate strategy name: {}",
                paper.strategy.name
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            orchestrator: OrchestratorConfig::default(),
            allocation: AllocationConfig::default(),
            scoring: ScoringConfig::default(),
            persistence: PersistenceConfig::default(),
            logging: LoggingConfig::default(),
            strategies: default_paper_strategies(),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            classifier_interval_secs: default_classifier_interval(),
            tracker_interval_secs: default_tracker_interval(),
            rebalance_interval_secs: default_rebalance_interval(),
            global_cooldown_secs: default_global_cooldown(),
            dispatch_timeout_secs: default_dispatch_timeout(),
            start_timeout_secs: default_start_timeout(),
            stop_timeout_secs: default_stop_timeout(),
            fallthrough_on_failure: false,
            zero_inapplicable_allocations: false,
            total_capital: default_total_capital(),
            min_total_capital: default_min_total_capital(),
        }
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_utilization: default_max_utilization(),
            base_share: default_base_share(),
            min_share: default_min_share(),
            performance_weight: default_performance_weight(),
            priority_weight: default_priority_weight(),
            high_win_rate: default_high_win_rate(),
            low_win_rate: default_low_win_rate(),
            high_win_rate_boost: default_high_win_rate_boost(),
            low_win_rate_penalty: default_low_win_rate_penalty(),
            risk_discount: default_risk_discount(),
        }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_risk: default_base_risk(),
            general_multiplier: default_general_multiplier(),
            multi_hop_multiplier: default_multi_hop_multiplier(),
            statistical_multiplier: default_statistical_multiplier(),
            stablecoin_multiplier: default_stablecoin_multiplier(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: default_persistence_enabled(),
            db_path: default_db_path(),
            snapshot_interval_secs: default_snapshot_interval(),
            keep_snapshots: default_keep_snapshots(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            file_prefix: default_log_file_prefix(),
            json: false,
        }
    }
}
