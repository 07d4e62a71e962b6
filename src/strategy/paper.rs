//! Paper strategy for simulation and testing.
//!
//! Simulates one trade per successful dispatch with a deterministic win
//! pattern, and can play any of the three execution capabilities. Stats are
//! reported as a loosely typed JSON record and decoded like any plugin's.

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::stats::StrategyStats;
use super::traits::{
    CapabilityKind, ExecutionCapability, ExecutionReport, OpportunityScanner, Opportunity,
    RunningState, Strategy, TradeExecutor,
};

/// Notional capital the paper ledger measures drawdown against.
const PAPER_NOTIONAL: Decimal = dec!(1000);

/// Simulated trade ledger.
#[derive(Debug, Clone, Default)]
struct PaperLedger {
    total_trades: u64,
    successful_trades: u64,
    total_profit: Decimal,
    peak_profit: Decimal,
    current_drawdown: Decimal,
    max_drawdown: Decimal,
}

/// Deterministic paper-trading strategy.
pub struct PaperStrategy {
    name: String,
    /// Share of simulated trades that win (0-100)
    win_rate_pct: u32,
    profit_per_win: Decimal,
    loss_per_trade: Decimal,
    running: AtomicBool,
    ledger: Mutex<PaperLedger>,
}

impl PaperStrategy {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_edge(name, 60, dec!(10), dec!(5))
    }

    pub fn with_edge(
        name: impl Into<String>,
        win_rate_pct: u32,
        profit_per_win: Decimal,
        loss_per_trade: Decimal,
    ) -> Self {
        Self {
            name: name.into(),
            win_rate_pct: win_rate_pct.min(100),
            profit_per_win,
            loss_per_trade,
            running: AtomicBool::new(false),
            ledger: Mutex::new(PaperLedger::default()),
        }
    }

    /// Declare this strategy with the given capability.
    pub fn capability(self: &Arc<Self>, kind: CapabilityKind) -> ExecutionCapability {
        match kind {
            CapabilityKind::Scanner => ExecutionCapability::Scanner(self.clone()),
            CapabilityKind::Executor => ExecutionCapability::Executor(self.clone()),
            CapabilityKind::SelfStarting => ExecutionCapability::SelfStarting(self.clone()),
        }
    }

    /// Raw stats record in the shape simple plugins emit.
    pub fn report(&self) -> Value {
        let ledger = match self.ledger.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };

        json!({
            "executedTrades": ledger.total_trades,
            "successfulTrades": ledger.successful_trades,
            "totalProfit": ledger.total_profit.to_string(),
            "avgExecutionTime": 250,
            "activeTrades": 0,
            "currentDrawdown": ledger.current_drawdown.to_string(),
            "maxDrawdown": ledger.max_drawdown.to_string(),
        })
    }

    /// Record one simulated trade and return its profit.
    fn simulate_trade(&self) -> Decimal {
        let mut ledger = match self.ledger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let n = ledger.total_trades + 1;
        let rate = u64::from(self.win_rate_pct);
        let is_win = n * rate / 100 > (n - 1) * rate / 100;

        let profit = if is_win {
            self.profit_per_win
        } else {
            -self.loss_per_trade
        };

        ledger.total_trades = n;
        if is_win {
            ledger.successful_trades += 1;
        }
        ledger.total_profit += profit;

        if ledger.total_profit > ledger.peak_profit {
            ledger.peak_profit = ledger.total_profit;
        }
        ledger.current_drawdown =
            (ledger.peak_profit - ledger.total_profit) / PAPER_NOTIONAL * dec!(100);
        ledger.max_drawdown = ledger.max_drawdown.max(ledger.current_drawdown);

        debug!(strategy = %self.name, trade = n, %profit, "Paper trade simulated");
        profit
    }
}

#[async_trait]
impl Strategy for PaperStrategy {
    async fn start(&self) -> anyhow::Result<()> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn stats(&self) -> anyhow::Result<StrategyStats> {
        Ok(StrategyStats::from_json(&self.report()))
    }
}

#[async_trait]
impl OpportunityScanner for PaperStrategy {
    async fn scan(&self) -> anyhow::Result<Vec<Opportunity>> {
        let profit = self.simulate_trade();
        Ok(vec![Opportunity {
            id: format!("{}-{}", self.name, chrono::Utc::now().timestamp_millis()),
            expected_profit: profit,
        }])
    }
}

#[async_trait]
impl TradeExecutor for PaperStrategy {
    async fn execute(&self) -> anyhow::Result<Option<ExecutionReport>> {
        let profit = self.simulate_trade();
        Ok(Some(ExecutionReport {
            description: format!("{} paper trade", self.name),
            profit: Some(profit),
        }))
    }
}

impl RunningState for PaperStrategy {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_win_pattern_matches_rate() {
        let paper = PaperStrategy::with_edge("p", 75, dec!(10), dec!(5));
        for _ in 0..8 {
            paper.execute().await.unwrap();
        }

        let stats = paper.stats().await.unwrap();
        assert_eq!(stats.total_trades, Some(8));
        assert_eq!(stats.successful_trades, Some(6));
        // 6 wins * 10 - 2 losses * 5
        assert_eq!(stats.total_profit, Some(dec!(50)));
        assert_eq!(stats.avg_execution_time, Some(dec!(250)));
        assert_eq!(stats.active_trades, Some(0));
    }

    #[tokio::test]
    async fn test_report_uses_executed_trades_key() {
        let paper = PaperStrategy::with_edge("p", 50, dec!(10), dec!(5));
        paper.execute().await.unwrap();
        paper.execute().await.unwrap();

        let report = paper.report();
        assert_eq!(report["executedTrades"], 2);
        assert!(report.get("totalTrades").is_none());
        assert_eq!(report["totalProfit"], "5");

        // decoded through the alias
        assert_eq!(paper.stats().await.unwrap().total_trades, Some(2));
    }

    #[tokio::test]
    async fn test_drawdown_tracks_peak() {
        let paper = PaperStrategy::with_edge("p", 0, dec!(10), dec!(5));
        paper.scan().await.unwrap();
        paper.scan().await.unwrap();

        let stats = paper.stats().await.unwrap();
        assert_eq!(stats.total_profit, Some(dec!(-10)));
        // 10 below peak on a 1000 notional
        assert_eq!(stats.current_drawdown, Some(dec!(1)));
        assert_eq!(stats.max_drawdown, Some(dec!(1)));
    }

    #[tokio::test]
    async fn test_start_stop_idempotent() {
        let paper = PaperStrategy::new("p");
        paper.start().await.unwrap();
        paper.start().await.unwrap();
        assert!(paper.is_running());

        paper.stop().await.unwrap();
        paper.stop().await.unwrap();
        assert!(!paper.is_running());
    }
}
