//! Market analysis provider contract and a scripted provider for paper runs.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::types::{
    AnalysisLiquidity, AnalysisSentiment, AnalysisTrend, AnalysisVolatility, MarketAnalysis,
};

/// Source of raw market analysis snapshots.
///
/// Implementations may fail; the classifier substitutes a conservative
/// regime instead of propagating the error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketAnalysisProvider: Send + Sync {
    /// Produce the latest market analysis snapshot.
    async fn analyze_market(&self) -> anyhow::Result<MarketAnalysis>;
}

/// Provider that replays a fixed script of snapshots, one per call.
pub struct SimulatedMarketProvider {
    script: Vec<MarketAnalysis>,
    cursor: AtomicUsize,
}

impl SimulatedMarketProvider {
    /// Create a provider cycling through `script`.
    pub fn new(script: Vec<MarketAnalysis>) -> Self {
        Self {
            script,
            cursor: AtomicUsize::new(0),
        }
    }

    /// A small cycle through bull, choppy and bear markets.
    pub fn default_cycle() -> Self {
        use rust_decimal_macros::dec;

        Self::new(vec![
            MarketAnalysis {
                trend: AnalysisTrend::Bullish,
                volatility: AnalysisVolatility::Low,
                liquidity: AnalysisLiquidity::Excellent,
                sentiment: AnalysisSentiment::Optimistic,
                confidence: dec!(0.85),
            },
            MarketAnalysis {
                trend: AnalysisTrend::Sideways,
                volatility: AnalysisVolatility::Medium,
                liquidity: AnalysisLiquidity::Good,
                sentiment: AnalysisSentiment::Neutral,
                confidence: dec!(0.6),
            },
            MarketAnalysis {
                trend: AnalysisTrend::Bearish,
                volatility: AnalysisVolatility::Extreme,
                liquidity: AnalysisLiquidity::Fair,
                sentiment: AnalysisSentiment::Fearful,
                confidence: dec!(0.4),
            },
        ])
    }
}

#[async_trait]
impl MarketAnalysisProvider for SimulatedMarketProvider {
    async fn analyze_market(&self) -> anyhow::Result<MarketAnalysis> {
        anyhow::ensure!(!self.script.is_empty(), "simulated market script is empty");
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst) % self.script.len();
        Ok(self.script[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_provider_cycles() {
        let provider = SimulatedMarketProvider::default_cycle();

        let first = provider.analyze_market().await.unwrap();
        let _ = provider.analyze_market().await.unwrap();
        let _ = provider.analyze_market().await.unwrap();
        let fourth = provider.analyze_market().await.unwrap();

        assert_eq!(first.trend, AnalysisTrend::Bullish);
        assert_eq!(first, fourth);
    }

    #[tokio::test]
    async fn test_empty_script_fails() {
        let provider = SimulatedMarketProvider::new(Vec::new());
        assert!(provider.analyze_market().await.is_err());
    }
}
