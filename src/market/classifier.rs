//! Market condition classification.
//!
//! Maps a provider snapshot onto the small categorical regime used by the
//! allocator and scheduler. The mapping is a total function: every input
//! value has an output.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::provider::MarketAnalysisProvider;
use super::types::{
    AnalysisLiquidity, AnalysisSentiment, AnalysisTrend, AnalysisVolatility, Level,
    MarketAnalysis, MarketCondition, Sentiment, Trend,
};

/// Classify a raw analysis snapshot.
pub fn classify(analysis: &MarketAnalysis) -> MarketCondition {
    MarketCondition {
        trend: map_trend(analysis.trend),
        volatility: map_volatility(analysis.volatility),
        liquidity: map_liquidity(analysis.liquidity),
        sentiment: map_sentiment(analysis.sentiment),
        risk_level: risk_level(analysis),
    }
}

fn map_trend(trend: AnalysisTrend) -> Trend {
    match trend {
        AnalysisTrend::Bullish => Trend::Bull,
        AnalysisTrend::Bearish => Trend::Bear,
        AnalysisTrend::Sideways | AnalysisTrend::Unknown => Trend::Sideways,
    }
}

fn map_volatility(volatility: AnalysisVolatility) -> Level {
    match volatility {
        AnalysisVolatility::Low => Level::Low,
        AnalysisVolatility::Medium => Level::Medium,
        AnalysisVolatility::High | AnalysisVolatility::Extreme => Level::High,
    }
}

fn map_liquidity(liquidity: AnalysisLiquidity) -> Level {
    match liquidity {
        AnalysisLiquidity::Poor => Level::Low,
        AnalysisLiquidity::Fair => Level::Medium,
        AnalysisLiquidity::Good | AnalysisLiquidity::Excellent => Level::High,
    }
}

fn map_sentiment(sentiment: AnalysisSentiment) -> Sentiment {
    match sentiment {
        AnalysisSentiment::Fearful | AnalysisSentiment::Cautious => Sentiment::Bearish,
        AnalysisSentiment::Neutral => Sentiment::Neutral,
        AnalysisSentiment::Optimistic | AnalysisSentiment::Greedy => Sentiment::Bullish,
    }
}

/// Additive risk score: extreme volatility, thin liquidity and low
/// confidence each contribute up to 2 points.
fn risk_level(analysis: &MarketAnalysis) -> Level {
    let volatility_points = match analysis.volatility {
        AnalysisVolatility::Extreme => 2,
        AnalysisVolatility::High => 1,
        AnalysisVolatility::Low | AnalysisVolatility::Medium => 0,
    };

    let liquidity_points = match analysis.liquidity {
        AnalysisLiquidity::Poor => 2,
        AnalysisLiquidity::Fair => 1,
        AnalysisLiquidity::Good | AnalysisLiquidity::Excellent => 0,
    };

    let confidence = analysis.confidence.max(Decimal::ZERO).min(Decimal::ONE);
    let confidence_points = if confidence < dec!(0.3) {
        2
    } else if confidence < dec!(0.7) {
        1
    } else {
        0
    };

    match volatility_points + liquidity_points + confidence_points {
        score if score >= 4 => Level::High,
        score if score >= 2 => Level::Medium,
        _ => Level::Low,
    }
}

/// Pulls analysis from a provider and classifies it, never failing.
pub struct MarketConditionClassifier {
    provider: Arc<dyn MarketAnalysisProvider>,
    analysis_timeout: Duration,
}

impl MarketConditionClassifier {
    pub fn new(provider: Arc<dyn MarketAnalysisProvider>, analysis_timeout: Duration) -> Self {
        Self {
            provider,
            analysis_timeout,
        }
    }

    /// Fetch and classify the current regime.
    ///
    /// Provider failures and timeouts yield [`MarketCondition::conservative`].
    pub async fn refresh(&self) -> MarketCondition {
        match timeout(self.analysis_timeout, self.provider.analyze_market()).await {
            Ok(Ok(analysis)) => {
                let condition = classify(&analysis);
                debug!(
                    %condition,
                    confidence = %analysis.confidence,
                    "Market condition classified"
                );
                condition
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Market analysis failed, using conservative regime");
                MarketCondition::conservative()
            }
            Err(_) => {
                warn!(timeout = ?self.analysis_timeout, "Market analysis timed out, using conservative regime");
                MarketCondition::conservative()
            }
        }
    }
}
