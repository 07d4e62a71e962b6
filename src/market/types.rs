//! Market analysis input and the classified regime shared by every component.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// Raw analysis snapshot (provider vocabulary)
// =============================================================================

/// Trend reported by the market analysis provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTrend {
    Bullish,
    Bearish,
    Sideways,
    /// Anything the provider could not classify, including unrecognised labels.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisVolatility {
    Low,
    Medium,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisLiquidity {
    Poor,
    Fair,
    Good,
    Excellent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSentiment {
    Fearful,
    Cautious,
    Neutral,
    Optimistic,
    Greedy,
}

/// Snapshot returned by a [`MarketAnalysisProvider`](super::MarketAnalysisProvider).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketAnalysis {
    pub trend: AnalysisTrend,
    pub volatility: AnalysisVolatility,
    pub liquidity: AnalysisLiquidity,
    pub sentiment: AnalysisSentiment,
    /// Provider confidence (0.0-1.0)
    pub confidence: Decimal,
}

// =============================================================================
// Classified regime (orchestrator vocabulary)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Bull,
    Bear,
    Sideways,
}

/// Three-step scale used for volatility, liquidity and risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Bullish,
    Bearish,
    Neutral,
}

/// The current market regime.
///
/// Overwritten as a whole on every classifier tick; never partially updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCondition {
    pub trend: Trend,
    pub volatility: Level,
    pub liquidity: Level,
    pub sentiment: Sentiment,
    pub risk_level: Level,
}

impl MarketCondition {
    /// Regime assumed when market analysis is unavailable.
    pub const fn conservative() -> Self {
        Self {
            trend: Trend::Sideways,
            volatility: Level::Medium,
            liquidity: Level::Medium,
            sentiment: Sentiment::Neutral,
            risk_level: Level::Medium,
        }
    }
}

impl Default for MarketCondition {
    fn default() -> Self {
        Self::conservative()
    }
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trend={:?} volatility={:?} liquidity={:?} sentiment={:?} risk={:?}",
            self.trend, self.volatility, self.liquidity, self.sentiment, self.risk_level
        )
    }
}

/// Market conditions a strategy can declare itself applicable to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeTag {
    Bull,
    Bear,
    Sideways,
    Volatile,
    Stable,
}

impl From<Trend> for RegimeTag {
    fn from(trend: Trend) -> Self {
        match trend {
            Trend::Bull => RegimeTag::Bull,
            Trend::Bear => RegimeTag::Bear,
            Trend::Sideways => RegimeTag::Sideways,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conservative_default() {
        let condition = MarketCondition::default();
        assert_eq!(condition.trend, Trend::Sideways);
        assert_eq!(condition.volatility, Level::Medium);
        assert_eq!(condition.liquidity, Level::Medium);
        assert_eq!(condition.sentiment, Sentiment::Neutral);
        assert_eq!(condition.risk_level, Level::Medium);
    }

    #[test]
    fn test_unrecognised_trend_deserializes_as_unknown() {
        let analysis: MarketAnalysis = serde_json::from_str(
            r#"{"trend":"parabolic","volatility":"low","liquidity":"good","sentiment":"greedy","confidence":0.9}"#,
        )
        .unwrap();
        assert_eq!(analysis.trend, AnalysisTrend::Unknown);
    }
}
