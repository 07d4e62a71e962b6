//! Market regime classification.
//!
//! - `types`: provider snapshot vocabulary and the classified regime
//! - `classifier`: table-driven mapping and the failure-tolerant classifier
//! - `provider`: analysis provider contract plus a scripted provider

mod classifier;
mod provider;
mod types;

pub use classifier::{classify, MarketConditionClassifier};
pub use provider::{MarketAnalysisProvider, SimulatedMarketProvider};
pub use types::{
    AnalysisLiquidity, AnalysisSentiment, AnalysisTrend, AnalysisVolatility, Level,
    MarketAnalysis, MarketCondition, RegimeTag, Sentiment, Trend,
};

#[cfg(test)]
pub use provider::MockMarketAnalysisProvider;
