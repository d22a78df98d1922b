use crate::{Bar, NewsArticle, SignalError};
use async_trait::async_trait;

/// Source of OHLCV price history. Implemented by the HTTP quote client and by
/// in-memory fixtures in tests.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily bars for the trailing `days` calendar days, oldest first.
    async fn daily_history(&self, symbol: &str, days: i64) -> Result<Vec<Bar>, SignalError>;

    /// Most recent traded price.
    async fn latest_price(&self, symbol: &str) -> Result<f64, SignalError>;
}

/// Source of recent news articles for a symbol.
#[async_trait]
pub trait NewsProvider: Send + Sync {
    /// Recent articles, newest first. An empty vec is a legitimate "no news"
    /// state; malformed payloads must surface as `MalformedData`.
    async fn recent_articles(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<NewsArticle>, SignalError>;
}
