use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use signal_core::{Bar, MarketDataProvider, SignalError};
use std::time::Duration as StdDuration;

const DEFAULT_BASE_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_ATTEMPTS: u32 = 3;

/// HTTP client for the quote provider's chart API.
///
/// Handles `.AX` symbols the same as any other; every request carries an
/// explicit timeout and failures are retried a bounded number of times with
/// doubling backoff before surfacing a `DataSource` error.
#[derive(Clone)]
pub struct QuoteClient {
    client: reqwest::Client,
    base_url: String,
}

impl QuoteClient {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL.to_string())
    }

    /// Point the client at a different chart endpoint (tests, mirrors).
    pub fn with_base_url(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url }
    }

    /// GET with bounded retry. Transport errors and 5xx responses are retried;
    /// anything else is returned to the caller for inspection.
    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, SignalError> {
        let mut backoff = StdDuration::from_secs(1);
        let mut last_err = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.get(url).send().await {
                Ok(resp) if !resp.status().is_server_error() => return Ok(resp),
                Ok(resp) => {
                    last_err = format!("HTTP {}", resp.status());
                }
                Err(e) => {
                    last_err = e.to_string();
                }
            }

            if attempt < MAX_ATTEMPTS {
                tracing::warn!(
                    "quote request failed ({}), retry {}/{} in {:?}",
                    last_err,
                    attempt,
                    MAX_ATTEMPTS - 1,
                    backoff
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(SignalError::DataSource(format!(
            "quote provider unreachable after {} attempts: {}",
            MAX_ATTEMPTS, last_err
        )))
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Bar>, SignalError> {
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url,
            symbol,
            from.timestamp(),
            to.timestamp()
        );

        let response = self.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(SignalError::DataSource(format!(
                "quote provider returned HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SignalError::MalformedData(format!("chart payload for {}: {}", symbol, e)))?;

        parse_chart(symbol, &json)
    }
}

impl Default for QuoteClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the provider's chart response into bars, dropping rows with null
/// fields rather than zero-filling them.
fn parse_chart(symbol: &str, json: &serde_json::Value) -> Result<Vec<Bar>, SignalError> {
    let chart = json
        .get("chart")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| {
            SignalError::MalformedData(format!("no chart result for {}", symbol))
        })?;

    let timestamps = chart
        .get("timestamp")
        .and_then(|v| v.as_array())
        .ok_or_else(|| SignalError::MalformedData(format!("no timestamps for {}", symbol)))?;

    let quote = chart
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| SignalError::MalformedData(format!("no quote block for {}", symbol)))?;

    let field = |name: &str| -> Result<&Vec<serde_json::Value>, SignalError> {
        quote
            .get(name)
            .and_then(|v| v.as_array())
            .ok_or_else(|| SignalError::MalformedData(format!("no {} series for {}", name, symbol)))
    };

    let opens = field("open")?;
    let highs = field("high")?;
    let lows = field("low")?;
    let closes = field("close")?;
    let volumes = field("volume")?;

    let mut bars = Vec::with_capacity(timestamps.len());
    for i in 0..timestamps.len() {
        if let (Some(ts), Some(o), Some(h), Some(l), Some(c), Some(v)) = (
            timestamps[i].as_i64(),
            opens.get(i).and_then(|v| v.as_f64()),
            highs.get(i).and_then(|v| v.as_f64()),
            lows.get(i).and_then(|v| v.as_f64()),
            closes.get(i).and_then(|v| v.as_f64()),
            volumes.get(i).and_then(|v| v.as_f64()),
        ) {
            let timestamp = DateTime::from_timestamp(ts, 0).ok_or_else(|| {
                SignalError::MalformedData(format!("invalid timestamp {} for {}", ts, symbol))
            })?;
            bars.push(Bar {
                timestamp,
                open: o,
                high: h,
                low: l,
                close: c,
                volume: v,
            });
        }
    }

    Ok(bars)
}

#[async_trait]
impl MarketDataProvider for QuoteClient {
    async fn daily_history(&self, symbol: &str, days: i64) -> Result<Vec<Bar>, SignalError> {
        let now = Utc::now();
        let bars = self.fetch_chart(symbol, now - Duration::days(days), now).await?;
        tracing::debug!("{}: {} daily bars fetched", symbol, bars.len());
        Ok(bars)
    }

    async fn latest_price(&self, symbol: &str) -> Result<f64, SignalError> {
        let now = Utc::now();
        let bars = self.fetch_chart(symbol, now - Duration::days(7), now).await?;
        bars.last()
            .map(|b| b.close)
            .ok_or_else(|| SignalError::InsufficientData(format!("no recent bars for {}", symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart_json() -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "timestamp": [1_700_000_000i64, 1_700_086_400i64, 1_700_172_800i64],
                    "indicators": {
                        "quote": [{
                            "open":   [100.0, 101.0, null],
                            "high":   [102.0, 103.0, 104.0],
                            "low":    [ 99.0, 100.0, 101.0],
                            "close":  [101.0, 102.0, 103.0],
                            "volume": [1e6, 1.1e6, 0.9e6]
                        }]
                    }
                }]
            }
        })
    }

    #[test]
    fn test_parse_chart_drops_null_rows() {
        let bars = parse_chart("CBA.AX", &chart_json()).unwrap();
        // Third row has a null open and must be dropped, not zero-filled
        assert_eq!(bars.len(), 2);
        assert!((bars[0].close - 101.0).abs() < 1e-9);
        assert!((bars[1].close - 102.0).abs() < 1e-9);
    }

    #[test]
    fn test_parse_chart_malformed_is_typed() {
        let err = parse_chart("CBA.AX", &json!({"chart": {}})).unwrap_err();
        assert!(matches!(err, SignalError::MalformedData(_)));
    }

    #[test]
    fn test_parse_chart_missing_series() {
        let json = json!({
            "chart": {"result": [{
                "timestamp": [1_700_000_000i64],
                "indicators": {"quote": [{"open": [1.0]}]}
            }]}
        });
        let err = parse_chart("WBC.AX", &json).unwrap_err();
        assert!(matches!(err, SignalError::MalformedData(_)));
    }
}
