use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use signal_core::{NewsArticle, NewsProvider, SignalError};
use std::time::Duration;

const REQUEST_TIMEOUT_SECS: u64 = 20;
const MAX_ATTEMPTS: u32 = 3;

/// Article shape on the wire
#[derive(Debug, Deserialize)]
struct FeedArticle {
    title: String,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    url: Option<String>,
    published_utc: String,
}

/// Client for the news feed service.
///
/// The feed returning an empty list is a legitimate "no news today" state and
/// comes back as `Ok(vec![])`; a reachable feed returning something that is
/// not an article list is a `MalformedData` error, never a fallback.
#[derive(Clone)]
pub struct NewsFeedClient {
    client: reqwest::Client,
    base_url: String,
}

impl NewsFeedClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self { client, base_url }
    }

    async fn get_with_retry(&self, url: &str) -> Result<reqwest::Response, SignalError> {
        let mut backoff = Duration::from_secs(1);
        let mut last_err = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.client.get(url).send().await {
                Ok(resp) if !resp.status().is_server_error() => return Ok(resp),
                Ok(resp) => last_err = format!("HTTP {}", resp.status()),
                Err(e) => last_err = e.to_string(),
            }

            if attempt < MAX_ATTEMPTS {
                tracing::warn!(
                    "news feed request failed ({}), retry {}/{}",
                    last_err,
                    attempt,
                    MAX_ATTEMPTS - 1
                );
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        Err(SignalError::DataSource(format!(
            "news feed unreachable after {} attempts: {}",
            MAX_ATTEMPTS, last_err
        )))
    }
}

fn parse_articles(symbol: &str, body: &str) -> Result<Vec<NewsArticle>, SignalError> {
    let raw: Vec<FeedArticle> = serde_json::from_str(body).map_err(|e| {
        SignalError::MalformedData(format!("news feed payload for {}: {}", symbol, e))
    })?;

    raw.into_iter()
        .map(|a| {
            let published_utc = DateTime::parse_from_rfc3339(&a.published_utc)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    SignalError::MalformedData(format!(
                        "bad article timestamp '{}' for {}: {}",
                        a.published_utc, symbol, e
                    ))
                })?;
            Ok(NewsArticle {
                title: a.title,
                summary: a.summary,
                url: a.url,
                published_utc,
            })
        })
        .collect()
}

#[async_trait]
impl NewsProvider for NewsFeedClient {
    async fn recent_articles(
        &self,
        symbol: &str,
        limit: u32,
    ) -> Result<Vec<NewsArticle>, SignalError> {
        let url = format!("{}/articles?symbol={}&limit={}", self.base_url, symbol, limit);

        let response = self.get_with_retry(&url).await?;
        if !response.status().is_success() {
            return Err(SignalError::DataSource(format!(
                "news feed returned HTTP {} for {}",
                response.status(),
                symbol
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SignalError::DataSource(e.to_string()))?;

        let articles = parse_articles(symbol, &body)?;
        tracing::debug!("{}: {} articles from feed", symbol, articles.len());
        Ok(articles)
    }
}
