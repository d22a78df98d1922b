use chrono::Utc;
use market_data::QuoteClient;
use news_feed::NewsFeedClient;
use outcome_predictor::{build_feature_vector, OutcomeModel};
use persistence::{MorningWrite, SignalStore, WriteOutcome};
use sentiment_analysis::SentimentAnalysisEngine;
use signal_core::{
    MarketDataProvider, NewsProvider, PredictionRecord, PredictionStatus, SignalAction,
    SignalConfig, SignalError,
};
use technical_analysis::TechnicalAnalysisEngine;
use tracing::{debug, info, warn};

use crate::lock::JobLock;
use crate::PipelineOptions;

/// Calendar days of history fetched per symbol. Enough to cover the long SMA
/// window across weekends and holidays.
const HISTORY_DAYS: i64 = 120;
const NEWS_LIMIT: u32 = 20;

/// Everything one morning batch needs. The data sources come in as trait
/// objects so in-memory fixtures can stand in for the HTTP clients.
struct MorningContext<'a> {
    market: &'a dyn MarketDataProvider,
    news: Option<&'a dyn NewsProvider>,
    technical: &'a TechnicalAnalysisEngine,
    sentiment: &'a SentimentAnalysisEngine,
    model: Option<&'a OutcomeModel>,
    store: &'a SignalStore,
    config: &'a SignalConfig,
    dry_run: bool,
}

#[derive(Debug, Default)]
struct BatchSummary {
    buys: usize,
    sells: usize,
    holds: usize,
    failed: usize,
}

pub async fn run(opts: &PipelineOptions) -> anyhow::Result<()> {
    let _lock = JobLock::acquire(&opts.lock_path("morning"))?;

    let config = SignalConfig::default();
    let store = SignalStore::connect(&opts.db_url(), &config).await?;
    store.migrate().await?;
    store.verify_schema().await?;

    let market = QuoteClient::new();
    let news = opts.news_url.clone().map(NewsFeedClient::new);
    if news.is_none() {
        warn!("no news feed configured, all sentiment will use the market-condition fallback");
    }

    let model = load_model(opts);
    let technical = TechnicalAnalysisEngine::new(config.clone());
    let sentiment = SentimentAnalysisEngine::new();

    let ctx = MorningContext {
        market: &market,
        news: news.as_ref().map(|n| n as &dyn NewsProvider),
        technical: &technical,
        sentiment: &sentiment,
        model: model.as_ref(),
        store: &store,
        config: &config,
        dry_run: opts.dry_run,
    };

    let summary = run_batch(&opts.symbols, &ctx).await?;
    info!(
        buys = summary.buys,
        sells = summary.sells,
        holds = summary.holds,
        failed = summary.failed,
        dry_run = opts.dry_run,
        "morning run complete"
    );
    if summary.failed == opts.symbols.len() {
        anyhow::bail!("every symbol failed");
    }
    Ok(())
}

/// Per-symbol loop. One symbol failing is logged and counted, and the batch
/// moves on; only fatal store errors abort the whole run.
async fn run_batch(
    symbols: &[String],
    ctx: &MorningContext<'_>,
) -> Result<BatchSummary, SignalError> {
    let mut summary = BatchSummary::default();

    for symbol in symbols {
        match process_symbol(symbol, ctx).await {
            Ok(SignalAction::Buy) => summary.buys += 1,
            Ok(SignalAction::Sell) => summary.sells += 1,
            Ok(SignalAction::Hold) => summary.holds += 1,
            // A broken store or schema fails every symbol the same way;
            // stop instead of logging it once per symbol.
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!("{symbol}: skipped: {e}");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn load_model(opts: &PipelineOptions) -> Option<OutcomeModel> {
    if !opts.model_path.exists() {
        info!("no outcome model at {}, predictions go unscored", opts.model_path.display());
        return None;
    }
    match OutcomeModel::load(&opts.model_path) {
        Ok(model) => Some(model),
        Err(e) => {
            warn!("failed to load outcome model: {e}");
            None
        }
    }
}

async fn process_symbol(
    symbol: &str,
    ctx: &MorningContext<'_>,
) -> Result<SignalAction, SignalError> {
    let bars = ctx.market.daily_history(symbol, HISTORY_DAYS).await?;
    let reading = ctx.technical.compute_reading(symbol, &bars)?;

    // An unreachable feed degrades to the no-news fallback; a feed that
    // answers with garbage is a real fault and fails the symbol.
    let articles = match ctx.news {
        Some(feed) => match feed.recent_articles(symbol, NEWS_LIMIT).await {
            Ok(articles) => articles,
            Err(SignalError::DataSource(msg)) => {
                warn!("{symbol}: news feed unreachable ({msg}), using fallback sentiment");
                Vec::new()
            }
            Err(e) => return Err(e),
        },
        None => Vec::new(),
    };

    let sentiment_reading = ctx.sentiment.analyze(symbol, &articles, &bars)?;
    let signal = signal_combiner::combine(&reading, &sentiment_reading, ctx.config);

    let prediction = PredictionRecord {
        id: None,
        symbol: symbol.to_string(),
        timestamp: Utc::now(),
        signal: signal.action,
        confidence: signal.confidence,
        sentiment_score: sentiment_reading.sentiment_score,
        pattern_strength: reading.strength,
        price_at_prediction: reading.last_price,
        status: PredictionStatus::Pending,
        actual_outcome: None,
    };

    // Model output is advisory: logged next to the signal, never folded back
    // into the combined score.
    if let Some(model) = ctx.model {
        match model.predict_proba(&build_feature_vector(&prediction)) {
            Ok(p) => info!(
                "{symbol}: {} score={:.3} model_p={:.3}",
                signal.action.as_str(),
                signal.combined_score,
                p
            ),
            Err(e) => warn!("{symbol}: model scoring failed: {e}"),
        }
    } else {
        info!(
            "{symbol}: {} score={:.3} rsi={:.1}",
            signal.action.as_str(),
            signal.combined_score,
            reading.rsi
        );
    }

    if ctx.dry_run {
        return Ok(signal.action);
    }

    let written = ctx
        .store
        .record_morning_run(MorningWrite {
            sentiment: &sentiment_reading,
            articles: &articles,
            signal: &signal,
            prediction: &prediction,
        })
        .await?;
    match written {
        WriteOutcome::Inserted(id) => debug!("{symbol}: prediction {id} recorded"),
        WriteOutcome::Duplicate(id) => {
            info!("{symbol}: near-identical prediction {id} already recorded")
        }
    }

    Ok(signal.action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use signal_core::{Bar, NewsArticle};
    use std::collections::HashMap;

    struct FixtureMarket {
        histories: HashMap<String, Vec<Bar>>,
    }

    #[async_trait]
    impl MarketDataProvider for FixtureMarket {
        async fn daily_history(&self, symbol: &str, _days: i64) -> Result<Vec<Bar>, SignalError> {
            self.histories
                .get(symbol)
                .cloned()
                .ok_or_else(|| SignalError::InsufficientData(format!("no history for {symbol}")))
        }

        async fn latest_price(&self, symbol: &str) -> Result<f64, SignalError> {
            self.histories
                .get(symbol)
                .and_then(|bars| bars.last())
                .map(|bar| bar.close)
                .ok_or_else(|| SignalError::DataSource(format!("no quote for {symbol}")))
        }
    }

    /// Feed whose payloads are garbage, so every fetch is `MalformedData`.
    struct BrokenFeed;

    #[async_trait]
    impl NewsProvider for BrokenFeed {
        async fn recent_articles(
            &self,
            symbol: &str,
            _limit: u32,
        ) -> Result<Vec<NewsArticle>, SignalError> {
            Err(SignalError::MalformedData(format!("bad payload for {symbol}")))
        }
    }

    fn rising_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.25;
                Bar {
                    timestamp: Utc::now() - Duration::days((n - i) as i64),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 1_000_000.0,
                }
            })
            .collect()
    }

    async fn test_store() -> SignalStore {
        let store = SignalStore::connect("sqlite::memory:", &SignalConfig::default())
            .await
            .unwrap();
        store.migrate().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_one_bad_symbol_does_not_abort_batch() {
        let mut histories = HashMap::new();
        histories.insert("CBA.AX".to_string(), rising_bars(25));
        // WBC.AX has no history at all and must fail without sinking CBA.AX
        let market = FixtureMarket { histories };
        let store = test_store().await;
        let config = SignalConfig::default();
        let technical = TechnicalAnalysisEngine::new(config.clone());
        let sentiment = SentimentAnalysisEngine::new();

        let ctx = MorningContext {
            market: &market,
            news: None,
            technical: &technical,
            sentiment: &sentiment,
            model: None,
            store: &store,
            config: &config,
            dry_run: false,
        };

        let symbols = vec!["CBA.AX".to_string(), "WBC.AX".to_string()];
        let summary = run_batch(&symbols, &ctx).await.unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.buys + summary.sells + summary.holds, 1);

        let pending = store.pending_predictions(Utc::now()).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].symbol, "CBA.AX");
    }

    #[tokio::test]
    async fn test_malformed_feed_fails_symbol_not_fallback() {
        let mut histories = HashMap::new();
        histories.insert("NAB.AX".to_string(), rising_bars(25));
        let market = FixtureMarket { histories };
        let store = test_store().await;
        let config = SignalConfig::default();
        let technical = TechnicalAnalysisEngine::new(config.clone());
        let sentiment = SentimentAnalysisEngine::new();
        let feed = BrokenFeed;

        let ctx = MorningContext {
            market: &market,
            news: Some(&feed),
            technical: &technical,
            sentiment: &sentiment,
            model: None,
            store: &store,
            config: &config,
            dry_run: false,
        };

        let symbols = vec!["NAB.AX".to_string()];
        let summary = run_batch(&symbols, &ctx).await.unwrap();

        // Garbage from a reachable feed skips the symbol instead of quietly
        // producing a fallback reading
        assert_eq!(summary.failed, 1);
        let pending = store.pending_predictions(Utc::now()).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let mut histories = HashMap::new();
        histories.insert("CBA.AX".to_string(), rising_bars(25));
        let market = FixtureMarket { histories };
        let store = test_store().await;
        let config = SignalConfig::default();
        let technical = TechnicalAnalysisEngine::new(config.clone());
        let sentiment = SentimentAnalysisEngine::new();

        let ctx = MorningContext {
            market: &market,
            news: None,
            technical: &technical,
            sentiment: &sentiment,
            model: None,
            store: &store,
            config: &config,
            dry_run: true,
        };

        let symbols = vec!["CBA.AX".to_string()];
        let summary = run_batch(&symbols, &ctx).await.unwrap();

        assert_eq!(summary.failed, 0);
        let pending = store.pending_predictions(Utc::now()).await.unwrap();
        assert!(pending.is_empty());
    }
}
