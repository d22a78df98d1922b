use chrono::{DateTime, Duration, Utc};
use signal_core::{
    ModelPerformanceRecord, NewsArticle, PredictionOutcome, PredictionRecord, PredictionStatus,
    SentimentReading, SignalAction, SignalConfig, SignalError, TradingSignal,
};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::{debug, info};

use crate::schema;

/// Result of a prediction write attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted(i64),
    /// A prediction for the same symbol already exists within the dedup
    /// window with near-identical confidence. The id is the existing row.
    Duplicate(i64),
}

/// Everything one morning run produces for one symbol, written atomically.
pub struct MorningWrite<'a> {
    pub sentiment: &'a SentimentReading,
    pub articles: &'a [NewsArticle],
    pub signal: &'a TradingSignal,
    pub prediction: &'a PredictionRecord,
}

pub struct SignalStore {
    pool: SqlitePool,
    dedup_window: Duration,
    dedup_epsilon: f64,
    min_training_samples: usize,
}

fn db_err(e: sqlx::Error) -> SignalError {
    SignalError::Database(e.to_string())
}

fn parse_utc(s: &str) -> Result<DateTime<Utc>, SignalError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| SignalError::Database(format!("bad timestamp '{s}' in database: {e}")))
}

impl SignalStore {
    /// Open (or create) the database at `url`. In-memory databases are pinned
    /// to a single connection so every handle sees the same data.
    pub async fn connect(url: &str, config: &SignalConfig) -> Result<Self, SignalError> {
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;

        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
            .map_err(db_err)?;

        Ok(Self {
            pool,
            dedup_window: Duration::minutes(config.dedup_window_minutes),
            dedup_epsilon: config.dedup_confidence_epsilon,
            min_training_samples: config.min_training_samples,
        })
    }

    pub async fn migrate(&self) -> Result<(), SignalError> {
        schema::migrate(&self.pool).await?;
        info!("database schema up to date");
        Ok(())
    }

    /// Fail fast if any required table is absent. Run at startup, before any
    /// writes are attempted.
    pub async fn verify_schema(&self) -> Result<(), SignalError> {
        schema::verify(&self.pool).await
    }

    /// Persist one symbol's morning-run output in a single transaction.
    ///
    /// Sentiment, articles and the combined signal are always written; the
    /// prediction insert is skipped when a near-identical prediction for the
    /// same symbol already sits inside the dedup window.
    pub async fn record_morning_run(
        &self,
        write: MorningWrite<'_>,
    ) -> Result<WriteOutcome, SignalError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let s = write.sentiment;
        sqlx::query(
            "INSERT INTO sentiment_analysis
                (symbol, timestamp, sentiment_score, confidence, news_count, source)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&s.symbol)
        .bind(s.timestamp.to_rfc3339())
        .bind(s.sentiment_score)
        .bind(s.confidence)
        .bind(s.news_count as i64)
        .bind(s.source.as_str())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        for article in write.articles {
            sqlx::query(
                "INSERT INTO news (symbol, timestamp, title, summary, url)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&s.symbol)
            .bind(article.published_utc.to_rfc3339())
            .bind(&article.title)
            .bind(article.summary.as_deref())
            .bind(article.url.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        }

        let sig = write.signal;
        sqlx::query(
            "INSERT INTO trading_signals
                (symbol, timestamp, combined_score, action, strength, confidence)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&sig.symbol)
        .bind(sig.timestamp.to_rfc3339())
        .bind(sig.combined_score)
        .bind(sig.action.as_str())
        .bind(sig.strength.as_str())
        .bind(sig.confidence)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let p = write.prediction;
        let cutoff = p.timestamp - self.dedup_window;
        let recent: Vec<(i64, f64)> = sqlx::query_as(
            "SELECT id, confidence FROM trading_predictions
             WHERE symbol = ? AND timestamp >= ?
             ORDER BY timestamp DESC",
        )
        .bind(&p.symbol)
        .bind(cutoff.to_rfc3339())
        .fetch_all(&mut *tx)
        .await
        .map_err(db_err)?;

        if let Some((existing_id, _)) = recent
            .iter()
            .find(|(_, conf)| (conf - p.confidence).abs() < self.dedup_epsilon)
        {
            let existing_id = *existing_id;
            tx.commit().await.map_err(db_err)?;
            debug!(
                symbol = %p.symbol,
                existing_id,
                "prediction within dedup window, keeping existing row"
            );
            return Ok(WriteOutcome::Duplicate(existing_id));
        }

        let result = sqlx::query(
            "INSERT INTO trading_predictions
                (symbol, timestamp, signal, confidence, sentiment_score,
                 pattern_strength, price_at_prediction, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, 'pending')",
        )
        .bind(&p.symbol)
        .bind(p.timestamp.to_rfc3339())
        .bind(p.signal.as_str())
        .bind(p.confidence)
        .bind(p.sentiment_score)
        .bind(p.pattern_strength)
        .bind(p.price_at_prediction)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(WriteOutcome::Inserted(result.last_insert_rowid()))
    }

    /// Predictions still pending whose creation time is at or before `cutoff`.
    pub async fn pending_predictions(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<PredictionRecord>, SignalError> {
        let rows = sqlx::query(
            "SELECT id, symbol, timestamp, signal, confidence, sentiment_score,
                    pattern_strength, price_at_prediction, status,
                    price_change_percent, outcome_timestamp
             FROM trading_predictions
             WHERE status = 'pending' AND timestamp <= ?
             ORDER BY timestamp ASC",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(row_to_prediction).collect()
    }

    /// Completed predictions, oldest first. Training input for the outcome
    /// model.
    pub async fn completed_predictions(&self) -> Result<Vec<PredictionRecord>, SignalError> {
        let rows = sqlx::query(
            "SELECT id, symbol, timestamp, signal, confidence, sentiment_score,
                    pattern_strength, price_at_prediction, status,
                    price_change_percent, outcome_timestamp
             FROM trading_predictions
             WHERE status = 'completed'
             ORDER BY timestamp ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter().map(row_to_prediction).collect()
    }

    /// Attach a realized outcome to a pending prediction.
    ///
    /// The status guard in the UPDATE makes this idempotent: a prediction
    /// completed by an earlier run is left untouched and `Ok(false)` is
    /// returned, with no second outcome row written.
    pub async fn complete_outcome(
        &self,
        prediction_id: i64,
        symbol: &str,
        price_change_percent: f64,
        profitable: bool,
        at: DateTime<Utc>,
    ) -> Result<bool, SignalError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            "UPDATE trading_predictions
             SET status = 'completed', price_change_percent = ?, outcome_timestamp = ?
             WHERE id = ? AND status = 'pending'",
        )
        .bind(price_change_percent)
        .bind(at.to_rfc3339())
        .bind(prediction_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?
        .rows_affected();

        if updated == 0 {
            tx.commit().await.map_err(db_err)?;
            return Ok(false);
        }

        sqlx::query(
            "INSERT INTO trading_outcomes
                (prediction_id, symbol, price_change_percent, profitable, timestamp)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(prediction_id)
        .bind(symbol)
        .bind(price_change_percent)
        .bind(profitable)
        .bind(at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }

    /// Record metrics for one training run. Nonsense metrics are rejected
    /// rather than silently persisted: a model with zero features, or zero
    /// accuracy despite a full training set, indicates a broken feature
    /// pipeline upstream.
    pub async fn insert_model_performance(
        &self,
        record: &ModelPerformanceRecord,
    ) -> Result<(), SignalError> {
        if record.feature_count == 0 {
            return Err(SignalError::FeatureEngineering(
                "refusing to record model performance with zero features".to_string(),
            ));
        }
        if record.training_samples as usize >= self.min_training_samples
            && record.training_accuracy == 0.0
        {
            return Err(SignalError::FeatureEngineering(format!(
                "zero training accuracy over {} samples",
                record.training_samples
            )));
        }

        sqlx::query(
            "INSERT INTO model_performance
                (model_version, training_samples, training_accuracy,
                 validation_accuracy, cross_validation_score, feature_count, timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.model_version)
        .bind(record.training_samples as i64)
        .bind(record.training_accuracy)
        .bind(record.validation_accuracy)
        .bind(record.cross_validation_score)
        .bind(record.feature_count as i64)
        .bind(record.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

fn row_to_prediction(row: SqliteRow) -> Result<PredictionRecord, SignalError> {
    let signal_str: String = row.try_get("signal").map_err(db_err)?;
    let signal = SignalAction::parse(&signal_str)
        .ok_or_else(|| SignalError::Database(format!("unknown signal action '{signal_str}'")))?;

    let status_str: String = row.try_get("status").map_err(db_err)?;
    let status = PredictionStatus::parse(&status_str)
        .ok_or_else(|| SignalError::Database(format!("unknown prediction status '{status_str}'")))?;

    let timestamp_str: String = row.try_get("timestamp").map_err(db_err)?;

    let change: Option<f64> = row.try_get("price_change_percent").map_err(db_err)?;
    let outcome_ts: Option<String> = row.try_get("outcome_timestamp").map_err(db_err)?;
    let actual_outcome = match (change, outcome_ts) {
        (Some(price_change_percent), Some(ts)) => Some(PredictionOutcome {
            price_change_percent,
            outcome_timestamp: parse_utc(&ts)?,
        }),
        _ => None,
    };

    Ok(PredictionRecord {
        id: Some(row.try_get("id").map_err(db_err)?),
        symbol: row.try_get("symbol").map_err(db_err)?,
        timestamp: parse_utc(&timestamp_str)?,
        signal,
        confidence: row.try_get("confidence").map_err(db_err)?,
        sentiment_score: row.try_get("sentiment_score").map_err(db_err)?,
        pattern_strength: row.try_get("pattern_strength").map_err(db_err)?,
        price_at_prediction: row.try_get("price_at_prediction").map_err(db_err)?,
        status,
        actual_outcome,
    })
}
