use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV bar data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// News article as delivered by the feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsArticle {
    pub title: String,
    pub summary: Option<String>,
    pub url: Option<String>,
    pub published_utc: DateTime<Utc>,
}

/// Trading action for a symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BUY" => Some(SignalAction::Buy),
            "SELL" => Some(SignalAction::Sell),
            "HOLD" => Some(SignalAction::Hold),
            _ => None,
        }
    }

    /// Numeric encoding used as an ML feature: BUY=1, HOLD=0, SELL=-1
    pub fn encoded(&self) -> f64 {
        match self {
            SignalAction::Buy => 1.0,
            SignalAction::Hold => 0.0,
            SignalAction::Sell => -1.0,
        }
    }
}

/// Qualitative grade of a combined signal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalGrade {
    Strong,
    Moderate,
    Neutral,
}

impl SignalGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalGrade::Strong => "STRONG",
            SignalGrade::Moderate => "MODERATE",
            SignalGrade::Neutral => "NEUTRAL",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STRONG" => Some(SignalGrade::Strong),
            "MODERATE" => Some(SignalGrade::Moderate),
            "NEUTRAL" => Some(SignalGrade::Neutral),
            _ => None,
        }
    }
}

/// Indicator snapshot for one symbol. Recomputed each run, cached only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TechnicalReading {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// RSI(14), 0-100
    pub rsi: f64,
    /// SMA over the short window (20 closes)
    pub sma_short: f64,
    /// SMA over the long window (50 closes); absent on short histories
    pub sma_long: Option<f64>,
    pub last_price: f64,
    pub signal: SignalAction,
    /// 0.0 (HOLD) to 0.7
    pub strength: f64,
}

/// Where a sentiment reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SentimentSource {
    NewsFeed,
    /// No news was available; confidence derived from market conditions
    TechnicalFallback,
}

impl SentimentSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentSource::NewsFeed => "news_feed",
            SentimentSource::TechnicalFallback => "technical_fallback",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "news_feed" => Some(SentimentSource::NewsFeed),
            "technical_fallback" => Some(SentimentSource::TechnicalFallback),
            _ => None,
        }
    }
}

/// Aggregated news sentiment for one symbol at one point in time.
///
/// `news_count == 0` means the fallback path was used; that state is carried
/// in `source` and is distinct from a genuine zero-score reading with news.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentReading {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// -1.0 to +1.0
    pub sentiment_score: f64,
    /// 0.0 to 1.0
    pub confidence: f64,
    pub news_count: u32,
    pub source: SentimentSource,
}

/// Combined trading signal, derived deterministically from one
/// TechnicalReading and one SentimentReading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingSignal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    /// -1.0 to +1.0
    pub combined_score: f64,
    pub action: SignalAction,
    pub strength: SignalGrade,
    /// 0.0 to 1.0
    pub confidence: f64,
}

/// Prediction lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    Pending,
    Completed,
}

impl PredictionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionStatus::Pending => "pending",
            PredictionStatus::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PredictionStatus::Pending),
            "completed" => Some(PredictionStatus::Completed),
            _ => None,
        }
    }
}

/// Realized outcome attached to a completed prediction
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub price_change_percent: f64,
    pub outcome_timestamp: DateTime<Utc>,
}

/// A persisted prediction awaiting (or holding) its realized outcome.
///
/// Created as `pending` with no outcome; transitions to `completed` exactly
/// once, and never back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Option<i64>,
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub signal: SignalAction,
    pub confidence: f64,
    pub sentiment_score: f64,
    /// Technical signal strength at prediction time
    pub pattern_strength: f64,
    /// Close price when the prediction was made; outcome change is measured
    /// against this.
    pub price_at_prediction: f64,
    pub status: PredictionStatus,
    pub actual_outcome: Option<PredictionOutcome>,
}

/// Metrics for one training run of the outcome model.
///
/// `feature_count == 0` is definitionally invalid and the store refuses to
/// persist it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPerformanceRecord {
    pub model_version: String,
    pub training_samples: u32,
    pub training_accuracy: f64,
    pub validation_accuracy: f64,
    pub cross_validation_score: f64,
    pub feature_count: u32,
    pub timestamp: DateTime<Utc>,
}
