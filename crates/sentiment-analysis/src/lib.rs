use chrono::Utc;
use signal_core::stats;
use signal_core::{Bar, NewsArticle, SentimentReading, SentimentSource, SignalError};
use std::collections::HashSet;

const NEGATION_WORDS: &[&str] = &[
    "not", "no", "never", "don't", "doesn't", "didn't", "isn't", "aren't",
    "wasn't", "weren't", "won't", "wouldn't", "couldn't", "shouldn't", "hardly",
    "barely", "neither", "nor", "without",
];

const NEGATION_WINDOW: usize = 3;

/// Per-article lexicon scores are squashed to [-1, 1] with tanh(raw / SCALE)
const POLARITY_SCALE: f64 = 3.0;

/// Variance at which article agreement bottoms out
const MAX_EXPECTED_VARIANCE: f64 = 0.25;

pub struct SentimentAnalysisEngine {
    positive_words: Vec<&'static str>,
    negative_words: Vec<&'static str>,
}

impl SentimentAnalysisEngine {
    pub fn new() -> Self {
        Self {
            positive_words: vec![
                "bullish", "rally", "surge", "gain", "profit", "growth", "beat",
                "upgrade", "outperform", "strong", "positive", "rise", "increase",
                "breakthrough", "success", "exceed", "momentum", "buy",
                "recommend", "optimistic", "record", "advance",
                // Bank-sector terms
                "dividend", "buyback", "franking", "margin", "upside",
                "recovery", "rebound", "expansion", "robust", "accretive",
                "overweight", "raised", "upgraded", "tailwind",
            ],
            negative_words: vec![
                "bearish", "decline", "loss", "fall", "plunge", "crash", "miss",
                "downgrade", "underperform", "weak", "negative", "drop", "decrease",
                "concern", "risk", "fail", "disappoint", "slump", "sell",
                "warning", "pessimistic", "retreat", "fear", "trouble",
                // Bank-sector terms
                "arrears", "impairment", "writedown", "write-down", "lawsuit",
                "remediation", "investigation", "probe", "default", "scandal",
                "headwind", "downside", "underweight", "lowered", "breach",
            ],
        }
    }

    /// Raw lexicon score of a text: +1 per positive hit, -1 per negative hit,
    /// with the sign flipped when a negation word precedes the hit within a
    /// 3-word window.
    fn analyze_text(&self, text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = text_lower
            .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '.' | '!' | '?' | ':'))
            .filter(|w| !w.is_empty())
            .collect();

        let positive_set: HashSet<&str> = self.positive_words.iter().copied().collect();
        let negative_set: HashSet<&str> = self.negative_words.iter().copied().collect();
        let negation_set: HashSet<&str> = NEGATION_WORDS.iter().copied().collect();

        let negation_positions: Vec<usize> = words
            .iter()
            .enumerate()
            .filter(|(_, w)| negation_set.contains(*w))
            .map(|(i, _)| i)
            .collect();

        let mut score: i32 = 0;
        for (i, word) in words.iter().enumerate() {
            let is_positive = positive_set.contains(*word);
            let is_negative = negative_set.contains(*word);
            if !is_positive && !is_negative {
                continue;
            }

            let negated = negation_positions
                .iter()
                .any(|&neg| neg < i && (i - neg) <= NEGATION_WINDOW);

            if is_positive {
                score += if negated { -1 } else { 1 };
            } else {
                score += if negated { 1 } else { -1 };
            }
        }

        score as f64
    }

    /// Bounded polarity of one article; title weighted over summary.
    fn article_polarity(&self, article: &NewsArticle) -> f64 {
        let mut raw = self.analyze_text(&article.title) * 2.0;
        if let Some(summary) = &article.summary {
            raw += self.analyze_text(summary);
        }
        (raw / POLARITY_SCALE).tanh()
    }

    /// Aggregate article polarities into a reading.
    ///
    /// With no articles, computes the market-condition fallback instead —
    /// the fallback confidence is derived from the symbol's own volatility
    /// and SMA distance so it varies across symbols and runs rather than
    /// collapsing to one constant.
    pub fn analyze(
        &self,
        symbol: &str,
        articles: &[NewsArticle],
        bars: &[Bar],
    ) -> Result<SentimentReading, SignalError> {
        if articles.is_empty() {
            tracing::info!("{}: no news available, using market-condition fallback", symbol);
            return Ok(self.fallback_reading(symbol, bars));
        }

        let polarities: Vec<f64> = articles.iter().map(|a| self.article_polarity(a)).collect();
        let sentiment_score = stats::mean(&polarities).clamp(-1.0, 1.0);
        let var = stats::variance(&polarities);

        let volume = (articles.len() as f64 / 10.0).min(1.0);
        let mut agreement = 1.0 - (var / MAX_EXPECTED_VARIANCE).min(1.0);

        // Many articles with literally identical polarity usually means a
        // syndicated story counted multiple times, not real consensus.
        if articles.len() >= 5 && var < 1e-4 {
            tracing::debug!("{}: near-zero polarity variance over {} articles, damping agreement", symbol, articles.len());
            agreement = 0.5;
        }

        let confidence = (0.4 * volume + 0.5 * agreement + 0.1).min(0.95);

        Ok(SentimentReading {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            sentiment_score,
            confidence,
            news_count: articles.len() as u32,
            source: SentimentSource::NewsFeed,
        })
    }

    /// Neutral reading whose confidence reflects current market conditions:
    /// calmer price action and a price hugging its average mean the neutral
    /// assumption is more trustworthy.
    fn fallback_reading(&self, symbol: &str, bars: &[Bar]) -> SentimentReading {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let returns = stats::simple_returns(&closes);
        let vol = stats::std_dev(&returns);

        let sma_window = closes.len().min(20);
        let sma_distance = if sma_window >= 2 {
            let sma: f64 =
                closes[closes.len() - sma_window..].iter().sum::<f64>() / sma_window as f64;
            let last = closes[closes.len() - 1];
            if sma > 0.0 { (last - sma).abs() / sma } else { 0.0 }
        } else {
            0.0
        };

        let calm = 0.5 / (1.0 + 40.0 * vol);
        let displacement = (sma_distance * 4.0).min(0.2);
        let confidence = (0.2 + calm - displacement).clamp(0.05, 0.9);

        SentimentReading {
            symbol: symbol.to_string(),
            timestamp: Utc::now(),
            sentiment_score: 0.0,
            confidence,
            news_count: 0,
            source: SentimentSource::TechnicalFallback,
        }
    }
}

impl Default for SentimentAnalysisEngine {
    fn default() -> Self {
        Self::new()
    }
}
