use signal_core::{
    SentimentReading, SignalAction, SignalConfig, SignalGrade, TechnicalReading, TradingSignal,
};

/// Blend one technical reading and one sentiment reading into a trading
/// signal.
///
/// Pure and deterministic: identical inputs always produce identical output,
/// and the action/strength mapping is a function of the combined score alone.
/// The default weighting (40% sentiment / 60% technical, ±0.3 action
/// thresholds, ±0.1 RSI nudge) is the configuration that historically kept
/// the signal mix healthy; changing it is allowed, silently degrading to
/// always-HOLD is not.
pub fn combine(
    technical: &TechnicalReading,
    sentiment: &SentimentReading,
    config: &SignalConfig,
) -> TradingSignal {
    let mut score = 0.0;

    // Sentiment leg, dead zone around neutral
    let s = sentiment.sentiment_score;
    if s > config.sentiment_dead_zone {
        score += config.sentiment_weight * (s * 2.0).min(1.0);
    } else if s < -config.sentiment_dead_zone {
        score -= config.sentiment_weight * (s.abs() * 2.0).min(1.0);
    }

    // Technical leg
    match technical.signal {
        SignalAction::Buy => score += config.technical_weight * technical.strength,
        SignalAction::Sell => score -= config.technical_weight * technical.strength,
        SignalAction::Hold => {}
    }

    // RSI extremes nudge against the crowd
    if technical.rsi > config.rsi_overbought {
        score -= config.rsi_nudge;
    } else if technical.rsi < config.rsi_oversold {
        score += config.rsi_nudge;
    }

    let combined_score = score.clamp(-1.0, 1.0);
    let (action, strength) = classify(combined_score, config);

    let confidence = (config.sentiment_weight * sentiment.confidence
        + config.technical_weight * technical.strength)
        .clamp(0.0, 1.0);

    TradingSignal {
        symbol: technical.symbol.clone(),
        timestamp: technical.timestamp,
        combined_score,
        action,
        strength,
        confidence,
    }
}

/// Map a combined score to (action, grade). Pure function of the score.
pub fn classify(score: f64, config: &SignalConfig) -> (SignalAction, SignalGrade) {
    let action = if score > config.action_threshold {
        SignalAction::Buy
    } else if score < -config.action_threshold {
        SignalAction::Sell
    } else {
        SignalAction::Hold
    };

    let strength = if score.abs() > config.strong_threshold {
        SignalGrade::Strong
    } else if action != SignalAction::Hold {
        SignalGrade::Moderate
    } else {
        SignalGrade::Neutral
    };

    (action, strength)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use signal_core::SentimentSource;

    fn technical(signal: SignalAction, strength: f64, rsi: f64) -> TechnicalReading {
        TechnicalReading {
            symbol: "CBA.AX".to_string(),
            timestamp: Utc::now(),
            rsi,
            sma_short: 100.0,
            sma_long: None,
            last_price: 103.0,
            signal,
            strength,
        }
    }

    fn sentiment(score: f64, confidence: f64) -> SentimentReading {
        SentimentReading {
            symbol: "CBA.AX".to_string(),
            timestamp: Utc::now(),
            sentiment_score: score,
            confidence,
            news_count: 5,
            source: SentimentSource::NewsFeed,
        }
    }

    #[test]
    fn test_classify_thresholds() {
        let cfg = SignalConfig::default();

        assert_eq!(classify(0.45, &cfg), (SignalAction::Buy, SignalGrade::Moderate));
        assert_eq!(classify(0.75, &cfg), (SignalAction::Buy, SignalGrade::Strong));
        assert_eq!(classify(0.0, &cfg), (SignalAction::Hold, SignalGrade::Neutral));
        assert_eq!(classify(-0.45, &cfg), (SignalAction::Sell, SignalGrade::Moderate));
        assert_eq!(classify(-0.75, &cfg), (SignalAction::Sell, SignalGrade::Strong));
        // Exactly at the threshold stays HOLD
        assert_eq!(classify(0.3, &cfg), (SignalAction::Hold, SignalGrade::Neutral));
    }

    #[test]
    fn test_combined_buy() {
        let cfg = SignalConfig::default();
        // 0.4*min(0.5*2,1) + 0.6*0.6 = 0.2 + 0.36 = 0.56
        let signal = combine(&technical(SignalAction::Buy, 0.6, 50.0), &sentiment(0.5, 0.8), &cfg);

        assert!((signal.combined_score - 0.56).abs() < 1e-9);
        assert_eq!(signal.action, SignalAction::Buy);
        assert_eq!(signal.strength, SignalGrade::Moderate);
    }

    #[test]
    fn test_rsi_nudges() {
        let cfg = SignalConfig::default();

        let hot = combine(&technical(SignalAction::Buy, 0.6, 75.0), &sentiment(0.0, 0.5), &cfg);
        let cool = combine(&technical(SignalAction::Buy, 0.6, 50.0), &sentiment(0.0, 0.5), &cfg);
        assert!((cool.combined_score - hot.combined_score - 0.1).abs() < 1e-9);

        let oversold = combine(&technical(SignalAction::Hold, 0.0, 25.0), &sentiment(0.0, 0.5), &cfg);
        assert!((oversold.combined_score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_sentiment_dead_zone() {
        let cfg = SignalConfig::default();
        let signal = combine(&technical(SignalAction::Hold, 0.0, 50.0), &sentiment(0.05, 0.9), &cfg);
        assert_eq!(signal.combined_score, 0.0);
        assert_eq!(signal.action, SignalAction::Hold);
    }

    #[test]
    fn test_score_clamped() {
        let cfg = SignalConfig::default();
        let signal = combine(&technical(SignalAction::Sell, 0.7, 80.0), &sentiment(-1.0, 0.9), &cfg);
        assert!(signal.combined_score >= -1.0);
        assert_eq!(signal.action, SignalAction::Sell);
        assert_eq!(signal.strength, SignalGrade::Strong);
    }

    #[test]
    fn test_deterministic() {
        let cfg = SignalConfig::default();
        let t = technical(SignalAction::Buy, 0.7, 28.0);
        let s = sentiment(0.3, 0.6);

        let a = combine(&t, &s, &cfg);
        let b = combine(&t, &s, &cfg);
        assert_eq!(a.combined_score, b.combined_score);
        assert_eq!(a.action, b.action);
        assert_eq!(a.strength, b.strength);
        assert_eq!(a.confidence, b.confidence);
    }

    #[test]
    fn test_mixed_inputs_do_not_degenerate_to_hold() {
        // A plausible spread of inputs must produce a varied signal mix;
        // the production failure mode was 100% HOLD.
        let cfg = SignalConfig::default();
        let cases = [
            (SignalAction::Buy, 0.7, 25.0, 0.4),
            (SignalAction::Buy, 0.6, 55.0, 0.2),
            (SignalAction::Hold, 0.0, 50.0, 0.0),
            (SignalAction::Sell, 0.6, 60.0, -0.3),
            (SignalAction::Sell, 0.7, 75.0, -0.5),
        ];

        let mut actionable = 0;
        for (sig, strength, rsi, sent) in cases {
            let out = combine(&technical(sig, strength, rsi), &sentiment(sent, 0.6), &cfg);
            if out.action != SignalAction::Hold {
                actionable += 1;
            }
        }
        assert!(actionable >= 3, "only {} of 5 cases actionable", actionable);
    }
}
