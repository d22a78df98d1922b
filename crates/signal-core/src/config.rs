/// Tunable constants for signal generation.
///
/// The defaults reproduce the one historically healthy configuration
/// (40% sentiment / 60% technical, ±0.3 action thresholds, ±0.1 RSI nudge).
/// They are defaults, not proven-optimal parameters.
#[derive(Debug, Clone)]
pub struct SignalConfig {
    // Combiner weights and thresholds
    pub sentiment_weight: f64,
    pub technical_weight: f64,
    /// Sentiment inside ±dead_zone contributes nothing
    pub sentiment_dead_zone: f64,
    /// |score| above this is actionable (BUY/SELL)
    pub action_threshold: f64,
    /// |score| above this grades STRONG
    pub strong_threshold: f64,
    pub rsi_nudge: f64,

    // Technical rule
    pub rsi_period: usize,
    pub sma_short_period: usize,
    pub sma_long_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    /// Breakout distance from SMA (0.02 = 2%)
    pub breakout_pct: f64,
    /// Strength of the RSI+SMA condition
    pub reversal_strength: f64,
    /// Strength of the pure breakout condition
    pub breakout_strength: f64,

    // Persistence invariants
    pub dedup_window_minutes: i64,
    pub dedup_confidence_epsilon: f64,

    // Outcome / training
    pub outcome_horizon_hours: i64,
    pub min_training_samples: usize,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            sentiment_weight: 0.4,
            technical_weight: 0.6,
            sentiment_dead_zone: 0.1,
            action_threshold: 0.3,
            strong_threshold: 0.6,
            rsi_nudge: 0.1,

            rsi_period: 14,
            sma_short_period: 20,
            sma_long_period: 50,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            breakout_pct: 0.02,
            reversal_strength: 0.7,
            breakout_strength: 0.6,

            dedup_window_minutes: 30,
            dedup_confidence_epsilon: 0.05,

            outcome_horizon_hours: 24,
            min_training_samples: 20,
        }
    }
}
