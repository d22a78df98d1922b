use chrono::Utc;
use signal_core::{Bar, SignalAction, SignalConfig, SignalError, TechnicalReading};

use crate::indicators::{rsi, sma};

/// Derives a `TechnicalReading` from daily bars.
///
/// The signal rule deliberately pairs RSI with the price-vs-SMA position.
/// A naive RSI-threshold-only rule (RSI<30 buy / RSI>70 sell) degenerates to
/// near-100% HOLD on trending bank stocks and must not be reintroduced.
pub struct TechnicalAnalysisEngine {
    config: SignalConfig,
}

impl TechnicalAnalysisEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn compute_reading(&self, symbol: &str, bars: &[Bar]) -> Result<TechnicalReading, SignalError> {
        let cfg = &self.config;
        let min_closes = cfg.sma_short_period.max(cfg.rsi_period + 1);
        if bars.len() < min_closes {
            return Err(SignalError::InsufficientData(format!(
                "{}: {} bars, need at least {}",
                symbol,
                bars.len(),
                min_closes
            )));
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let last_price = closes[closes.len() - 1];

        let rsi_values = rsi(&closes, cfg.rsi_period);
        let current_rsi = *rsi_values.last().ok_or_else(|| {
            SignalError::InsufficientData(format!("{}: RSI window not filled", symbol))
        })?;

        let sma_short_values = sma(&closes, cfg.sma_short_period);
        let sma_short = *sma_short_values.last().ok_or_else(|| {
            SignalError::InsufficientData(format!("{}: SMA window not filled", symbol))
        })?;

        let sma_long = sma(&closes, cfg.sma_long_period).last().copied();

        let (signal, strength) = self.derive_signal(current_rsi, last_price, sma_short);

        Ok(TechnicalReading {
            symbol: symbol.to_string(),
            timestamp: bars.last().map(|b| b.timestamp).unwrap_or_else(Utc::now),
            rsi: current_rsi,
            sma_short,
            sma_long,
            last_price,
            signal,
            strength,
        })
    }

    /// Dual-condition price-momentum rule:
    /// - BUY on oversold RSI above the SMA (reversal, 0.7) or price breaking
    ///   2% above the SMA (momentum, 0.6)
    /// - SELL on the mirrored conditions
    fn derive_signal(&self, rsi: f64, price: f64, sma: f64) -> (SignalAction, f64) {
        let cfg = &self.config;

        if rsi < cfg.rsi_oversold && price > sma {
            (SignalAction::Buy, cfg.reversal_strength)
        } else if price > sma * (1.0 + cfg.breakout_pct) {
            (SignalAction::Buy, cfg.breakout_strength)
        } else if rsi > cfg.rsi_overbought && price < sma {
            (SignalAction::Sell, cfg.reversal_strength)
        } else if price < sma * (1.0 - cfg.breakout_pct) {
            (SignalAction::Sell, cfg.breakout_strength)
        } else {
            (SignalAction::Hold, 0.0)
        }
    }
}

impl Default for TechnicalAnalysisEngine {
    fn default() -> Self {
        Self::new(SignalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                timestamp: Utc::now() - Duration::days((closes.len() - i) as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 1_000_000.0,
            })
            .collect()
    }

    #[test]
    fn test_insufficient_data() {
        let engine = TechnicalAnalysisEngine::default();
        let bars = bars_from_closes(&[100.0; 10]);
        let err = engine.compute_reading("CBA.AX", &bars).unwrap_err();
        assert!(matches!(err, SignalError::InsufficientData(_)));
    }

    #[test]
    fn test_monotonic_rise_is_buy() {
        // 20 closes rising ~4.75%: RSI pins high, price sits >2% above SMA20.
        let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64 * 0.25).collect();
        let engine = TechnicalAnalysisEngine::default();
        let reading = engine.compute_reading("CBA.AX", &bars_from_closes(&closes)).unwrap();

        assert!(reading.rsi >= 70.0);
        assert!(reading.last_price > reading.sma_short);
        assert_eq!(reading.signal, SignalAction::Buy);
        assert!(reading.strength >= 0.6 && reading.strength <= 0.7);
    }

    #[test]
    fn test_breakdown_is_sell() {
        let closes: Vec<f64> = (0..20).map(|i| 100.0 - i as f64 * 0.25).collect();
        let engine = TechnicalAnalysisEngine::default();
        let reading = engine.compute_reading("WBC.AX", &bars_from_closes(&closes)).unwrap();

        assert_eq!(reading.signal, SignalAction::Sell);
        assert!(reading.strength >= 0.6);
    }

    #[test]
    fn test_flat_series_is_hold() {
        let closes = vec![50.0; 25];
        let engine = TechnicalAnalysisEngine::default();
        let reading = engine.compute_reading("ANZ.AX", &bars_from_closes(&closes)).unwrap();

        assert_eq!(reading.signal, SignalAction::Hold);
        assert_eq!(reading.strength, 0.0);
    }

    #[test]
    fn test_not_rsi_threshold_only() {
        // Overbought RSI while price is still above the SMA must NOT sell:
        // the rule requires price < SMA for the RSI-overbought leg. A steady
        // uptrend stays BUY via the breakout leg instead of degenerating.
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64 * 0.4).collect();
        let engine = TechnicalAnalysisEngine::default();
        let reading = engine.compute_reading("NAB.AX", &bars_from_closes(&closes)).unwrap();

        assert!(reading.rsi > 70.0);
        assert_eq!(reading.signal, SignalAction::Buy);
    }

    #[test]
    fn test_sma_long_absent_on_short_history() {
        let closes = vec![30.0; 25];
        let engine = TechnicalAnalysisEngine::default();
        let reading = engine.compute_reading("MQG.AX", &bars_from_closes(&closes)).unwrap();
        assert!(reading.sma_long.is_none());

        let closes = vec![30.0; 60];
        let reading = engine.compute_reading("MQG.AX", &bars_from_closes(&closes)).unwrap();
        assert!(reading.sma_long.is_some());
    }
}
