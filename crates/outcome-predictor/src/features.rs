use chrono::{Datelike, Timelike};
use signal_core::{PredictionRecord, SignalAction, SignalError};

/// Column order of every feature vector this crate produces.
pub const FEATURE_NAMES: &[&str] = &[
    "signal_encoded",
    "confidence",
    "sentiment_score",
    "pattern_strength",
    "hour_sin",
    "hour_cos",
    "day_of_week",
];

/// One (features, label) pair for training.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub features: Vec<f64>,
    pub profitable: bool,
}

/// Feature vector for a prediction record. Hour-of-day is encoded on the
/// unit circle so 23:00 and 01:00 are near each other.
pub fn build_feature_vector(record: &PredictionRecord) -> Vec<f64> {
    let hour = record.timestamp.hour() as f64;
    let hour_angle = hour / 24.0 * std::f64::consts::TAU;
    let day_of_week = record.timestamp.weekday().num_days_from_monday() as f64;

    vec![
        record.signal.encoded(),
        record.confidence,
        record.sentiment_score,
        record.pattern_strength,
        hour_angle.sin(),
        hour_angle.cos(),
        day_of_week / 6.0,
    ]
}

/// Whether a completed prediction worked out: BUY profits on a rise, SELL on
/// a fall, HOLD counts as correct when the price barely moved. Pending
/// records have no label.
pub fn outcome_label(record: &PredictionRecord) -> Option<bool> {
    let outcome = record.actual_outcome?;
    let change = outcome.price_change_percent;
    Some(match record.signal {
        SignalAction::Buy => change > 0.0,
        SignalAction::Sell => change < 0.0,
        SignalAction::Hold => change.abs() < 1.0,
    })
}

/// Convert completed prediction records into a training set. Pending records
/// are skipped; an empty result is the caller's minimum-sample problem, but a
/// non-empty result with zero feature columns is a fatal engineering bug.
pub fn training_set_from(records: &[PredictionRecord]) -> Result<Vec<TrainingExample>, SignalError> {
    let examples: Vec<TrainingExample> = records
        .iter()
        .filter_map(|r| {
            outcome_label(r).map(|profitable| TrainingExample {
                features: build_feature_vector(r),
                profitable,
            })
        })
        .collect();

    if let Some(first) = examples.first() {
        if first.features.is_empty() {
            return Err(SignalError::FeatureEngineering(
                "feature vector has zero columns".to_string(),
            ));
        }
    }

    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use signal_core::{PredictionOutcome, PredictionStatus};

    fn record(signal: SignalAction, change: Option<f64>) -> PredictionRecord {
        PredictionRecord {
            id: Some(1),
            symbol: "CBA.AX".to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 8, 24, 9, 30, 0).unwrap(),
            signal,
            confidence: 0.6,
            sentiment_score: 0.2,
            pattern_strength: 0.7,
            price_at_prediction: 100.0,
            status: if change.is_some() {
                PredictionStatus::Completed
            } else {
                PredictionStatus::Pending
            },
            actual_outcome: change.map(|c| PredictionOutcome {
                price_change_percent: c,
                outcome_timestamp: Utc.with_ymd_and_hms(2026, 8, 25, 16, 0, 0).unwrap(),
            }),
        }
    }

    #[test]
    fn test_feature_vector_shape() {
        let f = build_feature_vector(&record(SignalAction::Buy, None));
        assert_eq!(f.len(), FEATURE_NAMES.len());
        assert_eq!(f[0], 1.0);
        // hour features stay on the unit circle
        assert!((f[4] * f[4] + f[5] * f[5] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_labels() {
        assert_eq!(outcome_label(&record(SignalAction::Buy, Some(1.5))), Some(true));
        assert_eq!(outcome_label(&record(SignalAction::Buy, Some(-0.5))), Some(false));
        assert_eq!(outcome_label(&record(SignalAction::Sell, Some(-2.0))), Some(true));
        assert_eq!(outcome_label(&record(SignalAction::Hold, Some(0.3))), Some(true));
        assert_eq!(outcome_label(&record(SignalAction::Hold, Some(2.0))), Some(false));
        assert_eq!(outcome_label(&record(SignalAction::Buy, None)), None);
    }

    #[test]
    fn test_pending_records_skipped() {
        let records = vec![
            record(SignalAction::Buy, Some(1.0)),
            record(SignalAction::Buy, None),
            record(SignalAction::Sell, Some(-1.0)),
        ];
        let set = training_set_from(&records).unwrap();
        assert_eq!(set.len(), 2);
    }
}
