use chrono::Utc;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use signal_core::{ModelPerformanceRecord, SignalError};
use std::path::Path;

use crate::features::{TrainingExample, FEATURE_NAMES};

const EPOCHS: usize = 500;
const LEARNING_RATE: f64 = 0.5;
/// Every k-th example goes to the hold-out set
const HOLDOUT_STRIDE: usize = 5;
const CV_FOLDS: usize = 5;

/// Trained logistic-regression outcome classifier, serialized to JSON on
/// disk together with its standardization parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeModel {
    pub version: String,
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub bias: f64,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl OutcomeModel {
    /// Probability that the signalled trade is profitable next session.
    pub fn predict_proba(&self, features: &[f64]) -> Result<f64, SignalError> {
        if features.len() != self.weights.len() {
            return Err(SignalError::FeatureEngineering(format!(
                "expected {} features, got {}",
                self.weights.len(),
                features.len()
            )));
        }

        let mut z = self.bias;
        for i in 0..features.len() {
            let x = (features[i] - self.means[i]) / self.stds[i];
            z += self.weights[i] * x;
        }
        Ok(sigmoid(z))
    }

    /// Confidence derived from a probability: distance from the coin flip.
    pub fn confidence_of(probability: f64) -> f64 {
        (probability - 0.5).abs() * 2.0
    }

    pub fn save(&self, path: &Path) -> Result<(), SignalError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| SignalError::ModelIo(format!("serialize model: {}", e)))?;
        std::fs::write(path, json)
            .map_err(|e| SignalError::ModelIo(format!("write {}: {}", path.display(), e)))
    }

    pub fn load(path: &Path) -> Result<Self, SignalError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| SignalError::ModelIo(format!("read {}: {}", path.display(), e)))?;
        let model: OutcomeModel = serde_json::from_str(&json)
            .map_err(|e| SignalError::ModelIo(format!("corrupt model file {}: {}", path.display(), e)))?;

        if model.weights.len() != model.means.len() || model.weights.len() != model.stds.len() {
            return Err(SignalError::ModelIo(format!(
                "inconsistent model file {}: {} weights / {} means / {} stds",
                path.display(),
                model.weights.len(),
                model.means.len(),
                model.stds.len()
            )));
        }
        Ok(model)
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Trainer for the outcome model.
pub struct OutcomePredictor {
    pub min_training_samples: usize,
}

impl OutcomePredictor {
    pub fn new(min_training_samples: usize) -> Self {
        Self { min_training_samples }
    }

    /// Train on completed predictions.
    ///
    /// Fails fast on degenerate input: fewer examples than the configured
    /// minimum is `InsufficientData`, a zero-column feature matrix is
    /// `FeatureEngineering`. Validation accuracy comes from a deterministic
    /// hold-out split and the cross-validation score from k-fold; neither is
    /// ever a copy of the training accuracy.
    pub fn train(
        &self,
        examples: &[TrainingExample],
    ) -> Result<(OutcomeModel, ModelPerformanceRecord), SignalError> {
        if examples.len() < self.min_training_samples {
            return Err(SignalError::InsufficientData(format!(
                "{} training examples, need at least {}",
                examples.len(),
                self.min_training_samples
            )));
        }

        let feature_count = examples[0].features.len();
        if feature_count == 0 {
            return Err(SignalError::FeatureEngineering(
                "training matrix has zero feature columns".to_string(),
            ));
        }
        if examples.iter().any(|e| e.features.len() != feature_count) {
            return Err(SignalError::FeatureEngineering(
                "ragged feature matrix".to_string(),
            ));
        }

        // Deterministic hold-out: every 5th example validates
        let mut train_set = Vec::new();
        let mut holdout = Vec::new();
        for (i, ex) in examples.iter().enumerate() {
            if i % HOLDOUT_STRIDE == HOLDOUT_STRIDE - 1 {
                holdout.push(ex.clone());
            } else {
                train_set.push(ex.clone());
            }
        }

        let (weights, bias, means, stds) = fit(&train_set, feature_count);
        let model = OutcomeModel {
            version: format!("logreg-{}", Utc::now().format("%Y%m%d%H%M%S")),
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            weights,
            bias,
            means,
            stds,
        };

        let training_accuracy = accuracy(&model, &train_set);
        let validation_accuracy = if holdout.is_empty() {
            0.0
        } else {
            accuracy(&model, &holdout)
        };
        let cross_validation_score = self.cross_validate(examples, feature_count);

        tracing::info!(
            "trained {} on {} examples: train acc {:.3}, holdout acc {:.3}, cv {:.3}",
            model.version,
            examples.len(),
            training_accuracy,
            validation_accuracy,
            cross_validation_score
        );

        let performance = ModelPerformanceRecord {
            model_version: model.version.clone(),
            training_samples: examples.len() as u32,
            training_accuracy,
            validation_accuracy,
            cross_validation_score,
            feature_count: feature_count as u32,
            timestamp: Utc::now(),
        };

        Ok((model, performance))
    }

    /// Mean accuracy over k deterministic folds (fold i holds out every
    /// example with index ≡ i mod k).
    fn cross_validate(&self, examples: &[TrainingExample], feature_count: usize) -> f64 {
        let mut scores = Vec::with_capacity(CV_FOLDS);

        for fold in 0..CV_FOLDS {
            let mut train_set = Vec::new();
            let mut test_set = Vec::new();
            for (i, ex) in examples.iter().enumerate() {
                if i % CV_FOLDS == fold {
                    test_set.push(ex.clone());
                } else {
                    train_set.push(ex.clone());
                }
            }
            if train_set.is_empty() || test_set.is_empty() {
                continue;
            }

            let (weights, bias, means, stds) = fit(&train_set, feature_count);
            let model = OutcomeModel {
                version: String::new(),
                feature_names: Vec::new(),
                weights,
                bias,
                means,
                stds,
            };
            scores.push(accuracy(&model, &test_set));
        }

        if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        }
    }
}

/// Standardize columns and fit by batch gradient descent.
fn fit(examples: &[TrainingExample], feature_count: usize) -> (Vec<f64>, f64, Vec<f64>, Vec<f64>) {
    let n = examples.len();

    let mut means = vec![0.0; feature_count];
    let mut stds = vec![0.0; feature_count];
    for j in 0..feature_count {
        let col: Vec<f64> = examples.iter().map(|e| e.features[j]).collect();
        means[j] = signal_core::stats::mean(&col);
        let sd = signal_core::stats::std_dev(&col);
        // Constant columns standardize to zero with a unit divisor
        stds[j] = if sd > 1e-12 { sd } else { 1.0 };
    }

    let x = DMatrix::from_fn(n, feature_count, |i, j| {
        (examples[i].features[j] - means[j]) / stds[j]
    });
    let y = DVector::from_fn(n, |i, _| if examples[i].profitable { 1.0 } else { 0.0 });

    let mut w = DVector::zeros(feature_count);
    let mut b = 0.0;

    for _ in 0..EPOCHS {
        let z = &x * &w;
        let p = DVector::from_fn(n, |i, _| sigmoid(z[i] + b));
        let err = &p - &y;

        let grad_w = x.transpose() * &err / n as f64;
        let grad_b = err.sum() / n as f64;

        w -= grad_w * LEARNING_RATE;
        b -= grad_b * LEARNING_RATE;
    }

    (w.iter().copied().collect(), b, means, stds)
}

fn accuracy(model: &OutcomeModel, examples: &[TrainingExample]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let correct = examples
        .iter()
        .filter(|e| {
            model
                .predict_proba(&e.features)
                .map(|p| (p >= 0.5) == e.profitable)
                .unwrap_or(false)
        })
        .count();
    correct as f64 / examples.len() as f64
}
