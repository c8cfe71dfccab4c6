//! Standardized logistic regression
//!
//! Features are scaled to zero mean / unit variance with statistics fit on
//! the training set, then a class-balanced, L2-regularized logistic
//! regression is trained with full-batch gradient descent. Training is
//! deterministic: the same set always yields the same weights.

use super::Classifier;
use crate::error::{InferenceError, TrainingError};
use crate::models::{FeatureVector, TrainingSet, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identifier written into persisted artifacts
const ALGORITHM: &str = "standardized-logistic-regression";

/// Epochs between divergence checks
const DIVERGENCE_CHECK_INTERVAL: usize = 100;

/// Hyperparameters for [`LogisticClassifier`]
#[derive(Debug, Clone)]
pub struct LogisticConfig {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on weights (not on the bias)
    pub l2_penalty: f64,
    /// Weight classes inversely to their frequency
    pub balanced: bool,
}

impl Default for LogisticConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 2000,
            l2_penalty: 1e-4,
            balanced: true,
        }
    }
}

/// Per-feature zero-mean / unit-variance scaling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    /// Fit on rows of equal width. Constant columns get a scale of 1.
    pub fn fit(rows: &[[f64; FEATURE_COUNT]]) -> Self {
        let n = rows.len().max(1) as f64;
        let mut mean = vec![0.0; FEATURE_COUNT];
        let mut scale = vec![0.0; FEATURE_COUNT];

        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        for row in rows {
            for ((s, m), v) in scale.iter_mut().zip(&mean).zip(row) {
                *s += (v - m).powi(2);
            }
        }
        for s in scale.iter_mut() {
            let std = (*s / n).sqrt();
            *s = if std > f64::EPSILON { std } else { 1.0 };
        }

        Self { mean, scale }
    }

    pub fn transform(&self, row: &[f64; FEATURE_COUNT]) -> [f64; FEATURE_COUNT] {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, v) in row.iter().enumerate() {
            out[i] = (v - self.mean[i]) / self.scale[i];
        }
        out
    }

    fn width(&self) -> usize {
        self.mean.len().min(self.scale.len())
    }
}

/// Fitted logistic model, scaler included
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub scaler: StandardScaler,
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl LogisticModel {
    fn expected_features(&self) -> usize {
        if self.weights.len() != FEATURE_COUNT {
            self.weights.len()
        } else {
            self.scaler.width()
        }
    }

    fn is_compatible(&self) -> bool {
        self.weights.len() == FEATURE_COUNT && self.scaler.width() == FEATURE_COUNT
    }
}

/// Logistic regression classifier
#[derive(Debug, Clone, Default)]
pub struct LogisticClassifier {
    config: LogisticConfig,
}

impl LogisticClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: LogisticConfig) -> Self {
        Self { config }
    }

    fn class_weights(&self, n: usize, positives: usize) -> (f64, f64) {
        if !self.config.balanced {
            return (1.0, 1.0);
        }
        let n = n as f64;
        let negatives = n - positives as f64;
        (n / (2.0 * negatives), n / (2.0 * positives as f64))
    }
}

impl Classifier for LogisticClassifier {
    type Model = LogisticModel;

    fn algorithm(&self) -> &'static str {
        ALGORITHM
    }

    fn fit(&self, training_set: &TrainingSet) -> Result<LogisticModel, TrainingError> {
        let n = training_set.len();
        if n == 0 {
            return Err(TrainingError::EmptyTrainingSet);
        }
        let positives = training_set.positives();
        if positives == 0 || positives == n {
            return Err(TrainingError::SingleClass);
        }

        let raw: Vec<[f64; FEATURE_COUNT]> = training_set
            .samples()
            .iter()
            .map(|s| s.features.as_array())
            .collect();
        let scaler = StandardScaler::fit(&raw);
        let rows: Vec<[f64; FEATURE_COUNT]> = raw.iter().map(|r| scaler.transform(r)).collect();
        let labels: Vec<f64> = training_set
            .samples()
            .iter()
            .map(|s| f64::from(s.label))
            .collect();

        let (w_neg, w_pos) = self.class_weights(n, positives);
        let total_weight: f64 = labels
            .iter()
            .map(|y| if *y > 0.5 { w_pos } else { w_neg })
            .sum();

        let mut weights = [0.0; FEATURE_COUNT];
        let mut bias = 0.0;
        let lr = self.config.learning_rate;

        for epoch in 1..=self.config.epochs {
            let mut grad_w = [0.0; FEATURE_COUNT];
            let mut grad_b = 0.0;

            for (x, y) in rows.iter().zip(&labels) {
                let sample_weight = if *y > 0.5 { w_pos } else { w_neg };
                let err = (sigmoid(dot(&weights, x) + bias) - y) * sample_weight;
                for (g, xi) in grad_w.iter_mut().zip(x) {
                    *g += err * xi;
                }
                grad_b += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= lr * (g / total_weight + self.config.l2_penalty * *w);
            }
            bias -= lr * grad_b / total_weight;

            if epoch % DIVERGENCE_CHECK_INTERVAL == 0
                && !(bias.is_finite() && weights.iter().all(|w| w.is_finite()))
            {
                return Err(TrainingError::Diverged { epochs: epoch });
            }
        }

        if !(bias.is_finite() && weights.iter().all(|w| w.is_finite())) {
            return Err(TrainingError::Diverged {
                epochs: self.config.epochs,
            });
        }

        debug!(
            samples = n,
            positives = positives,
            weights = ?weights,
            bias = bias,
            "Fitted logistic model"
        );

        Ok(LogisticModel {
            scaler,
            weights: weights.to_vec(),
            bias,
        })
    }

    fn predict_probability(
        &self,
        model: &LogisticModel,
        features: &FeatureVector,
    ) -> Result<f64, InferenceError> {
        if !model.is_compatible() {
            return Err(InferenceError::ShapeMismatch {
                expected: model.expected_features(),
                actual: FEATURE_COUNT,
            });
        }

        let x = model.scaler.transform(&features.as_array());
        let z: f64 = model.weights.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>() + model.bias;
        let p = sigmoid(z);

        if p.is_finite() {
            Ok(p)
        } else {
            Err(InferenceError::NonFiniteOutput)
        }
    }
}

fn dot(a: &[f64; FEATURE_COUNT], b: &[f64; FEATURE_COUNT]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Numerically stable logistic function
fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}
