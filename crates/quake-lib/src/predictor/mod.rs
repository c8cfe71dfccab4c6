//! Significance classification
//!
//! The lifecycle manager only depends on the [`Classifier`] trait; the
//! shipped learner is [`LogisticClassifier`].

mod features;
mod logistic;
mod output;

pub use features::{FeatureProcessor, DEFAULT_DEPTH_KM, DEFAULT_MAGNITUDE};
pub use logistic::{LogisticClassifier, LogisticConfig, LogisticModel, StandardScaler};
pub use output::{OutputConfig, OutputFormatter, HIGH_RISK_THRESHOLD, MEDIUM_RISK_THRESHOLD};

use crate::error::{InferenceError, TrainingError};
use crate::models::{FeatureVector, TrainingSet};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Black-box learner with a uniform fit/predict contract
///
/// Any scaling the learner needs is fit once in [`Classifier::fit`], stored
/// in the returned model and reapplied as-is in
/// [`Classifier::predict_probability`].
pub trait Classifier: Send + Sync + 'static {
    /// Fitted state; must survive a serde round-trip unchanged
    type Model: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Stable identifier written into persisted artifacts
    fn algorithm(&self) -> &'static str;

    /// Fit a model on a labeled training set
    fn fit(&self, training_set: &TrainingSet) -> Result<Self::Model, TrainingError>;

    /// Probability in [0, 1] that the input is a significant quake
    fn predict_probability(
        &self,
        model: &Self::Model,
        features: &FeatureVector,
    ) -> Result<f64, InferenceError>;
}

/// Fitted classifier state with its training timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedModel<M> {
    pub model: M,
    pub algorithm: String,
    pub trained_at: DateTime<Utc>,
}

impl<M> TrainedModel<M> {
    pub fn new(model: M, algorithm: impl Into<String>, trained_at: DateTime<Utc>) -> Self {
        Self {
            model,
            algorithm: algorithm.into(),
            trained_at,
        }
    }
}
