//! Prediction output formatting
//!
//! Converts a raw significance probability into a [`Prediction`] with a
//! discrete risk tier.

use crate::error::InferenceError;
use crate::models::{Prediction, RiskTier};

/// Probability above which risk is `medium`
pub const MEDIUM_RISK_THRESHOLD: f64 = 0.3;

/// Probability above which risk is `high`
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

/// Thresholds used to derive risk tiers
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub medium_threshold: f64,
    pub high_threshold: f64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            medium_threshold: MEDIUM_RISK_THRESHOLD,
            high_threshold: HIGH_RISK_THRESHOLD,
        }
    }
}

/// Formats classifier probabilities into predictions
#[derive(Debug, Clone, Default)]
pub struct OutputFormatter {
    config: OutputConfig,
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: OutputConfig) -> Self {
        Self { config }
    }

    /// Risk tier for a probability; both thresholds are exclusive
    pub fn risk_tier(&self, probability: f64) -> RiskTier {
        if probability > self.config.high_threshold {
            RiskTier::High
        } else if probability > self.config.medium_threshold {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Build a prediction, clipping the probability into [0, 1]
    pub fn format(&self, probability: f64) -> Result<Prediction, InferenceError> {
        if !probability.is_finite() {
            return Err(InferenceError::NonFiniteOutput);
        }
        let probability = probability.clamp(0.0, 1.0);
        Ok(Prediction {
            probability,
            risk: self.risk_tier(probability),
        })
    }
}
