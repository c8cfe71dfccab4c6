//! Feature extraction for training and inference
//!
//! Turns raw GeoJSON events into bounded `(latitude, longitude, depth,
//! magnitude)` vectors with a significance label. Out-of-range values are
//! clipped to their physical domain rather than rejected; records whose
//! structure cannot be interpreted are skipped.

use crate::error::MalformedRecordError;
use crate::models::{
    FeatureVector, LabeledSample, PredictionInput, RawEvent, TrainingSet, FEATURE_NAMES,
};
use crate::observability::QuakeMetrics;
use serde_json::Value;
use tracing::{debug, warn};

/// Depth assumed when an event has none (km)
pub const DEFAULT_DEPTH_KM: f64 = 10.0;

/// Magnitude assumed when an event has none
pub const DEFAULT_MAGNITUDE: f64 = 0.0;

/// Extracts bounded feature vectors from raw events
#[derive(Debug, Clone, Default)]
pub struct FeatureProcessor {
    metrics: QuakeMetrics,
}

impl FeatureProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Extract a labeled sample from one event
    ///
    /// A missing geometry is read as `[0, 0, 10]`. A geometry that is present
    /// but lacks longitude or latitude is malformed.
    pub fn extract(&self, event: &RawEvent) -> Result<LabeledSample, MalformedRecordError> {
        let (longitude, latitude, depth) = match event.geometry {
            None => (0.0, 0.0, DEFAULT_DEPTH_KM),
            Some(_) => {
                let longitude = event
                    .coordinate(0)
                    .ok_or(MalformedRecordError::MissingCoordinate("longitude"))
                    .and_then(|v| numeric("longitude", v))?;
                let latitude = event
                    .coordinate(1)
                    .ok_or(MalformedRecordError::MissingCoordinate("latitude"))
                    .and_then(|v| numeric("latitude", v))?;
                let depth = match event.coordinate(2) {
                    Some(v) => numeric("depth", v)?,
                    None => DEFAULT_DEPTH_KM,
                };
                (longitude, latitude, depth)
            }
        };

        let magnitude = match event.magnitude() {
            Some(v) => numeric("mag", v)?,
            None => DEFAULT_MAGNITUDE,
        };

        Ok(LabeledSample::new(FeatureVector::clamped(
            latitude, longitude, depth, magnitude,
        )))
    }

    /// Extract every event, skipping malformed records
    pub fn build_training_set(&self, events: &[RawEvent]) -> TrainingSet {
        let mut skipped = 0usize;

        let set: TrainingSet = events
            .iter()
            .filter_map(|event| match self.extract(event) {
                Ok(sample) if sample.features.is_finite() => Some(sample),
                Ok(_) => {
                    skipped += 1;
                    None
                }
                Err(e) => {
                    warn!(id = ?event.id, error = %e, "Skipping malformed quake");
                    skipped += 1;
                    None
                }
            })
            .collect();

        if skipped > 0 {
            self.metrics.add_records_skipped(skipped);
        }

        debug!(
            events = events.len(),
            samples = set.len(),
            positives = set.positives(),
            skipped = skipped,
            "Built training set"
        );

        set
    }

    /// Normalize a prediction request with the same domain rules as training
    pub fn normalize(
        &self,
        input: &PredictionInput,
    ) -> Result<FeatureVector, MalformedRecordError> {
        let values = [input.latitude, input.longitude, input.depth, input.magnitude];
        let invalid = FEATURE_NAMES
            .iter()
            .zip(values)
            .find(|(_, v)| !v.is_finite());
        if let Some((&name, _)) = invalid {
            return Err(MalformedRecordError::NonFinite(name));
        }

        Ok(FeatureVector::clamped(
            input.latitude,
            input.longitude,
            input.depth,
            input.magnitude,
        ))
    }
}

fn numeric(field: &'static str, value: &Value) -> Result<f64, MalformedRecordError> {
    value.as_f64().ok_or_else(|| MalformedRecordError::NonNumeric {
        field,
        value: value.to_string(),
    })
}
