//! Observability infrastructure for the seismic risk predictor
//!
//! Provides:
//! - Prometheus metrics (fetch failures, training runs, prediction latency, model age)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter,
    IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for prediction latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<QuakeMetricsInner> = OnceLock::new();

struct QuakeMetricsInner {
    chunks_fetched: IntCounter,
    chunk_failures: IntCounter,
    events_fetched: IntCounter,
    records_skipped: IntCounter,
    training_runs: IntCounter,
    training_failures: IntCounter,
    predictions_served: IntCounter,
    predictions_unavailable: IntCounter,
    prediction_latency_seconds: Histogram,
    model_trained_at_seconds: IntGauge,
}

impl QuakeMetricsInner {
    fn new() -> Self {
        Self {
            chunks_fetched: register_int_counter!(
                "quake_fetch_chunks_total",
                "Number of upstream chunk queries that succeeded"
            )
            .expect("Failed to register chunks_fetched"),

            chunk_failures: register_int_counter!(
                "quake_fetch_chunk_failures_total",
                "Number of upstream chunk queries that failed and were skipped"
            )
            .expect("Failed to register chunk_failures"),

            events_fetched: register_int_counter!(
                "quake_events_fetched_total",
                "Number of raw seismic events fetched from upstream"
            )
            .expect("Failed to register events_fetched"),

            records_skipped: register_int_counter!(
                "quake_records_skipped_total",
                "Number of malformed event records skipped during feature extraction"
            )
            .expect("Failed to register records_skipped"),

            training_runs: register_int_counter!(
                "quake_training_runs_total",
                "Number of training runs attempted"
            )
            .expect("Failed to register training_runs"),

            training_failures: register_int_counter!(
                "quake_training_failures_total",
                "Number of training runs aborted"
            )
            .expect("Failed to register training_failures"),

            predictions_served: register_int_counter!(
                "quake_predictions_total",
                "Number of risk predictions served"
            )
            .expect("Failed to register predictions_served"),

            predictions_unavailable: register_int_counter!(
                "quake_predictions_unavailable_total",
                "Number of prediction requests that could not be answered"
            )
            .expect("Failed to register predictions_unavailable"),

            prediction_latency_seconds: register_histogram!(
                "quake_prediction_latency_seconds",
                "Time spent normalizing input and running inference",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            model_trained_at_seconds: register_int_gauge!(
                "quake_model_trained_at_seconds",
                "Unix timestamp at which the live model was trained (0 if none)"
            )
            .expect("Failed to register model_trained_at_seconds"),
        }
    }
}

/// Prometheus metrics handle
///
/// Lightweight handle to the global metrics instance. Clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct QuakeMetrics {
    _private: (),
}

impl Default for QuakeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for QuakeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuakeMetrics").finish_non_exhaustive()
    }
}

impl QuakeMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(QuakeMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &QuakeMetricsInner {
        GLOBAL_METRICS.get_or_init(QuakeMetricsInner::new)
    }

    pub fn inc_chunks_fetched(&self) {
        self.inner().chunks_fetched.inc();
    }

    pub fn inc_chunk_failures(&self) {
        self.inner().chunk_failures.inc();
    }

    pub fn add_events_fetched(&self, count: usize) {
        self.inner().events_fetched.inc_by(count as u64);
    }

    pub fn add_records_skipped(&self, count: usize) {
        self.inner().records_skipped.inc_by(count as u64);
    }

    pub fn inc_training_runs(&self) {
        self.inner().training_runs.inc();
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    pub fn inc_predictions_served(&self) {
        self.inner().predictions_served.inc();
    }

    pub fn inc_predictions_unavailable(&self) {
        self.inner().predictions_unavailable.inc();
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Record when the live model was trained
    pub fn set_model_trained_at(&self, unix_secs: i64) {
        self.inner().model_trained_at_seconds.set(unix_secs);
    }
}

/// Structured logger for lifecycle events
///
/// Keeps event names and field sets consistent across the training and
/// serving paths.
#[derive(Clone, Debug)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn log_model_loaded(&self, path: &str, algorithm: &str, trained_at: i64) {
        info!(
            event = "model_loaded",
            service = %self.service,
            path = %path,
            algorithm = %algorithm,
            trained_at = trained_at,
            "Loaded existing model"
        );
    }

    pub fn log_training_started(&self, start: &str, end: &str) {
        info!(
            event = "training_started",
            service = %self.service,
            window_start = %start,
            window_end = %end,
            "Training model"
        );
    }

    pub fn log_training_completed(
        &self,
        samples: usize,
        positives: usize,
        algorithm: &str,
        elapsed_ms: u64,
    ) {
        info!(
            event = "training_completed",
            service = %self.service,
            samples = samples,
            positives = positives,
            algorithm = %algorithm,
            elapsed_ms = elapsed_ms,
            "Model trained successfully"
        );
    }

    pub fn log_training_aborted(&self, reason: &str) {
        warn!(
            event = "training_aborted",
            service = %self.service,
            reason = %reason,
            "Model training aborted"
        );
    }

    pub fn log_prediction(&self, latitude: f64, longitude: f64, probability: f64, risk: &str) {
        tracing::debug!(
            event = "prediction_generated",
            service = %self.service,
            latitude = latitude,
            longitude = longitude,
            probability = probability,
            risk = %risk,
            "Generated risk prediction"
        );
    }

    pub fn log_startup(&self, version: &str, model_state: &str) {
        info!(
            event = "server_started",
            service = %self.service,
            version = %version,
            model_state = %model_state,
            "Seismic risk predictor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            service = %self.service,
            reason = %reason,
            "Seismic risk predictor shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_handles_share_registry() {
        let a = QuakeMetrics::new();
        let b = QuakeMetrics::new();
        a.inc_training_runs();
        b.inc_training_runs();
        a.set_model_trained_at(1_700_000_000);

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "quake_training_runs_total"));
        assert!(families
            .iter()
            .any(|f| f.get_name() == "quake_model_trained_at_seconds"));
    }

    #[test]
    fn test_structured_logger_does_not_panic() {
        let logger = StructuredLogger::new("test");
        logger.log_training_started("2024-01-01", "2024-06-29");
        logger.log_training_aborted("not enough data");
        logger.log_prediction(37.7, -122.4, 0.9, "high");
    }
}
