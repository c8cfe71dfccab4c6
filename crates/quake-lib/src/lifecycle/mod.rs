//! Model lifecycle management
//!
//! The [`ModelLifecycleManager`] owns the single live model. It restores a
//! persisted model on startup or trains a fresh one, serves predictions
//! from whatever model is current, and swaps in a new model only after a
//! training run has fully succeeded (fit and persisted).
//!
//! State machine:
//!
//! ```text
//! Uninitialized --load ok--> Loaded
//!               --load miss-> Untrained --train ok--> Trained
//! ```
//!
//! A failed training run leaves state and model exactly as they were.


use crate::error::{InferenceError, InsufficientDataError, TrainingRunError};
use crate::ingest::RangeFetcher;
use crate::models::{Prediction, PredictionInput};
use crate::observability::{QuakeMetrics, StructuredLogger};
use crate::predictor::{
    Classifier, FeatureProcessor, LogisticClassifier, OutputFormatter, TrainedModel,
};
use crate::store::ModelStore;
use chrono::{DateTime, Days, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Approximate month length used to size the training window
const DAYS_PER_MONTH: u64 = 30;

/// Lifecycle state of the live model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    Uninitialized,
    /// Restored from the persisted artifact
    Loaded,
    Untrained,
    /// Produced by a training run in this process
    Trained,
}

impl ModelState {
    /// Whether predictions can be served
    pub fn is_serving(&self) -> bool {
        matches!(self, ModelState::Loaded | ModelState::Trained)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelState::Uninitialized => "uninitialized",
            ModelState::Loaded => "loaded",
            ModelState::Untrained => "untrained",
            ModelState::Trained => "trained",
        }
    }
}

/// Training policy
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Length of the training window in 30-day months
    pub training_months: u64,
    /// Minimum fetched events before a run proceeds
    pub min_training_quakes: usize,
    /// Minimum significant samples before a run proceeds
    pub min_significant_quakes: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            training_months: 6,
            min_training_quakes: 50,
            min_significant_quakes: 5,
        }
    }
}

/// Summary of a successful training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub events_fetched: usize,
    pub samples: usize,
    pub positives: usize,
    pub chunks_failed: usize,
    pub trained_at: DateTime<Utc>,
}

/// Outcome of the most recent training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingAttempt {
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Point-in-time view of the manager
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub state: ModelState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_training: Option<TrainingAttempt>,
}

struct ModelSlot<M> {
    state: ModelState,
    model: Option<Arc<TrainedModel<M>>>,
}

/// Owns the live model and drives load, training and prediction
pub struct ModelLifecycleManager<C: Classifier = LogisticClassifier> {
    fetcher: RangeFetcher,
    processor: FeatureProcessor,
    classifier: C,
    store: ModelStore,
    formatter: OutputFormatter,
    config: LifecycleConfig,
    slot: RwLock<ModelSlot<C::Model>>,
    last_training: RwLock<Option<TrainingAttempt>>,
    /// Held for the whole duration of a training run
    training: Mutex<()>,
    metrics: QuakeMetrics,
    logger: StructuredLogger,
}

impl<C: Classifier> ModelLifecycleManager<C> {
    /// Create a manager in the `Uninitialized` state
    pub fn new(
        fetcher: RangeFetcher,
        classifier: C,
        store: ModelStore,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            fetcher,
            processor: FeatureProcessor::new(),
            classifier,
            store,
            formatter: OutputFormatter::new(),
            config,
            slot: RwLock::new(ModelSlot {
                state: ModelState::Uninitialized,
                model: None,
            }),
            last_training: RwLock::new(None),
            training: Mutex::new(()),
            metrics: QuakeMetrics::new(),
            logger: StructuredLogger::new("model-lifecycle"),
        }
    }

    /// Restore the persisted model, or train a new one if there is none
    pub async fn load_or_train(&self) -> ModelState {
        if self.restore() {
            return ModelState::Loaded;
        }

        warn!("No trained model found. Attempting to train...");
        self.set_state(ModelState::Untrained);

        match self.train_if_missing().await {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Model training failed"),
        }
        self.state()
    }

    /// Try to restore the persisted model; returns whether one was loaded
    pub fn restore(&self) -> bool {
        let Some(trained) = self.store.load::<C::Model>(self.classifier.algorithm()) else {
            return false;
        };

        self.logger.log_model_loaded(
            &self.store.path().display().to_string(),
            &trained.algorithm,
            trained.trained_at.timestamp(),
        );
        self.install(trained, ModelState::Loaded);
        true
    }

    /// Run a training run ending now
    ///
    /// Waits for any in-flight run to finish first; runs never overlap.
    pub async fn train(&self) -> Result<TrainingReport, TrainingRunError> {
        let _guard = self.training.lock().await;
        self.run_training(Utc::now()).await
    }

    /// Train only if no model is being served once the training lock is held
    ///
    /// Concurrent callers that all found no model collapse into one run.
    pub async fn train_if_missing(&self) -> Result<Option<TrainingReport>, TrainingRunError> {
        let _guard = self.training.lock().await;
        if self.has_model() {
            debug!("Model became available while waiting, skipping training");
            return Ok(None);
        }
        self.run_training(Utc::now()).await.map(Some)
    }

    /// Run a training run whose window ends at `now`
    pub async fn train_at(&self, now: DateTime<Utc>) -> Result<TrainingReport, TrainingRunError> {
        let _guard = self.training.lock().await;
        self.run_training(now).await
    }

    async fn run_training(&self, now: DateTime<Utc>) -> Result<TrainingReport, TrainingRunError> {
        self.metrics.inc_training_runs();

        let result = self.fit_window(now).await;
        let attempt = TrainingAttempt {
            finished_at: Utc::now(),
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        *self
            .last_training
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(attempt);

        if let Err(e) = &result {
            self.metrics.inc_training_failures();
            self.logger.log_training_aborted(&e.to_string());
        }
        result
    }

    async fn fit_window(&self, now: DateTime<Utc>) -> Result<TrainingReport, TrainingRunError> {
        let started = Instant::now();
        let end = now.date_naive();
        let start = self
            .config
            .training_months
            .checked_mul(DAYS_PER_MONTH)
            .and_then(|days| end.checked_sub_days(Days::new(days)))
            .ok_or(TrainingRunError::InvalidWindow {
                months: self.config.training_months,
            })?;
        self.logger
            .log_training_started(&start.to_string(), &end.to_string());

        let fetched = self.fetcher.fetch(start, end).await;
        let events_fetched = fetched.events.len();
        if events_fetched < self.config.min_training_quakes {
            return Err(InsufficientDataError::TooFewEvents {
                fetched: events_fetched,
                required: self.config.min_training_quakes,
            }
            .into());
        }

        let training_set = self.processor.build_training_set(&fetched.events);
        if training_set.len() < self.config.min_training_quakes {
            return Err(InsufficientDataError::TooFewSamples {
                usable: training_set.len(),
                required: self.config.min_training_quakes,
            }
            .into());
        }
        let positives = training_set.positives();
        if positives < self.config.min_significant_quakes {
            return Err(InsufficientDataError::TooFewPositives {
                positives,
                required: self.config.min_significant_quakes,
            }
            .into());
        }

        let model = self.classifier.fit(&training_set)?;
        let trained = TrainedModel::new(model, self.classifier.algorithm(), Utc::now());
        self.store.save(&trained)?;

        let report = TrainingReport {
            events_fetched,
            samples: training_set.len(),
            positives,
            chunks_failed: fetched.report.chunks_failed,
            trained_at: trained.trained_at,
        };

        self.install(trained, ModelState::Trained);
        self.logger.log_training_completed(
            report.samples,
            report.positives,
            self.classifier.algorithm(),
            started.elapsed().as_millis() as u64,
        );

        Ok(report)
    }

    /// Swap in a fully built model
    fn install(&self, trained: TrainedModel<C::Model>, state: ModelState) {
        let trained_at = trained.trained_at.timestamp();
        {
            let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
            slot.model = Some(Arc::new(trained));
            slot.state = state;
        }
        self.metrics.set_model_trained_at(trained_at);
        info!(state = state.as_str(), trained_at = trained_at, "Model installed");
    }

    fn set_state(&self, state: ModelState) {
        self.slot
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .state = state;
    }

    /// Predict significance risk for one event
    ///
    /// Returns [`InferenceError::ModelUnavailable`] when no model is being
    /// served; this never triggers training by itself.
    pub fn predict(&self, input: &PredictionInput) -> Result<Prediction, InferenceError> {
        let started = Instant::now();

        let Some(model) = self.current_model() else {
            self.metrics.inc_predictions_unavailable();
            return Err(InferenceError::ModelUnavailable);
        };

        let features = self
            .processor
            .normalize(input)
            .map_err(|e| InferenceError::InvalidInput(e.to_string()))?;

        let prediction = self
            .classifier
            .predict_probability(&model.model, &features)
            .and_then(|p| self.formatter.format(p))
            .map_err(|e| {
                warn!(error = %e, "Prediction error");
                e
            })?;

        self.metrics.inc_predictions_served();
        self.metrics
            .observe_prediction_latency(started.elapsed().as_secs_f64());
        self.logger.log_prediction(
            input.latitude,
            input.longitude,
            prediction.probability,
            prediction.risk.as_str(),
        );

        Ok(prediction)
    }

    /// Current model reference, if one is being served
    pub fn current_model(&self) -> Option<Arc<TrainedModel<C::Model>>> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        if slot.state.is_serving() {
            slot.model.clone()
        } else {
            None
        }
    }

    pub fn has_model(&self) -> bool {
        self.current_model().is_some()
    }

    pub fn state(&self) -> ModelState {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .state
    }

    pub fn status(&self) -> ModelStatus {
        let (state, model) = {
            let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
            (slot.state, slot.model.clone())
        };
        let last_training = self
            .last_training
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        ModelStatus {
            state,
            algorithm: model.as_ref().map(|m| m.algorithm.clone()),
            trained_at: model.as_ref().map(|m| m.trained_at),
            last_training,
        }
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }
}
