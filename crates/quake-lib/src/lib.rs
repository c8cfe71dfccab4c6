//! Seismic risk prediction library
//!
//! This crate provides the model lifecycle for significant-quake prediction:
//! - Chunked historical event ingestion
//! - Feature normalization and training-set construction
//! - A swappable classifier behind a fit/predict trait
//! - Model artifact persistence
//! - Load-or-train startup, lazy retraining and risk prediction
//! - Health checks and observability

pub mod error;
pub mod health;
pub mod ingest;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod store;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use lifecycle::{
    LifecycleConfig, ModelLifecycleManager, ModelState, ModelStatus, TrainingAttempt,
    TrainingReport,
};
pub use models::*;
pub use observability::{QuakeMetrics, StructuredLogger};
pub use store::ModelStore;
