//! Error taxonomy for the model lifecycle
//!
//! Per-item errors ([`FetchChunkError`], [`MalformedRecordError`]) are
//! contained where they occur and logged. Run-level errors
//! ([`TrainingRunError`]) abort a training run and leave the manager in its
//! prior state. None of them are fatal to the process.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A single chunk of a range fetch failed and was skipped
#[derive(Debug, Error)]
pub enum FetchChunkError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// A raw event could not be turned into a feature vector
#[derive(Debug, Error, PartialEq)]
pub enum MalformedRecordError {
    #[error("event has no {0} coordinate")]
    MissingCoordinate(&'static str),

    #[error("field `{field}` is not numeric: {value}")]
    NonNumeric { field: &'static str, value: String },

    #[error("field `{0}` is not finite")]
    NonFinite(&'static str),
}

/// Not enough data to attempt a training run
#[derive(Debug, Error, PartialEq)]
pub enum InsufficientDataError {
    #[error("fetched {fetched} events, need at least {required}")]
    TooFewEvents { fetched: usize, required: usize },

    #[error("training set has {usable} usable samples, need at least {required}")]
    TooFewSamples { usable: usize, required: usize },

    #[error("training set has {positives} significant quakes, need at least {required}")]
    TooFewPositives { positives: usize, required: usize },
}

/// The classifier could not be fitted
#[derive(Debug, Error, PartialEq)]
pub enum TrainingError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("training set contains a single class")]
    SingleClass,

    #[error("optimizer diverged after {epochs} epochs")]
    Diverged { epochs: usize },
}

/// Prediction could not be produced
#[derive(Debug, Error, PartialEq)]
pub enum InferenceError {
    #[error("no trained model is available")]
    ModelUnavailable,

    #[error("model expects {expected} features, input has {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("model produced a non-finite probability")]
    NonFiniteOutput,

    #[error("invalid prediction input: {0}")]
    InvalidInput(String),
}

/// Saving or restoring the model artifact failed
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("model artifact not found at {0}")]
    NotFound(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to (de)serialize model artifact: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported artifact format version {0}")]
    UnsupportedVersion(u32),

    #[error("artifact was produced by `{found}`, expected `{expected}`")]
    AlgorithmMismatch { expected: String, found: String },

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
}

/// Why a training run was aborted
#[derive(Debug, Error)]
pub enum TrainingRunError {
    #[error(transparent)]
    InsufficientData(#[from] InsufficientDataError),

    #[error("classifier failed to fit: {0}")]
    Training(#[from] TrainingError),

    #[error("failed to persist trained model: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("a {months}-month training window is out of the supported date range")]
    InvalidWindow { months: u64 },
}
