//! Model artifact persistence
//!
//! A trained model is stored as a single JSON envelope carrying the
//! algorithm name, training timestamp and a SHA256 checksum of the
//! serialized model. Writes go through a temp file and a rename so a crash
//! never leaves a half-written artifact behind.

use crate::error::PersistenceError;
use crate::predictor::TrainedModel;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Current artifact layout version
pub const FORMAT_VERSION: u32 = 1;

/// Default artifact file name
pub const DEFAULT_MODEL_FILE: &str = "earthquake_model.json";

#[derive(Debug, Serialize, Deserialize)]
struct ModelArtifact {
    format_version: u32,
    algorithm: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    trained_at: Option<DateTime<Utc>>,
    checksum: String,
    model: Value,
}

/// Persists and restores the single model artifact
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the model atomically, replacing any previous artifact
    pub fn save<M: Serialize>(&self, trained: &TrainedModel<M>) -> Result<(), PersistenceError> {
        let model = serde_json::to_value(&trained.model)?;
        let checksum = compute_checksum(&serde_json::to_vec(&model)?);

        let artifact = ModelArtifact {
            format_version: FORMAT_VERSION,
            algorithm: trained.algorithm.clone(),
            trained_at: Some(trained.trained_at),
            checksum,
            model,
        };
        let bytes = serde_json::to_vec_pretty(&artifact)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_error(parent, e))?;
        }

        let temp_path = self.path.with_extension("tmp");
        let mut file = File::create(&temp_path).map_err(|e| self.io_error(&temp_path, e))?;
        file.write_all(&bytes)
            .map_err(|e| self.io_error(&temp_path, e))?;
        file.sync_all().map_err(|e| self.io_error(&temp_path, e))?;

        fs::rename(&temp_path, &self.path).map_err(|e| self.io_error(&self.path, e))?;

        info!(
            path = %self.path.display(),
            algorithm = %trained.algorithm,
            size = bytes.len(),
            checksum = %artifact.checksum,
            "Model artifact saved"
        );

        Ok(())
    }

    /// Restore the model, or `None` if it is missing or fails integrity checks
    pub fn load<M: DeserializeOwned>(&self, algorithm: &str) -> Option<TrainedModel<M>> {
        match self.try_load(algorithm) {
            Ok(model) => Some(model),
            Err(PersistenceError::NotFound(path)) => {
                debug!(path = %path.display(), "No model artifact found");
                None
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Error loading model");
                None
            }
        }
    }

    /// Restore the model, reporting why it could not be used
    pub fn try_load<M: DeserializeOwned>(
        &self,
        algorithm: &str,
    ) -> Result<TrainedModel<M>, PersistenceError> {
        if !self.path.exists() {
            return Err(PersistenceError::NotFound(self.path.clone()));
        }

        let bytes = fs::read(&self.path).map_err(|e| self.io_error(&self.path, e))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;

        if artifact.format_version != FORMAT_VERSION {
            return Err(PersistenceError::UnsupportedVersion(artifact.format_version));
        }
        if artifact.algorithm != algorithm {
            return Err(PersistenceError::AlgorithmMismatch {
                expected: algorithm.to_string(),
                found: artifact.algorithm,
            });
        }

        let actual = compute_checksum(&serde_json::to_vec(&artifact.model)?);
        if actual != artifact.checksum {
            return Err(PersistenceError::ChecksumMismatch {
                expected: artifact.checksum,
                actual,
            });
        }

        let trained_at = match artifact.trained_at {
            Some(ts) => ts,
            None => self.modified_at()?,
        };
        let model: M = serde_json::from_value(artifact.model)?;

        Ok(TrainedModel::new(model, artifact.algorithm, trained_at))
    }

    /// Last modification time of the artifact
    pub fn modified_at(&self) -> Result<DateTime<Utc>, PersistenceError> {
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map_err(|e| self.io_error(&self.path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }

    fn io_error(&self, path: &Path, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct DummyModel {
        weights: Vec<f64>,
        bias: f64,
    }

    fn dummy() -> TrainedModel<DummyModel> {
        TrainedModel::new(
            DummyModel {
                weights: vec![0.1, -2.345678901234567, 1e-17, 3.0],
                bias: -0.333333333333333,
            },
            "dummy",
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"model bytes");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"model bytes"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));

        store.save(&dummy()).unwrap();
        let loaded: TrainedModel<DummyModel> = store.load("dummy").unwrap();

        assert_eq!(loaded, dummy());
        assert!(!dir.path().join("model.tmp").exists());
    }

    #[test]
    fn test_save_creates_parent_directory() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("nested/models/model.json"));
        store.save(&dummy()).unwrap();
        assert!(store.exists());
    }

    #[test]
    fn test_missing_artifact_is_absent() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("missing.json"));
        assert!(store.load::<DummyModel>("dummy").is_none());
        assert!(matches!(
            store.try_load::<DummyModel>("dummy"),
            Err(PersistenceError::NotFound(_))
        ));
    }

    #[test]
    fn test_corrupt_artifact_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, b"\x00\x01not json at all").unwrap();

        let store = ModelStore::new(&path);
        assert!(store.load::<DummyModel>("dummy").is_none());
        assert!(matches!(
            store.try_load::<DummyModel>("dummy"),
            Err(PersistenceError::Serialization(_))
        ));
    }

    #[test]
    fn test_tampered_model_fails_checksum() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        store.save(&dummy()).unwrap();

        let mut artifact: Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        artifact["model"]["bias"] = Value::from(42.0);
        fs::write(store.path(), serde_json::to_vec(&artifact).unwrap()).unwrap();

        assert!(matches!(
            store.try_load::<DummyModel>("dummy"),
            Err(PersistenceError::ChecksumMismatch { .. })
        ));
        assert!(store.load::<DummyModel>("dummy").is_none());
    }

    #[test]
    fn test_algorithm_mismatch() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        store.save(&dummy()).unwrap();

        assert!(matches!(
            store.try_load::<DummyModel>("random-forest"),
            Err(PersistenceError::AlgorithmMismatch { .. })
        ));
    }

    #[test]
    fn test_unsupported_format_version() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        store.save(&dummy()).unwrap();

        let mut artifact: Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        artifact["format_version"] = Value::from(99);
        fs::write(store.path(), serde_json::to_vec(&artifact).unwrap()).unwrap();

        assert!(matches!(
            store.try_load::<DummyModel>("dummy"),
            Err(PersistenceError::UnsupportedVersion(99))
        ));
    }

    #[test]
    fn test_missing_trained_at_uses_file_mtime() {
        let dir = TempDir::new().unwrap();
        let store = ModelStore::new(dir.path().join("model.json"));
        store.save(&dummy()).unwrap();

        let mut artifact: Value = serde_json::from_slice(&fs::read(store.path()).unwrap()).unwrap();
        artifact.as_object_mut().unwrap().remove("trained_at");
        fs::write(store.path(), serde_json::to_vec(&artifact).unwrap()).unwrap();

        let loaded: TrainedModel<DummyModel> = store.load("dummy").unwrap();
        assert_eq!(loaded.trained_at, store.modified_at().unwrap());
        assert_ne!(loaded.trained_at, dummy().trained_at);
    }
}
