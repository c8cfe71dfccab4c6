//! Server configuration

use anyhow::{Context, Result};
use quake_lib::ingest::{FetchConfig, DEFAULT_USGS_URL};
use quake_lib::lifecycle::LifecycleConfig;
use quake_lib::store::DEFAULT_MODEL_FILE;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration, read from `QUAKE_*` environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP port for the prediction API, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Location of the persisted model artifact
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// USGS FDSN event query endpoint
    #[serde(default = "default_usgs_url")]
    pub usgs_url: String,

    /// Training window length in 30-day months
    #[serde(default = "default_training_months")]
    pub training_months: u64,

    #[serde(default = "default_min_training_quakes")]
    pub min_training_quakes: usize,

    #[serde(default = "default_min_significant_quakes")]
    pub min_significant_quakes: usize,

    /// Days per upstream query during training
    #[serde(default = "default_chunk_days")]
    pub chunk_days: u64,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause between training chunk queries in milliseconds
    #[serde(default = "default_chunk_delay")]
    pub chunk_delay_ms: u64,

    #[serde(default = "default_training_min_magnitude")]
    pub training_min_magnitude: f64,
}

fn default_api_port() -> u16 {
    5000
}

fn default_model_path() -> PathBuf {
    PathBuf::from(DEFAULT_MODEL_FILE)
}

fn default_usgs_url() -> String {
    DEFAULT_USGS_URL.to_string()
}

fn default_training_months() -> u64 {
    6
}

fn default_min_training_quakes() -> usize {
    50
}

fn default_min_significant_quakes() -> usize {
    5
}

fn default_chunk_days() -> u64 {
    60
}

fn default_request_timeout() -> u64 {
    45
}

fn default_chunk_delay() -> u64 {
    1000
}

fn default_training_min_magnitude() -> f64 {
    2.5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            model_path: default_model_path(),
            usgs_url: default_usgs_url(),
            training_months: default_training_months(),
            min_training_quakes: default_min_training_quakes(),
            min_significant_quakes: default_min_significant_quakes(),
            chunk_days: default_chunk_days(),
            request_timeout_secs: default_request_timeout(),
            chunk_delay_ms: default_chunk_delay(),
            training_min_magnitude: default_training_min_magnitude(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("QUAKE").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid QUAKE_* configuration")
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            chunk_days: self.chunk_days,
            request_timeout: self.request_timeout(),
            chunk_delay: Duration::from_millis(self.chunk_delay_ms),
            min_magnitude: self.training_min_magnitude,
        }
    }

    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            training_months: self.training_months,
            min_training_quakes: self.min_training_quakes,
            min_significant_quakes: self.min_significant_quakes,
        }
    }
}
