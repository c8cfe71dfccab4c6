//! Seismic event ingestion
//!
//! This module provides the upstream event source abstraction and a
//! chunked range fetcher that splits long historical windows into
//! provider-sized queries, skipping chunks that fail.

mod range;
mod usgs;


pub use range::{plan_chunks, FetchConfig, FetchOutcome, FetchReport, RangeFetcher};
pub use usgs::{decode_feature_collection, UsgsEventSource, DEFAULT_USGS_URL};

use crate::error::FetchChunkError;
use crate::models::RawEvent;
use chrono::NaiveDate;

pub use async_trait::async_trait;

/// Time-range query service for seismic events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Fetch events between `start` and `end` (inclusive dates) at or above `min_magnitude`
    async fn query(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        min_magnitude: f64,
    ) -> Result<Vec<RawEvent>, FetchChunkError>;
}
