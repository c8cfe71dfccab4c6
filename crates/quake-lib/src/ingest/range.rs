//! Chunked historical range fetching
//!
//! Long windows are split into fixed-size chunks queried one after another
//! with a per-request timeout and a pause between requests. A failed chunk
//! is logged and dropped; there is no retry.

use super::EventSource;
use crate::error::FetchChunkError;
use crate::models::RawEvent;
use crate::observability::QuakeMetrics;
use chrono::{Days, NaiveDate};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for chunked range fetches
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Days covered by a single upstream query
    pub chunk_days: u64,
    /// Timeout applied to each chunk query
    pub request_timeout: Duration,
    /// Pause between consecutive chunk queries
    pub chunk_delay: Duration,
    /// Minimum magnitude requested from upstream
    pub min_magnitude: f64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            chunk_days: 60,
            request_timeout: Duration::from_secs(45),
            chunk_delay: Duration::from_secs(1),
            min_magnitude: 2.5,
        }
    }
}

/// Per-fetch chunk accounting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub chunks_attempted: usize,
    pub chunks_succeeded: usize,
    pub chunks_failed: usize,
}

/// Events gathered from all successful chunks
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub events: Vec<RawEvent>,
    pub report: FetchReport,
}

/// Split `[start, end]` into consecutive chunks of at most `chunk_days`
///
/// Each chunk ends at `min(cursor + chunk_days, end)` and the next one
/// starts the day after. An empty or inverted window yields no chunks.
pub fn plan_chunks(
    start: NaiveDate,
    end: NaiveDate,
    chunk_days: u64,
) -> Vec<(NaiveDate, NaiveDate)> {
    let step = Days::new(chunk_days.max(1));
    let mut chunks = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let chunk_end = cursor.checked_add_days(step).map_or(end, |d| d.min(end));
        chunks.push((cursor, chunk_end));
        match chunk_end.checked_add_days(Days::new(1)) {
            Some(next) => cursor = next,
            None => break,
        }
    }

    chunks
}

/// Fetches seismic events for arbitrary windows via chunked queries
pub struct RangeFetcher {
    source: Arc<dyn EventSource>,
    config: FetchConfig,
    metrics: QuakeMetrics,
}

impl RangeFetcher {
    pub fn new(source: Arc<dyn EventSource>, config: FetchConfig) -> Self {
        Self {
            source,
            config,
            metrics: QuakeMetrics::new(),
        }
    }

    /// Fetch every event in `[start, end]`
    ///
    /// Blocks the calling task for the whole window, including the pauses
    /// between chunks. An empty result is not an error.
    pub async fn fetch(&self, start: NaiveDate, end: NaiveDate) -> FetchOutcome {
        let chunks = plan_chunks(start, end, self.config.chunk_days);
        if chunks.is_empty() {
            warn!(start = %start, end = %end, "Empty fetch window, nothing to query");
            return FetchOutcome::default();
        }

        info!(
            start = %start,
            end = %end,
            chunks = chunks.len(),
            "Fetching historical events"
        );

        let mut outcome = FetchOutcome::default();
        let last = chunks.len() - 1;

        for (i, (chunk_start, chunk_end)) in chunks.into_iter().enumerate() {
            outcome.report.chunks_attempted += 1;

            match self.fetch_chunk(chunk_start, chunk_end).await {
                Ok(events) => {
                    debug!(
                        chunk_start = %chunk_start,
                        chunk_end = %chunk_end,
                        events = events.len(),
                        "Chunk fetched"
                    );
                    outcome.report.chunks_succeeded += 1;
                    self.metrics.inc_chunks_fetched();
                    self.metrics.add_events_fetched(events.len());
                    outcome.events.extend(events);
                }
                Err(e) => {
                    warn!(
                        chunk_start = %chunk_start,
                        chunk_end = %chunk_end,
                        error = %e,
                        "Failed to fetch chunk, skipping"
                    );
                    outcome.report.chunks_failed += 1;
                    self.metrics.inc_chunk_failures();
                }
            }

            if i < last && !self.config.chunk_delay.is_zero() {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
        }

        info!(
            events = outcome.events.len(),
            succeeded = outcome.report.chunks_succeeded,
            failed = outcome.report.chunks_failed,
            "Historical fetch complete"
        );

        outcome
    }

    async fn fetch_chunk(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<RawEvent>, FetchChunkError> {
        let timeout = self.config.request_timeout;
        tokio::time::timeout(timeout, self.source.query(start, end, self.config.min_magnitude))
            .await
            .map_err(|_| FetchChunkError::Timeout(timeout))?
    }
}
