//! USGS FDSN event service client

use super::EventSource;
use crate::error::FetchChunkError;
use crate::models::RawEvent;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Public USGS event query endpoint
pub const DEFAULT_USGS_URL: &str = "https://earthquake.usgs.gov/fdsnws/event/1/query";

/// Date format accepted by the FDSN `starttime`/`endtime` parameters
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Event source backed by the USGS GeoJSON feed
pub struct UsgsEventSource {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl UsgsEventSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid USGS URL")?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    fn query_url(&self, start: NaiveDate, end: NaiveDate, min_magnitude: f64) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("format", "geojson")
            .append_pair("starttime", &start.format(DATE_FORMAT).to_string())
            .append_pair("endtime", &end.format(DATE_FORMAT).to_string())
            .append_pair("minmagnitude", &min_magnitude.to_string())
            .append_pair("orderby", "time");
        url
    }

    fn map_transport_error(&self, err: reqwest::Error) -> FetchChunkError {
        if err.is_timeout() {
            FetchChunkError::Timeout(self.timeout)
        } else {
            FetchChunkError::Transport(err.to_string())
        }
    }
}

#[async_trait]
impl EventSource for UsgsEventSource {
    async fn query(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        min_magnitude: f64,
    ) -> Result<Vec<RawEvent>, FetchChunkError> {
        let url = self.query_url(start, end, min_magnitude);
        debug!(url = %url, "Querying USGS event feed");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchChunkError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        decode_feature_collection(&body)
    }
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Value>,
}

/// Decode a GeoJSON FeatureCollection body
///
/// A body that is not a collection fails the whole chunk. Individual
/// features that are not JSON objects are dropped with a warning.
pub fn decode_feature_collection(body: &str) -> Result<Vec<RawEvent>, FetchChunkError> {
    let collection: FeatureCollection = serde_json::from_str(body)
        .map_err(|e| FetchChunkError::MalformedPayload(e.to_string()))?;

    let total = collection.features.len();
    let events: Vec<RawEvent> = collection
        .features
        .into_iter()
        .filter_map(|feature| match serde_json::from_value::<RawEvent>(feature) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(error = %e, "Dropping undecodable feature");
                None
            }
        })
        .collect();

    if events.len() < total {
        debug!(decoded = events.len(), total = total, "Some features were not decodable");
    }

    Ok(events)
}
