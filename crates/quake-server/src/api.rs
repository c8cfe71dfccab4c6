//! HTTP API for predictions, recent events, health checks and metrics

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{Days, Utc};
use prometheus::{Encoder, TextEncoder};
use quake_lib::{
    error::InferenceError,
    health::{components, ComponentStatus, HealthRegistry},
    ingest::EventSource,
    ModelLifecycleManager, Prediction, PredictionInput, RawEvent,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info, warn};

const DEFAULT_DAYS: i64 = 30;
const MAX_DAYS: i64 = 90;
const DEFAULT_MIN_MAGNITUDE: f64 = 2.5;
const MIN_MAGNITUDE_RANGE: (f64, f64) = (1.0, 9.0);

/// Depth assumed for events without a depth coordinate
const FALLBACK_DEPTH_KM: f64 = 10.0;
/// Magnitude assumed for events without one
const FALLBACK_MAGNITUDE: f64 = 4.0;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ModelLifecycleManager>,
    pub source: Arc<dyn EventSource>,
    pub health_registry: HealthRegistry,
}

impl AppState {
    pub fn new(
        manager: Arc<ModelLifecycleManager>,
        source: Arc<dyn EventSource>,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            manager,
            source,
            health_registry,
        }
    }
}

type Params = HashMap<String, String>;

fn error_response(status: StatusCode, error: impl ToString, message: &str) -> Response {
    (
        status,
        Json(json!({
            "status": "error",
            "error": error.to_string(),
            "message": message,
        })),
    )
        .into_response()
}

/// Parse an optional query parameter, falling back to `default` when absent
fn parse_param<T: FromStr>(params: &Params, name: &str, default: Option<T>) -> Result<T, String> {
    match params.get(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| format!("Invalid value for '{}': {}", name, raw)),
        None => default.ok_or_else(|| format!("Missing parameter '{}'", name)),
    }
}

fn prediction_input(params: &Params) -> Result<PredictionInput, String> {
    let latitude: f64 = parse_param(params, "lat", None)?;
    // `lon` wins over `lng` when both are given
    let longitude: f64 = if params.contains_key("lon") {
        parse_param(params, "lon", None)?
    } else {
        parse_param(params, "lng", None)?
    };
    let depth = parse_param(params, "depth", Some(PredictionInput::DEFAULT_DEPTH))?;
    let magnitude = parse_param(params, "mag", Some(PredictionInput::DEFAULT_MAGNITUDE))?;

    Ok(PredictionInput::new(latitude, longitude)
        .with_depth(depth)
        .with_magnitude(magnitude))
}

/// Predict, training once on demand when no model has been produced yet
async fn predict_with_lazy_training(
    state: &AppState,
    input: &PredictionInput,
) -> Result<Prediction, InferenceError> {
    match state.manager.predict(input) {
        Err(InferenceError::ModelUnavailable) if !state.manager.has_model() => {
            warn!("No model available, attempting to train");
            match state.manager.train_if_missing().await {
                Ok(_) => {
                    state
                        .health_registry
                        .record_model_state(state.manager.state())
                        .await;
                }
                Err(e) => warn!(error = %e, "On-demand training failed"),
            }
            state.manager.predict(input)
        }
        other => other,
    }
}

/// Significance probability and risk tier for a single location
async fn predict(State(state): State<Arc<AppState>>, Query(params): Query<Params>) -> Response {
    let input = match prediction_input(&params) {
        Ok(input) => input,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e, "Prediction failed"),
    };

    match predict_with_lazy_training(&state, &input).await {
        Ok(prediction) => Json(json!({
            "status": "success",
            "latitude": input.latitude,
            "longitude": input.longitude,
            "probability": prediction.probability,
            "risk": prediction.risk,
            "timestamp": Utc::now().to_rfc3339(),
        }))
        .into_response(),
        Err(e) => error_response(StatusCode::BAD_REQUEST, e, "Prediction failed"),
    }
}

/// Location of an upstream event, with fallbacks for missing parts
fn event_input(event: &RawEvent) -> Option<PredictionInput> {
    let number = |v: Option<&Value>| v.and_then(Value::as_f64);

    let (latitude, longitude, depth) = if event.geometry.is_some() {
        (
            number(event.coordinate(1))?,
            number(event.coordinate(0))?,
            number(event.coordinate(2)).unwrap_or(FALLBACK_DEPTH_KM),
        )
    } else {
        (0.0, 0.0, FALLBACK_DEPTH_KM)
    };
    let magnitude = match event.magnitude() {
        Some(v) => v.as_f64()?,
        None => FALLBACK_MAGNITUDE,
    };

    Some(
        PredictionInput::new(latitude, longitude)
            .with_depth(depth)
            .with_magnitude(magnitude),
    )
}

/// Attach `prediction` and `risk` properties to each event the model can score
fn annotate(manager: &ModelLifecycleManager, events: &mut [RawEvent]) {
    for event in events.iter_mut() {
        let Some(prediction) = event_input(event).and_then(|input| manager.predict(&input).ok())
        else {
            continue;
        };

        let properties = event.properties.get_or_insert_with(Default::default);
        properties
            .extra
            .insert("prediction".to_string(), Value::from(prediction.probability));
        properties
            .extra
            .insert("risk".to_string(), Value::from(prediction.risk.as_str()));
    }
}

/// Recent events from upstream, scored by the current model when there is one
async fn earthquakes(State(state): State<Arc<AppState>>, Query(params): Query<Params>) -> Response {
    let window = parse_param(&params, "days", Some(DEFAULT_DAYS)).and_then(|days| {
        parse_param(&params, "min_mag", Some(DEFAULT_MIN_MAGNITUDE))
            .and_then(|mag: f64| {
                if mag.is_finite() {
                    Ok(mag)
                } else {
                    Err(format!("Invalid value for 'min_mag': {}", mag))
                }
            })
            .map(|mag| (days, mag))
    });
    let (days, min_magnitude) = match window {
        Ok((days, mag)) => (
            days.clamp(1, MAX_DAYS),
            mag.clamp(MIN_MAGNITUDE_RANGE.0, MIN_MAGNITUDE_RANGE.1),
        ),
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                e,
                "Failed to fetch earthquake data",
            )
        }
    };

    let end = Utc::now().date_naive();
    let start = end - Days::new(days as u64);

    let mut events = match state.source.query(start, end, min_magnitude).await {
        Ok(events) => {
            state
                .health_registry
                .set_healthy(components::EVENT_SOURCE)
                .await;
            events
        }
        Err(e) => {
            error!(error = %e, "Failed to fetch earthquake data");
            state
                .health_registry
                .set_degraded(components::EVENT_SOURCE, e.to_string())
                .await;
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                e,
                "Failed to fetch earthquake data",
            );
        }
    };

    if state.manager.has_model() {
        annotate(&state.manager, &mut events);
    }
    let count = events.len();

    Json(json!({
        "type": "FeatureCollection",
        "features": events,
        "count": count,
        "status": "success",
        "generated": Utc::now().to_rfc3339(),
    }))
    .into_response()
}

/// Lifecycle state of the live model
async fn model_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.manager.status())
}

/// Health check response - returns 200 if healthy or degraded, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/predict", get(predict))
        .route("/api/earthquakes", get(earthquakes))
        .route("/api/model", get(model_status))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server, returning once `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::NaiveDate;
    use quake_lib::error::FetchChunkError;
    use quake_lib::ingest::{FetchConfig, RangeFetcher};
    use quake_lib::predictor::LogisticClassifier;
    use quake_lib::{LifecycleConfig, ModelState, ModelStore};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;
    use tower::ServiceExt;

    /// Serves a fixed batch of events per query, or fails every query
    struct StubSource {
        failing: AtomicBool,
        queries: AtomicUsize,
        magnitudes: Mutex<Vec<f64>>,
    }

    impl StubSource {
        fn new(failing: bool) -> Arc<Self> {
            Arc::new(Self {
                failing: AtomicBool::new(failing),
                queries: AtomicUsize::new(0),
                magnitudes: Mutex::new(Vec::new()),
            })
        }

        fn batch() -> Vec<RawEvent> {
            (0..40)
                .map(|i| {
                    let mag = 3.0 + (i % 8) as f64 * 0.5;
                    let lat = -60.0 + (i * 3) as f64;
                    let lng = -170.0 + (i * 8) as f64;
                    RawEvent::from_point(lng, lat, 5.0 + (i % 5) as f64 * 20.0, mag)
                })
                .collect()
        }
    }

    #[async_trait]
    impl EventSource for StubSource {
        async fn query(
            &self,
            _start: NaiveDate,
            _end: NaiveDate,
            min_magnitude: f64,
        ) -> Result<Vec<RawEvent>, FetchChunkError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.magnitudes.lock().unwrap().push(min_magnitude);
            if self.failing.load(Ordering::SeqCst) {
                Err(FetchChunkError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                })
            } else {
                Ok(Self::batch())
            }
        }
    }

    fn setup_test_app(source: Arc<StubSource>, dir: &TempDir) -> (Router, Arc<AppState>) {
        let fetcher = RangeFetcher::new(
            source.clone(),
            FetchConfig {
                chunk_delay: Duration::ZERO,
                ..Default::default()
            },
        );
        let manager = Arc::new(ModelLifecycleManager::new(
            fetcher,
            LogisticClassifier::new(),
            ModelStore::new(dir.path().join("model.json")),
            LifecycleConfig::default(),
        ));

        let health_registry = HealthRegistry::new();
        let state = Arc::new(AppState::new(manager, source, health_registry));
        (create_router(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_predict_trains_lazily() {
        let dir = TempDir::new().unwrap();
        let source = StubSource::new(false);
        let (app, state) = setup_test_app(source.clone(), &dir);
        assert_eq!(state.manager.state(), ModelState::Uninitialized);

        let (status, body) = get_json(app, "/api/predict?lat=37.7&lng=-122.4&mag=6.2").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        assert_eq!(body["latitude"], 37.7);
        assert_eq!(body["longitude"], -122.4);
        let probability = body["probability"].as_f64().unwrap();
        assert!((0.0..=1.0).contains(&probability));
        assert!(body["risk"].is_string());
        assert_eq!(state.manager.state(), ModelState::Trained);
        assert_eq!(source.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_predict_reuses_existing_model() {
        let dir = TempDir::new().unwrap();
        let source = StubSource::new(false);
        let (app, state) = setup_test_app(source.clone(), &dir);
        state.manager.train().await.unwrap();
        let queries = source.queries.load(Ordering::SeqCst);

        let (status, _) = get_json(app, "/api/predict?lat=1&lon=1").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(source.queries.load(Ordering::SeqCst), queries);
    }

    #[tokio::test]
    async fn test_predict_fails_when_training_impossible() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(StubSource::new(true), &dir);

        let (status, body) = get_json(app, "/api/predict?lat=1.0&lon=1.0").await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Prediction failed");
        assert!(!state.manager.has_model());
    }

    #[tokio::test]
    async fn test_predict_rejects_bad_parameters() {
        let dir = TempDir::new().unwrap();
        let source = StubSource::new(false);
        let (app, _state) = setup_test_app(source.clone(), &dir);

        let (status, body) = get_json(app.clone(), "/api/predict?lng=10").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "error");

        let (status, _) = get_json(app, "/api/predict?lat=abc&lng=10").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(source.queries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_earthquakes_without_model() {
        let dir = TempDir::new().unwrap();
        let (app, _state) = setup_test_app(StubSource::new(false), &dir);

        let (status, body) = get_json(app, "/api/earthquakes?days=500&min_mag=0").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["status"], "success");
        assert_eq!(body["count"], 40);
        assert!(body["features"][0]["properties"].get("risk").is_none());
    }

    #[tokio::test]
    async fn test_earthquakes_clamps_min_magnitude() {
        let dir = TempDir::new().unwrap();
        let source = StubSource::new(false);
        let (app, _state) = setup_test_app(source.clone(), &dir);

        let (status, _) = get_json(app.clone(), "/api/earthquakes?min_mag=0.2").await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = get_json(app, "/api/earthquakes?min_mag=12").await;
        assert_eq!(status, StatusCode::OK);

        assert_eq!(*source.magnitudes.lock().unwrap(), vec![1.0, 9.0]);
    }

    #[tokio::test]
    async fn test_earthquakes_rejects_non_finite_min_magnitude() {
        let dir = TempDir::new().unwrap();
        let source = StubSource::new(false);
        let (app, _state) = setup_test_app(source.clone(), &dir);

        for uri in ["/api/earthquakes?min_mag=nan", "/api/earthquakes?min_mag=inf"] {
            let (status, body) = get_json(app.clone(), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body["status"], "error");
        }

        assert!(source.magnitudes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_earthquakes_annotated_with_model() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(StubSource::new(false), &dir);
        state.manager.train().await.unwrap();

        let (status, body) = get_json(app, "/api/earthquakes").await;

        assert_eq!(status, StatusCode::OK);
        let features = body["features"].as_array().unwrap();
        assert_eq!(features.len(), 40);
        for feature in features {
            let props = &feature["properties"];
            assert!(props["prediction"].is_f64());
            assert!(["low", "medium", "high"].contains(&props["risk"].as_str().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_earthquakes_upstream_failure() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(StubSource::new(true), &dir);

        let (status, body) = get_json(app, "/api/earthquakes?days=7").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["status"], "error");
        assert_eq!(
            state.health_registry.health().await.status,
            ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_model_status() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(StubSource::new(false), &dir);
        state.manager.train().await.unwrap();

        let (status, body) = get_json(app, "/api/model").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "trained");
        assert_eq!(body["algorithm"], "standardized-logistic-regression");
        assert_eq!(body["last_training"]["success"], true);
    }

    #[tokio::test]
    async fn test_readyz_not_ready_before_startup() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(StubSource::new(false), &dir);

        let (status, _) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.health_registry.set_ready(true).await;
        let (status, body) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
    }

    #[tokio::test]
    async fn test_healthz_degraded_without_model() {
        let dir = TempDir::new().unwrap();
        let (app, state) = setup_test_app(StubSource::new(false), &dir);
        state
            .health_registry
            .record_model_state(ModelState::Untrained)
            .await;

        let (status, body) = get_json(app, "/healthz").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "degraded");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let dir = TempDir::new().unwrap();
        let (app, _state) = setup_test_app(StubSource::new(false), &dir);

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/plain; charset=utf-8"
        );
    }
}
