//! Core data models for seismic risk prediction

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Number of features fed to the classifier
pub const FEATURE_COUNT: usize = 4;

/// Feature names in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["latitude", "longitude", "depth", "mag"];

/// Magnitude at or above which a quake is labeled significant
pub const SIGNIFICANT_MAGNITUDE: f64 = 5.0;

/// Seismic event as delivered by the upstream feed (GeoJSON feature)
///
/// Fields are kept loosely typed; interpretation and validation happen in
/// [`crate::predictor::FeatureProcessor`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Upstream identifier; any JSON type is accepted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default)]
    pub properties: Option<EventProperties>,
    #[serde(default)]
    pub geometry: Option<EventGeometry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventProperties {
    #[serde(default)]
    pub mag: Option<Value>,
    /// Non-feature properties (`place`, `time`, ...) kept as-is
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// GeoJSON point geometry; coordinates are `[longitude, latitude, depth]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventGeometry {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<Value>,
    #[serde(default)]
    pub coordinates: Vec<Value>,
}

impl RawEvent {
    /// Build a well-formed point event
    pub fn from_point(longitude: f64, latitude: f64, depth: f64, magnitude: f64) -> Self {
        Self {
            id: None,
            properties: Some(EventProperties {
                mag: Some(Value::from(magnitude)),
                ..Default::default()
            }),
            geometry: Some(EventGeometry {
                kind: Some(Value::from("Point")),
                coordinates: vec![
                    Value::from(longitude),
                    Value::from(latitude),
                    Value::from(depth),
                ],
            }),
            extra: Map::new(),
        }
    }

    /// Raw magnitude value, if present and not null
    pub fn magnitude(&self) -> Option<&Value> {
        self.properties
            .as_ref()
            .and_then(|p| p.mag.as_ref())
            .filter(|v| !v.is_null())
    }

    /// Raw coordinate at `index` of `[lon, lat, depth]`, if present and not null
    pub fn coordinate(&self, index: usize) -> Option<&Value> {
        self.geometry
            .as_ref()
            .and_then(|g| g.coordinates.get(index))
            .filter(|v| !v.is_null())
    }
}

/// Bounded feature vector `(latitude, longitude, depth, magnitude)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub magnitude: f64,
}

impl FeatureVector {
    pub const LATITUDE_RANGE: (f64, f64) = (-90.0, 90.0);
    pub const LONGITUDE_RANGE: (f64, f64) = (-180.0, 180.0);
    pub const DEPTH_RANGE: (f64, f64) = (0.0, 700.0);
    pub const MAGNITUDE_RANGE: (f64, f64) = (0.0, 10.0);

    /// Build a vector clamped to each field's physical domain
    pub fn clamped(latitude: f64, longitude: f64, depth: f64, magnitude: f64) -> Self {
        Self {
            latitude: latitude.clamp(Self::LATITUDE_RANGE.0, Self::LATITUDE_RANGE.1),
            longitude: longitude.clamp(Self::LONGITUDE_RANGE.0, Self::LONGITUDE_RANGE.1),
            depth: depth.clamp(Self::DEPTH_RANGE.0, Self::DEPTH_RANGE.1),
            magnitude: magnitude.clamp(Self::MAGNITUDE_RANGE.0, Self::MAGNITUDE_RANGE.1),
        }
    }

    /// Re-apply domain clamping
    pub fn clamp(&self) -> Self {
        Self::clamped(self.latitude, self.longitude, self.depth, self.magnitude)
    }

    pub fn is_finite(&self) -> bool {
        self.as_array().iter().all(|v| v.is_finite())
    }

    pub fn as_array(&self) -> [f64; FEATURE_COUNT] {
        [self.latitude, self.longitude, self.depth, self.magnitude]
    }
}

/// Feature vector with its significance label (1 = significant)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledSample {
    pub features: FeatureVector,
    pub label: u8,
}

impl LabeledSample {
    pub fn new(features: FeatureVector) -> Self {
        let label = u8::from(features.magnitude >= SIGNIFICANT_MAGNITUDE);
        Self { features, label }
    }

    pub fn is_significant(&self) -> bool {
        self.label == 1
    }
}

/// Ordered collection of labeled samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    samples: Vec<LabeledSample>,
}

impl TrainingSet {
    pub fn new(samples: Vec<LabeledSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[LabeledSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of samples labeled significant
    pub fn positives(&self) -> usize {
        self.samples.iter().filter(|s| s.is_significant()).count()
    }
}

impl FromIterator<LabeledSample> for TrainingSet {
    fn from_iter<I: IntoIterator<Item = LabeledSample>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Prediction request as received from the serving boundary
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    pub latitude: f64,
    pub longitude: f64,
    pub depth: f64,
    pub magnitude: f64,
}

impl PredictionInput {
    pub const DEFAULT_DEPTH: f64 = 10.0;
    pub const DEFAULT_MAGNITUDE: f64 = 4.0;

    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            depth: Self::DEFAULT_DEPTH,
            magnitude: Self::DEFAULT_MAGNITUDE,
        }
    }

    pub fn with_depth(mut self, depth: f64) -> Self {
        self.depth = depth;
        self
    }

    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = magnitude;
        self
    }
}

/// Discretized risk derived from the significance probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Significance probability and its risk tier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f64,
    pub risk: RiskTier,
}
