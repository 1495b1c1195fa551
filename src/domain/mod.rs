/// Domain models for the pass predictor
use crate::errors::{ApiError, ApiResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geodetic location on the ground, degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Validated constructor, rejects non-finite and out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> ApiResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(ApiError::InvalidInput(format!(
                "latitude must be within [-90, 90], got {}",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(ApiError::InvalidInput(format!(
                "longitude must be within [-180, 180], got {}",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// Sub-satellite point returned by a propagator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeodeticPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

/// One propagated tick of the prediction horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplePoint {
    pub offset_seconds: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
}

impl SamplePoint {
    pub fn at_offset(offset_seconds: u32, position: GeodeticPosition) -> Self {
        Self {
            offset_seconds,
            latitude: position.latitude,
            longitude: position.longitude,
            altitude_km: position.altitude_km,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Sample minimizing the great-circle distance to the target
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClosestApproach {
    pub offset_seconds: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_km: f64,
    pub distance_km: f64,
}

impl ClosestApproach {
    pub fn from_sample(sample: &SamplePoint, distance_km: f64) -> Self {
        Self {
            offset_seconds: sample.offset_seconds,
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude_km: sample.altitude_km,
            distance_km,
        }
    }
}

/// First contiguous run of samples inside the detection radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PassWindow {
    pub entry_offset_seconds: u32,
    /// Last consecutive sample still inside the radius
    pub exit_offset_seconds: u32,
    pub closest: ClosestApproach,
}

/// Persisted raw TLE catalog text
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fetched_at: DateTime<Utc>,
    pub raw_text: String,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        now - self.fetched_at < max_age
    }
}

/// Mutable observer parameters owned by the session
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionConfig {
    pub target: GeoPoint,
    pub radius_km: f64,
    pub display_duration_sec: u32,
}

impl PredictionConfig {
    pub fn validate_radius(radius_km: f64) -> ApiResult<f64> {
        if radius_km.is_finite() && radius_km > 0.0 {
            Ok(radius_km)
        } else {
            Err(ApiError::InvalidInput(format!(
                "radius_km must be a positive number, got {}",
                radius_km
            )))
        }
    }

    pub fn validate_duration(duration_sec: f64) -> ApiResult<u32> {
        if duration_sec.is_finite() && duration_sec >= 0.0 {
            Ok(duration_sec.min(u32::MAX as f64) as u32)
        } else {
            Err(ApiError::InvalidInput(format!(
                "display duration must be >= 0 seconds, got {}",
                duration_sec
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Uninitialized,
    FetchingTle,
    TleReady,
    Predicting,
    Predicted,
    /// No orbital elements, prediction disabled until a TLE refresh succeeds
    Unavailable,
}

/// Keeps "no data" distinct from a confident "no pass"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionOutcome {
    NoData,
    NoPass,
    PassFound,
}

/// Path point in the shape the globe renderer consumes
#[derive(Debug, Clone, Serialize)]
pub struct PathPoint {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    /// Seconds from the prediction anchor
    pub time: u32,
}

impl From<&SamplePoint> for PathPoint {
    fn from(s: &SamplePoint) -> Self {
        Self {
            lat: s.latitude,
            lon: s.longitude,
            alt: s.altitude_km,
            time: s.offset_seconds,
        }
    }
}

/// Closest approach with its absolute wall-clock instant
#[derive(Debug, Clone, Serialize)]
pub struct ClosestApproachDetails {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub time: u32,
    pub dist: f64,
    pub at: DateTime<Utc>,
}

impl ClosestApproachDetails {
    pub fn anchored(approach: &ClosestApproach, anchored_at: DateTime<Utc>) -> Self {
        Self {
            lat: approach.latitude,
            lon: approach.longitude,
            alt: approach.altitude_km,
            time: approach.offset_seconds,
            dist: approach.distance_km,
            at: anchored_at + chrono::Duration::seconds(approach.offset_seconds as i64),
        }
    }
}

/// Session overview served by the status endpoint
#[derive(Debug, Clone, Serialize)]
pub struct PredictionSnapshot {
    pub state: SessionState,
    pub config: PredictionConfig,
    pub satellite: Option<String>,
    pub tle_epoch: Option<DateTime<Utc>>,
    pub anchored_at: Option<DateTime<Utc>>,
    pub predicted_target: Option<GeoPoint>,
    pub predicted_radius_km: Option<f64>,
    pub outcome: Option<PredictionOutcome>,
    pub first_entry_offset_sec: Option<u32>,
    pub first_pass: Option<PassWindow>,
    pub closest_overall_km: Option<f64>,
    pub samples: usize,
    pub gaps: usize,
    pub generation: u64,
}

/// Age of the persisted TLE text
#[derive(Debug, Clone, Serialize)]
pub struct TleStatus {
    pub fetched_at: DateTime<Utc>,
    pub age_sec: i64,
    pub stale: bool,
}

/// Health check response
#[derive(Serialize)]
pub struct Health {
    pub status: &'static str,
    pub now: DateTime<Utc>,
}
