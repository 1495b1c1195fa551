/// HTTP request handlers
use crate::clients::TleClient;
use crate::domain::{Health, PathPoint, PredictionSnapshot, SessionState};
use crate::errors::ApiError;
use crate::repo::TleCacheRepo;
use crate::services::PredictionSession;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub type LiveSession = PredictionSession<TleClient, TleCacheRepo>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<LiveSession>,
}

/// Successful response wrapper
#[derive(Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub ok: bool,
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> SuccessResponse<T> {
    pub fn new(data: T) -> Self {
        Self { ok: true, data }
    }
}

#[derive(Deserialize)]
pub struct TargetParams {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Deserialize)]
pub struct RadiusParams {
    pub km: f64,
}

#[derive(Deserialize)]
pub struct DurationParams {
    pub sec: f64,
}

/// Health check handler
pub async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        now: Utc::now(),
    })
}

/// Current session state and prediction summary
pub async fn get_prediction(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<PredictionSnapshot>>, ApiError> {
    Ok(Json(SuccessResponse::new(state.session.snapshot().await)))
}

/// Predicted path truncated to the display duration
pub async fn get_path(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    if state.session.state().await == SessionState::Unavailable {
        return Err(ApiError::Unavailable("no TLE data".to_string()));
    }

    let points: Vec<PathPoint> = state
        .session
        .displayed_path()
        .await
        .iter()
        .map(PathPoint::from)
        .collect();
    let config = state.session.config().await;

    Ok(Json(serde_json::json!(SuccessResponse::new(
        serde_json::json!({
            "display_duration_sec": config.display_duration_sec,
            "points": points
        })
    ))))
}

/// Closest approach to the target within the horizon
pub async fn get_closest(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let session_state = state.session.state().await;
    if session_state == SessionState::Unavailable {
        return Err(ApiError::Unavailable("no TLE data".to_string()));
    }

    match state.session.closest_approach_details().await {
        Some(details) => Ok(Json(serde_json::json!(SuccessResponse::new(details)))),
        None => Ok(Json(serde_json::json!(SuccessResponse::new(
            serde_json::json!({
                "state": session_state,
                "message": "no data"
            })
        )))),
    }
}

/// Move the observer and rescan
pub async fn set_target(
    Query(params): Query<TargetParams>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<PredictionSnapshot>>, ApiError> {
    state.session.set_target(params.lat, params.lon).await?;
    get_prediction(State(state)).await
}

/// Change the detection radius and rescan
pub async fn set_radius(
    Query(params): Query<RadiusParams>,
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<PredictionSnapshot>>, ApiError> {
    state.session.set_radius_km(params.km).await?;
    get_prediction(State(state)).await
}

/// Change the display window, path only
pub async fn set_duration(
    Query(params): Query<DurationParams>,
    State(state): State<AppState>,
) -> Result<Json<Value>, ApiError> {
    state.session.set_display_duration_sec(params.sec).await?;
    get_path(State(state)).await
}

/// Force a TLE download and rescan
pub async fn refresh_tle(
    State(state): State<AppState>,
) -> Result<Json<SuccessResponse<PredictionSnapshot>>, ApiError> {
    state.session.refresh_tle().await?;
    get_prediction(State(state)).await
}

/// Age of the persisted TLE text
pub async fn tle_status(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    match state.session.tle_status().await? {
        Some(status) => Ok(Json(serde_json::json!(SuccessResponse::new(status)))),
        None => Ok(Json(serde_json::json!(SuccessResponse::new(
            serde_json::json!({
                "message": "no data"
            })
        )))),
    }
}
