/// Application routes configuration
use crate::handlers::{
    get_closest, get_path, get_prediction, health, refresh_tle, set_duration, set_radius,
    set_target, tle_status, AppState,
};
use axum::{routing::get, Router};

/// Build the application router with all routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health))
        // Prediction endpoints
        .route("/prediction", get(get_prediction))
        .route("/prediction/path", get(get_path))
        .route("/prediction/closest", get(get_closest))
        .route("/prediction/target", get(set_target))
        .route("/prediction/radius", get(set_radius))
        .route("/prediction/duration", get(set_duration))
        // TLE endpoints
        .route("/tle/refresh", get(refresh_tle))
        .route("/tle/status", get(tle_status))
        .with_state(state)
}
