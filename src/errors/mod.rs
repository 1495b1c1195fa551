/// Unified error handling module
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Unified error response format
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub ok: bool,
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// Transport-level failure reaching the TLE source
    #[error("External API error: {0}")]
    ExternalApi(#[from] reqwest::Error),
    /// TLE source answered, but not with usable text
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("TLE parse error: {0}")]
    TleParse(String),
    #[error("Prediction unavailable: {0}")]
    Unavailable(String),
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl ApiError {
    /// True for failures reaching the TLE source, as opposed to bad content
    pub fn is_fetch_failure(&self) -> bool {
        matches!(self, ApiError::ExternalApi(_) | ApiError::Upstream(_))
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Database(_) => "DATABASE_ERROR",
            ApiError::ExternalApi(e) => match e.status().map(|s| s.as_u16()) {
                Some(403) => "UPSTREAM_403",
                Some(404) => "UPSTREAM_404",
                Some(429) => "UPSTREAM_429",
                Some(500..=599) => "UPSTREAM_5XX",
                _ if e.is_timeout() => "UPSTREAM_TIMEOUT",
                _ => "UPSTREAM_ERROR",
            },
            ApiError::Upstream(_) => "UPSTREAM_ERROR",
            ApiError::TleParse(_) => "TLE_PARSE_ERROR",
            ApiError::Unavailable(_) => "PREDICTION_UNAVAILABLE",
            ApiError::Internal(_) => "INTERNAL_ERROR",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_response = ErrorResponse {
            ok: false,
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                trace_id: None,
            },
        };

        // Always HTTP 200 with ok=false, clients branch on the envelope
        (StatusCode::OK, Json(error_response)).into_response()
    }
}

/// Type alias for API results
pub type ApiResult<T> = Result<T, ApiError>;
