//! Application error handling

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use httpmetrics_core::PipelineError;
use serde::Serialize;

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// A live collector refused to begin; the request was not handled.
    MetricsSetup(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let msg = match self {
            AppError::MetricsSetup(msg) => format!("Request instrumentation failed: {}", msg),
            AppError::Internal(msg) => msg,
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorBody { error: msg })).into_response()
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::MetricsSetup(err.to_string())
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        AppError::Internal(format!("Metrics encoding error: {}", err))
    }
}
