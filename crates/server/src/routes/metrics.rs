//! Prometheus metrics endpoint

use axum::{extract::State, http::header, response::IntoResponse};
use httpmetrics_core::exposition;
use prometheus::Registry;

use crate::error::AppError;

/// GET /metrics - Render the registry in Prometheus text format
pub async fn get(State(registry): State<Registry>) -> Result<impl IntoResponse, AppError> {
    let body = exposition::render(&registry)?;
    Ok(([(header::CONTENT_TYPE, exposition::CONTENT_TYPE)], body))
}
