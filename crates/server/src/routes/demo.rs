//! Demo handlers for the bundled server

use axum::{Json, extract::Path, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
pub struct ItemResponse {
    item_id: u64,
}

/// GET /ping
pub async fn ping() -> &'static str {
    "pong"
}

/// GET /app2/ping, served by the mounted sub-application
pub async fn ping_sub_app() -> &'static str {
    "pong_2"
}

/// GET /items/{item_id}
pub async fn item(Path(item_id): Path<u64>) -> impl IntoResponse {
    Json(ItemResponse { item_id })
}
