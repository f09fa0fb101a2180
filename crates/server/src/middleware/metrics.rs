//! Request instrumentation middleware
//!
//! Admits each HTTP request into the [`Pipeline`] and hands the route resolver
//! a slot to record the matched template in. The request completes when the
//! response body has been fully sent, with the status and headers of the
//! response head. Response bytes are passed through untouched. Websocket
//! upgrades and excluded paths skip the pipeline.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use httpmetrics_core::{Pipeline, Protocol, RequestScope, RouteSlot};

use super::body::InstrumentedBody;
use crate::error::AppError;

/// Middleware that runs the collector pipeline around every request.
pub async fn metrics_middleware(
    State(pipeline): State<Pipeline>,
    mut request: Request,
    next: Next,
) -> Response {
    let protocol = Protocol::from_headers(request.headers());
    let path = request.uri().path().to_string();

    if !pipeline.accepts(protocol, &path) {
        tracing::debug!(path = %path, ?protocol, "Skipping instrumentation");
        return next.run(request).await;
    }

    let scope = RequestScope::new(
        protocol,
        request.method().clone(),
        path,
        request.headers().clone(),
    );
    let flight = match pipeline.admit(scope) {
        Ok(flight) => flight,
        Err(err) => return AppError::from(err).into_response(),
    };
    request
        .extensions_mut()
        .insert::<Arc<RouteSlot>>(flight.route_slot());

    // A panic or a dropped future past this point is recorded by the guard.
    let response = next.run(request).await;

    let (parts, body) = response.into_parts();
    let body = InstrumentedBody::new(body, flight, parts.status.as_u16(), parts.headers.clone());
    Response::from_parts(parts, Body::new(body))
}
