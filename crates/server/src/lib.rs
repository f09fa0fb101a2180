//! httpmetrics-server library crate
//!
//! Axum integration for `httpmetrics-core`: the instrumentation middleware,
//! the route-template resolver and the exposition endpoint. Also exposes
//! `build_app` so integration tests can run the demo application without
//! binding a port. The binary entrypoint is in `main.rs`.

pub mod config;
pub mod error;
pub mod instrumentor;
mod middleware;
mod routes;
pub mod template;

use axum::{Router, routing::get};
use httpmetrics_core::{
    ConfigurationError, GlobalActiveRequests, Pipeline, RequestLatency, TotalRequests,
};
use prometheus::Registry;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use config::Config;

pub use instrumentor::Instrumentor;
pub use middleware::{InstrumentedBody, metrics_middleware};
pub use template::{RouteTemplate, RouteTemplateLayer, TemplateRouter};

/// Build the demo application against the process-wide default registry.
pub fn build_app(config: &Config) -> Result<Router, ConfigurationError> {
    build_app_with_registry(config, prometheus::default_registry().clone())
}

/// Build the demo application, registering its metrics into `registry`.
///
/// Collects `http_requests_total`, `http_request_duration_seconds` and
/// `http_active_requests`, and serves the registry at `config.metrics_path`.
pub fn build_app_with_registry(
    config: &Config,
    registry: Registry,
) -> Result<Router, ConfigurationError> {
    let mut builder = Pipeline::builder()
        .registry(registry)
        .post_collector(TotalRequests::new()?)
        .post_collector(RequestLatency::new()?)
        .live_collector(GlobalActiveRequests::new()?);
    for pattern in &config.excluded_paths {
        builder = builder.exclude(pattern)?;
    }
    let instrumentor = Instrumentor::new(builder.build());

    let sub_app = TemplateRouter::new().route("/ping", get(routes::demo::ping_sub_app));

    let app = TemplateRouter::new()
        .route("/ping", get(routes::demo::ping))
        .route("/items/{item_id}", get(routes::demo::item))
        .route("/health", get(routes::health::check))
        .mount_static("/static", ServeDir::new(&config.static_dir))
        .nest("/app2", sub_app);
    let app = instrumentor.expose(app, &config.metrics_path);

    Ok(instrumentor
        .instrument(app.into_router())
        .layer(TraceLayer::new_for_http()))
}
