//! Application-facing instrumentation handle

use axum::{Router, middleware as axum_mw, routing::get};
use httpmetrics_core::Pipeline;
use prometheus::Registry;

use crate::middleware::metrics_middleware;
use crate::routes;
use crate::template::TemplateRouter;

/// Wires a [`Pipeline`] into an axum application.
///
/// ```ignore
/// let instrumentor = Instrumentor::new(
///     Pipeline::builder().post_collector(TotalRequests::new()?).build(),
/// );
/// let app = instrumentor.expose(TemplateRouter::new().route("/ping", get(ping)), "/metrics");
/// let app = instrumentor.instrument(app.into_router());
/// ```
#[derive(Clone)]
pub struct Instrumentor {
    pipeline: Pipeline,
}

impl Instrumentor {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn registry(&self) -> &Registry {
        self.pipeline.registry()
    }

    /// Wrap every route of `router`, including its fallback.
    ///
    /// Routes added to the returned router afterwards are not instrumented.
    pub fn instrument<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.layer(axum_mw::from_fn_with_state(
            self.pipeline.clone(),
            metrics_middleware,
        ))
    }

    /// Serve the registry's text exposition at `path`.
    pub fn expose<S>(&self, router: TemplateRouter<S>, path: &str) -> TemplateRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        router.route(
            path,
            get(routes::metrics::get).with_state(self.registry().clone()),
        )
    }
}
