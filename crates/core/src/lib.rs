//! httpmetrics-core: request instrumentation pipeline
//!
//! Framework-independent pieces used by the server crate: collectors and the
//! metrics they own, the per-request context, and the pipeline that runs
//! collectors around each request.

pub mod builtin;
pub mod collector;
pub mod context;
pub mod error;
pub mod exposition;
pub mod metric;
pub mod pipeline;
pub mod summary;

pub use builtin::{GlobalActiveRequests, RequestLatency, TotalRequests};
pub use collector::{Collector, Lifecycle, LiveCollector, PostCollector, register};
pub use context::{
    Outcome, Protocol, RequestContext, RequestScope, RouteSlot, TemplateMatch,
};
pub use error::{CollectorError, ConfigurationError, PipelineError};
pub use metric::{Metric, MetricKind, MetricOpts};
pub use pipeline::{InFlight, Pipeline, PipelineBuilder};
pub use summary::{Summary, SummaryVec};

// Re-export the metrics client so applications use the same version
pub use prometheus;
