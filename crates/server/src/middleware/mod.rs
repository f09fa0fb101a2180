//! HTTP middleware

mod body;
pub mod metrics;

pub use body::InstrumentedBody;
pub use metrics::metrics_middleware;
