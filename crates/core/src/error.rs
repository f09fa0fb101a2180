//! Error types for collector construction and the instrumentation pipeline

use thiserror::Error;

use crate::metric::MetricKind;

/// Invalid collector or pipeline configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("metric name must not be empty")]
    EmptyName,

    #[error("metric `{metric}` declares label `{label}` more than once")]
    DuplicateLabel { metric: String, label: String },

    #[error("option `{option}` is not supported for {kind} metrics")]
    UnsupportedOption { kind: MetricKind, option: &'static str },

    #[error("invalid exclusion pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("metrics client rejected the metric: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// Failure reported by a single collector operation
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("{0}")]
    Failed(String),

    #[error("expected a {expected} metric, found {found}")]
    WrongKind {
        expected: MetricKind,
        found: MetricKind,
    },

    #[error("collector panicked: {0}")]
    Panicked(String),

    #[error(transparent)]
    Prometheus(#[from] prometheus::Error),
}

impl CollectorError {
    pub fn failed(msg: impl Into<String>) -> Self {
        CollectorError::Failed(msg.into())
    }
}

/// A collector failure, tagged with the pipeline phase it happened in
#[derive(Debug, Error)]
pub enum PipelineError {
    /// `begin()` failed; the request is aborted before the downstream call.
    #[error("live collector `{collector}` failed to begin: {source}")]
    LiveSetup {
        collector: String,
        #[source]
        source: CollectorError,
    },

    /// `end()` failed; logged, remaining teardowns still run.
    #[error("live collector `{collector}` failed to end: {source}")]
    LiveTeardown {
        collector: String,
        #[source]
        source: CollectorError,
    },

    /// `apply()` failed; logged, the next post collector still runs.
    #[error("post collector `{collector}` failed: {source}")]
    PostCollector {
        collector: String,
        #[source]
        source: CollectorError,
    },
}

impl PipelineError {
    /// Name of the metric bound to the failing collector
    pub fn collector(&self) -> &str {
        match self {
            PipelineError::LiveSetup { collector, .. }
            | PipelineError::LiveTeardown { collector, .. }
            | PipelineError::PostCollector { collector, .. } => collector,
        }
    }
}
