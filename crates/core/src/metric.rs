//! Registry-backed metrics owned by collectors
//!
//! A [`Metric`] is one of four shapes. Every shape is a labelled vector so a
//! collector always addresses its series the same way, with
//! `get_metric_with_label_values`.

use std::collections::HashSet;
use std::fmt;

use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry};

use crate::error::ConfigurationError;
use crate::summary::SummaryVec;

/// Closed set of metric shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
            MetricKind::Summary => "summary",
        };
        f.write_str(name)
    }
}

/// Construction options shared by every metric kind
#[derive(Debug, Clone)]
pub struct MetricOpts {
    pub name: String,
    pub help: String,
    pub label_names: Vec<String>,
    pub namespace: String,
    pub subsystem: String,
    /// Histogram only.
    pub buckets: Option<Vec<f64>>,
}

impl MetricOpts {
    pub fn new(name: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            label_names: Vec::new(),
            namespace: String::new(),
            subsystem: String::new(),
            buckets: None,
        }
    }

    pub fn labels<I, L>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<String>,
    {
        self.label_names = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn subsystem(mut self, subsystem: impl Into<String>) -> Self {
        self.subsystem = subsystem.into();
        self
    }

    pub fn buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    /// Fully qualified name: `namespace_subsystem_name`, skipping empty parts
    pub fn fq_name(&self) -> String {
        self.prometheus_opts().fq_name()
    }

    /// Reject an empty name and repeated label names.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.name.is_empty() {
            return Err(ConfigurationError::EmptyName);
        }

        let mut seen = HashSet::with_capacity(self.label_names.len());
        for label in &self.label_names {
            if !seen.insert(label.as_str()) {
                return Err(ConfigurationError::DuplicateLabel {
                    metric: self.name.clone(),
                    label: label.clone(),
                });
            }
        }

        Ok(())
    }

    pub(crate) fn prometheus_opts(&self) -> Opts {
        Opts::new(self.name.clone(), self.help.clone())
            .namespace(self.namespace.clone())
            .subsystem(self.subsystem.clone())
    }

    pub(crate) fn label_refs(&self) -> Vec<&str> {
        self.label_names.iter().map(String::as_str).collect()
    }
}

/// A metric bound to exactly one collector
#[derive(Clone)]
pub enum Metric {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
    Summary(SummaryVec),
}

impl Metric {
    /// Build a metric of the given kind. Nothing is registered yet.
    pub fn new(kind: MetricKind, opts: MetricOpts) -> Result<Self, ConfigurationError> {
        match kind {
            MetricKind::Counter => Self::counter(opts),
            MetricKind::Gauge => Self::gauge(opts),
            MetricKind::Histogram => Self::histogram(opts),
            MetricKind::Summary => Self::summary(opts),
        }
    }

    pub fn counter(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        reject_buckets(MetricKind::Counter, &opts)?;
        opts.validate()?;
        let vec = CounterVec::new(opts.prometheus_opts(), &opts.label_refs())?;
        Ok(Metric::Counter(vec))
    }

    pub fn gauge(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        reject_buckets(MetricKind::Gauge, &opts)?;
        opts.validate()?;
        let vec = GaugeVec::new(opts.prometheus_opts(), &opts.label_refs())?;
        Ok(Metric::Gauge(vec))
    }

    pub fn histogram(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        opts.validate()?;
        let mut hist_opts = HistogramOpts::from(opts.prometheus_opts());
        if let Some(buckets) = &opts.buckets {
            hist_opts = hist_opts.buckets(buckets.clone());
        }
        let vec = HistogramVec::new(hist_opts, &opts.label_refs())?;
        Ok(Metric::Histogram(vec))
    }

    pub fn summary(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        reject_buckets(MetricKind::Summary, &opts)?;
        opts.validate()?;
        let vec = SummaryVec::new(&opts)?;
        Ok(Metric::Summary(vec))
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            Metric::Counter(_) => MetricKind::Counter,
            Metric::Gauge(_) => MetricKind::Gauge,
            Metric::Histogram(_) => MetricKind::Histogram,
            Metric::Summary(_) => MetricKind::Summary,
        }
    }

    /// Fully qualified metric name, as it appears in the exposition output
    pub fn name(&self) -> String {
        self.desc().fq_name.clone()
    }

    pub fn help(&self) -> String {
        self.desc().help.clone()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.desc().variable_labels.clone()
    }

    pub fn as_counter(&self) -> Option<&CounterVec> {
        match self {
            Metric::Counter(vec) => Some(vec),
            _ => None,
        }
    }

    pub fn as_gauge(&self) -> Option<&GaugeVec> {
        match self {
            Metric::Gauge(vec) => Some(vec),
            _ => None,
        }
    }

    pub fn as_histogram(&self) -> Option<&HistogramVec> {
        match self {
            Metric::Histogram(vec) => Some(vec),
            _ => None,
        }
    }

    pub fn as_summary(&self) -> Option<&SummaryVec> {
        match self {
            Metric::Summary(vec) => Some(vec),
            _ => None,
        }
    }

    /// Add this metric to `registry`. Fails if the name is already taken.
    pub(crate) fn register_into(&self, registry: &Registry) -> prometheus::Result<()> {
        match self {
            Metric::Counter(vec) => registry.register(Box::new(vec.clone())),
            Metric::Gauge(vec) => registry.register(Box::new(vec.clone())),
            Metric::Histogram(vec) => registry.register(Box::new(vec.clone())),
            Metric::Summary(vec) => registry.register(Box::new(vec.clone())),
        }
    }

    fn desc(&self) -> &prometheus::core::Desc {
        use prometheus::core::Collector;

        // Every shape is built from a single descriptor.
        let descs = match self {
            Metric::Counter(vec) => vec.desc(),
            Metric::Gauge(vec) => vec.desc(),
            Metric::Histogram(vec) => vec.desc(),
            Metric::Summary(vec) => vec.desc(),
        };
        descs[0]
    }
}

impl fmt::Debug for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Metric")
            .field("kind", &self.kind())
            .field("name", &self.name())
            .field("label_names", &self.label_names())
            .finish()
    }
}

fn reject_buckets(kind: MetricKind, opts: &MetricOpts) -> Result<(), ConfigurationError> {
    if opts.buckets.is_some() {
        return Err(ConfigurationError::UnsupportedOption {
            kind,
            option: "buckets",
        });
    }
    Ok(())
}
