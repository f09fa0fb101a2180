//! Ready-made collectors for the usual HTTP metrics

use crate::collector::{LiveCollector, PostCollector};
use crate::context::{Outcome, RequestContext, RequestScope};
use crate::error::{CollectorError, ConfigurationError};
use crate::metric::{Metric, MetricKind, MetricOpts};

/// Handler label used for unmatched requests when grouping is on
pub const UNMATCHED_HANDLER: &str = "None";

pub const DEFAULT_LATENCY_BUCKETS: [f64; 3] = [0.1, 0.5, 1.0];

fn wrong_kind(expected: MetricKind, metric: &Metric) -> CollectorError {
    CollectorError::WrongKind {
        expected,
        found: metric.kind(),
    }
}

fn handler_label(ctx: &RequestContext, group_unmatched: bool) -> &str {
    let template = ctx.matched_template();
    if group_unmatched && !template.matched {
        UNMATCHED_HANDLER
    } else {
        &template.template
    }
}

/// `http_requests_total{method, handler, status}`
pub struct TotalRequests {
    metric: Metric,
    group_status_code: bool,
    group_unmatched_template: bool,
}

impl TotalRequests {
    pub fn new() -> Result<Self, ConfigurationError> {
        Self::with_opts(MetricOpts::new(
            "http_requests_total",
            "Total number of requests by method, status and handler.",
        ))
    }

    /// Label names are always `method, handler, status`.
    pub fn with_opts(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        let metric = Metric::counter(opts.labels(["method", "handler", "status"]))?;
        Ok(Self {
            metric,
            group_status_code: true,
            group_unmatched_template: true,
        })
    }

    /// Report `2xx` instead of `200` (default: on).
    pub fn group_status_code(mut self, enabled: bool) -> Self {
        self.group_status_code = enabled;
        self
    }

    /// Report unmatched requests under the `None` handler (default: on).
    pub fn group_unmatched_template(mut self, enabled: bool) -> Self {
        self.group_unmatched_template = enabled;
        self
    }
}

impl PostCollector for TotalRequests {
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn apply(&self, ctx: &RequestContext) -> Result<(), CollectorError> {
        let status = if self.group_status_code {
            ctx.status_class()
        } else {
            ctx.status_code().to_string()
        };
        let handler = handler_label(ctx, self.group_unmatched_template);

        let counter = self
            .metric
            .as_counter()
            .ok_or_else(|| wrong_kind(MetricKind::Counter, &self.metric))?;
        counter
            .get_metric_with_label_values(&[ctx.method().as_str(), handler, status.as_str()])?
            .inc();
        Ok(())
    }
}

/// `http_request_duration_seconds{method, handler}`
pub struct RequestLatency {
    metric: Metric,
    group_unmatched_template: bool,
}

impl RequestLatency {
    pub fn new() -> Result<Self, ConfigurationError> {
        Self::with_opts(
            MetricOpts::new(
                "http_request_duration_seconds",
                "Histogram of HTTP request durations (request start to response end).",
            )
            .buckets(DEFAULT_LATENCY_BUCKETS.to_vec()),
        )
    }

    /// Label names are always `method, handler`.
    pub fn with_opts(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        let metric = Metric::histogram(opts.labels(["method", "handler"]))?;
        Ok(Self {
            metric,
            group_unmatched_template: true,
        })
    }

    pub fn group_unmatched_template(mut self, enabled: bool) -> Self {
        self.group_unmatched_template = enabled;
        self
    }
}

impl PostCollector for RequestLatency {
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn apply(&self, ctx: &RequestContext) -> Result<(), CollectorError> {
        let handler = handler_label(ctx, self.group_unmatched_template);
        let histogram = self
            .metric
            .as_histogram()
            .ok_or_else(|| wrong_kind(MetricKind::Histogram, &self.metric))?;
        histogram
            .get_metric_with_label_values(&[ctx.method().as_str(), handler])?
            .observe(ctx.duration_seconds());
        Ok(())
    }
}

/// `http_active_requests`: incremented on admission, decremented on completion
pub struct GlobalActiveRequests {
    metric: Metric,
}

impl GlobalActiveRequests {
    pub fn new() -> Result<Self, ConfigurationError> {
        Self::with_opts(MetricOpts::new(
            "http_active_requests",
            "Number of current active requests.",
        ))
    }

    pub fn with_opts(opts: MetricOpts) -> Result<Self, ConfigurationError> {
        let metric = Metric::gauge(opts.labels(Vec::<String>::new()))?;
        Ok(Self { metric })
    }

    fn series(&self) -> Result<prometheus::Gauge, CollectorError> {
        let gauge = self
            .metric
            .as_gauge()
            .ok_or_else(|| wrong_kind(MetricKind::Gauge, &self.metric))?;
        Ok(gauge.get_metric_with_label_values(&[])?)
    }
}

impl LiveCollector for GlobalActiveRequests {
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn begin(&self, _scope: &RequestScope) -> Result<(), CollectorError> {
        self.series()?.inc();
        Ok(())
    }

    fn end(&self, _scope: &RequestScope, _outcome: &Outcome) -> Result<(), CollectorError> {
        self.series()?.dec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Protocol, TemplateMatch};
    use http::{HeaderMap, Method};
    use std::time::Duration;

    fn ctx(template: TemplateMatch, status: u16) -> RequestContext {
        let scope = RequestScope::new(Protocol::Http, Method::GET, "/raw", HeaderMap::new());
        RequestContext::new(
            &scope,
            template,
            Outcome::Responded { status },
            Duration::from_millis(250),
            1,
            HeaderMap::new(),
        )
    }

    #[test]
    fn test_total_requests_groups_status_and_unmatched() {
        let collector = TotalRequests::new().unwrap();
        collector.apply(&ctx(TemplateMatch::matched("/ping"), 200)).unwrap();
        collector.apply(&ctx(TemplateMatch::matched("/ping"), 204)).unwrap();
        collector.apply(&ctx(TemplateMatch::unmatched("/nope"), 404)).unwrap();

        let counter = collector.metric().as_counter().unwrap();
        assert_eq!(counter.with_label_values(&["GET", "/ping", "2xx"]).get(), 2.0);
        assert_eq!(counter.with_label_values(&["GET", "None", "4xx"]).get(), 1.0);
    }

    #[test]
    fn test_total_requests_without_grouping() {
        let collector = TotalRequests::new()
            .unwrap()
            .group_status_code(false)
            .group_unmatched_template(false);
        collector.apply(&ctx(TemplateMatch::unmatched("/nope"), 404)).unwrap();

        let counter = collector.metric().as_counter().unwrap();
        assert_eq!(counter.with_label_values(&["GET", "/nope", "404"]).get(), 1.0);
    }

    #[test]
    fn test_request_latency_observes_duration() {
        let collector = RequestLatency::new().unwrap();
        collector.apply(&ctx(TemplateMatch::matched("/ping"), 200)).unwrap();

        let histogram = collector
            .metric()
            .as_histogram()
            .unwrap()
            .with_label_values(&["GET", "/ping"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert!((histogram.get_sample_sum() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_active_requests_gauge_brackets_request() {
        let collector = GlobalActiveRequests::new().unwrap();
        let scope = RequestScope::new(Protocol::Http, Method::GET, "/", HeaderMap::new());
        let gauge = collector.metric().as_gauge().unwrap().with_label_values(&[]);

        collector.begin(&scope).unwrap();
        assert_eq!(gauge.get(), 1.0);
        collector.end(&scope, &Outcome::Responded { status: 200 }).unwrap();
        assert_eq!(gauge.get(), 0.0);
    }
}
