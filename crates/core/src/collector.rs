//! Collector interface
//!
//! A collector owns one [`Metric`] and updates it either once per finished
//! request ([`PostCollector`]) or around the request ([`LiveCollector`]).
//! [`Collector`] is the value the pipeline stores; it carries the lifecycle tag
//! and gives uniform access to the bound metric.

use std::fmt;
use std::sync::Arc;

use prometheus::Registry;

use crate::context::{Outcome, RequestContext, RequestScope};
use crate::error::CollectorError;
use crate::metric::{Metric, MetricKind};

/// Runs once per completed request.
pub trait PostCollector: Send + Sync {
    fn metric(&self) -> &Metric;

    fn apply(&self, ctx: &RequestContext) -> Result<(), CollectorError>;
}

/// Brackets a request: `begin` at admission, `end` once the downstream call is
/// over, whatever its outcome.
///
/// One collector instance serves every concurrent request, so per-request
/// state must come from the [`RequestScope`] passed to both calls.
pub trait LiveCollector: Send + Sync {
    fn metric(&self) -> &Metric;

    fn begin(&self, scope: &RequestScope) -> Result<(), CollectorError>;

    fn end(&self, scope: &RequestScope, outcome: &Outcome) -> Result<(), CollectorError>;
}

/// When a collector runs relative to the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    PostHoc,
    Live,
}

/// A post or live collector, ready to be handed to the pipeline
#[derive(Clone)]
pub enum Collector {
    Post(Arc<dyn PostCollector>),
    Live(Arc<dyn LiveCollector>),
}

impl Collector {
    pub fn post(collector: impl PostCollector + 'static) -> Self {
        Collector::Post(Arc::new(collector))
    }

    pub fn live(collector: impl LiveCollector + 'static) -> Self {
        Collector::Live(Arc::new(collector))
    }

    /// Post collector backed by a closure.
    pub fn post_fn<F>(metric: Metric, apply: F) -> Self
    where
        F: Fn(&Metric, &RequestContext) -> Result<(), CollectorError> + Send + Sync + 'static,
    {
        Collector::post(FnPostCollector { metric, apply })
    }

    /// Live collector backed by a pair of closures.
    pub fn live_fn<B, E>(metric: Metric, begin: B, end: E) -> Self
    where
        B: Fn(&Metric, &RequestScope) -> Result<(), CollectorError> + Send + Sync + 'static,
        E: Fn(&Metric, &RequestScope, &Outcome) -> Result<(), CollectorError>
            + Send
            + Sync
            + 'static,
    {
        Collector::live(FnLiveCollector { metric, begin, end })
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            Collector::Post(_) => Lifecycle::PostHoc,
            Collector::Live(_) => Lifecycle::Live,
        }
    }

    pub fn metric(&self) -> &Metric {
        match self {
            Collector::Post(c) => c.metric(),
            Collector::Live(c) => c.metric(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        self.metric().kind()
    }

    pub fn name(&self) -> String {
        self.metric().name()
    }
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("lifecycle", &self.lifecycle())
            .field("metric", self.metric())
            .finish()
    }
}

/// Add the collector's metric to `registry`.
///
/// Returns `false` instead of failing when the name is already registered, so
/// calling this again for the same collector and registry is harmless.
pub fn register(collector: &Collector, registry: &Registry) -> bool {
    match collector.metric().register_into(registry) {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(
                collector = %collector.name(),
                error = %e,
                "Metric already registered, skipping"
            );
            false
        }
    }
}

struct FnPostCollector<F> {
    metric: Metric,
    apply: F,
}

impl<F> PostCollector for FnPostCollector<F>
where
    F: Fn(&Metric, &RequestContext) -> Result<(), CollectorError> + Send + Sync,
{
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn apply(&self, ctx: &RequestContext) -> Result<(), CollectorError> {
        (self.apply)(&self.metric, ctx)
    }
}

struct FnLiveCollector<B, E> {
    metric: Metric,
    begin: B,
    end: E,
}

impl<B, E> LiveCollector for FnLiveCollector<B, E>
where
    B: Fn(&Metric, &RequestScope) -> Result<(), CollectorError> + Send + Sync,
    E: Fn(&Metric, &RequestScope, &Outcome) -> Result<(), CollectorError> + Send + Sync,
{
    fn metric(&self) -> &Metric {
        &self.metric
    }

    fn begin(&self, scope: &RequestScope) -> Result<(), CollectorError> {
        (self.begin)(&self.metric, scope)
    }

    fn end(&self, scope: &RequestScope, outcome: &Outcome) -> Result<(), CollectorError> {
        (self.end)(&self.metric, scope, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::MetricOpts;

    fn noop_post(name: &str) -> Collector {
        let metric = Metric::counter(MetricOpts::new(name, "test doc")).unwrap();
        Collector::post_fn(metric, |_, _| Ok(()))
    }

    #[test]
    fn test_register_twice_returns_true_then_false() {
        let registry = Registry::new();
        let collector = noop_post("register_twice_total");

        assert!(register(&collector, &registry));
        assert!(!register(&collector, &registry));
        assert!(!register(&collector, &registry));
    }

    #[test]
    fn test_register_same_name_from_other_collector_is_rejected() {
        let registry = Registry::new();
        assert!(register(&noop_post("shared_name_total"), &registry));
        assert!(!register(&noop_post("shared_name_total"), &registry));
    }

    #[test]
    fn test_same_collector_in_separate_registries() {
        let collector = noop_post("two_registries_total");
        assert!(register(&collector, &Registry::new()));
        assert!(register(&collector, &Registry::new()));
    }

    #[test]
    fn test_lifecycle_tags() {
        let post = noop_post("lifecycle_post_total");
        assert_eq!(post.lifecycle(), Lifecycle::PostHoc);
        assert_eq!(post.kind(), MetricKind::Counter);

        let gauge = Metric::gauge(MetricOpts::new("lifecycle_live", "test doc")).unwrap();
        let live = Collector::live_fn(gauge, |_, _| Ok(()), |_, _, _| Ok(()));
        assert_eq!(live.lifecycle(), Lifecycle::Live);
        assert_eq!(live.kind(), MetricKind::Gauge);
        assert_eq!(live.name(), "lifecycle_live");
    }
}
