//! Request instrumentation pipeline
//!
//! Per request: `admit` (count the request, begin live collectors), the
//! caller runs the downstream handler, then `InFlight::complete` (or the drop
//! guard, when the handler panicked or the future was dropped) ends live
//! collectors in reverse order and runs every post collector.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use http::HeaderMap;
use prometheus::Registry;
use regex::Regex;

use crate::collector::{self, Collector, LiveCollector, PostCollector};
use crate::context::{Outcome, Protocol, RequestContext, RequestScope, RouteSlot};
use crate::error::{CollectorError, ConfigurationError, PipelineError};

/// Builder for [`Pipeline`]
#[derive(Default)]
pub struct PipelineBuilder {
    registry: Option<Registry>,
    post: Vec<Arc<dyn PostCollector>>,
    live: Vec<Arc<dyn LiveCollector>>,
    excluded: Vec<Regex>,
}

impl PipelineBuilder {
    /// Registry the collectors are registered into. Defaults to
    /// `prometheus::default_registry()`.
    pub fn registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn collector(mut self, collector: Collector) -> Self {
        match collector {
            Collector::Post(c) => self.post.push(c),
            Collector::Live(c) => self.live.push(c),
        }
        self
    }

    pub fn post_collector(self, collector: impl PostCollector + 'static) -> Self {
        self.collector(Collector::post(collector))
    }

    pub fn live_collector(self, collector: impl LiveCollector + 'static) -> Self {
        self.collector(Collector::live(collector))
    }

    /// Skip instrumentation for raw paths matching `pattern`.
    pub fn exclude(mut self, pattern: &str) -> Result<Self, ConfigurationError> {
        let regex = Regex::new(pattern).map_err(|source| ConfigurationError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        self.excluded.push(regex);
        Ok(self)
    }

    /// Register every collector and build the pipeline.
    ///
    /// A collector whose metric name is already taken stays in the pipeline;
    /// its updates just never show up in the registry.
    pub fn build(self) -> Pipeline {
        let registry = self
            .registry
            .unwrap_or_else(|| prometheus::default_registry().clone());

        let collectors = self
            .post
            .iter()
            .map(|c| Collector::Post(c.clone()))
            .chain(self.live.iter().map(|c| Collector::Live(c.clone())));
        for c in collectors {
            collector::register(&c, &registry);
        }

        Pipeline {
            inner: Arc::new(PipelineInner {
                registry,
                post: self.post,
                live: self.live,
                excluded: self.excluded,
                active: AtomicUsize::new(0),
            }),
        }
    }
}

struct PipelineInner {
    registry: Registry,
    post: Vec<Arc<dyn PostCollector>>,
    live: Vec<Arc<dyn LiveCollector>>,
    excluded: Vec<Regex>,
    active: AtomicUsize,
}

/// Shared instrumentation state for one application
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Requests admitted but not yet completed
    pub fn active_requests(&self) -> usize {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        self.inner.excluded.iter().any(|re| re.is_match(path))
    }

    /// Whether the request goes through the pipeline at all.
    pub fn accepts(&self, protocol: Protocol, path: &str) -> bool {
        protocol == Protocol::Http && !self.is_excluded(path)
    }

    /// Count the request and begin every live collector in registration order.
    ///
    /// If a collector fails to begin, the ones that already began are ended,
    /// the count is restored and the request must not proceed.
    pub fn admit(&self, scope: RequestScope) -> Result<InFlight, PipelineError> {
        self.inner.active.fetch_add(1, Ordering::AcqRel);

        let mut flight = InFlight {
            pipeline: self.clone(),
            scope,
            route: Arc::new(RouteSlot::new()),
            begun: 0,
            finished: false,
        };

        for live in &self.inner.live {
            if let Err(source) = guarded(|| live.begin(&flight.scope)) {
                flight.abort();
                let err = PipelineError::LiveSetup {
                    collector: live.metric().name(),
                    source,
                };
                tracing::error!(
                    collector = %err.collector(),
                    error = %err,
                    "Live collector setup failed, aborting request"
                );
                return Err(err);
            }
            flight.begun += 1;
        }

        Ok(flight)
    }
}

/// An admitted request. Completing or dropping it records the request.
pub struct InFlight {
    pipeline: Pipeline,
    scope: RequestScope,
    route: Arc<RouteSlot>,
    begun: usize,
    finished: bool,
}

impl InFlight {
    pub fn scope(&self) -> &RequestScope {
        &self.scope
    }

    /// Slot to expose to the route resolver for this request
    pub fn route_slot(&self) -> Arc<RouteSlot> {
        self.route.clone()
    }

    /// The downstream handler produced a response and it was fully sent.
    pub fn complete(mut self, status: u16, response_headers: HeaderMap) {
        self.finish(Outcome::Responded { status }, response_headers);
    }

    /// Producing the response failed after the handler returned, e.g. the
    /// response body errored mid-stream.
    pub fn fail(mut self) {
        self.finish(Outcome::Failed, HeaderMap::new());
    }

    fn finish(&mut self, outcome: Outcome, response_headers: HeaderMap) {
        if self.finished {
            return;
        }
        self.finished = true;

        let duration = self.scope.elapsed();
        // Previous value: in-flight count including this request.
        let active = self.pipeline.inner.active.fetch_sub(1, Ordering::AcqRel);
        self.end_live(&outcome);

        let ctx = RequestContext::new(
            &self.scope,
            self.route.resolve(&self.scope.path),
            outcome,
            duration,
            active,
            response_headers,
        );

        for post in &self.pipeline.inner.post {
            if let Err(source) = guarded(|| post.apply(&ctx)) {
                let err = PipelineError::PostCollector {
                    collector: post.metric().name(),
                    source,
                };
                tracing::error!(collector = %err.collector(), error = %err, "Post collector failed");
            }
        }
    }

    fn abort(&mut self) {
        self.finished = true;
        self.pipeline.inner.active.fetch_sub(1, Ordering::AcqRel);
        self.end_live(&Outcome::Aborted);
    }

    /// End begun live collectors in reverse order; a failure never stops the rest.
    fn end_live(&self, outcome: &Outcome) {
        for live in self.pipeline.inner.live[..self.begun].iter().rev() {
            if let Err(source) = guarded(|| live.end(&self.scope, outcome)) {
                let err = PipelineError::LiveTeardown {
                    collector: live.metric().name(),
                    source,
                };
                tracing::warn!(collector = %err.collector(), error = %err, "Live collector teardown failed");
            }
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let outcome = if std::thread::panicking() {
            Outcome::Failed
        } else {
            tracing::debug!(path = %self.scope.path, "Request dropped before completion");
            Outcome::Cancelled
        };
        self.finish(outcome, HeaderMap::new());
    }
}

/// Run a collector callback, turning a panic into a [`CollectorError`].
///
/// While this thread is already unwinding, a second panic would abort the
/// process, so the callback runs on a scoped thread and its panic surfaces
/// through `join` instead.
fn guarded<F>(f: F) -> Result<(), CollectorError>
where
    F: FnOnce() -> Result<(), CollectorError> + Send,
{
    let panicked = |payload: Box<dyn Any + Send>| {
        Err(CollectorError::Panicked(panic_message(payload.as_ref())))
    };

    if std::thread::panicking() {
        return std::thread::scope(|s| s.spawn(f).join().unwrap_or_else(panicked));
    }

    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(panicked)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
