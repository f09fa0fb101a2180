//! Per-request data handed to collectors
//!
//! - [`RequestScope`]: transport-level snapshot taken when a request is admitted
//! - [`RouteSlot`]: shared slot the route resolver writes the matched template into
//! - [`RequestContext`]: read-only view built once the downstream call is over

use std::sync::{Mutex, OnceLock};
use std::time::{Duration, Instant};

use http::{HeaderMap, Method};

/// Status reported for requests that never produced a response
pub const DEFAULT_FAILURE_STATUS: u16 = 500;

/// Protocol of an inbound transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    WebSocket,
}

impl Protocol {
    /// Detect a websocket upgrade from the request headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let upgrade = headers
            .get(http::header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

        if upgrade {
            Protocol::WebSocket
        } else {
            Protocol::Http
        }
    }
}

/// Transport-level view of a request, captured at admission
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub protocol: Protocol,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub started_at: Instant,
}

impl RequestScope {
    pub fn new(protocol: Protocol, method: Method, path: impl Into<String>, headers: HeaderMap) -> Self {
        Self {
            protocol,
            method,
            path: path.into(),
            headers,
            started_at: Instant::now(),
        }
    }

    /// Time since admission, never negative
    pub fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.started_at)
    }
}

/// How the downstream call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The handler produced a response with this status.
    Responded { status: u16 },
    /// A panic unwound through the request, or the response body errored.
    Failed,
    /// The request was dropped before its response was fully sent. Async
    /// runtimes catch task panics first, so a panicking handler usually ends
    /// up here too.
    Cancelled,
    /// A live collector failed to begin; the handler never ran.
    Aborted,
}

impl Outcome {
    pub fn status(&self) -> u16 {
        match self {
            Outcome::Responded { status } => *status,
            Outcome::Failed | Outcome::Cancelled | Outcome::Aborted => DEFAULT_FAILURE_STATUS,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Responded { .. })
    }
}

/// Route template resolution result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMatch {
    /// `true` when a declared route matched.
    pub matched: bool,
    /// The route template, or the raw path when unmatched.
    pub template: String,
}

impl TemplateMatch {
    pub fn matched(template: impl Into<String>) -> Self {
        Self {
            matched: true,
            template: template.into(),
        }
    }

    pub fn unmatched(raw_path: impl Into<String>) -> Self {
        Self {
            matched: false,
            template: raw_path.into(),
        }
    }

    pub fn as_tuple(&self) -> (bool, &str) {
        (self.matched, &self.template)
    }
}

/// Request-scoped slot shared between the middleware and the route resolver.
///
/// The middleware inserts it into the request before routing. Mounted
/// sub-applications append their prefix to the root path; the matched route
/// writes the template once.
#[derive(Debug, Default)]
pub struct RouteSlot {
    root_path: Mutex<String>,
    template: OnceLock<String>,
}

impl RouteSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that routing descended into a sub-application mounted at `prefix`.
    pub fn enter_mount(&self, prefix: &str) {
        let mut root = self
            .root_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        root.push_str(prefix.trim_end_matches('/'));
    }

    pub fn root_path(&self) -> String {
        self.root_path
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Write `root_path + path_format`. Only the first write wins; returns
    /// whether this call stored the template.
    pub fn set_template(&self, path_format: &str) -> bool {
        let template = format!("{}{}", self.root_path(), path_format);
        self.template.set(template).is_ok()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.get().map(String::as_str)
    }

    /// Resolve against the raw request path.
    pub fn resolve(&self, raw_path: &str) -> TemplateMatch {
        match self.template() {
            Some(template) => TemplateMatch::matched(template),
            None => TemplateMatch::unmatched(raw_path),
        }
    }
}

/// Read-only view of a finished request
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    matched_template: TemplateMatch,
    status_code: u16,
    duration: Duration,
    global_active_requests: usize,
    response_headers: HeaderMap,
    outcome: Outcome,
}

impl RequestContext {
    pub(crate) fn new(
        scope: &RequestScope,
        matched_template: TemplateMatch,
        outcome: Outcome,
        duration: Duration,
        global_active_requests: usize,
        response_headers: HeaderMap,
    ) -> Self {
        Self {
            method: scope.method.clone(),
            path: scope.path.clone(),
            matched_template,
            status_code: outcome.status(),
            duration,
            global_active_requests,
            response_headers,
            outcome,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Raw request path
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn matched_template(&self) -> &TemplateMatch {
        &self.matched_template
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// First digit of the status followed by `xx`, e.g. `2xx`
    pub fn status_class(&self) -> String {
        format!("{}xx", self.status_code / 100)
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration.as_secs_f64()
    }

    /// In-flight requests when this one completed, itself included
    pub fn global_active_requests(&self) -> usize {
        self.global_active_requests
    }

    pub fn response_headers(&self) -> &HeaderMap {
        &self.response_headers
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(path: &str) -> RequestScope {
        RequestScope::new(Protocol::Http, Method::GET, path, HeaderMap::new())
    }

    #[test]
    fn test_slot_without_template_falls_back_to_raw_path() {
        let slot = RouteSlot::new();
        assert_eq!(slot.resolve("/items/"), TemplateMatch::unmatched("/items/"));
    }

    #[test]
    fn test_slot_first_template_wins() {
        let slot = RouteSlot::new();
        assert!(slot.set_template("/items/{item_id}"));
        assert!(!slot.set_template("/other"));
        assert_eq!(
            slot.resolve("/items/123").as_tuple(),
            (true, "/items/{item_id}")
        );
    }

    #[test]
    fn test_slot_prefixes_mounted_root_path() {
        let slot = RouteSlot::new();
        slot.enter_mount("/app2");
        slot.enter_mount("/v1/");
        slot.set_template("/ping");
        assert_eq!(slot.template(), Some("/app2/v1/ping"));
    }

    #[test]
    fn test_websocket_upgrade_detection() {
        let mut headers = HeaderMap::new();
        assert_eq!(Protocol::from_headers(&headers), Protocol::Http);

        headers.insert(http::header::UPGRADE, "WebSocket".parse().unwrap());
        assert_eq!(Protocol::from_headers(&headers), Protocol::WebSocket);
    }

    #[test]
    fn test_failed_outcomes_report_server_error() {
        let ctx = RequestContext::new(
            &scope("/boom"),
            TemplateMatch::matched("/boom"),
            Outcome::Failed,
            Duration::from_millis(5),
            1,
            HeaderMap::new(),
        );
        assert_eq!(ctx.status_code(), 500);
        assert_eq!(ctx.status_class(), "5xx");
        assert!(!ctx.outcome().is_success());
    }

    #[test]
    fn test_elapsed_is_never_negative() {
        let mut scope = scope("/");
        // A start time in the future behaves like a clock stepping backwards.
        scope.started_at = Instant::now() + Duration::from_secs(60);
        assert_eq!(scope.elapsed(), Duration::ZERO);
    }
}
