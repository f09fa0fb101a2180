//! Route template resolution
//!
//! Routes are declared through [`TemplateRouter`], which wraps each route's
//! service in a [`RouteTemplate`] capturing the declared path. When axum
//! dispatches to that route, the template is written into the request's
//! [`RouteSlot`], so metrics are labelled `/items/{item_id}` rather than
//! `/items/42`. Which route matches is left entirely to axum.
//!
//! - plain routes inject `root_path + path`
//! - static-file mounts inject `root_path + prefix + "/{path}"`
//! - sub-application mounts inject nothing themselves; they extend the root
//!   path and let the inner route inject its own template

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    Router,
    extract::Request,
    handler::Handler,
    http,
    middleware::{self as axum_mw, Next},
    response::IntoResponse,
    routing::MethodRouter,
};
use httpmetrics_core::RouteSlot;
use tower::{Layer, Service};

/// Layer producing [`RouteTemplate`] services
#[derive(Debug, Clone)]
pub struct RouteTemplateLayer {
    path_format: Arc<str>,
}

impl RouteTemplateLayer {
    pub fn new(path_format: &str) -> Self {
        Self {
            path_format: Arc::from(path_format),
        }
    }

    pub fn path_format(&self) -> &str {
        &self.path_format
    }
}

impl<S> Layer<S> for RouteTemplateLayer {
    type Service = RouteTemplate<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RouteTemplate {
            inner,
            path_format: self.path_format.clone(),
        }
    }
}

/// Wraps a matched route's service and records its template before calling it.
///
/// Only the first template written for a request is kept, so wrapping the
/// same service twice yields the same result as wrapping it once.
#[derive(Debug, Clone)]
pub struct RouteTemplate<S> {
    inner: S,
    path_format: Arc<str>,
}

impl<S> RouteTemplate<S> {
    pub fn path_format(&self) -> &str {
        &self.path_format
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Recover the undecorated service.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, B> Service<http::Request<B>> for RouteTemplate<S>
where
    S: Service<http::Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: http::Request<B>) -> Self::Future {
        if let Some(slot) = request.extensions().get::<Arc<RouteSlot>>() {
            slot.set_template(&self.path_format);
        }
        self.inner.call(request)
    }
}

/// An axum [`Router`] whose routes report their declared template.
pub struct TemplateRouter<S = ()> {
    router: Router<S>,
}

impl<S> TemplateRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            router: Router::new(),
        }
    }

    /// Plain route. Also used for websocket routes.
    pub fn route(self, path: &str, method_router: MethodRouter<S>) -> Self {
        Self {
            router: self
                .router
                .route(path, method_router.layer(RouteTemplateLayer::new(path))),
        }
    }

    pub fn route_service<T>(self, path: &str, service: T) -> Self
    where
        T: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        T::Response: IntoResponse,
        T::Future: Send + 'static,
    {
        Self {
            router: self
                .router
                .route_service(path, RouteTemplateLayer::new(path).layer(service)),
        }
    }

    /// Mount a static-file service under `prefix`.
    ///
    /// The bare `prefix` (no trailing segment) is routed to the service as
    /// well and reported with the same `prefix/{path}` template.
    pub fn mount_static<T>(self, prefix: &str, service: T) -> Self
    where
        T: Service<Request, Error = Infallible> + Clone + Send + Sync + 'static,
        T::Response: IntoResponse,
        T::Future: Send + 'static,
    {
        let prefix = prefix.trim_end_matches('/');
        let template = format!("{prefix}/{{path}}");
        Self {
            router: self
                .router
                .nest_service(prefix, RouteTemplateLayer::new(&template).layer(service)),
        }
    }

    /// Mount a sub-application under `prefix`. `prefix` must not be `/`.
    pub fn nest(self, prefix: &str, app: TemplateRouter<S>) -> Self {
        let mount: Arc<str> = Arc::from(prefix.trim_end_matches('/'));
        let app = app
            .router
            .layer(axum_mw::from_fn(move |request: Request, next: Next| {
                let mount = mount.clone();
                async move {
                    if let Some(slot) = request.extensions().get::<Arc<RouteSlot>>() {
                        slot.enter_mount(&mount);
                    }
                    next.run(request).await
                }
            }));

        Self {
            router: self.router.nest(prefix, app),
        }
    }

    pub fn merge(self, other: TemplateRouter<S>) -> Self {
        Self {
            router: self.router.merge(other.router),
        }
    }

    /// Requests reaching the fallback stay unmatched.
    pub fn fallback<H, T>(self, handler: H) -> Self
    where
        H: Handler<T, S>,
        T: 'static,
    {
        Self {
            router: self.router.fallback(handler),
        }
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}

impl<S> Default for TemplateRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> From<TemplateRouter<S>> for Router<S> {
    fn from(router: TemplateRouter<S>) -> Self {
        router.router
    }
}
