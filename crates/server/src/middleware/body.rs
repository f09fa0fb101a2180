//! Response body that completes the request once it has been fully sent

use std::pin::Pin;
use std::task::{Context, Poll, ready};

use axum::body::{Body, Bytes};
use axum::http::HeaderMap;
use http_body::{Body as HttpBody, Frame, SizeHint};
use httpmetrics_core::InFlight;

/// Wraps a response body and holds the request's [`InFlight`] until the
/// body reaches end-of-stream.
///
/// - end-of-stream completes with the status and headers of the response head
/// - a body error records a failed request
/// - dropping the body early (client went away) is recorded as cancelled by
///   the guard itself
pub struct InstrumentedBody {
    inner: Body,
    flight: Option<InFlight>,
    status: u16,
    headers: HeaderMap,
}

impl InstrumentedBody {
    pub fn new(inner: Body, flight: InFlight, status: u16, headers: HeaderMap) -> Self {
        let mut body = Self {
            inner,
            flight: Some(flight),
            status,
            headers,
        };
        // Bodies already at end-of-stream are never polled.
        if body.inner.is_end_stream() {
            body.complete();
        }
        body
    }

    fn complete(&mut self) {
        if let Some(flight) = self.flight.take() {
            flight.complete(self.status, std::mem::take(&mut self.headers));
        }
    }
}

impl HttpBody for InstrumentedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        let this = &mut *self;
        let frame = ready!(Pin::new(&mut this.inner).poll_frame(cx));

        match &frame {
            None => this.complete(),
            Some(Ok(_)) => {
                if this.inner.is_end_stream() {
                    this.complete();
                }
            }
            Some(Err(err)) => {
                tracing::debug!(error = %err, "Response body failed");
                if let Some(flight) = this.flight.take() {
                    flight.fail();
                }
            }
        }

        Poll::Ready(frame)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use httpmetrics_core::{Collector, Metric, MetricOpts, Outcome, Pipeline, Protocol, RequestScope};
    use prometheus::Registry;
    use std::sync::{Arc, Mutex};

    type Seen = Arc<Mutex<Vec<(Outcome, u16)>>>;

    fn pipeline(seen: &Seen) -> Pipeline {
        let sink = seen.clone();
        Pipeline::builder()
            .registry(Registry::new())
            .collector(Collector::post_fn(
                Metric::counter(MetricOpts::new("bodies_total", "test doc")).unwrap(),
                move |_, ctx| {
                    sink.lock().unwrap().push((ctx.outcome(), ctx.status_code()));
                    Ok(())
                },
            ))
            .build()
    }

    fn admit(pipeline: &Pipeline) -> InFlight {
        let scope = RequestScope::new(
            Protocol::Http,
            axum::http::Method::GET,
            "/body",
            HeaderMap::new(),
        );
        pipeline.admit(scope).unwrap()
    }

    #[tokio::test]
    async fn test_completes_at_end_of_stream() {
        let seen = Seen::default();
        let pipeline = pipeline(&seen);
        let body = InstrumentedBody::new(
            Body::from("hello"),
            admit(&pipeline),
            201,
            HeaderMap::new(),
        );
        assert_eq!(pipeline.active_requests(), 1);

        let bytes = body.collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"hello");
        assert_eq!(pipeline.active_requests(), 0);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Outcome::Responded { status: 201 }, 201)]
        );
    }

    #[tokio::test]
    async fn test_empty_body_completes_immediately() {
        let seen = Seen::default();
        let pipeline = pipeline(&seen);
        let _body = InstrumentedBody::new(Body::empty(), admit(&pipeline), 204, HeaderMap::new());

        assert_eq!(pipeline.active_requests(), 0);
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_body_is_cancelled() {
        let seen = Seen::default();
        let pipeline = pipeline(&seen);
        let body = InstrumentedBody::new(
            Body::from("never read"),
            admit(&pipeline),
            200,
            HeaderMap::new(),
        );
        drop(body);

        assert_eq!(pipeline.active_requests(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![(Outcome::Cancelled, 500)]);
    }

    #[tokio::test]
    async fn test_body_error_is_failed() {
        let seen = Seen::default();
        let pipeline = pipeline(&seen);
        let stream = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::other("disk gone")),
        ]);
        let body = InstrumentedBody::new(
            Body::from_stream(stream),
            admit(&pipeline),
            200,
            HeaderMap::new(),
        );

        assert!(body.collect().await.is_err());
        assert_eq!(pipeline.active_requests(), 0);
        assert_eq!(*seen.lock().unwrap(), vec![(Outcome::Failed, 500)]);
    }
}
