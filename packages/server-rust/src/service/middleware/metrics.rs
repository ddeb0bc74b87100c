//! Dispatch timing and counting.
//!
//! Each call runs inside a `dispatch` span and records
//! `switchyard_dispatch_total{outcome}` and
//! `switchyard_dispatch_duration_ms`. Without an installed recorder the
//! `metrics` macros are no-ops.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use metrics::{counter, histogram};
use switchyard_core::Request;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use crate::service::gateway::GatewayReply;

/// Tower layer wrapping a dispatch service with [`MetricsService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsLayer;

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService { inner }
    }
}

#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
}

impl<S> Service<Request> for MetricsService<S>
where
    S: Service<Request, Response = GatewayReply> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = GatewayReply;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<GatewayReply, S::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let span = info_span!(
            "dispatch",
            service = %request.service,
            operation = %request.operation,
            request_id = %request.request_id,
            outcome = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );

        let fut = self.inner.call(request);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;
                let elapsed = start.elapsed();
                let outcome = result.as_ref().map_or("failed", GatewayReply::outcome);

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = elapsed.as_millis() as u64;
                let span = tracing::Span::current();
                span.record("outcome", outcome);
                span.record("duration_ms", duration_ms);

                counter!("switchyard_dispatch_total", "outcome" => outcome).increment(1);
                histogram!("switchyard_dispatch_duration_ms")
                    .record(elapsed.as_secs_f64() * 1000.0);

                tracing::debug!(outcome, duration_ms, "dispatch complete");
                result
            }
            .instrument(span),
        )
    }
}
