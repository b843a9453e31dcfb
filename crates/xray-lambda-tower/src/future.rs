//! Response future that completes the subsegment lifecycle.
//!
//! The open/close bracket must hold on every exit path: normal response,
//! substituted error response, propagated error, and cancellation. The
//! future owns the per-request trace state; its drop guard closes the
//! subsegment if the request is abandoned before completion.

use crate::error::ErrorHandler;
use crate::header::{prepare_response_header, TraceHeader, TRACE_ID_HEADER};
use crate::layer::ErrorStrategy;
use crate::recorder::TraceRecorder;
use crate::request::RequestSummary;
use crate::segment::Subsegment;
use crate::stacktrace::{self, DEFAULT_STACK_DEPTH};
use http::{HeaderValue, Response};
use pin_project::pin_project;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::BoxError;

/// Per-request trace state carried by the future.
///
/// `completed` flips once the bracket has been closed; the drop impl closes
/// it otherwise, so a cancelled request cannot leak an open subsegment on
/// the recorder's stack.
pub(crate) struct TraceState {
    pub(crate) recorder: Arc<dyn TraceRecorder>,
    pub(crate) subsegment: Subsegment,
    pub(crate) origin: TraceHeader,
    pub(crate) request: RequestSummary,
    pub(crate) error_handler: ErrorHandler,
    pub(crate) strategy: ErrorStrategy,
    pub(crate) capture_response: bool,
    pub(crate) capture_error: bool,
    pub(crate) completed: bool,
}

impl TraceState {
    /// Success-path completion: inject the outbound trace header, attach the
    /// response status, close the subsegment.
    ///
    /// A close failure is returned as the request's error: a request whose
    /// trace cannot be closed must not be reported as successfully traced.
    fn complete<B>(&mut self, response: &mut Response<B>) -> Result<(), BoxError> {
        let header_value = prepare_response_header(&self.origin, &self.subsegment);
        match HeaderValue::from_str(&header_value) {
            Ok(value) => {
                response.headers_mut().insert(TRACE_ID_HEADER, value);
            }
            Err(_) => {
                tracing::warn!(
                    target: "xray_lifecycle",
                    subsegment = %self.subsegment.name(),
                    "outbound trace header is not a valid header value, skipping injection"
                );
            }
        }

        if self.capture_response {
            self.subsegment.set_http_status(response.status().as_u16());
        }

        self.completed = true;
        self.recorder.end_subsegment().map_err(Into::into)
    }
}

impl Drop for TraceState {
    fn drop(&mut self) {
        if self.completed {
            return;
        }
        tracing::warn!(
            target: "xray_lifecycle",
            subsegment = %self.subsegment.name(),
            "request future dropped before completion, closing subsegment"
        );
        if let Err(error) = self.recorder.end_subsegment() {
            tracing::warn!(
                target: "xray_lifecycle",
                error = %error,
                "failed to close subsegment for dropped request"
            );
        }
    }
}

/// Future returned by [`XRayTracingService`].
///
/// In pass-through mode (outside Lambda, no routed handler, or a failed
/// subsegment open) it only adapts the inner error type. In traced mode it
/// completes the subsegment lifecycle when the inner future resolves.
///
/// [`XRayTracingService`]: crate::service::XRayTracingService
#[pin_project]
pub struct XRayTracingFuture<F> {
    #[pin]
    inner: F,
    trace: Option<TraceState>,
}

impl<F> XRayTracingFuture<F> {
    pub(crate) fn passthrough(inner: F) -> Self {
        XRayTracingFuture { inner, trace: None }
    }

    pub(crate) fn traced(inner: F, trace: TraceState) -> Self {
        XRayTracingFuture {
            inner,
            trace: Some(trace),
        }
    }
}

impl<F, ResBody, E> Future for XRayTracingFuture<F>
where
    F: Future<Output = Result<Response<ResBody>, E>>,
    E: Into<BoxError>,
    ResBody: From<String>,
{
    type Output = Result<Response<ResBody>, BoxError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();

        let result = match this.inner.poll(cx) {
            Poll::Ready(result) => result,
            Poll::Pending => return Poll::Pending,
        };

        let Some(trace) = this.trace.as_mut() else {
            return Poll::Ready(result.map_err(Into::into));
        };

        match result {
            Ok(mut response) => Poll::Ready(trace.complete(&mut response).map(|()| response)),
            Err(error) => {
                let error: BoxError = error.into();
                if trace.capture_error {
                    trace
                        .subsegment
                        .add_exception(&*error, stacktrace::capture(DEFAULT_STACK_DEPTH));
                }

                match trace.strategy {
                    ErrorStrategy::Respond => {
                        let substitute =
                            (trace.error_handler)(&trace.request, &error, &trace.subsegment);
                        let mut response = substitute.into_response::<ResBody>();
                        Poll::Ready(trace.complete(&mut response).map(|()| response))
                    }
                    ErrorStrategy::Propagate => {
                        // The original error stays authoritative: a close
                        // failure here is logged, not substituted for it.
                        trace.completed = true;
                        if let Err(close_error) = trace.recorder.end_subsegment() {
                            tracing::warn!(
                                target: "xray_lifecycle",
                                error = %close_error,
                                "failed to close subsegment while propagating handler error"
                            );
                        }
                        Poll::Ready(Err(error))
                    }
                }
            }
        }
    }
}
