//! Tower Service implementation: opens and annotates the subsegment, then
//! hands lifecycle completion to [`XRayTracingFuture`].

use crate::future::{TraceState, XRayTracingFuture};
use crate::header::TraceHeader;
use crate::lambda_env::check_in_lambda;
use crate::layer::TraceConfig;
use crate::recorder::TraceRecorder;
use crate::request::{upstream_event_headers, RequestSummary, RoutedHandler};
use http::{Request, Response};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{BoxError, Service};

/// Tower service wrapping each request/response cycle in an X-Ray
/// subsegment.
///
/// Produced by [`XRayTracingLayer`]; see the layer documentation for the
/// configuration surface.
///
/// [`XRayTracingLayer`]: crate::layer::XRayTracingLayer
#[derive(Clone)]
pub struct XRayTracingService<S> {
    inner: S,
    config: TraceConfig,
}

impl<S> XRayTracingService<S> {
    pub(crate) fn new(inner: S, config: TraceConfig) -> Self {
        XRayTracingService { inner, config }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for XRayTracingService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    ResBody: From<String>,
{
    type Response = Response<ResBody>;
    type Error = BoxError;
    type Future = XRayTracingFuture<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        // Outside the Lambda runtime the middleware must cost nothing.
        if !check_in_lambda() {
            return XRayTracingFuture::passthrough(self.inner.call(request));
        }

        // No routed handler means a misconfigured pipeline; a subsegment we
        // cannot name meaningfully is not worth opening.
        let Some(handler) = request.extensions().get::<RoutedHandler>().cloned() else {
            return XRayTracingFuture::passthrough(self.inner.call(request));
        };

        let name = match &self.config.name {
            Some(name) => name.to_string(),
            None => handler.name().to_owned(),
        };

        // Prefer the raw upstream event's headers: that is where the real
        // triggering context carries the token. Local and test invocations
        // have no event envelope, so fall back to the request's own headers.
        let origin = match upstream_event_headers(&request) {
            Some(headers) => TraceHeader::from_headers(headers),
            None => TraceHeader::from_headers(request.headers()),
        };

        let subsegment = match self.config.recorder.begin_subsegment(&name) {
            Ok(subsegment) => subsegment,
            Err(error) => {
                tracing::warn!(
                    target: "xray_lifecycle",
                    error = %error,
                    handler = %handler.name(),
                    "cannot begin subsegment, request continues untraced"
                );
                return XRayTracingFuture::passthrough(self.inner.call(request));
            }
        };

        subsegment.save_origin_trace_header(origin.clone());
        subsegment.set_http_method(request.method());
        let url = match request.uri().query().filter(|query| !query.is_empty()) {
            Some(query) => format!("{}?{}", request.uri().path(), query),
            None => request.uri().path().to_owned(),
        };
        subsegment.set_http_url(url);

        // Expose the recorder and the open subsegment to downstream
        // handlers so they can attach their own annotations.
        request
            .extensions_mut()
            .insert(Arc::clone(&self.config.recorder));
        request.extensions_mut().insert(subsegment.clone());

        let summary = RequestSummary::from_parts(&request, handler.name());
        if let Some(segment_handler) = &self.config.segment_handler {
            segment_handler(&summary, &subsegment);
        }

        let future = self.inner.call(request);
        XRayTracingFuture::traced(
            future,
            TraceState {
                recorder: Arc::clone(&self.config.recorder),
                subsegment,
                origin,
                request: summary,
                error_handler: Arc::clone(&self.config.error_handler),
                strategy: self.config.error_strategy,
                capture_response: self.config.capture_response,
                capture_error: self.config.capture_error,
                completed: false,
            },
        )
    }
}
