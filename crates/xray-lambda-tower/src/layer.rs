//! Tower Layer carrying the middleware's construction-time configuration.

use crate::error::{default_error_handler, ErrorHandler, ErrorResponse, SegmentHandler};
use crate::recorder::{global_recorder, TraceRecorder};
use crate::request::RequestSummary;
use crate::segment::Subsegment;
use crate::service::XRayTracingService;
use std::borrow::Cow;
use std::sync::Arc;
use tower::{BoxError, Layer};

/// What to do when the inner service fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ErrorStrategy {
    /// Substitute the error handler's response and return it to the caller.
    /// The pipeline never sees the error itself.
    #[default]
    Respond,
    /// Record the error onto the subsegment, close it, and return the error
    /// unchanged, leaving error-to-response translation to the pipeline.
    Propagate,
}

#[derive(Clone)]
pub(crate) struct TraceConfig {
    pub(crate) recorder: Arc<dyn TraceRecorder>,
    pub(crate) error_handler: ErrorHandler,
    pub(crate) segment_handler: Option<SegmentHandler>,
    pub(crate) name: Option<Cow<'static, str>>,
    pub(crate) capture_response: bool,
    pub(crate) capture_error: bool,
    pub(crate) error_strategy: ErrorStrategy,
}

/// Tower layer that wraps each request/response cycle in an X-Ray
/// subsegment.
///
/// Inside the Lambda runtime, each request with a [`RoutedHandler`]
/// extension gets a subsegment named after its handler, annotated with HTTP
/// metadata, carrying the inbound `X-Amzn-Trace-Id` token through to the
/// response, and closed on every exit path. Outside the runtime (or without
/// a routed handler) the middleware is a pure pass-through.
///
/// [`RoutedHandler`]: crate::request::RoutedHandler
///
/// # Example
///
/// ```ignore
/// use tower::ServiceBuilder;
/// use xray_lambda_tower::XRayTracingLayer;
///
/// let service = ServiceBuilder::new()
///     .layer(XRayTracingLayer::new())
///     .service(router);
/// ```
#[derive(Clone)]
pub struct XRayTracingLayer {
    config: TraceConfig,
}

impl XRayTracingLayer {
    /// Creates a layer with default settings:
    ///
    /// - the process-wide shared recorder
    /// - the default error handler (structured errors keep their status,
    ///   everything else becomes `500 Server Error`)
    /// - no segment handler, no name override
    /// - response status and error capture enabled
    /// - [`ErrorStrategy::Respond`]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a builder for more detailed configuration.
    pub fn builder() -> XRayTracingLayerBuilder {
        XRayTracingLayerBuilder::new()
    }
}

impl Default for XRayTracingLayer {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Layer<S> for XRayTracingLayer {
    type Service = XRayTracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        XRayTracingService::new(inner, self.config.clone())
    }
}

/// Builder for configuring an [`XRayTracingLayer`].
///
/// # Example
///
/// ```ignore
/// use std::sync::Arc;
/// use xray_lambda_tower::{ErrorStrategy, XRayRecorder, XRayTracingLayer};
///
/// let recorder = Arc::new(XRayRecorder::new());
/// let layer = XRayTracingLayer::builder()
///     .recorder(recorder)
///     .error_strategy(ErrorStrategy::Propagate)
///     .build();
/// ```
#[must_use = "builders do nothing unless .build() is called"]
pub struct XRayTracingLayerBuilder {
    config: TraceConfig,
}

impl XRayTracingLayerBuilder {
    /// Creates a builder with the defaults described on
    /// [`XRayTracingLayer::new`].
    pub fn new() -> Self {
        XRayTracingLayerBuilder {
            config: TraceConfig {
                recorder: global_recorder(),
                error_handler: Arc::new(default_error_handler),
                segment_handler: None,
                name: None,
                capture_response: true,
                capture_error: true,
                error_strategy: ErrorStrategy::default(),
            },
        }
    }

    /// Sets the recorder driving subsegment lifecycle.
    ///
    /// Defaults to the process-wide shared recorder; inject a dedicated
    /// instance for isolation in tests or custom pipelines.
    pub fn recorder(mut self, recorder: Arc<dyn TraceRecorder>) -> Self {
        self.config.recorder = recorder;
        self
    }

    /// Sets the handler mapping inner-service errors to substitute
    /// responses (used with [`ErrorStrategy::Respond`]).
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RequestSummary, &BoxError, &Subsegment) -> ErrorResponse + Send + Sync + 'static,
    {
        self.config.error_handler = Arc::new(handler);
        self
    }

    /// Sets a handler invoked once per traced request, after HTTP metadata
    /// is attached, for caller-supplied subsegment enrichment.
    pub fn segment_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&RequestSummary, &Subsegment) + Send + Sync + 'static,
    {
        self.config.segment_handler = Some(Arc::new(handler));
        self
    }

    /// Overrides the subsegment name.
    ///
    /// Without an override the name is derived from the routed handler's
    /// identifier.
    pub fn name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Sets whether the response status is attached to the subsegment.
    ///
    /// Default: `true`.
    pub fn capture_response(mut self, capture: bool) -> Self {
        self.config.capture_response = capture;
        self
    }

    /// Sets whether inner-service errors are recorded onto the subsegment
    /// (message, cause chain, depth-limited stack trace).
    ///
    /// Default: `true`.
    pub fn capture_error(mut self, capture: bool) -> Self {
        self.config.capture_error = capture;
        self
    }

    /// Sets the error strategy.
    ///
    /// Default: [`ErrorStrategy::Respond`].
    pub fn error_strategy(mut self, strategy: ErrorStrategy) -> Self {
        self.config.error_strategy = strategy;
        self
    }

    /// Builds the configured layer.
    pub fn build(self) -> XRayTracingLayer {
        XRayTracingLayer {
            config: self.config,
        }
    }
}

impl Default for XRayTracingLayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
