//! AWS X-Ray Tower middleware for Lambda HTTP pipelines.
//!
//! This crate provides a Tower middleware layer that wraps each HTTP
//! request/response cycle handled inside the AWS Lambda runtime in an X-Ray
//! subsegment. It derives the subsegment name from the routed handler,
//! annotates the record with HTTP metadata, threads the `X-Amzn-Trace-Id`
//! correlation header from the inbound request to the outbound response,
//! captures handler errors into the trace record, and guarantees the
//! subsegment is closed on every exit path.
//!
//! # Architecture
//!
//! The middleware brackets exactly one request: one `begin_subsegment` when
//! the request enters, one `end_subsegment` when it leaves, whether the
//! inner service succeeds, fails, or is cancelled. The recorder is an
//! explicitly injected collaborator behind the [`TraceRecorder`] seam; the
//! bundled [`XRayRecorder`] keeps the segment/subsegment stack in process.
//! Sampling policy and emission to the X-Ray daemon belong to the wider
//! tracing client, not to this crate.
//!
//! Outside the Lambda runtime, or for requests without a [`RoutedHandler`]
//! extension, the middleware is a pure pass-through: the continuation's
//! response is returned unmodified and the recorder is never touched.
//!
//! # Usage
//!
//! ```no_run
//! use http::{Request, Response};
//! use tower::{BoxError, ServiceBuilder, ServiceExt};
//! use xray_lambda_tower::{RoutedHandler, XRayTracingLayer};
//!
//! # async fn run() -> Result<(), BoxError> {
//! let service = ServiceBuilder::new()
//!     .layer(XRayTracingLayer::new())
//!     .service_fn(|_request: Request<String>| async move {
//!         Ok::<_, BoxError>(Response::new("OK".to_owned()))
//!     });
//!
//! // The router is responsible for attaching the routed handler.
//! let mut request = Request::new(String::new());
//! request.extensions_mut().insert(RoutedHandler::new("say_hello"));
//!
//! let response = service.oneshot(request).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Error handling
//!
//! When the inner service fails, the error (message, cause chain, and a
//! depth-limited stack trace) is recorded onto the subsegment, and the
//! configured [`ErrorStrategy`] decides what the pipeline sees:
//!
//! - [`ErrorStrategy::Respond`] (default): the error handler produces a
//!   substitute response. A recognised [`HttpError`] keeps its declared
//!   status and message; anything else becomes `500 Server Error`.
//! - [`ErrorStrategy::Propagate`]: the subsegment is closed and the original
//!   error is returned unchanged, leaving error-to-response translation to
//!   the pipeline.
//!
//! Trace bookkeeping never masks the application's own outcome; the one
//! exception is a failure to close the subsegment on the response path,
//! which is treated as fatal for the request.

mod error;
mod future;
mod header;
mod lambda_env;
mod layer;
mod recorder;
mod request;
mod segment;
mod service;
mod stacktrace;

pub use error::{
    default_error_handler, find_http_error, ErrorHandler, ErrorResponse, HttpError, SegmentHandler,
};
pub use future::XRayTracingFuture;
pub use header::{prepare_response_header, SampleDecision, TraceHeader, TRACE_ID_HEADER};
pub use lambda_env::check_in_lambda;
pub use layer::{ErrorStrategy, XRayTracingLayer, XRayTracingLayerBuilder};
pub use recorder::{global_recorder, RecorderError, SegmentGuard, TraceRecorder, XRayRecorder};
pub use request::{RequestSummary, RoutedHandler};
pub use segment::{ExceptionRecord, HttpMeta, Segment, Subsegment};
pub use service::XRayTracingService;
