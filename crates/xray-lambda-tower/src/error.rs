//! Error types and the configurable error/segment handler seams.

use crate::request::RequestSummary;
use crate::segment::Subsegment;
use http::{Response, StatusCode};
use std::sync::Arc;
use thiserror::Error;
use tower::BoxError;

/// A structured application error carrying an HTTP status and message.
///
/// When the inner service fails with an `HttpError` anywhere in its source
/// chain, the default error handler preserves the declared status and
/// message instead of degrading to a generic server error.
#[derive(Debug, Error)]
#[error("{status} {message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    /// Creates an error with the given status and message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HttpError {
            status,
            message: message.into(),
        }
    }

    /// The declared response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The declared response message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The substitute response an error handler produces.
///
/// A description rather than a framework response: the middleware
/// materialises it into whatever body type the pipeline uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    status: StatusCode,
    message: String,
}

impl ErrorResponse {
    /// Creates a response description with the given status and body message.
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ErrorResponse {
            status,
            message: message.into(),
        }
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response body message.
    pub fn message(&self) -> &str {
        &self.message
    }

    pub(crate) fn into_response<B: From<String>>(self) -> Response<B> {
        let mut response = Response::new(B::from(self.message));
        *response.status_mut() = self.status;
        response
    }
}

/// Maps an inner-service error to a substitute response.
///
/// Invoked with a summary of the failed request, the error, and the open
/// subsegment (already carrying the exception record when error capture is
/// enabled) so the handler can attach its own metadata.
pub type ErrorHandler =
    Arc<dyn Fn(&RequestSummary, &BoxError, &Subsegment) -> ErrorResponse + Send + Sync>;

/// Enriches the subsegment once per traced request, after HTTP metadata is
/// attached and before the inner service runs.
pub type SegmentHandler = Arc<dyn Fn(&RequestSummary, &Subsegment) + Send + Sync>;

/// The default [`ErrorHandler`].
///
/// A recognised [`HttpError`] yields its declared status and message; any
/// other error degrades to `500 Server Error` with no detail leaked.
pub fn default_error_handler(
    _request: &RequestSummary,
    error: &BoxError,
    _subsegment: &Subsegment,
) -> ErrorResponse {
    match find_http_error(&**error) {
        Some(http_error) => ErrorResponse::new(http_error.status(), http_error.message()),
        None => ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Server Error"),
    }
}

/// Finds an [`HttpError`] in the error or its source chain.
pub fn find_http_error<'a>(error: &'a (dyn std::error::Error + 'static)) -> Option<&'a HttpError> {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(candidate) = current {
        if let Some(http_error) = candidate.downcast_ref::<HttpError>() {
            return Some(http_error);
        }
        current = candidate.source();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error)]
    #[error("wrapper")]
    struct Wrapper(#[source] HttpError);

    #[derive(Debug, Error)]
    #[error("plain failure")]
    struct Plain;

    fn subsegment() -> Subsegment {
        Subsegment::new("example_handler", "1-5759e988-bd862e3fe1be46a994272793", true)
    }

    fn summary() -> RequestSummary {
        let request = http::Request::builder()
            .method(http::Method::GET)
            .uri("/test")
            .body(())
            .unwrap();
        RequestSummary::from_parts(&request, "example_handler")
    }

    #[test]
    fn test_find_http_error_direct() {
        let error: BoxError = Box::new(HttpError::new(StatusCode::GATEWAY_TIMEOUT, "late"));
        let found = find_http_error(&*error).unwrap();
        assert_eq!(found.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(found.message(), "late");
    }

    #[test]
    fn test_find_http_error_in_source_chain() {
        let error: BoxError = Box::new(Wrapper(HttpError::new(StatusCode::BAD_GATEWAY, "upstream")));
        let found = find_http_error(&*error).unwrap();
        assert_eq!(found.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_find_http_error_absent() {
        let error: BoxError = Box::new(Plain);
        assert!(find_http_error(&*error).is_none());
    }

    #[test]
    fn test_default_handler_preserves_structured_error() {
        let error: BoxError = Box::new(HttpError::new(StatusCode::GATEWAY_TIMEOUT, "late"));
        let response = default_error_handler(&summary(), &error, &subsegment());
        assert_eq!(response, ErrorResponse::new(StatusCode::GATEWAY_TIMEOUT, "late"));
    }

    #[test]
    fn test_default_handler_degrades_to_server_error() {
        let error: BoxError = Box::new(Plain);
        let response = default_error_handler(&summary(), &error, &subsegment());
        assert_eq!(
            response,
            ErrorResponse::new(StatusCode::INTERNAL_SERVER_ERROR, "Server Error")
        );
    }

    #[test]
    fn test_error_response_materialisation() {
        let response: Response<String> =
            ErrorResponse::new(StatusCode::GATEWAY_TIMEOUT, "NOT OK").into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(response.body(), "NOT OK");
    }
}
