//! Request-side collaborators: the routed-handler extension and the request
//! summary handed to configured handlers.

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayV2httpRequest};
use http::{HeaderMap, Method, Request, Uri};
use std::borrow::Cow;

/// Extension attached by the router naming the handler selected for a
/// request.
///
/// The middleware derives the subsegment name from it and skips tracing
/// entirely when it is absent: a request the middleware cannot name is a
/// sign of a misconfigured pipeline, not something worth tracing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutedHandler {
    name: Cow<'static, str>,
}

impl RoutedHandler {
    /// Names the routed handler, e.g. `get_user`.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        RoutedHandler { name: name.into() }
    }

    /// The handler's identifier.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// A view of the request captured before the inner service consumes it.
///
/// Error and segment handlers run after the request has been moved into the
/// pipeline, so they receive this summary instead.
#[derive(Clone, Debug)]
pub struct RequestSummary {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    handler_name: String,
}

impl RequestSummary {
    pub(crate) fn from_parts<B>(request: &Request<B>, handler_name: &str) -> Self {
        RequestSummary {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            handler_name: handler_name.to_owned(),
        }
    }

    /// The request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// The request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// The query string, when one was present.
    pub fn query(&self) -> Option<&str> {
        self.uri.query()
    }

    /// The request headers as received by the middleware.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The routed handler's identifier.
    pub fn handler_name(&self) -> &str {
        &self.handler_name
    }
}

/// Headers of the raw upstream API Gateway event, when the pipeline adapter
/// attached one to the request's extensions.
///
/// The HTTP API (v2) shape is preferred over the REST API (v1) shape. Local
/// and test invocations carry no raw event, in which case the caller falls
/// back to the HTTP request's own headers.
pub(crate) fn upstream_event_headers<B>(request: &Request<B>) -> Option<&HeaderMap> {
    if let Some(event) = request.extensions().get::<ApiGatewayV2httpRequest>() {
        return Some(&event.headers);
    }
    request
        .extensions()
        .get::<ApiGatewayProxyRequest>()
        .map(|event| &event.headers)
}
