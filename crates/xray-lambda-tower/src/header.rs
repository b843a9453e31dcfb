//! X-Ray trace header parsing and serialisation.
//!
//! The `X-Amzn-Trace-Id` header carries the correlation token that lets the
//! tracing backend stitch the spans of a distributed request into one trace:
//!
//! ```text
//! X-Amzn-Trace-Id: Root=1-5759e988-bd862e3fe1be46a994272793;Parent=53995c3f42cd8ad8;Sampled=1
//! ```
//!
//! The middleware is a pure pass-through/enricher of this header: the format
//! is owned by the X-Ray protocol, and parsing here is deliberately lenient.
//! Malformed fragments are skipped and unknown `key=value` pairs are
//! preserved verbatim so they survive the round trip.

use crate::segment::Subsegment;
use http::HeaderMap;
use std::fmt;

/// Name of the X-Ray trace correlation header.
pub const TRACE_ID_HEADER: &str = "x-amzn-trace-id";

/// Upstream sampling decision carried in the `Sampled` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SampleDecision {
    /// `Sampled=1` - the trace is sampled.
    Sampled,
    /// `Sampled=0` - the trace is not sampled.
    NotSampled,
    /// `Sampled=?` - the caller asks the callee to decide.
    Requested,
}

impl SampleDecision {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "1" => Some(SampleDecision::Sampled),
            "0" => Some(SampleDecision::NotSampled),
            "?" => Some(SampleDecision::Requested),
            _ => None,
        }
    }

    /// The wire representation of the decision.
    pub fn as_str(self) -> &'static str {
        match self {
            SampleDecision::Sampled => "1",
            SampleDecision::NotSampled => "0",
            SampleDecision::Requested => "?",
        }
    }

    /// Converts a boolean sampling flag into a definite decision.
    pub fn from_flag(sampled: bool) -> Self {
        if sampled {
            SampleDecision::Sampled
        } else {
            SampleDecision::NotSampled
        }
    }
}

impl fmt::Display for SampleDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `X-Amzn-Trace-Id` header value.
///
/// A default-constructed header (all fields absent) represents a request
/// that carried no correlation token.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TraceHeader {
    root: Option<String>,
    parent: Option<String>,
    sampled: Option<SampleDecision>,
    extra: Vec<(String, String)>,
}

impl TraceHeader {
    /// Creates an empty trace header.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a trace header carrying only a root trace id.
    pub fn with_root(root: impl Into<String>) -> Self {
        TraceHeader {
            root: Some(root.into()),
            ..TraceHeader::default()
        }
    }

    /// The root trace id, e.g. `1-5759e988-bd862e3fe1be46a994272793`.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    /// The parent segment id.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// The upstream sampling decision.
    pub fn sampled(&self) -> Option<SampleDecision> {
        self.sampled
    }

    /// Fields other than `Root`/`Parent`/`Sampled`, preserved verbatim.
    pub fn extra(&self) -> &[(String, String)] {
        &self.extra
    }

    /// Parses a raw header value.
    ///
    /// Never fails: fragments that do not look like `key=value`, empty
    /// values, and unrecognised `Sampled` values are skipped.
    pub fn from_header_str(value: &str) -> Self {
        let mut header = TraceHeader::default();

        for part in value.split(';') {
            let part = part.trim();
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            if value.is_empty() {
                continue;
            }
            match key {
                "Root" => header.root = Some(value.to_owned()),
                "Parent" => header.parent = Some(value.to_owned()),
                "Sampled" => header.sampled = SampleDecision::parse(value),
                _ => header.extra.push((key.to_owned(), value.to_owned())),
            }
        }

        header
    }

    /// Looks up and parses the trace header from a header map.
    ///
    /// Returns an empty header when absent or not valid UTF-8.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TRACE_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(Self::from_header_str)
            .unwrap_or_default()
    }

    /// Serialises the header into its wire form.
    ///
    /// Only present fields are emitted, in `Root`, `Parent`, `Sampled`
    /// order, followed by any preserved extra fields.
    pub fn to_header_str(&self) -> String {
        let mut parts = Vec::new();
        if let Some(root) = &self.root {
            parts.push(format!("Root={root}"));
        }
        if let Some(parent) = &self.parent {
            parts.push(format!("Parent={parent}"));
        }
        if let Some(sampled) = self.sampled {
            parts.push(format!("Sampled={sampled}"));
        }
        for (key, value) in &self.extra {
            parts.push(format!("{key}={value}"));
        }
        parts.join(";")
    }
}

/// Derives the outbound `X-Amzn-Trace-Id` value for a response.
///
/// When the caller asked for a sampling decision (`Sampled=?`), the answer
/// carries the subsegment's decision alongside the root. Otherwise only the
/// root is echoed back. A request that carried no root is answered with the
/// subsegment's own trace id, so the response header is never empty.
pub fn prepare_response_header(origin: &TraceHeader, subsegment: &Subsegment) -> String {
    let root = origin
        .root()
        .map(str::to_owned)
        .unwrap_or_else(|| subsegment.trace_id());

    let mut header = TraceHeader::with_root(root);
    if origin.sampled() == Some(SampleDecision::Requested) {
        header.sampled = Some(SampleDecision::from_flag(subsegment.sampled()));
    }
    header.to_header_str()
}
