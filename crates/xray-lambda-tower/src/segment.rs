//! Trace records: segments and subsegments.
//!
//! A [`Segment`] is the top-level record for one unit of work (one Lambda
//! invocation), opened by whoever hosts the recorder. A [`Subsegment`] is a
//! nested record for a portion of that work; the middleware opens exactly one
//! per traced request. Both are cheaply clonable handles onto shared state:
//! the recorder keeps them on its stack while the middleware and downstream
//! handlers mutate them through their own clones.
//!
//! Records are append-only while open and immutable once closed; mutation of
//! a closed record is ignored with a lifecycle warning.

use crate::header::TraceHeader;
use crate::stacktrace::DEFAULT_STACK_DEPTH;
use serde_json::Value;
use std::collections::BTreeMap;
use std::error::Error;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// HTTP metadata recorded on a subsegment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpMeta {
    /// Request method, e.g. `GET`.
    pub method: Option<String>,
    /// Request path, with `?` + query string appended when one was present.
    pub url: Option<String>,
    /// Response status code.
    pub status: Option<u16>,
}

/// An error captured onto a subsegment, with its cause chain and a
/// depth-limited stack trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionRecord {
    message: String,
    causes: Vec<String>,
    stack: Vec<String>,
}

impl ExceptionRecord {
    /// The error's display message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Messages of the error's sources, outermost first.
    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    /// Rendered stack frames, capped at capture depth.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }
}

#[derive(Debug)]
struct SubsegmentState {
    name: String,
    id: String,
    trace_id: String,
    sampled: bool,
    in_progress: bool,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    http: HttpMeta,
    origin_trace_header: Option<TraceHeader>,
    metadata: BTreeMap<String, BTreeMap<String, Value>>,
    annotations: BTreeMap<String, Value>,
    exceptions: Vec<ExceptionRecord>,
}

/// A nested trace record scoped to one request.
///
/// Obtained from [`TraceRecorder::begin_subsegment`]; the middleware also
/// exposes the handle on the request's extensions so downstream handlers can
/// attach their own metadata and annotations while the request is in flight.
///
/// [`TraceRecorder::begin_subsegment`]: crate::recorder::TraceRecorder::begin_subsegment
#[derive(Clone, Debug)]
pub struct Subsegment {
    state: Arc<Mutex<SubsegmentState>>,
}

impl Subsegment {
    pub(crate) fn new(name: &str, trace_id: impl Into<String>, sampled: bool) -> Self {
        Subsegment {
            state: Arc::new(Mutex::new(SubsegmentState {
                name: name.to_owned(),
                id: crate::recorder::new_entity_id(),
                trace_id: trace_id.into(),
                sampled,
                in_progress: true,
                start_time: SystemTime::now(),
                end_time: None,
                http: HttpMeta::default(),
                origin_trace_header: None,
                metadata: BTreeMap::new(),
                annotations: BTreeMap::new(),
                exceptions: Vec::new(),
            })),
        }
    }

    /// The subsegment name (the routed handler's identifier unless overridden).
    pub fn name(&self) -> String {
        lock(&self.state).name.clone()
    }

    /// The subsegment's own id (16 hex characters).
    pub fn id(&self) -> String {
        lock(&self.state).id.clone()
    }

    /// The trace id inherited from the parent segment.
    pub fn trace_id(&self) -> String {
        lock(&self.state).trace_id.clone()
    }

    /// Whether this subsegment belongs to a sampled trace.
    pub fn sampled(&self) -> bool {
        lock(&self.state).sampled
    }

    /// `true` until the recorder closes the subsegment.
    pub fn is_in_progress(&self) -> bool {
        lock(&self.state).in_progress
    }

    /// When the subsegment was opened.
    pub fn start_time(&self) -> SystemTime {
        lock(&self.state).start_time
    }

    /// When the subsegment was closed, if it has been.
    pub fn end_time(&self) -> Option<SystemTime> {
        lock(&self.state).end_time
    }

    /// Recorded HTTP metadata.
    pub fn http(&self) -> HttpMeta {
        lock(&self.state).http.clone()
    }

    /// The inbound trace header stored as this subsegment's origin reference.
    pub fn origin_trace_header(&self) -> Option<TraceHeader> {
        lock(&self.state).origin_trace_header.clone()
    }

    /// A metadata value, if present under the given namespace and key.
    pub fn metadata(&self, namespace: &str, key: &str) -> Option<Value> {
        lock(&self.state)
            .metadata
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned()
    }

    /// An annotation value, if present.
    pub fn annotation(&self, key: &str) -> Option<Value> {
        lock(&self.state).annotations.get(key).cloned()
    }

    /// Errors captured onto this subsegment.
    pub fn exceptions(&self) -> Vec<ExceptionRecord> {
        lock(&self.state).exceptions.clone()
    }

    /// Stores the inbound trace header as this subsegment's origin reference.
    ///
    /// Carried unmodified from request extraction; the response header is
    /// later derived from the same token.
    pub fn save_origin_trace_header(&self, header: TraceHeader) {
        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state.origin_trace_header = Some(header);
    }

    /// Records the request method.
    pub fn set_http_method(&self, method: &http::Method) {
        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state.http.method = Some(method.to_string());
    }

    /// Records the request URL (path plus optional query string).
    pub fn set_http_url(&self, url: impl Into<String>) {
        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state.http.url = Some(url.into());
    }

    /// Records the response status code.
    pub fn set_http_status(&self, status: u16) {
        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state.http.status = Some(status);
    }

    /// Attaches free-form metadata under the `default` namespace.
    pub fn put_metadata(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.put_namespaced_metadata("default", key, value);
    }

    /// Attaches free-form metadata under an explicit namespace.
    pub fn put_namespaced_metadata(
        &self,
        namespace: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) {
        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state
            .metadata
            .entry(namespace.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Attaches an indexed annotation.
    pub fn put_annotation(&self, key: impl Into<String>, value: impl Into<Value>) {
        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state.annotations.insert(key.into(), value.into());
    }

    /// Captures an error and its cause chain, with the given stack frames.
    pub fn add_exception(&self, error: &(dyn Error + 'static), stack: Vec<String>) {
        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(cause) = source {
            if causes.len() == DEFAULT_STACK_DEPTH {
                break;
            }
            causes.push(cause.to_string());
            source = cause.source();
        }

        let mut state = lock(&self.state);
        if !Self::writable(&state) {
            return;
        }
        state.exceptions.push(ExceptionRecord {
            message: error.to_string(),
            causes,
            stack,
        });
    }

    pub(crate) fn close(&self) {
        let mut state = lock(&self.state);
        state.in_progress = false;
        state.end_time = Some(SystemTime::now());
    }

    fn writable(state: &SubsegmentState) -> bool {
        if !state.in_progress {
            tracing::warn!(
                target: "xray_lifecycle",
                subsegment = %state.name,
                "ignoring mutation of a closed subsegment"
            );
            return false;
        }
        true
    }
}

#[derive(Debug)]
struct SegmentState {
    name: String,
    id: String,
    trace_id: String,
    sampled: bool,
    in_progress: bool,
    subsegments: Vec<Subsegment>,
}

/// The top-level trace record for one unit of work.
///
/// In production the hosting runtime opens the segment before the pipeline
/// runs; test harnesses open one explicitly via
/// [`XRayRecorder::begin_segment`] or [`XRayRecorder::in_segment`].
///
/// [`XRayRecorder::begin_segment`]: crate::recorder::XRayRecorder::begin_segment
/// [`XRayRecorder::in_segment`]: crate::recorder::XRayRecorder::in_segment
#[derive(Clone, Debug)]
pub struct Segment {
    state: Arc<Mutex<SegmentState>>,
}

impl Segment {
    pub(crate) fn new(name: &str, trace_id: String, sampled: bool) -> Self {
        Segment {
            state: Arc::new(Mutex::new(SegmentState {
                name: name.to_owned(),
                id: crate::recorder::new_entity_id(),
                trace_id,
                sampled,
                in_progress: true,
                subsegments: Vec::new(),
            })),
        }
    }

    /// The segment name.
    pub fn name(&self) -> String {
        lock(&self.state).name.clone()
    }

    /// The segment's own id (16 hex characters).
    pub fn id(&self) -> String {
        lock(&self.state).id.clone()
    }

    /// The trace id all subsegments of this segment inherit.
    pub fn trace_id(&self) -> String {
        lock(&self.state).trace_id.clone()
    }

    /// Whether this trace is sampled.
    pub fn sampled(&self) -> bool {
        lock(&self.state).sampled
    }

    /// `true` until the segment is ended.
    pub fn is_in_progress(&self) -> bool {
        lock(&self.state).in_progress
    }

    /// All subsegments opened under this segment, in open order.
    pub fn subsegments(&self) -> Vec<Subsegment> {
        lock(&self.state).subsegments.clone()
    }

    pub(crate) fn add_subsegment(&self, subsegment: Subsegment) {
        lock(&self.state).subsegments.push(subsegment);
    }

    pub(crate) fn close(&self) {
        lock(&self.state).in_progress = false;
    }
}
