//! The trace recorder contract and its in-process reference implementation.
//!
//! The middleware only ever talks to a [`TraceRecorder`]: open one named
//! subsegment per request, close the most recently opened one. Everything
//! else the wider tracing client does (sampling policy, emission to the
//! X-Ray daemon, trace history) lives behind that seam and is out of scope
//! here.
//!
//! [`XRayRecorder`] is the bundled implementation: a segment plus a stack of
//! open subsegments behind a mutex. It retains closed subsegments on their
//! parent segment, which is what both test assertions and a real emitting
//! client need. Per-request scoping of the stack under concurrent request
//! processing is the hosting runtime's guarantee, not something the
//! middleware or this recorder arranges.

use crate::segment::{Segment, Subsegment};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors surfaced by recorder operations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RecorderError {
    /// A subsegment was opened with no segment in progress.
    #[error("no segment is open on this recorder")]
    NoOpenSegment,

    /// A subsegment was closed with none in progress.
    #[error("no subsegment is open on this recorder")]
    NoOpenSubsegment,
}

/// The contract the middleware requires of a tracing client.
///
/// Every `begin_subsegment` issued by the middleware is matched by exactly
/// one `end_subsegment`, on every exit path. Implementations maintain an
/// implicit stack: `end_subsegment` closes the most recently opened entry.
pub trait TraceRecorder: Send + Sync {
    /// Opens a named subsegment under the current segment.
    ///
    /// Requires a segment to be in progress; the hosting runtime guarantees
    /// one in production, test harnesses establish one explicitly.
    fn begin_subsegment(&self, name: &str) -> Result<Subsegment, RecorderError>;

    /// Closes the most recently opened subsegment.
    fn end_subsegment(&self) -> Result<(), RecorderError>;
}

#[derive(Debug, Default)]
struct TraceContext {
    segment: Option<Segment>,
    stack: Vec<Subsegment>,
}

/// In-process recorder maintaining one segment and a subsegment stack.
#[derive(Debug, Default)]
pub struct XRayRecorder {
    context: Mutex<TraceContext>,
}

impl XRayRecorder {
    /// Creates a recorder with no segment in progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new segment, replacing any previous one.
    ///
    /// The segment gets a freshly generated trace id and is sampled; the
    /// subsegment stack is reset.
    pub fn begin_segment(&self, name: &str) -> Segment {
        let segment = Segment::new(name, new_trace_id(), true);
        let mut context = self.lock();
        context.segment = Some(segment.clone());
        context.stack.clear();
        segment
    }

    /// Ends the current segment and clears the subsegment stack.
    pub fn end_segment(&self) {
        let mut context = self.lock();
        if let Some(segment) = context.segment.take() {
            segment.close();
        }
        context.stack.clear();
    }

    /// Opens a segment and returns a guard that ends it on drop.
    ///
    /// The test-harness equivalent of the parent segment the Lambda runtime
    /// opens around each invocation.
    pub fn in_segment(&self, name: &str) -> SegmentGuard<'_> {
        let segment = self.begin_segment(name);
        SegmentGuard {
            recorder: self,
            segment,
        }
    }

    /// The segment currently in progress, if any.
    pub fn current_segment(&self) -> Option<Segment> {
        self.lock().segment.clone()
    }

    /// The most recently opened subsegment still in progress, if any.
    pub fn current_subsegment(&self) -> Option<Subsegment> {
        self.lock().stack.last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, TraceContext> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TraceRecorder for XRayRecorder {
    fn begin_subsegment(&self, name: &str) -> Result<Subsegment, RecorderError> {
        let mut context = self.lock();
        let segment = context
            .segment
            .as_ref()
            .filter(|segment| segment.is_in_progress())
            .ok_or(RecorderError::NoOpenSegment)?;

        let subsegment = Subsegment::new(name, segment.trace_id(), segment.sampled());
        segment.add_subsegment(subsegment.clone());
        context.stack.push(subsegment.clone());
        Ok(subsegment)
    }

    fn end_subsegment(&self) -> Result<(), RecorderError> {
        let mut context = self.lock();
        let subsegment = context.stack.pop().ok_or(RecorderError::NoOpenSubsegment)?;
        subsegment.close();
        Ok(())
    }
}

/// Guard returned by [`XRayRecorder::in_segment`]; ends the segment on drop.
#[must_use = "the segment ends as soon as the guard is dropped"]
pub struct SegmentGuard<'a> {
    recorder: &'a XRayRecorder,
    segment: Segment,
}

impl SegmentGuard<'_> {
    /// The segment this guard keeps open.
    pub fn segment(&self) -> &Segment {
        &self.segment
    }
}

impl Drop for SegmentGuard<'_> {
    fn drop(&mut self) {
        self.recorder.end_segment();
    }
}

/// The process-wide shared recorder.
///
/// Used as the layer's construction-time default; request-scoped operations
/// always receive the recorder as an explicit collaborator.
pub fn global_recorder() -> Arc<XRayRecorder> {
    static GLOBAL: LazyLock<Arc<XRayRecorder>> = LazyLock::new(|| Arc::new(XRayRecorder::new()));
    Arc::clone(&GLOBAL)
}

/// Generates an X-Ray trace id: `1-{epoch seconds}-{96 random bits}`, hex.
fn new_trace_id() -> String {
    let epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default();
    let random = rand::random::<u128>() & ((1u128 << 96) - 1);
    format!("1-{epoch:08x}-{random:024x}")
}

/// Generates a segment/subsegment id: 64 random bits, hex.
pub(crate) fn new_entity_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}
