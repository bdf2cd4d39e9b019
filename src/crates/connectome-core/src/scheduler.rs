//! The frame scheduler (§4.1): [`Space`] drives the four-phase pipeline —
//! Modulation, Reception, Transformation, Effectuation, followed by
//! Maintenance — over one registered [`ComponentRegistry`] and
//! [`VeilState`], sealing exactly one [`Frame`] per call to
//! [`Space::run_frame`].
//!
//! Two non-obvious design choices carry weight here (§9, §7):
//!
//! - Phase 2 runs to a fixed point (new `state-change`/`continuation`
//!   facets may unlock another pass) bounded by
//!   `transform_fixed_point_limit`; a required Transform's failure, or
//!   non-convergence within the limit, rolls the whole phase back via
//!   [`VeilState::checkpoint`]/`restore` and aborts the frame, but the
//!   sequence counter still advances so the failure is visible in history
//!   (advance-on-abort, the default policy per §7).
//! - Persistence writes are a scheduler-internal step after the generic
//!   [`crate::component::Maintainer`]s run, rather than a `Maintainer`
//!   itself: a `Maintainer` only sees [`ReadonlyView`] (facets), but a
//!   [`connectome_persistence::StateSnapshot`] needs the scheduler's own
//!   bookkeeping (branch, bucket boundaries) that no component should have
//!   to carry.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use connectome_persistence::{BranchMetadata, FrameStore, SnapshotMetadata, StateSnapshot, DEFAULT_BRANCH};
use serde_json::Value;

use crate::clock::Clock;
use crate::component::{ComponentRegistry, ExternalAction, MaintainerOutcome};
use crate::config::SpaceConfig;
use crate::debug::{DebugObserver, ObserverList};
use crate::delta::Delta;
use crate::error::{Result, SpaceError};
use crate::event::SpaceEvent;
use crate::facet::FacetKind;
use crate::frame::Frame;
use crate::renderer::{self, RenderOptions};
use crate::snapshot::{FrameSnapshot, RenderedChunk};
use crate::veil::{ReadonlyView, VeilState};

/// Shared, thread-safe window onto sealed frame history, handed to
/// Transforms (the renderer-consuming [`crate::agent::ContextTransform`],
/// the [`crate::compression::CompressionTransform`]) at construction time
/// so they can read history without borrowing [`VeilState`] directly.
#[derive(Default)]
pub struct FrameHistoryHandle {
    frames: RwLock<Vec<Frame>>,
}

impl FrameHistoryHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, frame: Frame) {
        self.frames.write().unwrap().push(frame);
    }

    pub fn snapshot(&self) -> Vec<Frame> {
        self.frames.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

/// Captures how a single frame renders in isolation, for attachment via
/// [`Frame::attach_snapshot`] at the end of Phase 2 (§4.5). Reuses the
/// public renderer entry point rather than reaching into its internals:
/// an empty [`ReadonlyView`] means ambients from current state are not
/// folded in, since a per-frame snapshot is this frame's own content only.
fn capture_frame_snapshot(frame: &Frame) -> FrameSnapshot {
    let empty_state = ReadonlyView::default();
    let rendered = renderer::render(std::slice::from_ref(frame), &empty_state, None, &RenderOptions::default());
    if rendered.messages.is_empty() {
        return FrameSnapshot::empty("system", frame.timestamp);
    }
    let change_ids: Vec<String> = frame.change_set().all_ids().map(String::from).collect();
    let chunks: Vec<RenderedChunk> = rendered
        .messages
        .iter()
        .map(|m| RenderedChunk {
            content: m.content.clone(),
            tokens: estimate_tokens(&m.content),
            facet_ids: change_ids.clone(),
            chunk_type: None,
            role: Some(m.role.clone()),
        })
        .collect();
    let role = rendered.messages[0].role.clone();
    FrameSnapshot::new(chunks, role, frame.timestamp)
}

/// The four-phase frame scheduler (§4.1). Owns the authoritative
/// [`VeilState`], the registered [`ComponentRegistry`], the pending event
/// queue, and (optionally) a [`FrameStore`] for durable history.
pub struct Space {
    veil: VeilState,
    registry: ComponentRegistry,
    history: Arc<FrameHistoryHandle>,
    clock: Arc<dyn Clock>,
    config: SpaceConfig,
    events: VecDeque<SpaceEvent>,
    observer: ObserverList,
    store: Option<Arc<dyn FrameStore>>,
    branch: String,
    frames_since_snapshot: u64,
    last_error: Option<SpaceError>,
    pending_actions: Vec<ExternalAction>,
}

impl Space {
    /// Builds a space, resolving the Transform constraint order eagerly so
    /// a cycle or missing provider is fatal here rather than at first
    /// frame (§4.3). `history` should be the same handle passed to any
    /// Transforms registered on `registry` that need frame history.
    pub fn new(
        mut registry: ComponentRegistry,
        history: Arc<FrameHistoryHandle>,
        clock: Arc<dyn Clock>,
        config: SpaceConfig,
        store: Option<Arc<dyn FrameStore>>,
    ) -> Result<Self> {
        registry.resolve_transform_order()?;
        Ok(Self {
            veil: VeilState::new(),
            registry,
            history,
            clock,
            config,
            events: VecDeque::new(),
            observer: ObserverList::new(),
            store,
            branch: DEFAULT_BRANCH.to_string(),
            frames_since_snapshot: 0,
            last_error: None,
            pending_actions: Vec::new(),
        })
    }

    pub fn with_observer(mut self, observer: Box<dyn DebugObserver>) -> Self {
        self.observer.push(observer);
        self
    }

    pub fn enqueue(&mut self, event: SpaceEvent) {
        self.events.push_back(event);
    }

    pub fn veil(&self) -> &VeilState {
        &self.veil
    }

    pub fn readonly(&self) -> ReadonlyView {
        self.veil.readonly()
    }

    pub fn history_handle(&self) -> Arc<FrameHistoryHandle> {
        self.history.clone()
    }

    pub fn last_frame_error(&self) -> Option<&SpaceError> {
        self.last_error.as_ref()
    }

    /// External side effects ([`ExternalAction`]s) forwarded by Effectors
    /// during the last [`Self::run_frame`] call, drained on read.
    pub fn take_pending_actions(&mut self) -> Vec<ExternalAction> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Runs exactly one frame through all five phases and returns the
    /// sealed result. Safe to call with an empty event queue — an empty
    /// frame is still a valid, recorded frame (§3).
    pub async fn run_frame(&mut self) -> Result<Frame> {
        let next_seq = self.veil.current_sequence() + 1;
        self.veil.sweep_ephemeral(next_seq);
        let timestamp = self.clock.now_millis();

        // Phase 0: Modulation.
        let mut events: Vec<SpaceEvent> = self.events.drain(..).collect();
        for modulator in &mut self.registry.modulators {
            events = modulator.modulate(events);
        }
        self.observer.on_frame_start(next_seq, events.len());

        // Phase 1: Reception.
        let mut phase1_deltas = Vec::new();
        {
            let view = self.veil.readonly();
            for event in &events {
                self.observer.on_frame_event(next_seq, event);
                for receptor in &self.registry.receptors {
                    if !event.matches_topic(receptor.topics()) {
                        continue;
                    }
                    match receptor.receive(event, &view) {
                        Ok(deltas) => phase1_deltas.extend(deltas),
                        Err(e) => tracing::warn!(receptor = receptor.name(), error = %e, "receptor failed, isolating"),
                    }
                }
            }
        }
        let outcome = self.veil.apply_deltas(&phase1_deltas, next_seq);
        for diag in &outcome.diagnostics {
            tracing::warn!(error = %diag, "phase 1 delta dropped");
        }

        // Phase 2: Transformation, run to a fixed point.
        let checkpoint = self.veil.checkpoint();
        let mut phase2_deltas = Vec::new();
        let mut abort: Option<SpaceError> = None;
        let mut pass = 0u32;
        loop {
            pass += 1;
            let view = self.veil.readonly();
            let mut pass_deltas = Vec::new();
            let mut required_failure = None;
            for transform in self.registry.transforms_in_order() {
                match transform.transform(&view) {
                    Ok(deltas) => pass_deltas.extend(deltas),
                    Err(e) => {
                        if transform.is_required() {
                            required_failure = Some((transform.name().to_string(), e));
                            break;
                        }
                        tracing::warn!(transform = transform.name(), error = %e, "optional transform failed, isolating");
                    }
                }
            }
            if let Some((name, e)) = required_failure {
                abort = Some(SpaceError::FrameAborted { sequence: next_seq, transform: name, reason: e.to_string() });
                break;
            }
            if pass_deltas.is_empty() {
                break;
            }
            let pass_outcome = self.veil.apply_deltas(&pass_deltas, next_seq);
            for diag in &pass_outcome.diagnostics {
                tracing::warn!(error = %diag, "phase 2 delta dropped");
            }
            phase2_deltas.extend(pass_deltas);
            if pass >= self.config.scheduler.transform_fixed_point_limit {
                abort = Some(SpaceError::InvariantViolation(format!(
                    "transform fixed-point did not converge within {} passes",
                    self.config.scheduler.transform_fixed_point_limit
                )));
                break;
            }
        }

        let mut all_deltas = phase1_deltas;
        if let Some(err) = abort {
            tracing::error!(error = %err, sequence = next_seq, "phase 2 aborted; rolling back transform deltas");
            self.veil.restore(checkpoint);
            self.last_error = Some(err);
        } else {
            all_deltas.extend(phase2_deltas);
            self.last_error = None;
        }

        let mut frame = Frame::new(next_seq, timestamp, events, all_deltas);
        let frame_snapshot = capture_frame_snapshot(&frame);
        frame.attach_snapshot(frame_snapshot.clone());

        {
            let view = self.veil.readonly();
            for id in frame.change_set().added {
                if let Some(facet) = view.get(&id) {
                    if let FacetKind::RenderedContext { activation_id, .. } = &facet.kind {
                        self.observer.on_rendered_context(activation_id, &frame_snapshot);
                    }
                }
            }
        }

        // Phase 3: Effectuation.
        let change_set = frame.change_set();
        let soft_deadline = Duration::from_millis(self.config.scheduler.phase3_soft_deadline_ms);
        let pending_actions_before = self.pending_actions.len();
        let mut next_frame_events = Vec::new();
        {
            let view = self.veil.readonly();
            let matched_per_effector: Vec<Vec<&crate::facet::Facet>> = self
                .registry
                .effectors
                .iter()
                .map(|effector| {
                    let filters = effector.facet_filters();
                    change_set
                        .added
                        .iter()
                        .chain(change_set.changed.iter())
                        .filter_map(|id| view.get(id))
                        .filter(|f| filters.iter().any(|flt| flt.matches(f)))
                        .collect()
                })
                .collect();

            let mut tasks = Vec::new();
            for (effector, matched) in self.registry.effectors.iter_mut().zip(matched_per_effector) {
                let name = effector.name().to_string();
                let view_ref = &view;
                tasks.push(async move {
                    let outcome = tokio::time::timeout(soft_deadline, effector.effect(&matched, view_ref)).await;
                    (name, outcome)
                });
            }
            let outcomes = futures::future::join_all(tasks).await;
            for (name, outcome) in outcomes {
                match outcome {
                    Ok(Ok(result)) => {
                        next_frame_events.extend(result.events);
                        self.pending_actions.extend(result.external_actions);
                    }
                    Ok(Err(e)) => tracing::warn!(effector = %name, error = %e, "effector failed, isolating"),
                    Err(_) => {
                        tracing::warn!(effector = %name, deadline_ms = self.config.scheduler.phase3_soft_deadline_ms, "effector exceeded soft deadline");
                        self.pending_actions.push(ExternalAction::failed(
                            name.clone(),
                            SpaceError::EffectorTimeout(name, self.config.scheduler.phase3_soft_deadline_ms).to_string(),
                        ));
                    }
                }
            }
        }

        // Phase 4: Maintenance. Restricted to infrastructure deltas.
        let mut maintenance_events = Vec::new();
        {
            let view = self.veil.readonly();
            for maintainer in &mut self.registry.maintainers {
                match maintainer.maintain(&frame, &change_set, &view).await {
                    Ok(MaintainerOutcome { deltas, events }) => {
                        let outcome = self.veil.apply_deltas(&deltas, next_seq);
                        for diag in &outcome.diagnostics {
                            tracing::warn!(error = %diag, "phase 4 delta dropped");
                        }
                        maintenance_events.extend(events);
                    }
                    Err(e) => tracing::warn!(maintainer = maintainer.name(), error = %e, "maintainer failed, isolating"),
                }
            }
        }
        next_frame_events.extend(maintenance_events);

        frame.seal_transition();
        self.veil.record_frame(frame.clone())?;
        self.history.push(frame.clone());
        self.observer.on_frame_complete(&frame);
        if self.pending_actions.len() > pending_actions_before {
            self.observer.on_outgoing_frame(&frame);
        }

        if let Some(store) = self.store.clone() {
            self.persist_frame(&store, &frame).await;
        }

        for event in next_frame_events {
            self.events.push_back(event);
        }

        Ok(frame)
    }

    /// Writes this frame's transition, periodically a full-state snapshot,
    /// and periodically seals a content-addressed bucket (§4.7). All
    /// failures here are external failures: logged, never propagated back
    /// into frame processing.
    async fn persist_frame(&mut self, store: &Arc<dyn FrameStore>, frame: &Frame) {
        let Some(transition) = frame.transition.as_ref() else { return };
        if let Err(e) = store.write_transition(&self.branch, transition).await {
            tracing::warn!(error = %e, sequence = frame.sequence, "failed to write frame transition");
        }

        self.frames_since_snapshot += 1;
        if self.frames_since_snapshot >= self.config.persistence.snapshot_interval {
            self.frames_since_snapshot = 0;
            let view = self.veil.readonly();
            let facets: std::collections::HashMap<String, Value> =
                view.iter().map(|f| (f.id.clone(), serde_json::to_value(f).unwrap_or(Value::Null))).collect();
            let metadata = SnapshotMetadata { facet_count: view.len(), frame_count: frame.sequence, agent_count: 0 };
            let snapshot = StateSnapshot::new(frame.sequence, frame.timestamp, Value::Object(facets.into_iter().collect()), metadata);
            if let Err(e) = store.write_snapshot(&self.branch, &snapshot).await {
                tracing::warn!(error = %e, sequence = frame.sequence, "failed to write state snapshot");
            }
        }

        let bucket_size = self.config.persistence.bucket_size.max(1);
        if frame.sequence % bucket_size == 0 {
            let start = frame.sequence + 1 - bucket_size;
            let frames = self.history.snapshot();
            let bucket_frames: Vec<Value> = frames
                .iter()
                .filter(|f| f.sequence >= start && f.sequence <= frame.sequence)
                .filter_map(|f| f.transition.as_ref())
                .filter_map(|t| serde_json::to_value(t).ok())
                .collect();
            match store.seal_bucket(&self.branch, start, bucket_frames).await {
                Ok(_bucket_ref) => match store.manifest().await {
                    Ok(mut manifest) => {
                        let branch_meta: &mut BranchMetadata = manifest.branch_mut(&self.branch);
                        branch_meta.head_sequence = Some(frame.sequence);
                        if let Err(e) = store.write_manifest(&manifest).await {
                            tracing::warn!(error = %e, "failed to write manifest after sealing bucket");
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "failed to load manifest after sealing bucket"),
                },
                Err(e) => tracing::warn!(error = %e, sequence = frame.sequence, "failed to seal frame bucket"),
            }
        }
    }
}
