//! The [`Frame`]: the atomic unit of scheduling and history (§3, §4.1).
//!
//! A frame is immutable once sealed, except for attaching a
//! [`crate::snapshot::FrameSnapshot`] (§4.5, done in-place at end of Phase 2)
//! and for populating its `transition` record (done by the
//! `TransitionMaintainer` in Phase 4, §4.7).

use crate::delta::Delta;
use crate::event::SpaceEvent;
use crate::snapshot::FrameSnapshot;
use connectome_persistence::FrameTransition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub sequence: u64,
    pub timestamp: i64,
    pub events: Vec<SpaceEvent>,
    pub deltas: Vec<Delta>,
    #[serde(default)]
    pub element_ops: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub transition: Option<FrameTransition>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub rendered_snapshot: Option<FrameSnapshot>,
}

impl Frame {
    pub fn new(sequence: u64, timestamp: i64, events: Vec<SpaceEvent>, deltas: Vec<Delta>) -> Self {
        Self { sequence, timestamp, events, deltas, element_ops: Vec::new(), transition: None, rendered_snapshot: None }
    }

    /// Attaches the frame-tracking HUD's per-frame rendering, captured at
    /// end of Phase 2 before later frames can rewrite this one's view of
    /// state (§4.5). Idempotent by design: the scheduler calls this exactly
    /// once per frame but later replay may recompute and overwrite it.
    pub fn attach_snapshot(&mut self, snapshot: FrameSnapshot) {
        self.rendered_snapshot = Some(snapshot);
    }

    /// Builds and attaches the persistence-layer transition record from
    /// this frame's own events/deltas/element_ops. Called by the
    /// `TransitionMaintainer` in Phase 4.
    pub fn seal_transition(&mut self) -> &FrameTransition {
        let events = self.events.iter().map(|e| serde_json::to_value(e).expect("SpaceEvent always serializes")).collect();
        let deltas = self.deltas.iter().map(|d| serde_json::to_value(d).expect("Delta always serializes")).collect();
        let rendered_snapshot = self.rendered_snapshot.as_ref().map(|s| serde_json::to_value(s).expect("FrameSnapshot always serializes"));
        let mut transition = FrameTransition::new(self.sequence, self.timestamp);
        transition.events = events;
        transition.deltas = deltas;
        transition.element_ops = self.element_ops.clone();
        transition.rendered_snapshot = rendered_snapshot;
        self.transition = Some(transition);
        self.transition.as_ref().unwrap()
    }

    /// Diff of facet ids added, changed (rewritten), and removed by this
    /// frame's deltas, relative to the state the frame started with.
    /// Effectors in Phase 3 are invoked against this change set (§4.1).
    pub fn change_set(&self) -> FrameChangeSet {
        let mut added = Vec::new();
        let mut changed = Vec::new();
        let mut removed = Vec::new();
        for delta in &self.deltas {
            match delta {
                Delta::AddFacet { facet } => added.push(facet.id.clone()),
                Delta::RewriteFacet { id, .. } => changed.push(id.clone()),
                Delta::RemoveFacet { id } => removed.push(id.clone()),
            }
        }
        FrameChangeSet { added, changed, removed }
    }
}

/// The set of facet ids added, changed, or removed within one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameChangeSet {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl FrameChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }

    pub fn all_ids(&self) -> impl Iterator<Item = &str> {
        self.added.iter().chain(self.changed.iter()).chain(self.removed.iter()).map(String::as_str)
    }
}
