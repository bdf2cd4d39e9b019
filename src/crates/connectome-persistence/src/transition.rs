//! Per-frame transition records — the unit written to
//! `transitions/<branch>/<seq>.json` (spec §4.7, §6).
//!
//! The persistence crate deliberately stays opaque to `connectome-core`'s
//! `Facet`/`Delta` types: frames, events, and deltas cross the boundary as
//! `serde_json::Value`, the same way the teacher's checkpoint crate stores
//! channel values as JSON rather than importing the graph crate's node
//! types. That keeps the dependency edge one-directional (core depends on
//! persistence, never the reverse).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The durable record of one scheduler frame.
///
/// Mirrors the wire format in spec §6: `{sequence, timestamp, events,
/// deltas, transition, renderedSnapshot}`. `element_ops` records
/// infrastructure bookkeeping emitted by Phase 4 Maintainers (element-tree
/// creation/removal), kept separate from VEIL deltas since they are not
/// part of the facet model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameTransition {
    pub sequence: u64,
    pub timestamp: i64,
    #[serde(default)]
    pub events: Vec<Value>,
    #[serde(default)]
    pub deltas: Vec<Value>,
    #[serde(default)]
    pub element_ops: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_snapshot: Option<Value>,
}

impl FrameTransition {
    pub fn new(sequence: u64, timestamp: i64) -> Self {
        Self {
            sequence,
            timestamp,
            events: Vec::new(),
            deltas: Vec::new(),
            element_ops: Vec::new(),
            rendered_snapshot: None,
        }
    }
}
