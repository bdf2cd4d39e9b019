//! Periodic full-state snapshots (spec §4.7: `snapshots/<branch>/<seq>.json`).
//!
//! A snapshot is a fast-restore checkpoint of the entire VEIL state, taken
//! every `snapshot_interval` frames (default 100). It lets a restart skip
//! replaying the full transition log from sequence zero: load the nearest
//! snapshot at or before the target sequence, then replay only the
//! transitions after it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A full-state snapshot plus bookkeeping counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateSnapshot {
    /// The last frame sequence reflected in `state`.
    pub sequence: u64,
    pub timestamp: i64,
    /// Serialized VEIL state (facet map, streams, scopes, agents).
    pub state: Value,
    pub metadata: SnapshotMetadata,
}

/// Counters carried alongside a snapshot for observability and sanity
/// checks on restore (e.g. "does facet_count match what we replayed").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotMetadata {
    pub facet_count: usize,
    pub frame_count: u64,
    pub agent_count: usize,
}

impl StateSnapshot {
    pub fn new(sequence: u64, timestamp: i64, state: Value, metadata: SnapshotMetadata) -> Self {
        Self { sequence, timestamp, state, metadata }
    }
}
