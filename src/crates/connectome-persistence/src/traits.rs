//! [`FrameStore`] — the storage backend abstraction for frame history.
//!
//! The scheduler's `TransitionMaintainer` (Phase 4) writes one transition
//! per frame, periodically writes a snapshot, and seals completed frame
//! ranges into content-addressed buckets. `FrameStore` is the trait that
//! lets any backend (local filesystem, object storage, a database) serve
//! those writes and the corresponding reads for replay and time travel.
//!
//! Failures here are **external failures** per the core's error taxonomy:
//! callers log and move on, they never abort the frame that triggered the
//! write.

use async_trait::async_trait;

use crate::bucket::{BucketRef, FrameBucket};
use crate::error::Result;
use crate::manifest::Manifest;
use crate::snapshot::StateSnapshot;
use crate::transition::FrameTransition;

#[async_trait]
pub trait FrameStore: Send + Sync {
    /// Append (or overwrite, on replay) the transition for one frame.
    async fn write_transition(&self, branch: &str, transition: &FrameTransition) -> Result<()>;

    /// Load the transition for a single sequence number.
    async fn read_transition(&self, branch: &str, sequence: u64) -> Result<FrameTransition>;

    /// Write a full-state snapshot.
    async fn write_snapshot(&self, branch: &str, snapshot: &StateSnapshot) -> Result<()>;

    /// Load the most recent snapshot at or before `at_sequence`, if any.
    async fn latest_snapshot(&self, branch: &str, at_sequence: u64) -> Result<Option<StateSnapshot>>;

    /// Seal `frames` (raw transition JSON, in sequence order) into a
    /// content-addressed bucket and register it against `branch` in the
    /// manifest. Returns the resulting reference.
    async fn seal_bucket(&self, branch: &str, start_sequence: u64, frames: Vec<serde_json::Value>) -> Result<BucketRef>;

    /// Load the frames referenced by `refs`, in order, verifying each
    /// bucket's hash. Implementations should consult an LRU cache before
    /// hitting the backing store.
    async fn load_frames(&self, refs: &[BucketRef]) -> Result<Vec<serde_json::Value>>;

    /// Load a single bucket by its content hash.
    async fn load_bucket(&self, hash: &str) -> Result<FrameBucket>;

    /// Read the current manifest.
    async fn manifest(&self) -> Result<Manifest>;

    /// Persist an updated manifest.
    async fn write_manifest(&self, manifest: &Manifest) -> Result<()>;
}
