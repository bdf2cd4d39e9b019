//! In-memory [`FrameStore`] — reference implementation used in tests and
//! for spaces that run with `persistence.enabled = false` but still want a
//! uniform storage interface to query.
//!
//! Ephemeral: nothing survives process restart. Fast, thread-safe via
//! `tokio::sync::RwLock`, no external dependencies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::bucket::{build_bucket, verify_bucket, BucketCache, BucketRef, FrameBucket};
use crate::error::{PersistenceError, Result};
use crate::manifest::Manifest;
use crate::snapshot::StateSnapshot;
use crate::traits::FrameStore;
use crate::transition::FrameTransition;

#[derive(Default)]
struct BranchData {
    transitions: HashMap<u64, FrameTransition>,
    snapshots: Vec<StateSnapshot>,
}

/// In-memory frame store. `cache_capacity` controls the bucket LRU, same
/// knob a filesystem-backed store would expose.
pub struct InMemoryFrameStore {
    branches: RwLock<HashMap<String, BranchData>>,
    buckets: RwLock<HashMap<String, Arc<FrameBucket>>>,
    cache: BucketCache,
    manifest: RwLock<Manifest>,
}

impl InMemoryFrameStore {
    pub fn new() -> Self {
        Self::with_cache_capacity(10)
    }

    pub fn with_cache_capacity(cache_capacity: usize) -> Self {
        Self {
            branches: RwLock::new(HashMap::new()),
            buckets: RwLock::new(HashMap::new()),
            cache: BucketCache::new(cache_capacity),
            manifest: RwLock::new(Manifest::new()),
        }
    }

    pub async fn clear(&self) {
        self.branches.write().await.clear();
        self.buckets.write().await.clear();
        *self.manifest.write().await = Manifest::new();
    }

    /// Number of distinct bucket objects physically stored — used by
    /// tests asserting deduplication (spec §8 scenario 4).
    pub async fn object_count(&self) -> usize {
        self.buckets.read().await.len()
    }
}

impl Default for InMemoryFrameStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FrameStore for InMemoryFrameStore {
    async fn write_transition(&self, branch: &str, transition: &FrameTransition) -> Result<()> {
        let mut branches = self.branches.write().await;
        branches.entry(branch.to_string()).or_default().transitions.insert(transition.sequence, transition.clone());
        Ok(())
    }

    async fn read_transition(&self, branch: &str, sequence: u64) -> Result<FrameTransition> {
        let branches = self.branches.read().await;
        branches
            .get(branch)
            .and_then(|b| b.transitions.get(&sequence))
            .cloned()
            .ok_or_else(|| PersistenceError::TransitionNotFound { branch: branch.to_string(), sequence })
    }

    async fn write_snapshot(&self, branch: &str, snapshot: &StateSnapshot) -> Result<()> {
        let mut branches = self.branches.write().await;
        let data = branches.entry(branch.to_string()).or_default();
        data.snapshots.retain(|s| s.sequence != snapshot.sequence);
        data.snapshots.push(snapshot.clone());
        data.snapshots.sort_by_key(|s| s.sequence);
        Ok(())
    }

    async fn latest_snapshot(&self, branch: &str, at_sequence: u64) -> Result<Option<StateSnapshot>> {
        let branches = self.branches.read().await;
        Ok(branches
            .get(branch)
            .and_then(|b| b.snapshots.iter().rev().find(|s| s.sequence <= at_sequence))
            .cloned())
    }

    async fn seal_bucket(&self, branch: &str, start_sequence: u64, frames: Vec<Value>) -> Result<BucketRef> {
        let bucket = build_bucket(start_sequence, frames)?;
        let arc = Arc::new(bucket);
        self.buckets.write().await.entry(arc.hash.clone()).or_insert_with(|| arc.clone());
        self.cache.put(arc.clone()).await;
        let bucket_ref = BucketRef::from(arc.as_ref());
        let mut manifest = self.manifest.write().await;
        manifest.branch_mut(branch).buckets.push(bucket_ref.clone());
        Ok(bucket_ref)
    }

    async fn load_frames(&self, refs: &[BucketRef]) -> Result<Vec<Value>> {
        let mut out = Vec::new();
        for r in refs {
            out.extend(self.load_bucket(&r.hash).await?.frames);
        }
        Ok(out)
    }

    async fn load_bucket(&self, hash: &str) -> Result<FrameBucket> {
        if let Some(cached) = self.cache.get(hash).await {
            return Ok((*cached).clone());
        }
        let buckets = self.buckets.read().await;
        let bucket = buckets.get(hash).cloned().ok_or_else(|| PersistenceError::BucketNotFound(hash.to_string()))?;
        verify_bucket(&bucket)?;
        drop(buckets);
        self.cache.put(bucket.clone()).await;
        Ok((*bucket).clone())
    }

    async fn manifest(&self) -> Result<Manifest> {
        Ok(self.manifest.read().await.clone())
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        *self.manifest.write().await = manifest.clone();
        Ok(())
    }
}
