//! Filesystem-backed [`FrameStore`] implementing the storage layout of
//! spec §4.7 / §6:
//!
//! ```text
//! <root>/manifest.json
//! <root>/transitions/<branch>/<seq>.json
//! <root>/snapshots/<branch>/<seq>.json
//! <root>/frame-buckets/<hh>/<rest>.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;

use crate::bucket::{build_bucket, bucket_relative_path, verify_bucket, BucketCache, BucketRef, FrameBucket};
use crate::canonical::canonical_bytes;
use crate::error::{PersistenceError, Result};
use crate::manifest::Manifest;
use crate::snapshot::StateSnapshot;
use crate::traits::FrameStore;
use crate::transition::FrameTransition;

pub struct FileFrameStore {
    root: PathBuf,
    cache: BucketCache,
}

impl FileFrameStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_cache_capacity(root, 10)
    }

    pub fn with_cache_capacity(root: impl Into<PathBuf>, cache_capacity: usize) -> Self {
        Self { root: root.into(), cache: BucketCache::new(cache_capacity) }
    }

    fn manifest_path(&self) -> PathBuf {
        self.root.join("manifest.json")
    }

    fn transition_path(&self, branch: &str, sequence: u64) -> PathBuf {
        self.root.join("transitions").join(branch).join(format!("{sequence}.json"))
    }

    fn snapshot_path(&self, branch: &str, sequence: u64) -> PathBuf {
        self.root.join("snapshots").join(branch).join(format!("{sequence}.json"))
    }

    fn bucket_path(&self, hash: &str) -> PathBuf {
        let (hh, rest) = bucket_relative_path(hash);
        self.root.join("frame-buckets").join(hh).join(format!("{rest}.json"))
    }

    async fn write_json(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| PersistenceError::io(parent.display().to_string(), e))?;
        }
        fs::write(path, bytes).await.map_err(|e| PersistenceError::io(path.display().to_string(), e))
    }

    async fn read_json<T: for<'de> serde::Deserialize<'de>>(&self, path: &Path) -> Result<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(path.display().to_string(), e)),
        }
    }

    async fn snapshot_sequences(&self, branch: &str) -> Result<Vec<u64>> {
        let dir = self.root.join("snapshots").join(branch);
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(PersistenceError::io(dir.display().to_string(), e)),
        };
        while let Some(entry) = entries.next_entry().await.map_err(|e| PersistenceError::io(dir.display().to_string(), e))? {
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Ok(seq) = stem.parse::<u64>() {
                    out.push(seq);
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}

#[async_trait]
impl FrameStore for FileFrameStore {
    async fn write_transition(&self, branch: &str, transition: &FrameTransition) -> Result<()> {
        let bytes = canonical_bytes(transition)?;
        self.write_json(&self.transition_path(branch, transition.sequence), &bytes).await
    }

    async fn read_transition(&self, branch: &str, sequence: u64) -> Result<FrameTransition> {
        self.read_json(&self.transition_path(branch, sequence))
            .await?
            .ok_or_else(|| PersistenceError::TransitionNotFound { branch: branch.to_string(), sequence })
    }

    async fn write_snapshot(&self, branch: &str, snapshot: &StateSnapshot) -> Result<()> {
        let bytes = canonical_bytes(snapshot)?;
        self.write_json(&self.snapshot_path(branch, snapshot.sequence), &bytes).await
    }

    async fn latest_snapshot(&self, branch: &str, at_sequence: u64) -> Result<Option<StateSnapshot>> {
        let sequences = self.snapshot_sequences(branch).await?;
        let Some(target) = sequences.into_iter().filter(|s| *s <= at_sequence).max() else {
            return Ok(None);
        };
        self.read_json(&self.snapshot_path(branch, target)).await
    }

    async fn seal_bucket(&self, branch: &str, start_sequence: u64, frames: Vec<Value>) -> Result<BucketRef> {
        let bucket = build_bucket(start_sequence, frames)?;
        let path = self.bucket_path(&bucket.hash);
        if fs::metadata(&path).await.is_err() {
            let bytes = canonical_bytes(&bucket)?;
            self.write_json(&path, &bytes).await?;
        }
        let bucket_ref = BucketRef::from(&bucket);
        self.cache.put(std::sync::Arc::new(bucket)).await;

        let mut manifest = self.manifest().await.unwrap_or_default();
        manifest.branch_mut(branch).buckets.push(bucket_ref.clone());
        self.write_manifest(&manifest).await?;
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
        let bucket: FrameBucket = self
            .read_json(&self.bucket_path(hash))
            .await?
            .ok_or_else(|| PersistenceError::BucketNotFound(hash.to_string()))?;
        verify_bucket(&bucket)?;
        self.cache.put(std::sync::Arc::new(bucket.clone())).await;
        Ok(bucket)
    }

    async fn manifest(&self) -> Result<Manifest> {
        Ok(self.read_json(&self.manifest_path()).await?.unwrap_or_default())
    }

    async fn write_manifest(&self, manifest: &Manifest) -> Result<()> {
        let bytes = canonical_bytes(manifest)?;
        self.write_json(&self.manifest_path(), &bytes).await
    }
}
