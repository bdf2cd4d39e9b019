//! Content-addressed frame-bucket store (spec §4.7, §8 scenario 4).
//!
//! Frames are grouped into fixed-size buckets (default 100). Each bucket is
//! canonically serialized and named by the SHA-256 of its contents, so two
//! branches that share a prefix of history reference the very same
//! on-disk object — deduplication falls out of content addressing for
//! free, rather than needing an explicit "is this a duplicate" check.

use std::collections::VecDeque;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::canonical::content_hash;
use crate::error::{PersistenceError, Result};

/// A fully materialized bucket of consecutive frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameBucket {
    /// SHA-256 of the canonical JSON of `{start_sequence, end_sequence, frames}`.
    pub hash: String,
    pub start_sequence: u64,
    pub end_sequence: u64,
    pub frame_count: usize,
    pub frames: Vec<Value>,
}

/// The lightweight reference persisted inside a branch's frame index: just
/// enough to locate and validate a bucket without loading it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct BucketRef {
    pub hash: String,
    pub start_sequence: u64,
    pub end_sequence: u64,
    pub frame_count: usize,
}

impl From<&FrameBucket> for BucketRef {
    fn from(b: &FrameBucket) -> Self {
        Self {
            hash: b.hash.clone(),
            start_sequence: b.start_sequence,
            end_sequence: b.end_sequence,
            frame_count: b.frame_count,
        }
    }
}

/// Build a bucket from `frames` (each a serialized `FrameTransition`-shaped
/// value) and compute its content hash. The hash covers sequence bounds
/// plus frame contents so two buckets with identical frames but different
/// declared bounds never collide.
pub fn build_bucket(start_sequence: u64, frames: Vec<Value>) -> Result<FrameBucket> {
    let end_sequence = start_sequence + frames.len().saturating_sub(1) as u64;
    #[derive(Serialize)]
    struct Hashed<'a> {
        start_sequence: u64,
        end_sequence: u64,
        frames: &'a [Value],
    }
    let hash = content_hash(&Hashed { start_sequence, end_sequence, frames: &frames })?;
    Ok(FrameBucket { hash, start_sequence, end_sequence, frame_count: frames.len(), frames })
}

/// Path fan-out: `<hh>/<rest>` where `hh` is the hash's first two hex
/// characters, matching spec §4.7/§6's `frame-buckets/<hh>/<rest>.json`
/// storage layout (keeps any one directory from holding every bucket).
pub fn bucket_relative_path(hash: &str) -> (String, String) {
    let (hh, rest) = hash.split_at(2.min(hash.len()));
    (hh.to_string(), rest.to_string())
}

/// Small in-memory LRU over recently loaded buckets (default capacity 10,
/// per spec §4.7). Avoids re-reading and re-parsing hot buckets when
/// `loadFrames` is called repeatedly by the renderer or compression engine.
pub struct BucketCache {
    capacity: usize,
    inner: RwLock<LruInner>,
}

struct LruInner {
    order: VecDeque<String>,
    entries: std::collections::HashMap<String, Arc<FrameBucket>>,
}

impl BucketCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(LruInner { order: VecDeque::new(), entries: std::collections::HashMap::new() }),
        }
    }

    pub async fn get(&self, hash: &str) -> Option<Arc<FrameBucket>> {
        let mut inner = self.inner.write().await;
        if let Some(bucket) = inner.entries.get(hash).cloned() {
            inner.order.retain(|h| h != hash);
            inner.order.push_back(hash.to_string());
            Some(bucket)
        } else {
            None
        }
    }

    pub async fn put(&self, bucket: Arc<FrameBucket>) {
        let mut inner = self.inner.write().await;
        let hash = bucket.hash.clone();
        if inner.entries.contains_key(&hash) {
            inner.order.retain(|h| h != &hash);
        } else if inner.entries.len() >= self.capacity {
            if let Some(evict) = inner.order.pop_front() {
                inner.entries.remove(&evict);
            }
        }
        inner.order.push_back(hash.clone());
        inner.entries.insert(hash, bucket);
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }
}

/// Validate that a loaded bucket's recomputed hash matches its reference;
/// guards against silent corruption of on-disk bucket files.
pub fn verify_bucket(bucket: &FrameBucket) -> Result<()> {
    #[derive(Serialize)]
    struct Hashed<'a> {
        start_sequence: u64,
        end_sequence: u64,
        frames: &'a [Value],
    }
    let computed = content_hash(&Hashed {
        start_sequence: bucket.start_sequence,
        end_sequence: bucket.end_sequence,
        frames: &bucket.frames,
    })?;
    if computed != bucket.hash {
        return Err(PersistenceError::BucketHashMismatch { expected: bucket.hash.clone(), computed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_frame_sets_hash_identically() {
        let frames = vec![json!({"sequence": 0}), json!({"sequence": 1})];
        let a = build_bucket(0, frames.clone()).unwrap();
        let b = build_bucket(0, frames).unwrap();
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn bucket_bounds_are_derived_from_frame_count() {
        let frames: Vec<Value> = (0..100).map(|i| json!({"sequence": i})).collect();
        let bucket = build_bucket(0, frames).unwrap();
        assert_eq!(bucket.start_sequence, 0);
        assert_eq!(bucket.end_sequence, 99);
        assert_eq!(bucket.frame_count, 100);
    }

    #[tokio::test]
    async fn lru_evicts_oldest_entry_past_capacity() {
        let cache = BucketCache::new(2);
        let b1 = Arc::new(build_bucket(0, vec![json!(1)]).unwrap());
        let b2 = Arc::new(build_bucket(1, vec![json!(2)]).unwrap());
        let b3 = Arc::new(build_bucket(2, vec![json!(3)]).unwrap());
        cache.put(b1.clone()).await;
        cache.put(b2.clone()).await;
        cache.put(b3.clone()).await;
        assert_eq!(cache.len().await, 2);
        assert!(cache.get(&b1.hash).await.is_none());
        assert!(cache.get(&b2.hash).await.is_some());
        assert!(cache.get(&b3.hash).await.is_some());
    }

    #[test]
    fn hash_mismatch_is_detected() {
        let mut bucket = build_bucket(0, vec![json!(1)]).unwrap();
        bucket.frames.push(json!(2));
        assert!(verify_bucket(&bucket).is_err());
    }
}
