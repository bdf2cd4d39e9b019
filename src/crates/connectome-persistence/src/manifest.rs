//! `storage/manifest.json` — tracks the current branch and per-branch
//! metadata so the host can support branching for time-travel debugging
//! (spec §4.7).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bucket::BucketRef;

pub const DEFAULT_BRANCH: &str = "main";

/// Per-branch bookkeeping: the highest sealed sequence, the sealed frame
/// buckets in order, and the sequence of the most recent snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct BranchMetadata {
    pub head_sequence: Option<u64>,
    pub buckets: Vec<BucketRef>,
    pub last_snapshot_sequence: Option<u64>,
    /// Branch this one was forked from, and at what sequence, if any.
    pub forked_from: Option<(String, u64)>,
}

/// The durable manifest: which branch is active, and each branch's state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Manifest {
    pub current_branch: String,
    pub branches: HashMap<String, BranchMetadata>,
}

impl Default for Manifest {
    fn default() -> Self {
        let mut branches = HashMap::new();
        branches.insert(DEFAULT_BRANCH.to_string(), BranchMetadata::default());
        Self { current_branch: DEFAULT_BRANCH.to_string(), branches }
    }
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn branch_mut(&mut self, branch: &str) -> &mut BranchMetadata {
        self.branches.entry(branch.to_string()).or_default()
    }

    pub fn branch(&self, branch: &str) -> Option<&BranchMetadata> {
        self.branches.get(branch)
    }

    /// Fork `from` into a new branch `name` at `at_sequence`, copying the
    /// bucket/snapshot lineage up to that point so the new branch can
    /// resolve history without re-fetching shared buckets.
    pub fn fork(&mut self, from: &str, name: &str, at_sequence: u64) {
        let parent = self.branches.get(from).cloned().unwrap_or_default();
        let mut child = BranchMetadata {
            head_sequence: Some(at_sequence),
            buckets: parent
                .buckets
                .into_iter()
                .filter(|b| b.start_sequence <= at_sequence)
                .collect(),
            last_snapshot_sequence: parent.last_snapshot_sequence.filter(|s| *s <= at_sequence),
            forked_from: Some((from.to_string(), at_sequence)),
        };
        if let Some(last) = &mut child.last_snapshot_sequence {
            if *last > at_sequence {
                *last = at_sequence;
            }
        }
        self.branches.insert(name.to_string(), child);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forked_branch_shares_bucket_refs_within_bound() {
        let mut manifest = Manifest::new();
        manifest.branch_mut(DEFAULT_BRANCH).buckets.push(BucketRef {
            hash: "abc".into(),
            start_sequence: 0,
            end_sequence: 99,
            frame_count: 100,
        });
        manifest.fork(DEFAULT_BRANCH, "debug-1", 50);
        let child = manifest.branch("debug-1").unwrap();
        assert_eq!(child.buckets.len(), 1);
        assert_eq!(child.buckets[0].hash, "abc");
        assert_eq!(child.forked_from, Some((DEFAULT_BRANCH.to_string(), 50)));
    }
}
