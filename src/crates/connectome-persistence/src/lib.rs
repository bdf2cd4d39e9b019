//! # connectome-persistence — durable frame history
//!
//! This crate owns the append-only, content-addressed storage layer
//! described in spec §4.7: per-frame transitions, periodic full-state
//! snapshots, and a deduplicating frame-bucket store, all reachable
//! through the branch-aware [`FrameStore`] trait.
//!
//! It deliberately knows nothing about `connectome-core`'s `Facet`/`Delta`
//! types — frames, events, and deltas cross this boundary as
//! `serde_json::Value`. That keeps the dependency edge one-directional
//! (core depends on this crate, never the reverse) the same way the
//! teacher stack's checkpoint crate stores channel values as JSON rather
//! than importing the graph crate's node types.
//!
//! ## Layout
//!
//! - [`transition`] — per-frame `FrameTransition` records
//! - [`snapshot`] — periodic `StateSnapshot` records
//! - [`bucket`] — content-addressed `FrameBucket`s and their LRU cache
//! - [`manifest`] — branch tracking for time-travel debugging
//! - [`canonical`] — canonical JSON + SHA-256 hashing used for addressing
//! - [`traits`] — the [`FrameStore`] backend trait
//! - [`memory`] / [`filesystem`] — in-memory and on-disk implementations

pub mod bucket;
pub mod canonical;
pub mod error;
pub mod filesystem;
pub mod manifest;
pub mod memory;
pub mod snapshot;
pub mod traits;
pub mod transition;

pub use bucket::{build_bucket, verify_bucket, BucketCache, BucketRef, FrameBucket};
pub use error::{PersistenceError, Result};
pub use filesystem::FileFrameStore;
pub use manifest::{BranchMetadata, Manifest, DEFAULT_BRANCH};
pub use memory::InMemoryFrameStore;
pub use snapshot::{SnapshotMetadata, StateSnapshot};
pub use traits::FrameStore;
pub use transition::FrameTransition;
