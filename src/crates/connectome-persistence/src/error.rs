//! Error types for the persistence layer.

use thiserror::Error;

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;

/// Errors that can occur while reading or writing durable frame history.
///
/// Per the core's error taxonomy, persistence failures are **external
/// failures**: they are logged and surfaced, but never abort the frame
/// scheduler that triggered them.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// No transition file exists for the requested sequence.
    #[error("transition not found: branch={branch} sequence={sequence}")]
    TransitionNotFound { branch: String, sequence: u64 },

    /// No snapshot exists at or before the requested sequence.
    #[error("snapshot not found: branch={branch} sequence={sequence}")]
    SnapshotNotFound { branch: String, sequence: u64 },

    /// A frame bucket referenced by hash could not be located.
    #[error("frame bucket not found: hash={0}")]
    BucketNotFound(String),

    /// A loaded bucket's recomputed hash did not match its reference.
    #[error("frame bucket hash mismatch: expected {expected}, computed {computed}")]
    BucketHashMismatch { expected: String, computed: String },

    /// The manifest file is missing or unreadable.
    #[error("manifest error: {0}")]
    Manifest(String),

    /// Requested branch is unknown to the manifest.
    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Underlying filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Storage backend reported a condition not covered above.
    #[error("storage error: {0}")]
    Storage(String),
}

impl PersistenceError {
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}
