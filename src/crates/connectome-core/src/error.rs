//! Error types for the frame-processing core.
//!
//! [`SpaceError`] follows the failure taxonomy of §7: validation errors are
//! recoverable and drop the offending operation, component errors isolate to
//! the component that raised them, structural errors are fatal at startup,
//! and invariant violations push the space into a safe mode that halts new
//! event intake while keeping the last good state observable.
//!
//! ```text
//! SpaceError
//! ├── Validation          - bad delta, unknown facet id, malformed event
//! ├── Component           - Receptor/Effector/Maintainer isolated failure
//! ├── Structural          - Transform cycle, missing provider (fatal)
//! ├── FrameAborted        - required-transform failure, deltas rolled back
//! ├── External            - LLM timeout, persistence I/O error
//! ├── InvariantViolation  - sequence gap, duplicate id after conflict (bug)
//! ├── Persistence         - wraps connectome_persistence::PersistenceError
//! ├── Serialization       - wraps serde_json::Error
//! ├── Io                  - wraps std::io::Error
//! └── Configuration       - bad SpaceConfig value
//! ```

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SpaceError>;

#[derive(Debug, Error)]
pub enum SpaceError {
    /// A delta or event failed validation. Recoverable: the operation is
    /// dropped and a diagnostic event is enqueued for the next frame.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A rewrite or remove delta referenced a facet id that does not exist
    /// in the live state.
    #[error("unknown facet id '{0}' in rewrite/remove delta")]
    UnknownFacetId(String),

    /// Re-adding a facet id whose existing facet is not structurally equal
    /// to the new one.
    #[error("facet id '{0}' already exists with different content")]
    FacetConflict(String),

    /// A Receptor, Effector, or Maintainer raised an error. Isolated to the
    /// offending component's contribution; does not abort the frame.
    #[error("component '{component}' ({role}) failed: {message}")]
    Component { component: String, role: &'static str, message: String },

    /// A Transform dependency cycle or an unresolved `requires` capability.
    /// Fatal at startup — the space cannot be constructed.
    #[error("component constraint error: {0}")]
    Structural(String),

    /// A required Transform failed; the frame's accumulated deltas were
    /// rolled back. The scheduler still advances the sequence counter
    /// (advance-on-abort is the default policy) so the failure is visible
    /// in history.
    #[error("frame {sequence} aborted: required transform '{transform}' failed: {reason}")]
    FrameAborted { sequence: u64, transform: String, reason: String },

    /// An external collaborator (LLM call, I/O adapter) failed or timed
    /// out. Surfaced via facets/logs; never blocks the scheduler.
    #[error("external failure: {0}")]
    External(String),

    /// A phase 3 Effector exceeded its soft deadline. The frame still
    /// seals; the effector is marked failing for this frame.
    #[error("effector '{0}' exceeded soft deadline of {1}ms")]
    EffectorTimeout(String, u64),

    /// A bug-class invariant was violated (sequence gap, duplicate id after
    /// conflict resolution). The space should enter safe mode.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("persistence error: {0}")]
    Persistence(#[from] connectome_persistence::PersistenceError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("io error at '{path}': {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl SpaceError {
    pub fn component(component: impl Into<String>, role: &'static str, message: impl Into<String>) -> Self {
        Self::Component { component: component.into(), role, message: message.into() }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// Whether this error, raised during normal frame processing, should
    /// abort the frame rather than being isolated or logged.
    pub fn aborts_frame(&self) -> bool {
        matches!(self, Self::FrameAborted { .. } | Self::Structural(_) | Self::InvariantViolation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_error_names_role_and_component() {
        let err = SpaceError::component("BoxReceptor", "Receptor", "panicked");
        assert_eq!(err.to_string(), "component 'BoxReceptor' (Receptor) failed: panicked");
    }

    #[test]
    fn structural_and_invariant_errors_abort_frames() {
        assert!(SpaceError::Structural("cycle".into()).aborts_frame());
        assert!(SpaceError::InvariantViolation("sequence gap".into()).aborts_frame());
        assert!(!SpaceError::Validation("bad payload".into()).aborts_frame());
    }
}
