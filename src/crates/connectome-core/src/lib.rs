//! # connectome-core — the frame-processing core of an agent runtime
//!
//! `connectome-core` owns the VEIL state model, the four-phase frame
//! scheduler, the component bus, the frame-tracking renderer, the
//! compression engine, and the agent bridge that together let an external
//! LLM-backed agent observe and act on a shared, deterministic, replayable
//! timeline.
//!
//! ## Core Concepts
//!
//! ### 1. VEIL facets and deltas
//!
//! [`facet::Facet`] is the atomic unit of observable state — an event, a
//! durable `state` bag, an agent-produced artifact, or one of several other
//! kinds (see [`facet::FacetKind`]). State only ever changes through a
//! [`delta::Delta`] (`addFacet` / `rewriteFacet` / `removeFacet`), applied
//! atomically by [`veil::VeilState`].
//!
//! ### 2. The four-phase frame
//!
//! [`scheduler::Space`] seals one [`frame::Frame`] per call to
//! `run_frame()`: Modulation filters/batches the incoming events,
//! Reception turns events into deltas via pure [`component::Receptor`]s,
//! Transformation runs [`component::Transform`]s in an order resolved by
//! [`constraint::ConstraintSolver`] to a fixed point, Effectuation invokes
//! async [`component::Effector`]s under a soft deadline, and Maintenance
//! lets infrastructure-only [`component::Maintainer`]s close out the frame
//! (including, as a scheduler-internal step, persisting it).
//!
//! ### 3. Rendering and compression
//!
//! [`renderer::render`] projects frame history plus current facets into a
//! message sequence for one agent activation, classifying each frame's
//! source, grouping consecutive same-role content, and folding in trailing
//! ambient context. [`compression::CompressionEngine`] identifies and
//! coalesces old frame ranges into summaries the renderer can substitute in
//! without losing the state those frames established.
//!
//! ### 4. The agent bridge
//!
//! [`agent::ChatModel`] is the sole boundary to an external LLM provider.
//! [`agent::ContextTransform`] materializes a `rendered-context` facet for
//! a pending `agent-activation`; [`agent::AgentEffector`] calls the model
//! and emits a completion event picked up by
//! [`agent::AgentCompletionReceptor`] on the following frame.
//!
//! ### 5. Determinism and persistence
//!
//! [`clock::Clock`] centralizes the only two sources of non-determinism
//! (timestamps, ids) so a recorded frame sequence can be replayed
//! bit-for-bit. [`connectome_persistence`] stores one transition per frame,
//! periodic full-state snapshots, and content-addressed frame buckets
//! behind a branch-aware [`connectome_persistence::FrameStore`].
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use connectome_core::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> connectome_core::error::Result<()> {
//!     let registry = ComponentRegistry::new();
//!     let history = FrameHistoryHandle::new();
//!     let clock = Arc::new(SystemClock::new());
//!     let mut space = Space::new(registry, history, clock, SpaceConfig::default(), None)?;
//!
//!     space.enqueue(SpaceEvent::new("console:input", ElementRef::new("console-1"), 0, serde_json::json!({"text": "hi"})));
//!     let frame = space.run_frame().await?;
//!     println!("sealed frame {}", frame.sequence);
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod clock;
pub mod component;
pub mod compression;
pub mod config;
pub mod constraint;
pub mod debug;
pub mod delta;
pub mod error;
pub mod event;
pub mod facet;
pub mod frame;
pub mod renderer;
pub mod scheduler;
pub mod snapshot;
pub mod veil;

pub use clock::{Clock, FixedClock, SystemClock};
pub use component::{
    ComponentRegistry, Effector, EffectorResult, ExternalAction, FacetFilter, Maintainer, MaintainerOutcome, Modulator, Receptor, Transform,
};
pub use compression::{
    CompressionCache, CompressionEngine, CompressionOutcome, CompressionQuery, CompressionRange, CompressionTransform, ConcatSummarizer,
    DefaultCompressionEngine, StateDelta, Summarizer,
};
pub use config::{CompressionConfig, PersistenceConfig, SchedulerConfig, SpaceConfig, SpaceConfigBuilder};
pub use constraint::{ConstraintSolver, TransformSpec};
pub use debug::{DebugObserver, NullObserver, ObserverList};
pub use delta::Delta;
pub use error::{Result, SpaceError};
pub use event::{ElementRef, SpaceEvent};
pub use facet::{AgentArtifact, Facet, FacetKind};
pub use frame::{Frame, FrameChangeSet};
pub use renderer::{render, FrameRole, RenderOptions, RenderedContext, RenderedMessage};
pub use scheduler::{FrameHistoryHandle, Space};
pub use snapshot::{select_range, FrameSnapshot, RenderedChunk};
pub use veil::{AgentInfo, ApplyOutcome, ReadonlyView, RemovalKind, Stream, VeilCheckpoint, VeilState};

pub use agent::{
    AgentCompletionReceptor, AgentEffector, ChatMessage, ChatModel, ChatOptions, ChatResponse, ChatRole, ChatStreamChunk, ContextTransform,
    ParsedToolCall, ToolDefinition,
};

/// Convenience re-export of the types most callers wire up to construct
/// and drive a [`scheduler::Space`].
pub mod prelude {
    pub use crate::agent::{AgentCompletionReceptor, AgentEffector, ChatModel, ContextTransform};
    pub use crate::clock::{Clock, FixedClock, SystemClock};
    pub use crate::component::{ComponentRegistry, Effector, Maintainer, Modulator, Receptor, Transform};
    pub use crate::config::SpaceConfig;
    pub use crate::delta::Delta;
    pub use crate::error::{Result, SpaceError};
    pub use crate::event::{ElementRef, SpaceEvent};
    pub use crate::facet::{Facet, FacetKind};
    pub use crate::frame::Frame;
    pub use crate::scheduler::{FrameHistoryHandle, Space};
    pub use crate::veil::ReadonlyView;
}
