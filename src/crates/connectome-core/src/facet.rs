//! The VEIL facet data model (§3).
//!
//! A [`Facet`] is the atomic unit of observable state: a stable `id` plus a
//! tagged [`FacetKind`] carrying that variant's aspect mixins. Facets are
//! never subclassed — adding a new kind is a versioned change to the wire
//! format, not an open hierarchy (§9 "Facet polymorphism").
//!
//! `children` holds ids, not nested structural references, so facets stay
//! arena-friendly for persistence (§9 "Cyclic references").

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A point-in-time occurrence, a durable state bag, a staged mutation, or
/// an agent-produced artifact — see the variant docs below for the aspect
/// fields each one carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum FacetKind {
    /// A point-in-time occurrence rendered as plain content.
    #[serde(rename = "event")]
    Event {
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
        #[serde(default)]
        ephemeral: bool,
    },

    /// A durable entity attribute bag.
    #[serde(rename = "state")]
    State {
        content: String,
        #[serde(default)]
        state: HashMap<String, Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        transition_renderers: Option<Value>,
    },

    /// A staged mutation against one or more target `state` facets. Dropped
    /// with a warning if a target id no longer exists (§3 invariants).
    #[serde(rename = "state-change")]
    StateChange {
        target_facet_ids: Vec<String>,
        changes: HashMap<String, Value>,
        #[serde(default = "default_true")]
        ephemeral: bool,
    },

    /// Floating context (hints, tool lists) rendered near "now" rather than
    /// in frame order.
    #[serde(rename = "ambient")]
    Ambient { content: String, #[serde(default)] scope: Vec<String> },

    /// Agent-produced speech.
    #[serde(rename = "speech")]
    Speech(AgentArtifact),

    /// Agent-produced thought, rendered as `<thought>…</thought>`.
    #[serde(rename = "thought")]
    Thought(AgentArtifact),

    /// Agent-produced action, rendered as a `<tool_call>` element.
    #[serde(rename = "action")]
    Action(AgentArtifact),

    /// An action schema advertised to an agent. `defineAction` is accepted
    /// as a legacy alias for the same wire shape.
    #[serde(rename = "tool", alias = "defineAction")]
    Tool { definition: String, #[serde(default)] parameters: Value },

    /// A request for an agent to take a turn.
    #[serde(rename = "agent-activation")]
    AgentActivation {
        source: String,
        reason: String,
        #[serde(default)]
        priority: i32,
        #[serde(skip_serializing_if = "Option::is_none")]
        target_agent_id: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        stream_ref: Option<String>,
    },

    /// An ephemeral prompt snapshot materialized for a pending activation.
    #[serde(rename = "rendered-context")]
    RenderedContext {
        activation_id: String,
        messages: Vec<Value>,
        token_count: u32,
    },

    /// Scoped per-component durable memory, keyed by the owning element.
    #[serde(rename = "component-state")]
    ComponentState { component_id: String, element_id: String, state: HashMap<String, Value> },

    /// The result of a deferred action, triggering follow-ups.
    #[serde(rename = "continuation:complete")]
    ContinuationComplete {
        success: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        continuations: Vec<Value>,
    },

    /// A compression job proposed by the [`crate::compression`] engine.
    #[serde(rename = "compression-plan")]
    CompressionPlan { engine: String, ranges: Vec<(u64, u64)> },

    /// The outcome of executing a compression plan.
    #[serde(rename = "compression-result")]
    CompressionResult {
        engine: String,
        ranges: Vec<(u64, u64)>,
        summary: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        state_delta: Option<Value>,
    },
}

fn default_true() -> bool {
    true
}

/// Shared aspect mixin for `speech` / `thought` / `action` facets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AgentArtifact {
    pub content: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_parameters: Option<HashMap<String, Value>>,
}

/// A unit of observable state: a stable id, its tagged kind, and an
/// optional bounded tree of child facet ids (rendering only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Facet {
    pub id: String,
    #[serde(flatten)]
    pub kind: FacetKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<String>>,
}

impl Facet {
    pub fn new(id: impl Into<String>, kind: FacetKind) -> Self {
        Self { id: id.into(), kind, display_name: None, children: None }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_children(mut self, children: Vec<String>) -> Self {
        self.children = Some(children);
        self
    }

    /// `event`, `state`, `ambient`, `speech`/`thought`/`action`,
    /// `rendered-context` all carry renderable content.
    pub fn has_content_aspect(&self) -> bool {
        matches!(
            self.kind,
            FacetKind::Event { .. }
                | FacetKind::State { .. }
                | FacetKind::Ambient { .. }
                | FacetKind::Speech(_)
                | FacetKind::Thought(_)
                | FacetKind::Action(_)
        )
    }

    pub fn has_state_aspect(&self) -> bool {
        matches!(self.kind, FacetKind::State { .. })
    }

    pub fn has_stream_aspect(&self) -> bool {
        self.stream_id().is_some()
    }

    pub fn has_agent_generated_aspect(&self) -> bool {
        matches!(self.kind, FacetKind::Speech(_) | FacetKind::Thought(_) | FacetKind::Action(_))
    }

    pub fn has_ephemeral_aspect(&self) -> bool {
        matches!(
            self.kind,
            FacetKind::Event { ephemeral: true, .. }
                | FacetKind::StateChange { ephemeral: true, .. }
                | FacetKind::RenderedContext { .. }
                | FacetKind::CompressionPlan { .. }
                | FacetKind::CompressionResult { .. }
                | FacetKind::ContinuationComplete { .. }
        )
    }

    pub fn stream_id(&self) -> Option<&str> {
        match &self.kind {
            FacetKind::Event { stream_id, .. } => stream_id.as_deref(),
            FacetKind::Speech(a) | FacetKind::Thought(a) | FacetKind::Action(a) => a.stream_id.as_deref(),
            _ => None,
        }
    }

    pub fn agent_id(&self) -> Option<&str> {
        match &self.kind {
            FacetKind::Speech(a) | FacetKind::Thought(a) | FacetKind::Action(a) => Some(a.agent_id.as_str()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            FacetKind::Event { .. } => "event",
            FacetKind::State { .. } => "state",
            FacetKind::StateChange { .. } => "state-change",
            FacetKind::Ambient { .. } => "ambient",
            FacetKind::Speech(_) => "speech",
            FacetKind::Thought(_) => "thought",
            FacetKind::Action(_) => "action",
            FacetKind::Tool { .. } => "tool",
            FacetKind::AgentActivation { .. } => "agent-activation",
            FacetKind::RenderedContext { .. } => "rendered-context",
            FacetKind::ComponentState { .. } => "component-state",
            FacetKind::ContinuationComplete { .. } => "continuation:complete",
            FacetKind::CompressionPlan { .. } => "compression-plan",
            FacetKind::CompressionResult { .. } => "compression-result",
        }
    }
}
