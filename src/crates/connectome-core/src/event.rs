//! Incoming events and the element references that identify their source.
//!
//! `SpaceEvent` is the sole input to a frame: the scheduler drains the event
//! queue at frame start (§4.1 Phase 0), hands the batch to Modulators, then
//! to the Receptors whose `topics` match each event's topic (§4.1 Phase 1).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Identifies the element that produced an event: a console adapter, a
/// Discord bridge, an internal agent element, and so on. Opaque beyond its
/// id/path/type — concrete element trees live outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub element_id: String,
    #[serde(default)]
    pub element_path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element_type: Option<String>,
}

impl ElementRef {
    pub fn new(element_id: impl Into<String>) -> Self {
        Self { element_id: element_id.into(), element_path: Vec::new(), element_type: None }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.element_path = path;
        self
    }

    pub fn with_type(mut self, element_type: impl Into<String>) -> Self {
        self.element_type = Some(element_type.into());
        self
    }

    /// True when this ref names an `AgentElement` or an agent-prefixed path,
    /// used by the renderer to classify frame sources (§4.4).
    pub fn is_agent(&self) -> bool {
        self.element_type.as_deref() == Some("agent")
            || self.element_path.first().map(|p| p == "agent").unwrap_or(false)
    }
}

/// A single occurrence delivered to the scheduler's event queue.
///
/// Topics are namespaced strings (`console:input`, `veil:operation`,
/// `element:create`, `agent:activation`, …); the namespace prefix before the
/// first `:` is used by the renderer's source classification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SpaceEvent {
    pub topic: String,
    pub source: ElementRef,
    pub timestamp: i64,
    #[serde(default = "default_payload")]
    pub payload: Value,
}

fn default_payload() -> Value {
    Value::Object(Default::default())
}

impl SpaceEvent {
    pub fn new(topic: impl Into<String>, source: ElementRef, timestamp: i64, payload: Value) -> Self {
        Self { topic: topic.into(), source, timestamp, payload }
    }

    /// The namespace segment of the topic, e.g. `"console"` for
    /// `"console:input"`. Falls back to the whole topic if there is no `:`.
    pub fn namespace(&self) -> &str {
        self.topic.split(':').next().unwrap_or(&self.topic)
    }

    pub fn matches_topic(&self, topics: &[String]) -> bool {
        topics.iter().any(|t| t == &self.topic)
    }
}
