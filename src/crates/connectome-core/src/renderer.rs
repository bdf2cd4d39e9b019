//! The frame-tracking renderer / HUD (§4.4): projects frame history plus
//! current facets into a message sequence for one agent activation.
//!
//! The renderer never mutates VEIL state — it replays delta semantics onto
//! a scratch `replay map` so that a frame renders as it looked *at that
//! frame*, not as the facets look now. That replay map is also where a
//! compression engine's `StateDelta` is applied when the renderer reaches
//! a range's anchor frame (§4.6).

use std::collections::HashMap;

use serde_json::Value;

use crate::compression::CompressionQuery;
use crate::delta::Delta;
use crate::facet::{Facet, FacetKind};
use crate::frame::Frame;
use crate::veil::ReadonlyView;

/// Which of the three sources produced a frame, classified from its input
/// events (§4.4): external ingress, an agent element, or neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRole {
    User,
    Agent,
    System,
}

impl FrameRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameRole::User => "user",
            FrameRole::Agent => "agent",
            FrameRole::System => "system",
        }
    }

    /// Topic namespaces treated as external ingress. Adapters not listed
    /// here (a future Minecraft/HTTP bridge) still classify correctly as
    /// long as their topics aren't agent-prefixed, by falling through to
    /// `System` rather than `User` — conservative default.
    const USER_NAMESPACES: &'static [&'static str] = &["console", "discord", "http"];

    fn classify(frame: &Frame) -> Self {
        if frame.events.iter().any(|e| e.source.is_agent() || e.namespace() == "agent") {
            return FrameRole::Agent;
        }
        if frame.events.iter().any(|e| Self::USER_NAMESPACES.contains(&e.namespace())) {
            return FrameRole::User;
        }
        FrameRole::System
    }
}

/// One frame's (or compressed range's) contribution to the rendered
/// context, tagged with the frame span it came from for
/// `sourceFrames{from,to}` (§4.4 step 2).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub role: String,
    pub content: String,
    pub source_from: u64,
    pub source_to: u64,
}

/// `RenderedContext{messages, metadata}` (§4.4).
#[derive(Debug, Clone, Default)]
pub struct RenderedContext {
    pub messages: Vec<RenderedMessage>,
    pub total_tokens: u32,
    pub token_budget_exceeded: bool,
}

impl RenderedContext {
    /// Converts to the JSON message list carried by a `rendered-context`
    /// facet (§3, §6 wire format).
    pub fn to_facet_messages(&self) -> Vec<Value> {
        self.messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": m.content,
                    "sourceFrames": {"from": m.source_from, "to": m.source_to},
                })
            })
            .collect()
    }
}

/// Tunables for one render pass: the ambient-depth heuristic, soft token
/// budget, and optional prefill framing (§4.4 steps 3-5, §9 open question
/// on ambient depth).
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// How many messages from the end ambients are inserted before, so
    /// they stay salient without being the very last thing rendered.
    /// Default 5, per §9's "insert ambients at `length - 5`" heuristic.
    pub ambient_depth: usize,
    pub soft_token_budget: Option<u32>,
    pub assistant_prefix: Option<String>,
    pub assistant_suffix: Option<String>,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { ambient_depth: 5, soft_token_budget: None, assistant_prefix: None, assistant_suffix: None }
    }
}

/// Local replica of live facet state, advanced frame-by-frame as the
/// renderer walks history, so each frame renders against the state as of
/// that frame rather than the current state (§4.4 step 1).
#[derive(Default)]
struct ReplayState {
    facets: HashMap<String, Facet>,
    hidden: std::collections::HashSet<String>,
}

impl ReplayState {
    fn apply(&mut self, delta: &Delta) {
        match delta {
            Delta::AddFacet { facet } => {
                self.hidden.remove(&facet.id);
                self.facets.insert(facet.id.clone(), facet.clone());
            }
            Delta::RewriteFacet { id, changes } => {
                if let Some(facet) = self.facets.get_mut(id) {
                    apply_changes_for_render(facet, changes);
                }
            }
            Delta::RemoveFacet { id } => {
                self.hidden.insert(id.clone());
            }
        }
    }

    fn apply_state_delta(&mut self, delta: &crate::compression::StateDelta) {
        for id in &delta.deleted {
            self.hidden.insert(id.clone());
        }
        for (id, value) in &delta.changes {
            if let Some(facet) = self.facets.get_mut(id) {
                if let FacetKind::State { state, .. } = &mut facet.kind {
                    if let Some(obj) = value.as_object() {
                        for (k, v) in obj {
                            state.insert(k.clone(), v.clone());
                        }
                    }
                }
            }
        }
    }

    fn visible(&self, id: &str) -> Option<&Facet> {
        if self.hidden.contains(id) {
            None
        } else {
            self.facets.get(id)
        }
    }
}

fn apply_changes_for_render(facet: &mut Facet, changes: &HashMap<String, Value>) {
    if let Some(children) = changes.get("children") {
        if let Ok(ids) = serde_json::from_value::<Vec<String>>(children.clone()) {
            facet.children = Some(ids);
        }
    }
    match &mut facet.kind {
        FacetKind::State { content, state, .. } => {
            if let Some(new_content) = changes.get("content").and_then(|v| v.as_str()) {
                *content = new_content.to_string();
            }
            if let Some(new_state) = changes.get("state").and_then(|v| v.as_object()) {
                for (k, v) in new_state {
                    state.insert(k.clone(), v.clone());
                }
            }
        }
        FacetKind::Event { content, .. } | FacetKind::Ambient { content, .. } => {
            if let Some(new_content) = changes.get("content").and_then(|v| v.as_str()) {
                *content = new_content.to_string();
            }
        }
        _ => {}
    }
}

/// Renders one facet's content per §4.4's facet rendering rules: only
/// content-bearing facets render, `displayName` becomes the tag, children
/// nest, actions render as `<tool_call>`, thoughts as `<thought>`.
fn render_facet(facet: &Facet, replay: &ReplayState) -> Option<String> {
    if !facet.has_content_aspect() {
        return None;
    }
    let tag = facet.display_name.clone().unwrap_or_else(|| facet.type_name().to_string());
    let body = match &facet.kind {
        FacetKind::Event { content, .. } | FacetKind::Ambient { content, .. } => content.clone(),
        FacetKind::State { content, .. } => content.clone(),
        FacetKind::Speech(a) => a.content.clone(),
        FacetKind::Thought(a) => return Some(format!("<thought>{}</thought>", a.content)),
        FacetKind::Action(a) => {
            let params = a
                .tool_parameters
                .as_ref()
                .map(|p| p.iter().map(|(k, v)| format!(" {}=\"{}\"", k, value_to_attr(v))).collect::<String>())
                .unwrap_or_default();
            return Some(format!("<tool_call name=\"{}\"{params}>{}</tool_call>", tag, a.content));
        }
        _ => return None,
    };
    let children_rendered = facet
        .children
        .as_ref()
        .map(|ids| ids.iter().filter_map(|id| replay.visible(id)).filter_map(|f| render_facet(f, replay)).collect::<Vec<_>>().join(""))
        .unwrap_or_default();
    Some(format!("<{tag}>{body}{children_rendered}</{tag}>"))
}

fn value_to_attr(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Rough token estimate (content length / 4) used for the soft budget
/// check (§4.4 step 5) when a frame carries no captured snapshot token
/// count to reuse.
fn estimate_tokens(text: &str) -> u32 {
    ((text.len() as f64) / 4.0).ceil() as u32
}

/// Walks `frames` in order, consulting `compression` for replaced ranges,
/// classifying each frame's source, replaying deltas onto a local facet
/// map, and grouping consecutive same-role content into messages. Trailing
/// ambient facets from `current_state` are inserted `ambient_depth`
/// messages from the end so they stay salient without displacing the most
/// recent turn (§4.4, §9).
pub fn render(frames: &[Frame], current_state: &ReadonlyView, compression: Option<&dyn CompressionQuery>, options: &RenderOptions) -> RenderedContext {
    let mut replay = ReplayState::default();
    let mut grouped: Vec<RenderedMessage> = Vec::new();

    for frame in frames {
        if let Some(engine) = compression {
            if engine.should_replace_frame(frame.sequence) {
                if let Some(delta) = engine.get_state_delta(frame.sequence) {
                    replay.apply_state_delta(&delta);
                }
                match engine.get_replacement(frame.sequence) {
                    Some(text) if !text.is_empty() => push_or_extend(&mut grouped, "system", text, frame.sequence),
                    _ => {}
                }
                continue;
            }
        }

        let role = FrameRole::classify(frame).as_str().to_string();
        let mut frame_content = String::new();
        for delta in &frame.deltas {
            replay.apply(delta);
            if let Delta::AddFacet { facet } = delta {
                if let Some(rendered) = render_facet(facet, &replay) {
                    frame_content.push_str(&rendered);
                }
            }
            if let Delta::RewriteFacet { id, .. } = delta {
                if let Some(facet) = replay.visible(id) {
                    if let Some(rendered) = render_facet(facet, &replay) {
                        frame_content.push_str(&rendered);
                    }
                }
            }
        }
        if !frame_content.is_empty() {
            push_or_extend(&mut grouped, &role, frame_content, frame.sequence);
        }
    }

    let ambients: Vec<&Facet> = current_state.by_aspect(|f| matches!(f.kind, FacetKind::Ambient { .. }));
    if !ambients.is_empty() {
        let ambient_content: String = ambients.iter().filter_map(|f| render_facet(f, &replay)).collect();
        let insert_at = grouped.len().saturating_sub(options.ambient_depth);
        let last_seq = frames.last().map(|f| f.sequence).unwrap_or(0);
        grouped.insert(
            insert_at,
            RenderedMessage { role: "user".to_string(), content: ambient_content, source_from: last_seq, source_to: last_seq },
        );
    }

    if let Some(prefix) = &options.assistant_prefix {
        grouped.push(RenderedMessage { role: "assistant".into(), content: prefix.clone(), source_from: 0, source_to: 0 });
    }
    if let Some(suffix) = &options.assistant_suffix {
        grouped.push(RenderedMessage { role: "assistant".into(), content: suffix.clone(), source_from: 0, source_to: 0 });
    }

    let total_tokens: u32 = grouped.iter().map(|m| estimate_tokens(&m.content)).sum();
    let token_budget_exceeded = options.soft_token_budget.map(|budget| total_tokens > budget).unwrap_or(false);
    if token_budget_exceeded {
        tracing::warn!(total_tokens, budget = options.soft_token_budget, "rendered context exceeds soft token budget; not dropping frames");
    }

    RenderedContext { messages: grouped, total_tokens, token_budget_exceeded }
}

fn push_or_extend(grouped: &mut Vec<RenderedMessage>, role: &str, content: String, sequence: u64) {
    if let Some(last) = grouped.last_mut() {
        if last.role == role {
            last.content.push_str(&content);
            last.source_to = sequence;
            return;
        }
    }
    grouped.push(RenderedMessage { role: role.to_string(), content, source_from: sequence, source_to: sequence });
}
