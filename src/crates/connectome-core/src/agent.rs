//! The Agent Bridge (§4.8): the boundary contract between this crate and
//! an external LLM-backed agent subsystem.
//!
//! Three pieces cross that boundary: [`ChatModel`] (a minimal,
//! provider-agnostic chat trait users implement for OpenAI/Anthropic/
//! Ollama/etc — never embedded here), [`ContextTransform`] (materializes a
//! `rendered-context` facet for any pending activation that lacks one),
//! and [`AgentEffector`] + [`AgentCompletionReceptor`] (call the model and
//! turn its completion into `speech`/`thought`/`action` facets on the
//! following frame — the suspension-without-blocking pattern of §5).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::compression::CompressionCache;
use crate::component::{EffectorResult, Effector, ExternalAction, FacetFilter, Receptor, Transform};
use crate::delta::Delta;
use crate::error::{Result, SpaceError};
use crate::event::{ElementRef, SpaceEvent};
use crate::facet::{AgentArtifact, Facet, FacetKind};
use crate::renderer::{self, RenderOptions};
use crate::scheduler::FrameHistoryHandle;
use crate::veil::ReadonlyView;

/// Speaker role in a request sent to a [`ChatModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// An action schema advertised to the model, mirroring a `tool`/
/// `defineAction` facet's `definition`/`parameters`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatOptions {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    #[serde(default)]
    pub parameters: HashMap<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub tokens_used: u32,
    #[serde(default)]
    pub tool_calls: Vec<ParsedToolCall>,
    #[serde(default)]
    pub metadata: Value,
}

/// One incremental token/chunk of a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatStreamChunk {
    pub delta: String,
    pub done: bool,
}

/// The external collaborator boundary for LLM calls (§4.8, §6 "LLM
/// provider interface"). This crate never embeds a concrete OpenAI/
/// Anthropic/Ollama client — only this trait and its request/response
/// types.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<ChatResponse>;

    /// Default implementation streams the whole response as one final
    /// chunk; providers with true token streaming override this.
    async fn stream(&self, messages: &[ChatMessage], options: &ChatOptions) -> Result<BoxStream<'static, Result<ChatStreamChunk>>> {
        let response = self.chat(messages, options).await?;
        Ok(Box::pin(stream::once(async move { Ok(ChatStreamChunk { delta: response.content, done: true }) })))
    }
}

fn parse_chat_message(value: &Value) -> Option<ChatMessage> {
    let role_str = value.get("role")?.as_str()?;
    let role = match role_str {
        "system" => ChatRole::System,
        "agent" | "assistant" => ChatRole::Assistant,
        "tool" => ChatRole::Tool,
        _ => ChatRole::User,
    };
    let content = value.get("content")?.as_str()?.to_string();
    Some(ChatMessage { role, content })
}

/// Phase 2: materializes a `rendered-context` facet for any
/// `agent-activation` that doesn't have one yet, by calling
/// [`crate::renderer::render`] over the shared frame history (§4.8).
pub struct ContextTransform {
    history: Arc<FrameHistoryHandle>,
    compression: Arc<CompressionCache>,
    options: RenderOptions,
    provides: Vec<String>,
}

impl ContextTransform {
    pub fn new(history: Arc<FrameHistoryHandle>, compression: Arc<CompressionCache>, options: RenderOptions) -> Self {
        Self { history, compression, options, provides: vec!["rendered-context".to_string()] }
    }
}

impl Transform for ContextTransform {
    fn name(&self) -> &str {
        "ContextTransform"
    }

    fn provides(&self) -> &[String] {
        &self.provides
    }

    fn transform(&self, state: &ReadonlyView) -> Result<Vec<Delta>> {
        let mut deltas = Vec::new();
        for activation in state.by_type("agent-activation") {
            let has_context = state.iter().any(|f| matches!(&f.kind, FacetKind::RenderedContext { activation_id, .. } if activation_id == &activation.id));
            if has_context {
                continue;
            }
            let frames = self.history.snapshot();
            let rendered = renderer::render(&frames, state, Some(self.compression.as_ref()), &self.options);
            let facet = Facet::new(
                format!("{}-context", activation.id),
                FacetKind::RenderedContext {
                    activation_id: activation.id.clone(),
                    messages: rendered.to_facet_messages(),
                    token_count: rendered.total_tokens,
                },
            );
            deltas.push(Delta::add(facet));
        }
        Ok(deltas)
    }
}

/// Phase 3: consumes `agent-activation` + its matching `rendered-context`,
/// calls the model, and emits an `agent:completion` event for the next
/// frame rather than awaiting-then-mutating state mid-phase (§5, §4.8).
pub struct AgentEffector {
    model: Arc<dyn ChatModel>,
    clock: Arc<dyn Clock>,
}

impl AgentEffector {
    pub fn new(model: Arc<dyn ChatModel>, clock: Arc<dyn Clock>) -> Self {
        Self { model, clock }
    }
}

#[async_trait]
impl Effector for AgentEffector {
    fn name(&self) -> &str {
        "AgentEffector"
    }

    fn facet_filters(&self) -> Vec<FacetFilter> {
        vec![FacetFilter::of_type("agent-activation")]
    }

    async fn effect(&mut self, matched: &[&Facet], state: &ReadonlyView) -> Result<EffectorResult> {
        let mut events = Vec::new();
        let mut external_actions = Vec::new();

        for activation in matched {
            let (target_agent_id, stream_ref) = match &activation.kind {
                FacetKind::AgentActivation { target_agent_id, stream_ref, .. } => (target_agent_id.clone(), stream_ref.clone()),
                _ => continue,
            };
            let Some(context_facet) = state.iter().find(|f| matches!(&f.kind, FacetKind::RenderedContext { activation_id, .. } if activation_id == &activation.id)) else {
                // No rendered-context yet (ContextTransform runs before this
                // phase in the same frame, but hasn't landed for this
                // activation on the very first pass); wait for a later frame.
                continue;
            };
            let FacetKind::RenderedContext { messages, .. } = &context_facet.kind else { continue };
            let chat_messages: Vec<ChatMessage> = messages.iter().filter_map(parse_chat_message).collect();

            match self.model.chat(&chat_messages, &ChatOptions::default()).await {
                Ok(response) => {
                    let payload = serde_json::json!({
                        "activation_id": activation.id,
                        "agent_id": target_agent_id.clone().unwrap_or_else(|| "agent".to_string()),
                        "stream_id": stream_ref,
                        "content": response.content,
                        "tokens_used": response.tokens_used,
                        "tool_calls": response.tool_calls,
                    });
                    let source = ElementRef::new(target_agent_id.unwrap_or_else(|| "agent".to_string())).with_type("agent");
                    events.push(SpaceEvent::new("agent:completion", source, self.clock.now_millis(), payload));
                }
                Err(e) => {
                    external_actions.push(ExternalAction::failed("agent-chat", e.to_string()));
                }
            }
        }

        Ok(EffectorResult { events, external_actions })
    }
}

/// Phase 1 (next frame): turns an `agent:completion` event into
/// `speech`/`thought`/`action` facets and removes the spent activation.
/// Facet ids are derived from the activation id rather than a clock/uuid
/// so the receptor stays pure (§4.1: identical inputs, identical deltas).
pub struct AgentCompletionReceptor {
    topics: Vec<String>,
}

impl Default for AgentCompletionReceptor {
    fn default() -> Self {
        Self { topics: vec!["agent:completion".to_string()] }
    }
}

impl Receptor for AgentCompletionReceptor {
    fn name(&self) -> &str {
        "AgentCompletionReceptor"
    }

    fn topics(&self) -> &[String] {
        &self.topics
    }

    fn receive(&self, event: &SpaceEvent, state: &ReadonlyView) -> Result<Vec<Delta>> {
        let payload = &event.payload;
        let activation_id = payload
            .get("activation_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SpaceError::Validation("agent:completion missing activation_id".into()))?;
        let agent_id = payload.get("agent_id").and_then(|v| v.as_str()).unwrap_or("agent").to_string();
        let stream_id = payload.get("stream_id").and_then(|v| v.as_str()).map(str::to_string);
        let content = payload.get("content").and_then(|v| v.as_str()).unwrap_or_default().to_string();

        let mut deltas = vec![Delta::remove(activation_id.to_string())];

        if !content.is_empty() {
            deltas.push(Delta::add(Facet::new(
                format!("{activation_id}-speech"),
                FacetKind::Speech(AgentArtifact { content, agent_id: agent_id.clone(), stream_id: stream_id.clone(), tool_parameters: None }),
            )));
        }

        if let Some(tool_calls) = payload.get("tool_calls").and_then(|v| v.as_array()) {
            for (i, call) in tool_calls.iter().enumerate() {
                let name = call.get("name").and_then(|v| v.as_str()).unwrap_or("action").to_string();
                let parameters: HashMap<String, Value> = call
                    .get("parameters")
                    .and_then(|v| v.as_object())
                    .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                    .unwrap_or_default();

                if !tool_call_parameters_are_valid(state, &name, &parameters) {
                    tracing::warn!(tool = %name, activation_id, "tool call parameters failed schema validation, dropping action facet");
                    continue;
                }

                deltas.push(Delta::add(Facet::new(
                    format!("{activation_id}-action-{i}"),
                    FacetKind::Action(AgentArtifact { content: name, agent_id: agent_id.clone(), stream_id: stream_id.clone(), tool_parameters: Some(parameters) }),
                )));
            }
        }

        Ok(deltas)
    }
}

/// Validates a parsed tool call's parameters against the matching
/// `tool`/`defineAction` facet's JSON Schema, when the `json-validation`
/// feature is enabled. A tool call naming an action this space never
/// advertised, or one advertised without a schema, is always accepted —
/// this only rejects parameters that contradict a schema the space itself
/// declared.
#[cfg(feature = "json-validation")]
fn tool_call_parameters_are_valid(state: &ReadonlyView, tool_name: &str, parameters: &HashMap<String, Value>) -> bool {
    let Some(schema) = state.by_type("tool").into_iter().find_map(|f| match &f.kind {
        FacetKind::Tool { definition, parameters: schema } if definition == tool_name => Some(schema),
        _ => None,
    }) else {
        return true;
    };
    if schema.is_null() {
        return true;
    }
    let instance = Value::Object(parameters.iter().map(|(k, v)| (k.clone(), v.clone())).collect());
    match jsonschema::JSONSchema::compile(schema) {
        Ok(compiled) => compiled.is_valid(&instance),
        Err(e) => {
            tracing::warn!(tool = %tool_name, error = %e, "tool parameter schema itself is invalid, accepting call unvalidated");
            true
        }
    }
}

#[cfg(not(feature = "json-validation"))]
fn tool_call_parameters_are_valid(_state: &ReadonlyView, _tool_name: &str, _parameters: &HashMap<String, Value>) -> bool {
    true
}
