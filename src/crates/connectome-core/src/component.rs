//! The component bus (§4): the five roles a space's behavior is built from.
//!
//! Every component is registered once, in registration order, and that
//! order is part of the deterministic contract: Modulators and Maintainers
//! run in registration order; Receptors run in (event order, registration
//! order); Transforms are reordered by the [`crate::constraint`] solver but
//! fall back to registration order among unconstrained ones; Effectors are
//! collected in registration order even though the scheduler may dispatch
//! them concurrently (§4.1 Phase 3).

use crate::delta::Delta;
use crate::error::Result;
use crate::event::SpaceEvent;
use crate::facet::Facet;
use crate::frame::{Frame, FrameChangeSet};
use crate::veil::ReadonlyView;
use async_trait::async_trait;
use serde_json::Value;

/// Phase 0. Stateful across frames; must be idempotent over replay, relying
/// only on declared internal state plus the frame's input events.
pub trait Modulator: Send + Sync {
    fn name(&self) -> &str;

    /// Filters, aggregates, batches, or deduplicates the frame's input
    /// events. Returning the input unchanged is a valid (identity)
    /// modulator.
    fn modulate(&mut self, events: Vec<SpaceEvent>) -> Vec<SpaceEvent>;
}

/// Phase 1. A pure function: identical `(event, state)` must always
/// produce identical deltas. `topics` selects which events this receptor is
/// invoked for.
pub trait Receptor: Send + Sync {
    fn name(&self) -> &str;
    fn topics(&self) -> &[String];

    fn receive(&self, event: &SpaceEvent, state: &ReadonlyView) -> Result<Vec<Delta>>;
}

/// Phase 2. Declares the capabilities it `provides` and `requires`; the
/// [`crate::constraint::ConstraintSolver`] uses these to compute a
/// topological execution order. May run more than once within a phase, up
/// to the scheduler's fixed-point iteration limit, if new `state-change` or
/// `continuation:complete` facets appear for it to consume.
pub trait Transform: Send + Sync {
    fn name(&self) -> &str;
    fn provides(&self) -> &[String] {
        &[]
    }
    fn requires(&self) -> &[String] {
        &[]
    }

    /// Whether a failure of this transform should abort the frame because
    /// other transforms `require` what it `provides` (§7). Defaults to
    /// true whenever `provides()` is non-empty.
    fn is_required(&self) -> bool {
        !self.provides().is_empty()
    }

    fn transform(&self, state: &ReadonlyView) -> Result<Vec<Delta>>;
}

/// A facet-matching filter an Effector declares to select the subset of a
/// frame's change set it is invoked with (§4.1 Phase 3).
#[derive(Debug, Clone, Default)]
pub struct FacetFilter {
    pub type_name: Option<String>,
    pub aspect: Option<&'static str>,
    pub attribute: Option<(String, Value)>,
}

impl FacetFilter {
    pub fn of_type(type_name: impl Into<String>) -> Self {
        Self { type_name: Some(type_name.into()), ..Default::default() }
    }

    pub fn matches(&self, facet: &Facet) -> bool {
        if let Some(t) = &self.type_name {
            if facet.type_name() != t {
                return false;
            }
        }
        if let Some(aspect) = self.aspect {
            let ok = match aspect {
                "content" => facet.has_content_aspect(),
                "state" => facet.has_state_aspect(),
                "stream" => facet.has_stream_aspect(),
                "agent-generated" => facet.has_agent_generated_aspect(),
                "ephemeral" => facet.has_ephemeral_aspect(),
                _ => true,
            };
            if !ok {
                return false;
            }
        }
        if let Some((key, expected)) = &self.attribute {
            if let FacetKindValue::Mismatch = attribute_matches(facet, key, expected) {
                return false;
            }
        }
        true
    }
}

enum FacetKindValue {
    Match,
    Mismatch,
}

fn attribute_matches(facet: &Facet, key: &str, expected: &Value) -> FacetKindValue {
    let value = serde_json::to_value(facet).ok().and_then(|v| v.get(key).cloned());
    if value.as_ref() == Some(expected) {
        FacetKindValue::Match
    } else {
        FacetKindValue::Mismatch
    }
}

/// What an Effector hands back to the scheduler: events queued for frame
/// N+1, and actions forwarded verbatim to the host boundary.
#[derive(Debug, Clone, Default)]
pub struct EffectorResult {
    pub events: Vec<SpaceEvent>,
    pub external_actions: Vec<ExternalAction>,
}

impl EffectorResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<SpaceEvent>) -> Self {
        Self { events, external_actions: Vec::new() }
    }
}

/// A side effect forwarded to the host boundary (console output, a Discord
/// send, an HTTP call) — opaque to the core beyond its kind/payload/error.
#[derive(Debug, Clone)]
pub struct ExternalAction {
    pub kind: String,
    pub payload: Value,
    pub error: Option<String>,
}

impl ExternalAction {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self { kind: kind.into(), payload, error: None }
    }

    pub fn failed(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self { kind: kind.into(), payload: Value::Null, error: Some(error.into()) }
    }
}

/// Phase 3. Stateful, may perform side effects and spawn follow-up events.
/// Declares [`FacetFilter`]s selecting which members of the frame's change
/// set it receives.
#[async_trait]
pub trait Effector: Send + Sync {
    fn name(&self) -> &str;
    fn facet_filters(&self) -> Vec<FacetFilter>;

    async fn effect(&mut self, matched: &[&Facet], state: &ReadonlyView) -> Result<EffectorResult>;
}

/// Phase 4. Receives the sealed frame, its change set, and post-frame
/// state. Restricted to infrastructure concerns — element-tree bookkeeping,
/// persistence stamping, snapshot attachment — never domain deltas.
#[async_trait]
pub trait Maintainer: Send + Sync {
    fn name(&self) -> &str;

    async fn maintain(&mut self, frame: &Frame, change_set: &FrameChangeSet, state: &ReadonlyView) -> Result<MaintainerOutcome>;
}

#[derive(Debug, Clone, Default)]
pub struct MaintainerOutcome {
    pub deltas: Vec<Delta>,
    pub events: Vec<SpaceEvent>,
}

/// Holds the registered component set for a space, in registration order.
/// Transform order is additionally resolved by the constraint solver at
/// construction time (§4.3) so a cycle or missing provider is fatal at
/// startup rather than at first frame.
#[derive(Default)]
pub struct ComponentRegistry {
    pub modulators: Vec<Box<dyn Modulator>>,
    pub receptors: Vec<Box<dyn Receptor>>,
    transforms: Vec<Box<dyn Transform>>,
    transform_order: Vec<usize>,
    pub effectors: Vec<Box<dyn Effector>>,
    pub maintainers: Vec<Box<dyn Maintainer>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_modulator(&mut self, m: Box<dyn Modulator>) {
        self.modulators.push(m);
    }

    pub fn register_receptor(&mut self, r: Box<dyn Receptor>) {
        self.receptors.push(r);
    }

    pub fn register_transform(&mut self, t: Box<dyn Transform>) {
        self.transforms.push(t);
    }

    pub fn register_effector(&mut self, e: Box<dyn Effector>) {
        self.effectors.push(e);
    }

    pub fn register_maintainer(&mut self, m: Box<dyn Maintainer>) {
        self.maintainers.push(m);
    }

    /// Resolves Transform execution order via the constraint solver. Must
    /// be called before the first frame; a cycle or missing provider is a
    /// fatal [`crate::error::SpaceError::Structural`] error (§4.3, §7).
    pub fn resolve_transform_order(&mut self) -> Result<()> {
        let specs: Vec<crate::constraint::TransformSpec> = self
            .transforms
            .iter()
            .enumerate()
            .map(|(i, t)| crate::constraint::TransformSpec {
                index: i,
                name: t.name().to_string(),
                provides: t.provides().to_vec(),
                requires: t.requires().to_vec(),
            })
            .collect();
        self.transform_order = crate::constraint::ConstraintSolver::order(&specs)?;
        Ok(())
    }

    /// Transforms in resolved topological order. Empty until
    /// [`Self::resolve_transform_order`] has run.
    pub fn transforms_in_order(&self) -> impl Iterator<Item = &dyn Transform> {
        self.transform_order.iter().map(move |&i| self.transforms[i].as_ref())
    }

    pub fn transform_at(&self, index: usize) -> &dyn Transform {
        self.transforms[index].as_ref()
    }

    pub fn transform_order(&self) -> &[usize] {
        &self.transform_order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::FacetKind;
    use std::collections::HashMap;

    fn state_facet(id: &str) -> Facet {
        Facet::new(id, FacetKind::State { content: id.to_string(), state: HashMap::new(), transition_renderers: None })
    }

    fn event_facet(id: &str) -> Facet {
        Facet::new(id, FacetKind::Event { content: id.to_string(), stream_id: None, ephemeral: false })
    }

    #[test]
    fn type_filter_matches_only_its_type_name() {
        let filter = FacetFilter::of_type("state");
        assert!(filter.matches(&state_facet("a")));
        assert!(!filter.matches(&event_facet("b")));
    }

    #[test]
    fn aspect_filter_selects_by_declared_aspect() {
        let filter = FacetFilter { aspect: Some("state"), ..Default::default() };
        assert!(filter.matches(&state_facet("a")));
        assert!(!filter.matches(&event_facet("b")));
    }

    #[test]
    fn attribute_filter_matches_a_specific_field_value() {
        let filter = FacetFilter { attribute: Some(("id".to_string(), serde_json::json!("a"))), ..Default::default() };
        assert!(filter.matches(&state_facet("a")));
        assert!(!filter.matches(&state_facet("b")));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = FacetFilter::default();
        assert!(filter.matches(&state_facet("a")));
        assert!(filter.matches(&event_facet("b")));
    }

    struct NamedTransform {
        name: &'static str,
        provides: Vec<String>,
        requires: Vec<String>,
    }

    impl Transform for NamedTransform {
        fn name(&self) -> &str {
            self.name
        }
        fn provides(&self) -> &[String] {
            &self.provides
        }
        fn requires(&self) -> &[String] {
            &self.requires
        }
        fn transform(&self, _state: &ReadonlyView) -> Result<Vec<Delta>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn resolve_transform_order_respects_provides_requires() {
        let mut registry = ComponentRegistry::new();
        registry.register_transform(Box::new(NamedTransform { name: "consumer", provides: vec![], requires: vec!["thing".into()] }));
        registry.register_transform(Box::new(NamedTransform { name: "producer", provides: vec!["thing".into()], requires: vec![] }));
        registry.resolve_transform_order().unwrap();
        let names: Vec<&str> = registry.transforms_in_order().map(|t| t.name()).collect();
        assert_eq!(names, vec!["producer", "consumer"]);
    }

    #[test]
    fn resolve_transform_order_falls_back_to_registration_order_when_unconstrained() {
        let mut registry = ComponentRegistry::new();
        registry.register_transform(Box::new(NamedTransform { name: "first", provides: vec![], requires: vec![] }));
        registry.register_transform(Box::new(NamedTransform { name: "second", provides: vec![], requires: vec![] }));
        registry.resolve_transform_order().unwrap();
        let names: Vec<&str> = registry.transforms_in_order().map(|t| t.name()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn resolve_transform_order_rejects_a_cycle() {
        let mut registry = ComponentRegistry::new();
        registry.register_transform(Box::new(NamedTransform { name: "a", provides: vec!["x".into()], requires: vec!["y".into()] }));
        registry.register_transform(Box::new(NamedTransform { name: "b", provides: vec!["y".into()], requires: vec!["x".into()] }));
        assert!(registry.resolve_transform_order().is_err());
    }
}
