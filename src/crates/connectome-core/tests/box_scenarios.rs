//! End-to-end scenarios from §8: a button dispensing a box, and an
//! existing box transitioning open, each driven through a real [`Space`]
//! rather than unit-level component calls.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use connectome_core::{
    ComponentRegistry, Delta, Effector, EffectorResult, ElementRef, Facet, FacetFilter, FacetKind, FixedClock, FrameHistoryHandle, ReadonlyView,
    Receptor, Result, Space, SpaceConfig, SpaceEvent, Transform,
};
use serde_json::json;

struct ButtonReceptor {
    topics: Vec<String>,
}

impl Receptor for ButtonReceptor {
    fn name(&self) -> &str {
        "ButtonReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, _event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        Ok(vec![Delta::add(Facet::new(
            "button-press-1",
            FacetKind::Event { content: "button-press".into(), stream_id: None, ephemeral: true },
        ))])
    }
}

struct DispenserEffector;

#[async_trait]
impl Effector for DispenserEffector {
    fn name(&self) -> &str {
        "DispenserEffector"
    }
    fn facet_filters(&self) -> Vec<FacetFilter> {
        vec![FacetFilter { attribute: Some(("content".to_string(), json!("button-press"))), ..Default::default() }]
    }
    async fn effect(&mut self, matched: &[&Facet], _state: &ReadonlyView) -> Result<EffectorResult> {
        if matched.is_empty() {
            return Ok(EffectorResult::empty());
        }
        Ok(EffectorResult::with_events(vec![SpaceEvent::new(
            "element:create",
            ElementRef::new("dispenser"),
            0,
            json!({"component": "BoxComponent", "boxId": 7}),
        )]))
    }
}

struct BoxCreateReceptor {
    topics: Vec<String>,
}

impl Receptor for BoxCreateReceptor {
    fn name(&self) -> &str {
        "BoxCreateReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        let box_id = event.payload.get("boxId").and_then(|v| v.as_i64()).unwrap_or(7);
        let facet_id = format!("box-{box_id}");
        Ok(vec![
            Delta::add(Facet::new(
                facet_id,
                FacetKind::State {
                    content: "a plain cardboard box".into(),
                    state: HashMap::from([("isOpen".to_string(), json!(false))]),
                    transition_renderers: None,
                },
            )),
            Delta::add(Facet::new(
                "activation-dispense",
                FacetKind::AgentActivation { source: "dispenser".into(), reason: "box dispensed".into(), priority: 0, target_agent_id: None, stream_ref: None },
            )),
        ])
    }
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register_receptor(Box::new(ButtonReceptor { topics: vec!["button:press".into()] }));
    registry.register_effector(Box::new(DispenserEffector));
    registry.register_receptor(Box::new(BoxCreateReceptor { topics: vec!["element:create".into()] }));
    registry
}

#[tokio::test]
async fn button_press_dispenses_a_closed_box_over_two_frames() {
    let history = FrameHistoryHandle::new();
    let clock = Arc::new(FixedClock::starting_at(0, 1));
    let mut space = Space::new(registry(), history, clock, SpaceConfig::default(), None).unwrap();

    space.enqueue(SpaceEvent::new("button:press", ElementRef::new("button-1"), 0, json!({})));
    let frame1 = space.run_frame().await.unwrap();
    assert!(frame1.change_set().added.iter().any(|id| id == "button-press-1"));

    // DispenserEffector matched the button-press facet in frame 1's Phase 3
    // and queued `element:create`, which frame 2's Phase 1 turns into the
    // box element and its activation.
    let frame2 = space.run_frame().await.unwrap();
    assert!(frame2.change_set().added.iter().any(|id| id == "box-7"));
    let view = space.readonly();
    let box_facet = view.get("box-7").unwrap();
    match &box_facet.kind {
        FacetKind::State { state, .. } => assert_eq!(state.get("isOpen"), Some(&json!(false))),
        other => panic!("expected a state facet, got {other:?}"),
    }
    assert_eq!(view.by_type("agent-activation").len(), 1);
}

struct SeedReceptor {
    topics: Vec<String>,
}

impl Receptor for SeedReceptor {
    fn name(&self) -> &str {
        "SeedReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, _event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        Ok(vec![Delta::add(Facet::new(
            "box-7",
            FacetKind::State {
                content: "a blue box".into(),
                state: HashMap::from([("isOpen".to_string(), json!(false)), ("color".to_string(), json!("blue"))]),
                transition_renderers: None,
            },
        ))])
    }
}

struct OpenBoxReceptor {
    topics: Vec<String>,
}

impl Receptor for OpenBoxReceptor {
    fn name(&self) -> &str {
        "OpenBoxReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        let box_id = event.payload.get("boxId").and_then(|v| v.as_i64()).unwrap_or(7);
        let method = event.payload.get("method").and_then(|v| v.as_str()).unwrap_or("normally");
        Ok(vec![
            Delta::add(Facet::new(
                "box-open-event",
                FacetKind::Event { content: format!("\u{1f4a5} The box opens {method}!"), stream_id: None, ephemeral: true },
            )),
            Delta::add(Facet::new(
                "state-change-box-7",
                FacetKind::StateChange {
                    target_facet_ids: vec![format!("box-{box_id}")],
                    changes: HashMap::from([("isOpen".to_string(), json!(true))]),
                    ephemeral: true,
                },
            )),
            Delta::add(Facet::new(
                "activation-open",
                FacetKind::AgentActivation { source: "box-7".into(), reason: "box opened".into(), priority: 0, target_agent_id: None, stream_ref: None },
            )),
        ])
    }
}

struct BoxStateTransform {
    provides: Vec<String>,
}

impl Transform for BoxStateTransform {
    fn name(&self) -> &str {
        "BoxStateTransform"
    }
    fn provides(&self) -> &[String] {
        &self.provides
    }
    fn transform(&self, state: &ReadonlyView) -> Result<Vec<Delta>> {
        let mut deltas = Vec::new();
        for facet in state.by_type("state-change") {
            if let FacetKind::StateChange { target_facet_ids, changes, .. } = &facet.kind {
                for target in target_facet_ids {
                    deltas.push(Delta::rewrite(target.clone(), changes.clone()));
                }
                deltas.push(Delta::remove(facet.id.clone()));
            }
        }
        Ok(deltas)
    }
}

fn box_is_open(view: &ReadonlyView) -> Option<bool> {
    match &view.get("box-7")?.kind {
        FacetKind::State { state, .. } => state.get("isOpen").and_then(|v| v.as_bool()),
        _ => None,
    }
}

fn registry_for_open_scenario() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register_receptor(Box::new(SeedReceptor { topics: vec!["box:seed".into()] }));
    registry.register_receptor(Box::new(OpenBoxReceptor { topics: vec!["box:open".into()] }));
    registry.register_transform(Box::new(BoxStateTransform { provides: vec!["box-state-transition".into()] }));
    registry
}

#[tokio::test]
async fn opening_an_existing_box_rewrites_its_state_and_consumes_the_staged_change() {
    let history = FrameHistoryHandle::new();
    let clock = Arc::new(FixedClock::starting_at(0, 1));
    let mut space = Space::new(registry_for_open_scenario(), history, clock, SpaceConfig::default(), None).unwrap();

    space.enqueue(SpaceEvent::new("box:seed", ElementRef::new("setup"), 0, json!({})));
    space.run_frame().await.unwrap();
    assert_eq!(box_is_open(&space.readonly()), Some(false));

    space.enqueue(SpaceEvent::new("box:open", ElementRef::new("console-1"), 0, json!({"boxId": 7, "method": "gently"})));
    let frame = space.run_frame().await.unwrap();
    assert_eq!(frame.sequence, 2);

    // The BoxStateTransform consumes the staged state-change facet on the
    // frame it landed in (same-phase re-run within the fixed point), so the
    // rewrite and removal are both visible by the time this frame seals.
    let view = space.readonly();
    assert_eq!(box_is_open(&view), Some(true));
    assert!(!view.contains("state-change-box-7"));
}
