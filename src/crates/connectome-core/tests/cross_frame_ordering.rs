//! §8 scenario 5: a ping fans out to two follow-up events dispatched by an
//! Effector, both of which land together a frame later and resolve to a
//! pong the frame after that. No event should ever be observed out of the
//! frame in which it was actually enqueued.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use connectome_core::{
    ComponentRegistry, Delta, Effector, EffectorResult, ElementRef, Facet, FacetFilter, FacetKind, FixedClock, FrameHistoryHandle, ReadonlyView,
    Receptor, Result, Space, SpaceConfig, SpaceEvent,
};
use serde_json::json;

type Log = Arc<Mutex<Vec<(u64, String)>>>;

struct PingReceptor {
    topics: Vec<String>,
    log: Log,
}

impl Receptor for PingReceptor {
    fn name(&self) -> &str {
        "PingReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        self.log.lock().unwrap().push((1, event.topic.clone()));
        Ok(vec![Delta::add(Facet::new("ping-marker", FacetKind::Event { content: "ping-seen".into(), stream_id: None, ephemeral: true }))])
    }
}

/// Fans a single ping-marker facet out into two follow-up events for the
/// next frame (the "enqueues two events" half of the scenario).
struct FanoutEffector;

#[async_trait]
impl Effector for FanoutEffector {
    fn name(&self) -> &str {
        "FanoutEffector"
    }
    fn facet_filters(&self) -> Vec<FacetFilter> {
        vec![FacetFilter::of_type("event")]
    }
    async fn effect(&mut self, matched: &[&Facet], _state: &ReadonlyView) -> Result<EffectorResult> {
        if matched.iter().all(|f| f.id != "ping-marker") {
            return Ok(EffectorResult::empty());
        }
        Ok(EffectorResult::with_events(vec![
            SpaceEvent::new("followup:a", ElementRef::new("fanout"), 0, json!({})),
            SpaceEvent::new("followup:b", ElementRef::new("fanout"), 0, json!({})),
        ]))
    }
}

struct FollowupReceptor {
    topics: Vec<String>,
    log: Log,
}

impl Receptor for FollowupReceptor {
    fn name(&self) -> &str {
        "FollowupReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        self.log.lock().unwrap().push((2, event.topic.clone()));
        Ok(vec![Delta::add(Facet::new(
            format!("seen-{}", event.topic.replace(':', "-")),
            FacetKind::Event { content: "followup-seen".into(), stream_id: None, ephemeral: true },
        ))])
    }
}

struct PongEffector;

#[async_trait]
impl Effector for PongEffector {
    fn name(&self) -> &str {
        "PongEffector"
    }
    fn facet_filters(&self) -> Vec<FacetFilter> {
        vec![FacetFilter { attribute: Some(("content".to_string(), json!("followup-seen"))), ..Default::default() }]
    }
    async fn effect(&mut self, matched: &[&Facet], _state: &ReadonlyView) -> Result<EffectorResult> {
        if matched.len() < 2 {
            return Ok(EffectorResult::empty());
        }
        Ok(EffectorResult::with_events(vec![SpaceEvent::new("pong", ElementRef::new("pong-source"), 0, json!({}))]))
    }
}

struct PongReceptor {
    topics: Vec<String>,
    log: Log,
}

impl Receptor for PongReceptor {
    fn name(&self) -> &str {
        "PongReceptor"
    }
    fn topics(&self) -> &[String] {
        &self.topics
    }
    fn receive(&self, event: &SpaceEvent, _state: &ReadonlyView) -> Result<Vec<Delta>> {
        self.log.lock().unwrap().push((3, event.topic.clone()));
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn ping_resolves_to_pong_over_exactly_three_frames_in_order() {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = ComponentRegistry::new();
    registry.register_receptor(Box::new(PingReceptor { topics: vec!["ping".into()], log: log.clone() }));
    registry.register_effector(Box::new(FanoutEffector));
    registry.register_receptor(Box::new(FollowupReceptor { topics: vec!["followup:a".into(), "followup:b".into()], log: log.clone() }));
    registry.register_effector(Box::new(PongEffector));
    registry.register_receptor(Box::new(PongReceptor { topics: vec!["pong".into()], log: log.clone() }));

    let history = FrameHistoryHandle::new();
    let clock = Arc::new(FixedClock::starting_at(0, 1));
    let mut space = Space::new(registry, history, clock, SpaceConfig::default(), None).unwrap();

    space.enqueue(SpaceEvent::new("ping", ElementRef::new("p"), 0, json!({})));
    let frame_n = space.run_frame().await.unwrap();
    let frame_n1 = space.run_frame().await.unwrap();
    let frame_n2 = space.run_frame().await.unwrap();

    assert_eq!((frame_n.sequence, frame_n1.sequence, frame_n2.sequence), (1, 2, 3));

    let entries = log.lock().unwrap();
    assert_eq!(entries[0], (1, "ping".to_string()));
    let mut followups: Vec<&str> = entries[1..3].iter().map(|(_, t)| t.as_str()).collect();
    followups.sort();
    assert_eq!(followups, vec!["followup:a", "followup:b"]);
    assert_eq!(entries[3], (3, "pong".to_string()));
    assert!(entries.windows(2).all(|w| w[0].0 <= w[1].0));
}
