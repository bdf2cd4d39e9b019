use std::collections::HashMap;
use std::sync::Arc;

use connectome_core::{
    ComponentRegistry, Delta, ElementRef, Facet, FacetKind, FixedClock, FrameHistoryHandle, ReadonlyView, Receptor, Result, Space, SpaceConfig,
    SpaceEvent,
};
use criterion::{criterion_group, criterion_main, Criterion};

struct CounterReceptor {
    topics: Vec<String>,
}

impl Receptor for CounterReceptor {
    fn name(&self) -> &str {
        "CounterReceptor"
    }

    fn topics(&self) -> &[String] {
        &self.topics
    }

    fn receive(&self, _event: &SpaceEvent, state: &ReadonlyView) -> Result<Vec<Delta>> {
        if state.contains("counter") {
            Ok(vec![Delta::rewrite("counter", HashMap::from([("state".to_string(), serde_json::json!({"value": 1}))]))])
        } else {
            Ok(vec![Delta::add(Facet::new(
                "counter",
                FacetKind::State { content: "counter".into(), state: HashMap::new(), transition_renderers: None },
            ))])
        }
    }
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    registry.register_receptor(Box::new(CounterReceptor { topics: vec!["tick".to_string()] }));
    registry
}

/// Throughput of the four-phase scheduler over a quiet registry (one
/// Receptor, no Transforms/Effectors/Maintainers) — the floor cost of
/// `Space::run_frame` itself, mirroring the teacher stack's own
/// `graph_execution_bench`/`checkpoint_bench` shape.
fn frame_scheduling(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("run_frame_single_receptor", |b| {
        b.iter(|| {
            rt.block_on(async {
                let history = FrameHistoryHandle::new();
                let clock = Arc::new(FixedClock::starting_at(0, 1));
                let mut space = Space::new(registry(), history, clock, SpaceConfig::default(), None).unwrap();
                space.enqueue(SpaceEvent::new("tick", ElementRef::new("clock"), 0, serde_json::Value::Null));
                space.run_frame().await.unwrap()
            })
        })
    });
}

/// Rendering cost over a moderately long frame history, exercising the
/// replay-map walk the HUD does on every activation (§4.4).
fn render_history(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("render_200_frames", |b| {
        b.iter(|| {
            rt.block_on(async {
                let history = FrameHistoryHandle::new();
                let clock = Arc::new(FixedClock::starting_at(0, 1));
                let mut space = Space::new(registry(), history.clone(), clock, SpaceConfig::default(), None).unwrap();
                for _ in 0..200 {
                    space.enqueue(SpaceEvent::new("tick", ElementRef::new("clock"), 0, serde_json::Value::Null));
                    space.run_frame().await.unwrap();
                }
                let frames = history.snapshot();
                let view = space.readonly();
                connectome_core::render(&frames, &view, None, &connectome_core::RenderOptions::default())
            })
        })
    });
}

criterion_group!(benches, frame_scheduling, render_history);
criterion_main!(benches);
