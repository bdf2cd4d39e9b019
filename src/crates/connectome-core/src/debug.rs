//! The debug observer interface (§6): callbacks the scheduler fires during
//! frame processing. No required transport — the debug server and MCP
//! surface that consume these live outside this crate's scope.

use crate::event::SpaceEvent;
use crate::frame::Frame;
use crate::snapshot::FrameSnapshot;

/// Implemented by anything that wants visibility into frame processing.
/// All methods have no-op defaults so an observer only overrides what it
/// cares about.
pub trait DebugObserver: Send + Sync {
    fn on_frame_start(&self, _sequence: u64, _event_count: usize) {}
    fn on_frame_event(&self, _sequence: u64, _event: &SpaceEvent) {}
    fn on_frame_complete(&self, _frame: &Frame) {}
    fn on_outgoing_frame(&self, _frame: &Frame) {}
    fn on_rendered_context(&self, _activation_id: &str, _snapshot: &FrameSnapshot) {}
}

/// An observer that does nothing; the default when a space is constructed
/// without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl DebugObserver for NullObserver {}

/// Fans a single notification out to a list of observers, in registration
/// order, used by [`crate::scheduler::Space`] so callers can attach more
/// than one sink (e.g. a test recorder alongside the real debug server
/// bridge).
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn DebugObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, observer: Box<dyn DebugObserver>) {
        self.observers.push(observer);
    }
}

impl DebugObserver for ObserverList {
    fn on_frame_start(&self, sequence: u64, event_count: usize) {
        for o in &self.observers {
            o.on_frame_start(sequence, event_count);
        }
    }

    fn on_frame_event(&self, sequence: u64, event: &SpaceEvent) {
        for o in &self.observers {
            o.on_frame_event(sequence, event);
        }
    }

    fn on_frame_complete(&self, frame: &Frame) {
        for o in &self.observers {
            o.on_frame_complete(frame);
        }
    }

    fn on_outgoing_frame(&self, frame: &Frame) {
        for o in &self.observers {
            o.on_outgoing_frame(frame);
        }
    }

    fn on_rendered_context(&self, activation_id: &str, snapshot: &FrameSnapshot) {
        for o in &self.observers {
            o.on_rendered_context(activation_id, snapshot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingObserver(Arc<AtomicUsize>);
    impl DebugObserver for CountingObserver {
        fn on_frame_start(&self, _sequence: u64, _event_count: usize) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn observer_list_fans_out_to_every_registered_observer() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut list = ObserverList::new();
        list.push(Box::new(CountingObserver(counter.clone())));
        list.push(Box::new(CountingObserver(counter.clone())));
        list.on_frame_start(1, 0);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn null_observer_is_inert() {
        let observer = NullObserver;
        observer.on_frame_start(1, 0);
    }
}
