//! The VEIL state manager (§4.2): the authoritative facet map, stream map,
//! scope set, agent map, and frame history.
//!
//! All other components operate only through [`ReadonlyView`] and
//! [`Delta`]s — invariant enforcement (unique ids, dangling state-change
//! targets, monotone sequencing) is owned entirely here.

use crate::delta::Delta;
use crate::error::{Result, SpaceError};
use crate::facet::{Facet, FacetKind};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An identified communication context, e.g. a chat channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Stream {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Stream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), label: None }
    }
}

/// Identity and runtime flags for an agent attached to the space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

impl AgentInfo {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), active: true }
    }
}

/// Whether a removed facet is still retained as a tombstone (`Hide`, e.g.
/// an explicit `removeFacet`, rendered invisible but auditable) or fully
/// forgotten (`Delete`, e.g. an expired ephemeral facet, never persisted).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalKind {
    Hide,
    Delete,
}

#[derive(Clone)]
struct FacetEntry {
    facet: Facet,
    added_at: u64,
}

/// Immutable snapshot of the facet set as of a point in frame processing.
/// Cloned eagerly rather than borrowed so a phase's components can hold a
/// view stable across the whole phase while the manager prepares the next
/// one.
#[derive(Debug, Clone, Default)]
pub struct ReadonlyView {
    facets: HashMap<String, Facet>,
}

impl ReadonlyView {
    pub fn get(&self, id: &str) -> Option<&Facet> {
        self.facets.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.facets.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Facet> {
        self.facets.values()
    }

    pub fn len(&self) -> usize {
        self.facets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facets.is_empty()
    }

    pub fn by_type(&self, type_name: &str) -> Vec<&Facet> {
        self.facets.values().filter(|f| f.type_name() == type_name).collect()
    }

    pub fn by_aspect(&self, pred: impl Fn(&Facet) -> bool) -> Vec<&Facet> {
        self.facets.values().filter(|f| pred(f)).collect()
    }

    pub fn by_stream(&self, stream_id: &str) -> Vec<&Facet> {
        self.facets.values().filter(|f| f.stream_id() == Some(stream_id)).collect()
    }
}

/// The result of applying a batch of deltas: how many were applied
/// cleanly, and the recoverable validation diagnostics for the rest (§7 —
/// the offending operation is dropped, a diagnostic event is enqueued by
/// the caller for the next frame).
#[derive(Debug, Default)]
pub struct ApplyOutcome {
    pub applied: usize,
    pub diagnostics: Vec<SpaceError>,
}

impl ApplyOutcome {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

#[derive(Default)]
pub struct VeilState {
    facets: HashMap<String, FacetEntry>,
    streams: HashMap<String, Stream>,
    scopes: HashSet<String>,
    agents: HashMap<String, AgentInfo>,
    removed: HashMap<String, RemovalKind>,
    history: Vec<Frame>,
    current_sequence: u64,
}

impl VeilState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_sequence(&self) -> u64 {
        self.current_sequence
    }

    pub fn history(&self) -> &[Frame] {
        &self.history
    }

    pub fn register_stream(&mut self, stream: Stream) {
        self.streams.insert(stream.id.clone(), stream);
    }

    pub fn register_agent(&mut self, agent: AgentInfo) {
        self.agents.insert(agent.id.clone(), agent);
    }

    pub fn agent(&self, id: &str) -> Option<&AgentInfo> {
        self.agents.get(id)
    }

    pub fn register_scope(&mut self, scope: impl Into<String>) {
        self.scopes.insert(scope.into());
    }

    /// Immutable snapshot of the current facet set, handed to the next
    /// phase's components.
    pub fn readonly(&self) -> ReadonlyView {
        ReadonlyView { facets: self.facets.iter().map(|(id, entry)| (id.clone(), entry.facet.clone())).collect() }
    }

    /// Applies a batch of deltas atomically at a phase boundary. Returns
    /// how many applied cleanly and which were dropped as recoverable
    /// validation failures (unknown rewrite/remove id, facet conflict,
    /// dangling state-change targets).
    pub fn apply_deltas(&mut self, deltas: &[Delta], at_sequence: u64) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for delta in deltas {
            match self.apply_one(delta, at_sequence) {
                Ok(()) => outcome.applied += 1,
                Err(e) => outcome.diagnostics.push(e),
            }
        }
        outcome
    }

    fn apply_one(&mut self, delta: &Delta, at_sequence: u64) -> Result<()> {
        match delta {
            Delta::AddFacet { facet } => self.add_facet(facet.clone(), at_sequence),
            Delta::RewriteFacet { id, changes } => self.rewrite_facet(id, changes),
            Delta::RemoveFacet { id } => self.remove_facet(id),
        }
    }

    fn add_facet(&mut self, mut facet: Facet, at_sequence: u64) -> Result<()> {
        if let FacetKind::StateChange { target_facet_ids, .. } = &mut facet.kind {
            target_facet_ids.retain(|target| match self.facets.get(target) {
                Some(entry) => entry.facet.has_state_aspect(),
                None => {
                    tracing::warn!(target, "state-change facet references a dangling target, dropping reference");
                    false
                }
            });
            if target_facet_ids.is_empty() {
                return Err(SpaceError::Validation(format!("state-change facet '{}' has no valid targets", facet.id)));
            }
        }

        if let Some(existing) = self.facets.get(&facet.id) {
            if existing.facet == facet {
                return Ok(());
            }
            return Err(SpaceError::FacetConflict(facet.id));
        }

        self.removed.remove(&facet.id);
        self.facets.insert(facet.id.clone(), FacetEntry { facet, added_at: at_sequence });
        Ok(())
    }

    fn rewrite_facet(&mut self, id: &str, changes: &HashMap<String, serde_json::Value>) -> Result<()> {
        let entry = self.facets.get_mut(id).ok_or_else(|| SpaceError::UnknownFacetId(id.to_string()))?;
        apply_changes(&mut entry.facet, changes);
        Ok(())
    }

    fn remove_facet(&mut self, id: &str) -> Result<()> {
        if self.facets.remove(id).is_none() {
            return Err(SpaceError::UnknownFacetId(id.to_string()));
        }
        self.removed.insert(id.to_string(), RemovalKind::Hide);
        Ok(())
    }

    /// Drops ephemeral facets that were added before `current_frame`,
    /// forgetting them entirely (never persisted, per §3's ephemeral
    /// invariant). Called by the scheduler once per frame after Phase 4.
    pub fn sweep_ephemeral(&mut self, current_frame: u64) -> Vec<String> {
        let expired: Vec<String> = self
            .facets
            .iter()
            .filter(|(_, entry)| entry.facet.has_ephemeral_aspect() && entry.added_at < current_frame)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.facets.remove(id);
            self.removed.insert(id.clone(), RemovalKind::Delete);
        }
        expired
    }

    pub fn removal_kind(&self, id: &str) -> Option<RemovalKind> {
        self.removed.get(id).copied()
    }

    /// Appends a sealed frame to history. Enforces the strictly-increasing,
    /// never-skipped sequence invariant (§3, §8).
    pub fn record_frame(&mut self, frame: Frame) -> Result<()> {
        if frame.sequence != self.current_sequence + 1 {
            return Err(SpaceError::InvariantViolation(format!(
                "expected frame sequence {}, got {}",
                self.current_sequence + 1,
                frame.sequence
            )));
        }
        self.current_sequence = frame.sequence;
        self.history.push(frame);
        Ok(())
    }

    /// Captures enough state to undo everything applied after this point,
    /// used by the scheduler to roll back Phase 2 when a required
    /// Transform fails or the fixed-point iteration does not converge
    /// (§4.1, §7).
    pub fn checkpoint(&self) -> VeilCheckpoint {
        VeilCheckpoint { facets: self.facets.clone(), removed: self.removed.clone() }
    }

    pub fn restore(&mut self, checkpoint: VeilCheckpoint) {
        self.facets = checkpoint.facets;
        self.removed = checkpoint.removed;
    }

    pub fn facets_by_type(&self, type_name: &str) -> Vec<&Facet> {
        self.facets.values().map(|e| &e.facet).filter(|f| f.type_name() == type_name).collect()
    }

    pub fn facets_by_aspect(&self, pred: impl Fn(&Facet) -> bool) -> Vec<&Facet> {
        self.facets.values().map(|e| &e.facet).filter(|f| pred(f)).collect()
    }
}

/// An opaque, restorable copy of the live facet set (§4.1 Phase 2 abort).
pub struct VeilCheckpoint {
    facets: HashMap<String, FacetEntry>,
    removed: HashMap<String, RemovalKind>,
}

/// Overlays `changes` onto a facet: `state` is shallow-merged, `content` is
/// replaced wholesale, `children` is replaced wholesale when present.
fn apply_changes(facet: &mut Facet, changes: &HashMap<String, serde_json::Value>) {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_facet(id: &str) -> Facet {
        Facet::new(id, FacetKind::State { content: "box".into(), state: HashMap::from([("isOpen".to_string(), json!(false))]), transition_renderers: None })
    }

    #[test]
    fn readding_structurally_equal_facet_is_a_no_op() {
        let mut veil = VeilState::new();
        let facet = state_facet("box-7");
        veil.apply_deltas(&[Delta::add(facet.clone())], 1);
        let outcome = veil.apply_deltas(&[Delta::add(facet)], 1);
        assert!(outcome.is_clean());
        assert_eq!(outcome.applied, 1);
    }

    #[test]
    fn readding_conflicting_facet_is_a_diagnostic() {
        let mut veil = VeilState::new();
        veil.apply_deltas(&[Delta::add(state_facet("box-7"))], 1);
        let conflicting = Facet::new("box-7", FacetKind::Event { content: "different".into(), stream_id: None, ephemeral: false });
        let outcome = veil.apply_deltas(&[Delta::add(conflicting)], 1);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn rewrite_merges_state_shallowly() {
        let mut veil = VeilState::new();
        veil.apply_deltas(&[Delta::add(state_facet("box-7"))], 1);
        let changes = HashMap::from([("state".to_string(), json!({"isOpen": true}))]);
        veil.apply_deltas(&[Delta::rewrite("box-7", changes)], 2);
        let view = veil.readonly();
        let facet = view.get("box-7").unwrap();
        if let FacetKind::State { state, .. } = &facet.kind {
            assert_eq!(state.get("isOpen"), Some(&json!(true)));
        } else {
            panic!("expected state facet");
        }
    }

    #[test]
    fn rewrite_of_unknown_id_is_a_diagnostic() {
        let mut veil = VeilState::new();
        let outcome = veil.apply_deltas(&[Delta::rewrite("missing", HashMap::new())], 1);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn state_change_with_dangling_target_is_dropped() {
        let mut veil = VeilState::new();
        let state_change = Facet::new(
            "sc1",
            FacetKind::StateChange { target_facet_ids: vec!["nonexistent".into()], changes: HashMap::new(), ephemeral: true },
        );
        let outcome = veil.apply_deltas(&[Delta::add(state_change)], 1);
        assert_eq!(outcome.applied, 0);
        assert_eq!(outcome.diagnostics.len(), 1);
    }

    #[test]
    fn ephemeral_facets_are_swept_after_their_producing_frame() {
        let mut veil = VeilState::new();
        let ephemeral = Facet::new("e1", FacetKind::Event { content: "tick".into(), stream_id: None, ephemeral: true });
        veil.apply_deltas(&[Delta::add(ephemeral)], 1);
        assert!(veil.readonly().contains("e1"));
        let expired = veil.sweep_ephemeral(2);
        assert_eq!(expired, vec!["e1".to_string()]);
        assert!(!veil.readonly().contains("e1"));
        assert_eq!(veil.removal_kind("e1"), Some(RemovalKind::Delete));
    }

    #[test]
    fn checkpoint_and_restore_undoes_intervening_deltas() {
        let mut veil = VeilState::new();
        veil.apply_deltas(&[Delta::add(state_facet("box-7"))], 1);
        let checkpoint = veil.checkpoint();
        veil.apply_deltas(&[Delta::add(state_facet("box-8"))], 2);
        assert!(veil.readonly().contains("box-8"));
        veil.restore(checkpoint);
        assert!(veil.readonly().contains("box-7"));
        assert!(!veil.readonly().contains("box-8"));
    }

    #[test]
    fn record_frame_enforces_monotone_sequence() {
        let mut veil = VeilState::new();
        let frame = Frame::new(1, 0, Vec::new(), Vec::new());
        assert!(veil.record_frame(frame).is_ok());
        let gap_frame = Frame::new(3, 0, Vec::new(), Vec::new());
        assert!(veil.record_frame(gap_frame).is_err());
    }
}
