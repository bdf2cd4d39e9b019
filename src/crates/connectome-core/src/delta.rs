//! VEIL deltas: the only mechanism for mutating state (§3).
//!
//! A delta is produced by a Receptor or Transform and buffered until the
//! end of the phase that emitted it, then applied atomically by
//! [`crate::veil::VeilState::apply_deltas`].

use crate::facet::Facet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Delta {
    /// Insert a new facet. A no-op if a facet with the same id already
    /// exists and is structurally equal; otherwise a conflict error.
    #[serde(rename = "addFacet")]
    AddFacet { facet: Facet },

    /// Merge `changes` into an existing facet: `state` is overlaid
    /// shallowly, `content` is replaced wholesale, `children` is replaced
    /// wholesale when present in `changes`.
    #[serde(rename = "rewriteFacet")]
    RewriteFacet { id: String, changes: HashMap<String, Value> },

    /// Remove a facet from the live state.
    #[serde(rename = "removeFacet")]
    RemoveFacet { id: String },
}

impl Delta {
    pub fn add(facet: Facet) -> Self {
        Self::AddFacet { facet }
    }

    pub fn rewrite(id: impl Into<String>, changes: HashMap<String, Value>) -> Self {
        Self::RewriteFacet { id: id.into(), changes }
    }

    pub fn remove(id: impl Into<String>) -> Self {
        Self::RemoveFacet { id: id.into() }
    }

    pub fn target_id(&self) -> &str {
        match self {
            Delta::AddFacet { facet } => &facet.id,
            Delta::RewriteFacet { id, .. } => id,
            Delta::RemoveFacet { id } => id,
        }
    }

    /// The inverse delta for the invariant in §8: applying a frame's deltas
    /// in reverse, with `addFacet` <-> `removeFacet` and `rewriteFacet`
    /// restoring its stored old values, must reproduce the pre-frame state
    /// bit-for-bit. `old_facet`/`old_changes` are the values captured by the
    /// scheduler before this delta was applied.
    pub fn invert(&self, old_facet: Option<Facet>, old_changes: Option<HashMap<String, Value>>) -> Option<Delta> {
        match self {
            Delta::AddFacet { facet } => Some(Delta::RemoveFacet { id: facet.id.clone() }),
            Delta::RewriteFacet { id, .. } => old_changes.map(|changes| Delta::RewriteFacet { id: id.clone(), changes }),
            Delta::RemoveFacet { id } => old_facet.map(|facet| {
                debug_assert_eq!(&facet.id, id);
                Delta::AddFacet { facet }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facet::FacetKind;

    #[test]
    fn add_facet_inverts_to_remove_facet() {
        let facet = Facet::new("f1", FacetKind::Event { content: "hi".into(), stream_id: None, ephemeral: false });
        let delta = Delta::add(facet);
        let inverse = delta.invert(None, None).unwrap();
        assert_eq!(inverse, Delta::RemoveFacet { id: "f1".into() });
    }

    #[test]
    fn remove_facet_inverts_to_add_facet_with_old_value() {
        let facet = Facet::new("f1", FacetKind::Event { content: "hi".into(), stream_id: None, ephemeral: false });
        let delta = Delta::remove("f1");
        let inverse = delta.invert(Some(facet.clone()), None).unwrap();
        assert_eq!(inverse, Delta::AddFacet { facet });
    }

    #[test]
    fn target_id_reads_the_affected_facet() {
        assert_eq!(Delta::remove("x").target_id(), "x");
        assert_eq!(Delta::rewrite("y", HashMap::new()).target_id(), "y");
    }
}
