//! Frame snapshot capture (§4.5).
//!
//! At the end of Phase 2, before later frames have a chance to rewrite
//! earlier state, the scheduler asks the renderer how this frame renders
//! *right now* and attaches the result to the frame in-place. This is the
//! durable, subjective record consumed by compression (§4.6) and by the
//! replay invariant in §8 ("re-rendering F against the state at the end of
//! F reproduces the snapshot's `totalContent`").

use serde::{Deserialize, Serialize};

/// One fragment of rendered content, tagged with the facet ids it came from
/// so extraction utilities can deduplicate across overlapping ranges.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RenderedChunk {
    pub content: String,
    pub tokens: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub facet_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// The HUD's captured rendering of a single frame, fixed at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameSnapshot {
    pub chunks: Vec<RenderedChunk>,
    pub total_content: String,
    pub total_tokens: u32,
    pub role: String,
    pub captured_at: i64,
    pub has_content: bool,
}

impl FrameSnapshot {
    pub fn new(chunks: Vec<RenderedChunk>, role: impl Into<String>, captured_at: i64) -> Self {
        let total_content = chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("");
        let total_tokens = chunks.iter().map(|c| c.tokens).sum();
        let has_content = chunks.iter().any(|c| !c.content.is_empty());
        Self { chunks, total_content, total_tokens, role: role.into(), captured_at, has_content }
    }

    pub fn empty(role: impl Into<String>, captured_at: i64) -> Self {
        Self::new(Vec::new(), role, captured_at)
    }

    /// All facet ids referenced by this snapshot's chunks, deduplicated and
    /// in first-seen order.
    pub fn facet_ids(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for chunk in &self.chunks {
            for id in &chunk.facet_ids {
                if seen.insert(id.clone()) {
                    out.push(id.clone());
                }
            }
        }
        out
    }
}

/// Selects the snapshots for frames in `[from, to]` (inclusive) and
/// deduplicates their facet references — used by the compression engine
/// when it needs the rendered content of a candidate range (§4.6).
pub fn select_range<'a>(frames: &'a [crate::frame::Frame], from: u64, to: u64) -> Vec<&'a FrameSnapshot> {
    frames
        .iter()
        .filter(|f| f.sequence >= from && f.sequence <= to)
        .filter_map(|f| f.rendered_snapshot.as_ref())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_content_concatenates_chunks_in_order() {
        let snapshot = FrameSnapshot::new(
            vec![RenderedChunk { content: "a".into(), tokens: 1, ..Default::default() }, RenderedChunk { content: "b".into(), tokens: 2, ..Default::default() }],
            "user",
            0,
        );
        assert_eq!(snapshot.total_content, "ab");
        assert_eq!(snapshot.total_tokens, 3);
        assert!(snapshot.has_content);
    }

    #[test]
    fn empty_snapshot_has_no_content() {
        let snapshot = FrameSnapshot::empty("system", 0);
        assert!(!snapshot.has_content);
        assert_eq!(snapshot.total_content, "");
    }

    #[test]
    fn facet_ids_are_deduplicated_in_first_seen_order() {
        let snapshot = FrameSnapshot::new(
            vec![
                RenderedChunk { content: "a".into(), tokens: 1, facet_ids: vec!["f1".into(), "f2".into()], ..Default::default() },
                RenderedChunk { content: "b".into(), tokens: 1, facet_ids: vec!["f2".into(), "f3".into()], ..Default::default() },
            ],
            "user",
            0,
        );
        assert_eq!(snapshot.facet_ids(), vec!["f1".to_string(), "f2".to_string(), "f3".to_string()]);
    }
}
