//! Unified mode-aware search: lane candidates, reciprocal rank fusion, and
//! budgeted context assembly.

pub mod context;

use crate::constants::{DEFAULT_CANDIDATE_WINDOW, RRF_K};
use crate::types::FrameId;

pub use context::{
    AssembledContext, ContextBudget, ContextCandidate, ContextItem, ContextItemKind,
    build_context, count_tokens,
};

/// Which lanes contribute to a search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchMode {
    TextOnly,
    VectorOnly,
    /// Both lanes fused with reciprocal rank fusion; `alpha` weighs the text
    /// lane against the vector lane (0.5 = the symmetric RRF sum).
    Hybrid { alpha: f32 },
}

impl SearchMode {
    #[must_use]
    pub fn uses_text(&self) -> bool {
        matches!(self, SearchMode::TextOnly | SearchMode::Hybrid { .. })
    }

    #[must_use]
    pub fn uses_vector(&self) -> bool {
        matches!(self, SearchMode::VectorOnly | SearchMode::Hybrid { .. })
    }
}

/// One retrieval request against the recall pipeline.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub embedding: Option<Vec<f32>>,
    pub top_k: usize,
    pub mode: SearchMode,
    pub preview_max_bytes: usize,
    pub max_context_tokens: usize,
    pub snippet_max_tokens: usize,
    pub expansion_max_tokens: usize,
    pub as_of_ms: Option<u64>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            embedding: None,
            top_k: 8,
            mode: SearchMode::Hybrid { alpha: 0.5 },
            preview_max_bytes: 240,
            max_context_tokens: 1024,
            snippet_max_tokens: 96,
            expansion_max_tokens: 320,
            as_of_ms: None,
        }
    }
}

/// Which lane produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateSource {
    Text,
    Vector,
    StructuredMemory,
}

/// Identity of a ranked candidate: a store frame or a structured-memory fact.
/// Ordering puts frames before facts, each ascending by id, which doubles as
/// the deterministic tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CandidateId {
    Frame(FrameId),
    Fact(u64),
}

impl CandidateId {
    #[must_use]
    pub fn frame_id(&self) -> Option<FrameId> {
        match self {
            CandidateId::Frame(id) => Some(*id),
            CandidateId::Fact(_) => None,
        }
    }
}

/// One ranked hit produced by a lane.
#[derive(Debug, Clone)]
pub struct LaneHit {
    pub id: CandidateId,
    pub score: f32,
    pub source: CandidateSource,
    pub preview: Option<String>,
}

/// A candidate after fusion, carrying every lane that produced it.
#[derive(Debug, Clone)]
pub struct FusedCandidate {
    pub id: CandidateId,
    pub score: f64,
    pub sources: Vec<CandidateSource>,
    pub preview: Option<String>,
}

/// Per-lane candidate cap: at least the default window, or `top_k` if larger.
#[must_use]
pub fn candidate_window(top_k: usize) -> usize {
    top_k.max(DEFAULT_CANDIDATE_WINDOW)
}

/// Reciprocal rank fusion: `score(c) = Σ_lane weight_lane / (k + rank_lane)`
/// with ranks 1-based and `k = 60`. The result is a pure function of the lane
/// rankings; ties break by candidate id (lower frame id first).
#[must_use]
pub fn rrf_fuse(lanes: &[(f64, Vec<LaneHit>)]) -> Vec<FusedCandidate> {
    let mut fused: std::collections::BTreeMap<CandidateId, FusedCandidate> =
        std::collections::BTreeMap::new();
    for (weight, hits) in lanes {
        for (rank, hit) in hits.iter().enumerate() {
            let contribution = weight / (RRF_K + (rank as f64 + 1.0));
            let entry = fused.entry(hit.id).or_insert_with(|| FusedCandidate {
                id: hit.id,
                score: 0.0,
                sources: Vec::new(),
                preview: None,
            });
            entry.score += contribution;
            if !entry.sources.contains(&hit.source) {
                entry.sources.push(hit.source);
            }
            if entry.preview.is_none() {
                entry.preview = hit.preview.clone();
            }
        }
    }
    let mut candidates: Vec<FusedCandidate> = fused.into_values().collect();
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates
}

/// Pass-through "fusion" for single-lane modes: native scores, merged sources.
#[must_use]
pub fn single_lane(hits: Vec<LaneHit>) -> Vec<FusedCandidate> {
    hits.into_iter()
        .map(|hit| FusedCandidate {
            id: hit.id,
            score: f64::from(hit.score),
            sources: vec![hit.source],
            preview: hit.preview,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: CandidateId, score: f32, source: CandidateSource) -> LaneHit {
        LaneHit {
            id,
            score,
            source,
            preview: Some(format!("{id:?}")),
        }
    }

    #[test]
    fn rrf_is_a_pure_function_of_rankings() {
        let text = vec![
            hit(CandidateId::Frame(1), 9.0, CandidateSource::Text),
            hit(CandidateId::Frame(2), 5.0, CandidateSource::Text),
        ];
        let vector = vec![
            hit(CandidateId::Frame(2), 0.9, CandidateSource::Vector),
            hit(CandidateId::Frame(3), 0.2, CandidateSource::Vector),
        ];
        let fused = rrf_fuse(&[(1.0, text), (1.0, vector)]);

        // Frame 2 appears in both lanes: 1/(60+2) + 1/(60+1).
        assert_eq!(fused[0].id, CandidateId::Frame(2));
        let expected = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((fused[0].score - expected).abs() < 1e-12);
        assert_eq!(fused[0].sources.len(), 2);
        // Frames 1 and 3 both scored 1/61 vs 1/62; rank order follows.
        assert_eq!(fused[1].id, CandidateId::Frame(1));
        assert_eq!(fused[2].id, CandidateId::Frame(3));
    }

    #[test]
    fn rrf_ties_break_by_lower_frame_id() {
        let text = vec![hit(CandidateId::Frame(7), 1.0, CandidateSource::Text)];
        let vector = vec![hit(CandidateId::Frame(3), 1.0, CandidateSource::Vector)];
        let fused = rrf_fuse(&[(1.0, text), (1.0, vector)]);
        assert_eq!(fused[0].id, CandidateId::Frame(3));
        assert_eq!(fused[1].id, CandidateId::Frame(7));
        assert!((fused[0].score - fused[1].score).abs() < 1e-12);
    }

    #[test]
    fn candidate_window_has_a_floor() {
        assert_eq!(candidate_window(3), DEFAULT_CANDIDATE_WINDOW);
        assert_eq!(candidate_window(100), 100);
    }

    #[test]
    fn frames_order_before_facts() {
        assert!(CandidateId::Frame(u64::MAX) < CandidateId::Fact(0));
    }
}
