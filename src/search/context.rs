//! Token-budgeted context assembly.
//!
//! Ranked candidates become context items: the first is expanded, later ones
//! are snippets, and candidates without a preview degrade to metadata-only
//! surrogates. A whitespace word count meters every budget; when an item would
//! overflow the total budget it is clipped to the remaining tokens and
//! assembly stops.

use super::{CandidateId, CandidateSource, FusedCandidate};
use crate::index::lex::truncate_utf8;

/// Assembly parameters, all in whitespace-token units except the byte clamp.
#[derive(Debug, Clone, Copy)]
pub struct ContextBudget {
    pub top_k: usize,
    pub preview_max_bytes: usize,
    pub max_context_tokens: usize,
    pub snippet_max_tokens: usize,
    pub expansion_max_tokens: usize,
}

/// One candidate entering assembly.
#[derive(Debug, Clone)]
pub struct ContextCandidate {
    pub id: CandidateId,
    pub score: f32,
    pub sources: Vec<CandidateSource>,
    pub preview: Option<String>,
    /// Metadata placeholder used when no preview text exists.
    pub surrogate_label: String,
}

impl From<FusedCandidate> for ContextCandidate {
    fn from(candidate: FusedCandidate) -> Self {
        let surrogate_label = match candidate.id {
            CandidateId::Frame(id) => format!("[frame {id}]"),
            CandidateId::Fact(id) => format!("[fact {id}]"),
        };
        Self {
            id: candidate.id,
            score: candidate.score as f32,
            sources: candidate.sources,
            preview: candidate.preview,
            surrogate_label,
        }
    }
}

/// How an item entered the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextItemKind {
    Expanded,
    Snippet,
    Surrogate,
}

/// One assembled context item.
#[derive(Debug, Clone)]
pub struct ContextItem {
    pub id: CandidateId,
    pub kind: ContextItemKind,
    pub sources: Vec<CandidateSource>,
    pub score: f32,
    pub text: String,
    pub tokens: usize,
}

/// Assembled, budget-conforming context.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub items: Vec<ContextItem>,
    pub total_tokens: usize,
}

/// Whitespace-delimited word count.
#[must_use]
pub fn count_tokens(text: &str) -> usize {
    text.split_whitespace().count()
}

/// First `max_tokens` whitespace words, re-joined with single spaces.
fn clip_tokens(text: &str, max_tokens: usize) -> (String, usize) {
    let words: Vec<&str> = text.split_whitespace().take(max_tokens).collect();
    let count = words.len();
    (words.join(" "), count)
}

/// Assembles the final context from ranked candidates.
#[must_use]
pub fn build_context(mut candidates: Vec<ContextCandidate>, budget: &ContextBudget) -> AssembledContext {
    for candidate in &mut candidates {
        if candidate.score.is_nan() {
            candidate.score = 0.0;
        }
    }
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    candidates.truncate(budget.top_k);

    let mut context = AssembledContext::default();
    for (position, candidate) in candidates.into_iter().enumerate() {
        let remaining = budget.max_context_tokens - context.total_tokens;
        if remaining == 0 {
            break;
        }

        let (kind, raw_text, kind_cap) = match &candidate.preview {
            Some(preview) => {
                let clamped = truncate_utf8(preview, budget.preview_max_bytes).to_string();
                if position == 0 {
                    (ContextItemKind::Expanded, clamped, budget.expansion_max_tokens)
                } else {
                    (ContextItemKind::Snippet, clamped, budget.snippet_max_tokens)
                }
            }
            None => (
                ContextItemKind::Surrogate,
                candidate.surrogate_label.clone(),
                budget.snippet_max_tokens,
            ),
        };

        let cap = kind_cap.min(remaining);
        let (text, tokens) = clip_tokens(&raw_text, cap);
        if tokens == 0 {
            continue;
        }
        let clipped_by_budget = count_tokens(&raw_text).min(kind_cap) > remaining;
        context.total_tokens += tokens;
        context.items.push(ContextItem {
            id: candidate.id,
            kind,
            sources: candidate.sources,
            score: candidate.score,
            text,
            tokens,
        });
        if clipped_by_budget {
            break;
        }
    }
    context
}
