//! In-memory lexical index with two-phase staging.
//!
//! Scoring is TF × IDF with natural logs: `tf(t, d) * ln(1 + N / df(t))`
//! summed over query tokens present in the document. Ties break by lower
//! frame id. Staged mutations are invisible to `search` until
//! `commit_staged` publishes them in insertion order.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    codec::sha256,
    constants::{LEX_SEGMENT_MAGIC, SEGMENT_VERSION},
    error::{Result, WaxError},
    types::FrameId,
};

/// Default preview window in bytes.
pub const DEFAULT_PREVIEW_MAX_BYTES: usize = 240;

fn lex_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq)]
pub struct LexSearchHit {
    pub frame_id: FrameId,
    pub score: f32,
    pub preview: String,
}

#[derive(Debug, Clone)]
struct LexDoc {
    text: String,
    term_counts: HashMap<String, u32>,
}

#[derive(Debug, Clone)]
enum LexOp {
    Index { frame_id: FrameId, text: String },
    Remove { frame_id: FrameId },
}

/// Serialized lexical segment ready to be embedded in the store file.
#[derive(Debug, Clone)]
pub struct LexIndexArtifact {
    pub bytes: Vec<u8>,
    pub doc_count: u64,
    pub checksum: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedDoc {
    frame_id: FrameId,
    text: String,
}

/// Tokenized TF-IDF text engine.
#[derive(Debug, Default)]
pub struct LexTextEngine {
    docs: BTreeMap<FrameId, LexDoc>,
    doc_freq: HashMap<String, u32>,
    staged: Vec<LexOp>,
    preview_max_bytes: usize,
}

impl LexTextEngine {
    #[must_use]
    pub fn new(preview_max_bytes: usize) -> Self {
        Self {
            preview_max_bytes,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Original text of a committed document, used as preview source.
    #[must_use]
    pub fn doc_text(&self, frame_id: FrameId) -> Option<&str> {
        self.docs.get(&frame_id).map(|doc| doc.text.as_str())
    }

    /// Indexes a document immediately, replacing any previous content.
    pub fn index(&mut self, frame_id: FrameId, text: &str) {
        self.remove(frame_id);
        let term_counts = term_counts(text);
        for term in term_counts.keys() {
            *self.doc_freq.entry(term.clone()).or_insert(0) += 1;
        }
        self.docs.insert(
            frame_id,
            LexDoc {
                text: text.to_string(),
                term_counts,
            },
        );
    }

    pub fn index_batch(&mut self, docs: &[(FrameId, String)]) {
        for (frame_id, text) in docs {
            self.index(*frame_id, text);
        }
    }

    /// Removes a document; returns whether it was present.
    pub fn remove(&mut self, frame_id: FrameId) -> bool {
        let Some(doc) = self.docs.remove(&frame_id) else {
            return false;
        };
        for term in doc.term_counts.keys() {
            if let Some(count) = self.doc_freq.get_mut(term) {
                *count -= 1;
                if *count == 0 {
                    self.doc_freq.remove(term);
                }
            }
        }
        true
    }

    /// Ranked search over committed documents only.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize) -> Vec<LexSearchHit> {
        if top_k == 0 || query.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }
        let mut query_tokens = tokenize(query);
        query_tokens.sort();
        query_tokens.dedup();
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let doc_total = self.docs.len() as f64;
        let mut hits: Vec<LexSearchHit> = Vec::new();
        for (frame_id, doc) in &self.docs {
            let mut score = 0.0f64;
            let mut matched = false;
            for token in &query_tokens {
                let Some(tf) = doc.term_counts.get(token) else {
                    continue;
                };
                matched = true;
                let df = f64::from(*self.doc_freq.get(token).unwrap_or(&1));
                score += f64::from(*tf) * (1.0 + doc_total / df).ln();
            }
            if matched {
                hits.push(LexSearchHit {
                    frame_id: *frame_id,
                    score: score as f32,
                    preview: truncate_utf8(&doc.text, self.preview_max_bytes).to_string(),
                });
            }
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.frame_id.cmp(&b.frame_id))
        });
        hits.truncate(top_k);
        hits
    }

    // Staged twins: invisible to search until commit_staged.

    pub fn stage_index(&mut self, frame_id: FrameId, text: &str) {
        self.staged.push(LexOp::Index {
            frame_id,
            text: text.to_string(),
        });
    }

    pub fn stage_index_batch(&mut self, docs: &[(FrameId, String)]) {
        for (frame_id, text) in docs {
            self.stage_index(*frame_id, text);
        }
    }

    pub fn stage_remove(&mut self, frame_id: FrameId) {
        self.staged.push(LexOp::Remove { frame_id });
    }

    /// Publishes staged mutations in insertion order.
    pub fn commit_staged(&mut self) {
        let staged = std::mem::take(&mut self.staged);
        for op in staged {
            match op {
                LexOp::Index { frame_id, text } => self.index(frame_id, &text),
                LexOp::Remove { frame_id } => {
                    self.remove(frame_id);
                }
            }
        }
    }

    pub fn rollback_staged(&mut self) {
        self.staged.clear();
    }

    #[must_use]
    pub fn pending_mutation_count(&self) -> usize {
        self.staged.len()
    }

    /// Serializes the index as it will look once staged mutations publish.
    /// The blob is magic + version + bincode documents.
    pub fn artifact_with_staged(&self) -> Result<LexIndexArtifact> {
        let mut projected: BTreeMap<FrameId, String> = self
            .docs
            .iter()
            .map(|(id, doc)| (*id, doc.text.clone()))
            .collect();
        for op in &self.staged {
            match op {
                LexOp::Index { frame_id, text } => {
                    projected.insert(*frame_id, text.clone());
                }
                LexOp::Remove { frame_id } => {
                    projected.remove(frame_id);
                }
            }
        }
        let docs: Vec<PersistedDoc> = projected
            .into_iter()
            .map(|(frame_id, text)| PersistedDoc { frame_id, text })
            .collect();

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&LEX_SEGMENT_MAGIC);
        bytes.extend_from_slice(&SEGMENT_VERSION.to_le_bytes());
        let body = bincode::serde::encode_to_vec(&docs, lex_config())?;
        bytes.extend_from_slice(&body);
        let checksum = sha256(&bytes);
        Ok(LexIndexArtifact {
            bytes,
            doc_count: docs.len() as u64,
            checksum,
        })
    }

    /// Rebuilds an engine from a persisted segment blob.
    pub fn load_artifact_bytes(bytes: &[u8], preview_max_bytes: usize) -> Result<Self> {
        if bytes.len() < LEX_SEGMENT_MAGIC.len() + 2 {
            return Err(WaxError::InvalidSegment {
                reason: "lexical segment shorter than its header".into(),
            });
        }
        if bytes[..4] != LEX_SEGMENT_MAGIC {
            return Err(WaxError::InvalidSegment {
                reason: "lexical segment magic mismatch".into(),
            });
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != SEGMENT_VERSION {
            return Err(WaxError::InvalidSegment {
                reason: format!("unsupported lexical segment version {version}").into(),
            });
        }
        let (docs, read): (Vec<PersistedDoc>, usize) =
            bincode::serde::decode_from_slice(&bytes[6..], lex_config())?;
        if read != bytes.len() - 6 {
            return Err(WaxError::InvalidSegment {
                reason: "lexical segment has trailing bytes".into(),
            });
        }
        let mut engine = Self::new(preview_max_bytes);
        for doc in docs {
            engine.index(doc.frame_id, &doc.text);
        }
        Ok(engine)
    }
}

/// Lowercase tokens split on non-alphanumerics.
#[must_use]
pub fn tokenize(input: &str) -> Vec<String> {
    input
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn term_counts(text: &str) -> HashMap<String, u32> {
    let mut counts = HashMap::new();
    for token in tokenize(text) {
        *counts.entry(token).or_insert(0) += 1;
    }
    counts
}

/// Truncates at a code-point boundary no later than `max_bytes`.
#[must_use]
pub fn truncate_utf8(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
