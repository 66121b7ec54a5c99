//! Orchestrator: chunked ingestion, embedding memoization, fact journaling,
//! flush-gated visibility, and mode-aware recall.
//!
//! All mutations stage through the store WAL and the in-memory engines;
//! `flush` drives the store commit and only then publishes the staged index
//! mutations, so recall never observes half-committed state.

pub mod chunker;
pub mod embed_cache;
pub mod journal;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::{
    constants::{JOURNAL_EMBED_KIND, JOURNAL_FACT_KIND},
    error::{Result, WaxError},
    index::{
        lex::LexTextEngine,
        structured::{FactHit, StructuredMemoryStore},
        vector::{VectorEngine, VectorMetric},
    },
    search::{
        CandidateId, CandidateSource, ContextBudget, LaneHit, SearchMode, SearchRequest,
        build_context, candidate_window, rrf_fuse, single_lane,
    },
    store::{PutOptions, WaxStore},
    types::{EmbeddingIdentity, EmbeddingProvider, FrameId, FrameStatus},
};

pub use chunker::{ChunkingConfig, chunk_text};
pub use embed_cache::{DEFAULT_CACHE_CAPACITY, EmbeddingCache, content_key};
pub use journal::{EmbedJournalRecord, FactJournalOp, FactJournalRecord};

/// Recall-side configuration.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub search_mode: SearchMode,
    pub search_top_k: usize,
    /// Snippet items admitted after the expanded head item.
    pub max_snippets: usize,
    pub preview_max_bytes: usize,
    pub max_context_tokens: usize,
    pub snippet_max_tokens: usize,
    pub expansion_max_tokens: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            search_mode: SearchMode::TextOnly,
            search_top_k: 8,
            max_snippets: 7,
            preview_max_bytes: 240,
            max_context_tokens: 1024,
            snippet_max_tokens: 96,
            expansion_max_tokens: 320,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub enable_text_search: bool,
    pub enable_vector_search: bool,
    pub chunking: ChunkingConfig,
    pub ingest_batch_size: usize,
    pub embedding_cache_capacity: usize,
    pub rag: RagConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enable_text_search: true,
            enable_vector_search: false,
            chunking: ChunkingConfig::default(),
            ingest_batch_size: 16,
            embedding_cache_capacity: DEFAULT_CACHE_CAPACITY,
            rag: RagConfig::default(),
        }
    }
}

/// One recall result item.
#[derive(Debug, Clone)]
pub struct RecallItem {
    /// Store frame behind this item; facts projected from structured memory
    /// have no frame.
    pub frame_id: Option<FrameId>,
    pub sources: Vec<CandidateSource>,
    pub score: f32,
    pub text: String,
    pub tokens: usize,
}

#[derive(Debug, Clone, Default)]
pub struct RecallResult {
    pub items: Vec<RecallItem>,
    pub total_tokens: usize,
}

pub struct Orchestrator {
    store: WaxStore,
    text: LexTextEngine,
    fact_text: LexTextEngine,
    vector: VectorEngine,
    facts: StructuredMemoryStore,
    embedder: Option<Box<dyn EmbeddingProvider>>,
    cache: EmbeddingCache,
    config: OrchestratorConfig,
    closed: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("store", &self.store)
            .field("vector", &self.vector)
            .field("config", &self.config)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Opens (or creates) the store at `path` and rebuilds every index from
    /// the committed state: lexical from the sealed segment or frame payloads,
    /// vectors from persisted embeddings, structured memory and the embedding
    /// memo from journal replay. No frame is ever re-embedded on open.
    pub fn new(
        path: impl AsRef<Path>,
        config: OrchestratorConfig,
        embedder: Option<Box<dyn EmbeddingProvider>>,
    ) -> Result<Self> {
        validate_config(&config, embedder.is_some())?;
        let path = path.as_ref();
        let mut store = if path.exists() {
            WaxStore::open(path, true)?
        } else {
            WaxStore::create(path)?
        };

        // Normalized providers pair with cosine; everything else scores dot.
        let metric = if store.committed_vectors().is_empty() {
            match embedder.as_ref() {
                Some(provider) if !provider.normalized() => VectorMetric::Dot,
                _ => VectorMetric::Cosine,
            }
        } else {
            store.vector_metric()
        };
        store.set_vector_metric(metric);

        let preview = config.rag.preview_max_bytes;
        let mut orchestrator = Self {
            store,
            text: LexTextEngine::new(preview),
            fact_text: LexTextEngine::new(preview),
            vector: VectorEngine::new(metric),
            facts: StructuredMemoryStore::new(),
            embedder,
            cache: EmbeddingCache::new(config.embedding_cache_capacity),
            config,
            closed: false,
        };
        orchestrator.rebuild_from_store()?;
        Ok(orchestrator)
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(WaxError::Closed)
        } else {
            Ok(())
        }
    }

    fn frame_visible(&self, frame_id: FrameId) -> bool {
        self.store
            .toc()
            .frame(frame_id)
            .is_some_and(|frame| frame.status == FrameStatus::Live && !frame.is_journal())
    }

    fn rebuild_from_store(&mut self) -> Result<()> {
        if self.config.enable_text_search {
            if let Some(bytes) = self.store.lex_segment_bytes()? {
                self.text =
                    LexTextEngine::load_artifact_bytes(&bytes, self.config.rag.preview_max_bytes)?;
                debug!(docs = self.text.len(), "lexical index loaded from sealed segment");
            } else {
                let metas: Vec<(FrameId, bool)> = self
                    .store
                    .frame_metas()
                    .iter()
                    .map(|frame| {
                        (
                            frame.id,
                            frame.status == FrameStatus::Live && !frame.is_journal(),
                        )
                    })
                    .collect();
                for (frame_id, indexable) in metas {
                    if !indexable {
                        continue;
                    }
                    let content = self.store.frame_content(frame_id)?;
                    self.text
                        .index(frame_id, &String::from_utf8_lossy(&content));
                }
                debug!(docs = self.text.len(), "lexical index rebuilt from frames");
            }
        }

        if self.config.enable_vector_search {
            for (frame_id, vector) in self.store.committed_vectors().clone() {
                if self.frame_visible(frame_id) {
                    self.vector.add(frame_id, vector)?;
                }
            }
            // Persisted embeddings carry their vector-space identity; a
            // different provider over the same file gives incomparable scores.
            if let Some(expected) = self.embedder.as_ref().and_then(|e| e.identity()) {
                let stored = self
                    .store
                    .frame_metas()
                    .iter()
                    .find_map(|frame| EmbeddingIdentity::from_entries(&frame.entries));
                if let Some(stored) = stored {
                    if stored != expected {
                        warn!(
                            stored_model = %stored.model,
                            configured_model = %expected.model,
                            "embedding identity differs from the persisted one"
                        );
                    }
                }
            }
        }

        // Journal replay, in frame order, rebuilds structured memory and the
        // embedding memo.
        let journal_frames: Vec<(FrameId, Option<String>)> = self
            .store
            .frame_metas()
            .iter()
            .filter(|frame| frame.status == FrameStatus::Live)
            .map(|frame| (frame.id, frame.kind.clone()))
            .collect();
        for (frame_id, kind) in journal_frames {
            match kind.as_deref() {
                Some(JOURNAL_FACT_KIND) => {
                    let record = FactJournalRecord::decode(&self.store.frame_content(frame_id)?)?;
                    match record.op {
                        FactJournalOp::Upsert => {
                            self.facts.upsert(
                                &record.entity,
                                &record.attribute,
                                record.value.as_deref().unwrap_or_default(),
                                record.metadata.unwrap_or_default(),
                            )?;
                        }
                        FactJournalOp::Remove => {
                            self.facts.remove(&record.entity, &record.attribute)?;
                        }
                    }
                }
                Some(JOURNAL_EMBED_KIND) => {
                    let record = EmbedJournalRecord::decode(&self.store.frame_content(frame_id)?)?;
                    if let Some(vector) = self.store.committed_vectors().get(&record.frame_id) {
                        self.cache.insert(record.key()?, vector.clone());
                    }
                }
                _ => {}
            }
        }
        self.rebuild_fact_text();
        info!(
            frames = self.store.frame_metas().len(),
            facts = self.facts.len(),
            vectors = self.vector.len(),
            "orchestrator state rebuilt"
        );
        Ok(())
    }

    /// Structured entries project into the text lane as
    /// `"{entity} {attribute} {value}"` documents keyed by fact id.
    fn rebuild_fact_text(&mut self) {
        let mut engine = LexTextEngine::new(self.config.rag.preview_max_bytes);
        for hit in self.facts.iter() {
            engine.index(
                hit.entry.id,
                &format!("{} {} {}", hit.entity, hit.attribute, hit.entry.value),
            );
        }
        self.fact_text = engine;
    }

    // ── Ingestion ───────────────────────────────────────────────────────

    /// Chunks `content` into overlapping token windows, stages one frame per
    /// chunk plus its lexical/vector index entries, and memoizes embeddings
    /// under a content hash. Nothing is visible to recall until `flush`.
    pub fn remember(
        &mut self,
        content: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<Vec<FrameId>> {
        self.check_open()?;
        let chunks = chunk_text(content, self.config.chunking);
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let kind = metadata
            .get("kind")
            .cloned()
            .unwrap_or_else(|| "text".to_string());
        let embed_identity = if self.config.enable_vector_search {
            self.embedder.as_ref().and_then(|e| e.identity())
        } else {
            None
        };
        let mut payloads = Vec::with_capacity(chunks.len());
        let mut options = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let mut entries = metadata.clone();
            entries.insert("chunk.index".to_string(), index.to_string());
            entries.insert("chunk.count".to_string(), chunks.len().to_string());
            if let Some(identity) = &embed_identity {
                identity.apply_to_entries(&mut entries);
            }
            payloads.push(chunk.clone().into_bytes());
            options.push(PutOptions {
                kind: Some(kind.clone()),
                entries,
                ..PutOptions::default()
            });
        }
        let ids = self.store.put_batch(&payloads, &options)?;

        if self.config.enable_text_search {
            for (frame_id, chunk) in ids.iter().zip(chunks.iter()) {
                self.text.stage_index(*frame_id, chunk);
            }
        }

        if self.config.enable_vector_search && self.embedder.is_some() {
            self.stage_chunk_embeddings(&ids, &chunks)?;
        }
        debug!(chunks = ids.len(), "content staged");
        Ok(ids)
    }

    fn stage_chunk_embeddings(&mut self, ids: &[FrameId], chunks: &[String]) -> Result<()> {
        let identity = self.embedder.as_ref().and_then(|e| e.identity());
        let keys: Vec<[u8; 32]> = chunks
            .iter()
            .map(|chunk| content_key(chunk, identity.as_ref()))
            .collect();

        let mut resolved: Vec<Option<Vec<f32>>> =
            keys.iter().map(|key| self.cache.get(key)).collect();
        let missing: Vec<usize> = resolved
            .iter()
            .enumerate()
            .filter_map(|(index, vector)| vector.is_none().then_some(index))
            .collect();

        let batch_size = self.config.ingest_batch_size.max(1);
        for batch in missing.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|index| chunks[*index].clone()).collect();
            let embedder = self.embedder.as_ref().ok_or(WaxError::Policy {
                reason: "vector ingestion requires an embedder".into(),
            })?;
            let vectors = embedder.embed_batch(&texts)?;
            if vectors.len() != texts.len() {
                return Err(WaxError::BatchShapeMismatch {
                    frames: texts.len(),
                    vectors: vectors.len(),
                });
            }
            for (index, vector) in batch.iter().zip(vectors) {
                self.cache.insert(keys[*index], vector.clone());
                // Memoize the text→embedding mapping across reopen.
                let record = EmbedJournalRecord::new(keys[*index], ids[*index]);
                self.store.put_with_options(
                    &record.encode()?,
                    PutOptions {
                        kind: Some(JOURNAL_EMBED_KIND.to_string()),
                        ..PutOptions::default()
                    },
                )?;
                resolved[*index] = Some(vector);
            }
        }

        for (index, frame_id) in ids.iter().enumerate() {
            let vector = resolved[index].clone().ok_or(WaxError::Policy {
                reason: "embedding resolution left a hole".into(),
            })?;
            self.store.put_embedding(*frame_id, vector.clone())?;
            self.vector.stage_add(*frame_id, vector)?;
        }
        Ok(())
    }

    /// Stages a structured-memory upsert and journals it as an internal frame.
    pub fn remember_fact(
        &mut self,
        entity: &str,
        attribute: &str,
        value: &str,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<()> {
        self.check_open()?;
        self.facts
            .stage_upsert(entity, attribute, value, metadata.clone().unwrap_or_default())?;
        let record = FactJournalRecord {
            op: FactJournalOp::Upsert,
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            value: Some(value.to_string()),
            metadata,
        };
        self.store.put_with_options(
            &record.encode()?,
            PutOptions {
                kind: Some(JOURNAL_FACT_KIND.to_string()),
                ..PutOptions::default()
            },
        )?;
        Ok(())
    }

    /// Stages a structured-memory removal and journals it.
    pub fn forget_fact(&mut self, entity: &str, attribute: &str) -> Result<()> {
        self.check_open()?;
        self.facts.stage_remove(entity, attribute)?;
        let record = FactJournalRecord {
            op: FactJournalOp::Remove,
            entity: entity.to_string(),
            attribute: attribute.to_string(),
            value: None,
            metadata: None,
        };
        self.store.put_with_options(
            &record.encode()?,
            PutOptions {
                kind: Some(JOURNAL_FACT_KIND.to_string()),
                ..PutOptions::default()
            },
        )?;
        Ok(())
    }

    /// Committed structured-memory view (staged facts are flush-gated).
    #[must_use]
    pub fn recall_facts_by_entity_prefix(&self, prefix: &str, limit: i64) -> Vec<FactHit> {
        self.facts.query_by_entity_prefix(prefix, limit)
    }

    // ── Visibility boundary ─────────────────────────────────────────────

    /// Commits the store, then publishes staged index mutations: store commit
    /// → text → vector → structured. A failure at any step leaves every
    /// staged mutation invisible; a successful retry republishes them.
    pub fn flush(&mut self) -> Result<()> {
        self.check_open()?;
        if self.config.enable_text_search
            && (self.store.pending_count() > 0 || self.text.pending_mutation_count() > 0)
        {
            let artifact = self.text.artifact_with_staged()?;
            self.store.stage_lex_artifact(artifact);
        }
        self.store.commit()?;
        self.text.commit_staged();
        self.vector.commit_staged()?;
        self.facts.commit_staged()?;
        self.rebuild_fact_text();
        Ok(())
    }

    /// Flushes outstanding staged work and closes the store.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let staged = self.store.has_local_staged()
            || self.text.pending_mutation_count() > 0
            || self.vector.pending_mutation_count() > 0
            || self.facts.pending_mutation_count() > 0;
        let flush_result = if staged { self.flush() } else { Ok(()) };
        let close_result = self.store.close();
        self.closed = true;
        flush_result.and(close_result)
    }

    // ── Recall ──────────────────────────────────────────────────────────

    /// Mode-aware recall with the configured budgets.
    pub fn recall(
        &mut self,
        query: Option<&str>,
        embedding: Option<Vec<f32>>,
    ) -> Result<RecallResult> {
        let rag = &self.config.rag;
        let request = SearchRequest {
            query: query.map(str::to_string),
            embedding,
            top_k: rag.search_top_k,
            mode: rag.search_mode,
            preview_max_bytes: rag.preview_max_bytes,
            max_context_tokens: rag.max_context_tokens,
            snippet_max_tokens: rag.snippet_max_tokens,
            expansion_max_tokens: rag.expansion_max_tokens,
            as_of_ms: None,
        };
        self.recall_with_request(request)
    }

    /// Recall with an explicit request (budgets, mode, time scope).
    pub fn recall_with_request(&mut self, request: SearchRequest) -> Result<RecallResult> {
        self.check_open()?;
        let mode = request.mode;
        self.validate_recall_mode(mode, request.embedding.is_some())?;
        let window = candidate_window(request.top_k);

        let mut text_hits: Vec<LaneHit> = Vec::new();
        if mode.uses_text() && self.config.enable_text_search {
            if let Some(query) = request.query.as_deref().filter(|q| !q.is_empty()) {
                for hit in self.text.search(query, window) {
                    // Text-lane hits must still exist, be live, and not be
                    // internal journal frames in the committed store view.
                    if !self.frame_visible(hit.frame_id) {
                        continue;
                    }
                    text_hits.push(LaneHit {
                        id: CandidateId::Frame(hit.frame_id),
                        score: hit.score,
                        source: CandidateSource::Text,
                        preview: Some(hit.preview),
                    });
                }
                for hit in self.fact_text.search(query, window) {
                    text_hits.push(LaneHit {
                        id: CandidateId::Fact(hit.frame_id),
                        score: hit.score,
                        source: CandidateSource::StructuredMemory,
                        preview: Some(hit.preview),
                    });
                }
                text_hits.sort_by(|a, b| {
                    b.score
                        .partial_cmp(&a.score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                        .then_with(|| a.id.cmp(&b.id))
                });
                text_hits.truncate(window);
            }
        }

        let mut vector_hits: Vec<LaneHit> = Vec::new();
        if mode.uses_vector() && self.config.enable_vector_search {
            // The embedder is only consulted when the mode needs a vector and
            // the caller did not supply one.
            let query_vector = match request.embedding.clone() {
                Some(vector) => Some(vector),
                None => match request.query.as_deref().filter(|q| !q.is_empty()) {
                    Some(query) => Some(self.embed_query(query)?),
                    None => None,
                },
            };
            if let Some(query_vector) = query_vector {
                for hit in self.vector.search(&query_vector, window)? {
                    if !self.frame_visible(hit.frame_id) {
                        continue;
                    }
                    let preview = self.text.doc_text(hit.frame_id).map(str::to_string);
                    vector_hits.push(LaneHit {
                        id: CandidateId::Frame(hit.frame_id),
                        score: hit.score,
                        source: CandidateSource::Vector,
                        preview,
                    });
                }
            }
        }

        if let Some(as_of_ms) = request.as_of_ms {
            let allowed: HashSet<FrameId> = self
                .store
                .time_index()
                .frames_as_of(as_of_ms)
                .into_iter()
                .collect();
            let keep = |hit: &LaneHit| match hit.id {
                CandidateId::Frame(frame_id) => allowed.contains(&frame_id),
                CandidateId::Fact(_) => true,
            };
            text_hits.retain(keep);
            vector_hits.retain(keep);
        }

        let fused = match mode {
            SearchMode::TextOnly => single_lane(text_hits),
            SearchMode::VectorOnly => single_lane(vector_hits),
            SearchMode::Hybrid { alpha } => {
                let alpha = f64::from(alpha.clamp(0.0, 1.0));
                // At alpha = 0.5 this is exactly Σ 1/(k + rank) per lane.
                rrf_fuse(&[
                    (2.0 * alpha, text_hits),
                    (2.0 * (1.0 - alpha), vector_hits),
                ])
            }
        };

        let budget = ContextBudget {
            top_k: request
                .top_k
                .min(self.config.rag.max_snippets.saturating_add(1)),
            preview_max_bytes: request.preview_max_bytes,
            max_context_tokens: request.max_context_tokens,
            snippet_max_tokens: request.snippet_max_tokens,
            expansion_max_tokens: request.expansion_max_tokens,
        };
        let context = build_context(fused.into_iter().map(Into::into).collect(), &budget);
        Ok(RecallResult {
            total_tokens: context.total_tokens,
            items: context
                .items
                .into_iter()
                .map(|item| RecallItem {
                    frame_id: item.id.frame_id(),
                    sources: item.sources,
                    score: item.score,
                    text: item.text,
                    tokens: item.tokens,
                })
                .collect(),
        })
    }

    fn validate_recall_mode(&self, mode: SearchMode, has_explicit_embedding: bool) -> Result<()> {
        match mode {
            SearchMode::TextOnly if !self.config.enable_text_search => Err(WaxError::Policy {
                reason: "text_only recall with the text lane disabled".into(),
            }),
            SearchMode::VectorOnly if !self.config.enable_vector_search => Err(WaxError::Policy {
                reason: "vector_only recall with the vector lane disabled".into(),
            }),
            SearchMode::Hybrid { .. }
                if !(self.config.enable_text_search && self.config.enable_vector_search) =>
            {
                Err(WaxError::Policy {
                    reason: "hybrid recall requires both lanes".into(),
                })
            }
            mode if mode.uses_vector() && self.embedder.is_none() && !has_explicit_embedding => {
                Err(WaxError::Policy {
                    reason: "vector recall requires an embedder or an explicit embedding".into(),
                })
            }
            _ => Ok(()),
        }
    }

    fn embed_query(&mut self, query: &str) -> Result<Vec<f32>> {
        let embedder = self.embedder.as_ref().ok_or(WaxError::Policy {
            reason: "vector recall requires an embedder".into(),
        })?;
        let key = content_key(query, embedder.identity().as_ref());
        if let Some(vector) = self.cache.get(&key) {
            return Ok(vector);
        }
        let vector = embedder.embed(query)?;
        self.cache.insert(key, vector.clone());
        Ok(vector)
    }

    // ── Introspection ───────────────────────────────────────────────────

    #[must_use]
    pub fn store(&self) -> &WaxStore {
        &self.store
    }

    #[must_use]
    pub fn store_mut(&mut self) -> &mut WaxStore {
        &mut self.store
    }

    #[must_use]
    pub fn embedding_cache_len(&self) -> usize {
        self.cache.len()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(error = %err, "orchestrator close during drop failed");
            }
        }
    }
}

fn validate_config(config: &OrchestratorConfig, has_embedder: bool) -> Result<()> {
    match config.rag.search_mode {
        SearchMode::TextOnly if !config.enable_text_search => {
            return Err(WaxError::Policy {
                reason: "text_only mode requires the text lane".into(),
            });
        }
        SearchMode::VectorOnly if !config.enable_vector_search => {
            return Err(WaxError::Policy {
                reason: "vector_only mode requires the vector lane".into(),
            });
        }
        SearchMode::Hybrid { .. }
            if !(config.enable_text_search && config.enable_vector_search) =>
        {
            return Err(WaxError::Policy {
                reason: "hybrid mode requires both lanes".into(),
            });
        }
        _ => {}
    }
    if config.rag.search_mode.uses_vector() && !has_embedder {
        return Err(WaxError::Policy {
            reason: "vector modes require an embedding provider".into(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructor_policy_rejections() {
        let mut config = OrchestratorConfig::default();
        config.enable_text_search = false;
        config.rag.search_mode = SearchMode::TextOnly;
        assert!(matches!(
            validate_config(&config, false),
            Err(WaxError::Policy { .. })
        ));

        let mut config = OrchestratorConfig::default();
        config.rag.search_mode = SearchMode::VectorOnly;
        config.enable_vector_search = false;
        assert!(validate_config(&config, true).is_err());

        let mut config = OrchestratorConfig::default();
        config.rag.search_mode = SearchMode::Hybrid { alpha: 0.5 };
        config.enable_text_search = true;
        config.enable_vector_search = false;
        assert!(validate_config(&config, true).is_err());

        let mut config = OrchestratorConfig::default();
        config.rag.search_mode = SearchMode::Hybrid { alpha: 0.5 };
        config.enable_vector_search = true;
        assert!(
            validate_config(&config, false).is_err(),
            "vector modes need an embedder"
        );
        assert!(validate_config(&config, true).is_ok());
    }
}
