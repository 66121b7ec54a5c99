use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use waxstore::{
    CandidateSource, EmbeddingIdentity, EmbeddingProvider, ErrorKind, Orchestrator,
    OrchestratorConfig, Result, SearchMode, SearchRequest,
};

/// Deterministic hash-based embedder; every vector is unit-norm.
struct StubEmbedder {
    calls: Rc<Cell<usize>>,
}

fn unit_vector(text: &str) -> Vec<f32> {
    let mut v = [0.1f32; 4];
    for (i, b) in text.bytes().enumerate() {
        v[i % 4] += f32::from(b) / 255.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

impl EmbeddingProvider for StubEmbedder {
    fn dimensions(&self) -> u32 {
        4
    }

    fn normalized(&self) -> bool {
        true
    }

    fn identity(&self) -> Option<EmbeddingIdentity> {
        Some(EmbeddingIdentity {
            provider: "stub".into(),
            model: "hash-v1".into(),
            dimension: 4,
            normalized: true,
        })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.set(self.calls.get() + 1);
        Ok(unit_vector(text))
    }
}

fn text_config() -> OrchestratorConfig {
    OrchestratorConfig::default()
}

fn hybrid_config() -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.enable_vector_search = true;
    config.rag.search_mode = SearchMode::Hybrid { alpha: 0.5 };
    config
}

fn stub(calls: &Rc<Cell<usize>>) -> Option<Box<dyn EmbeddingProvider>> {
    Some(Box::new(StubEmbedder {
        calls: Rc::clone(calls),
    }))
}

#[test]
fn flush_gates_visibility() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("gate.mv2s");
    let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");

    mem.remember("flush gated apple", BTreeMap::new()).expect("remember");
    let before = mem.recall(Some("apple"), None).expect("recall");
    assert!(before.items.is_empty(), "staged content must be invisible");

    mem.flush().expect("flush");
    let after = mem.recall(Some("apple"), None).expect("recall");
    assert_eq!(after.items.len(), 1);
    assert_eq!(after.items[0].frame_id, Some(0));
    assert!(after.items[0].text.contains("apple"));
    assert!(after.total_tokens > 0);
    mem.close().expect("close");
}

#[test]
fn text_ranking_is_deterministic() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("rank.mv2s");
    let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");

    mem.remember("apple banana", BTreeMap::new()).expect("remember");
    mem.remember("apple apple", BTreeMap::new()).expect("remember");
    mem.remember("banana", BTreeMap::new()).expect("remember");
    mem.flush().expect("flush");

    let result = mem.recall(Some("apple banana"), None).expect("recall");
    let ids: Vec<_> = result.items.iter().map(|item| item.frame_id).collect();
    assert_eq!(ids, vec![Some(0), Some(1), Some(2)]);
    assert!(result.items[0].score >= result.items[1].score);
    mem.close().expect("close");
}

#[test]
fn structured_memory_journal_replays_across_reopen() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("facts.mv2s");

    {
        let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");
        mem.remember_fact("user:1", "name", "Alice", None).expect("fact");
        mem.remember_fact("user:1", "city", "Paris", None).expect("fact");
        mem.remember_fact("user:2", "name", "Bob", None).expect("fact");
        let mut meta = BTreeMap::new();
        meta.insert("src".to_string(), "edit".to_string());
        mem.remember_fact("user:1", "name", "Alice B", Some(meta)).expect("fact");

        assert!(
            mem.recall_facts_by_entity_prefix("user:", 10).is_empty(),
            "facts are flush-gated"
        );
        mem.flush().expect("flush");

        let hits = mem.recall_facts_by_entity_prefix("user:", 10);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].attribute, "city");
        assert_eq!(hits[0].entry.value, "Paris");
        assert_eq!(hits[0].entry.version, 1);
        assert_eq!(hits[1].entry.value, "Alice B");
        assert_eq!(hits[1].entry.version, 2);
        assert_eq!(hits[1].entry.metadata.get("src").map(String::as_str), Some("edit"));
        assert_eq!(hits[2].entry.value, "Bob");
        mem.close().expect("close");
    }

    // Journal replay rebuilds the same structured state.
    let mut mem = Orchestrator::new(&path, text_config(), None).expect("reopen");
    let hits = mem.recall_facts_by_entity_prefix("user:", -1);
    assert_eq!(hits.len(), 3);
    assert_eq!(hits[1].entry.value, "Alice B");
    assert_eq!(hits[1].entry.version, 2);

    mem.forget_fact("user:2", "name").expect("forget");
    mem.flush().expect("flush");
    assert_eq!(mem.recall_facts_by_entity_prefix("user:", -1).len(), 2);
    mem.close().expect("close");
}

#[test]
fn facts_surface_in_the_text_lane() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("factlane.mv2s");
    let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");

    mem.remember_fact("user:1", "city", "Paris", None).expect("fact");
    mem.flush().expect("flush");

    let result = mem.recall(Some("Paris"), None).expect("recall");
    assert_eq!(result.items.len(), 1);
    assert_eq!(result.items[0].frame_id, None, "fact items carry no frame");
    assert!(result.items[0]
        .sources
        .contains(&CandidateSource::StructuredMemory));
    assert!(result.items[0].text.contains("Paris"));
    mem.close().expect("close");
}

#[test]
fn hybrid_recall_fuses_text_and_vector_lanes() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("hybrid.mv2s");
    let calls = Rc::new(Cell::new(0));
    let mut mem = Orchestrator::new(&path, hybrid_config(), stub(&calls)).expect("new");

    mem.remember("rust borrow checker", BTreeMap::new()).expect("remember");
    mem.remember("garbage collected runtime", BTreeMap::new()).expect("remember");
    mem.flush().expect("flush");

    let result = mem.recall(Some("rust borrow checker"), None).expect("recall");
    assert!(!result.items.is_empty());
    assert_eq!(result.items[0].frame_id, Some(0));
    let sources = &result.items[0].sources;
    assert!(
        sources.contains(&CandidateSource::Text) && sources.contains(&CandidateSource::Vector),
        "top hit should be corroborated by both lanes, got {sources:?}"
    );
    mem.close().expect("close");
}

#[test]
fn vector_only_accepts_explicit_embedding_with_no_query() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("veconly.mv2s");
    let calls = Rc::new(Cell::new(0));
    let mut config = hybrid_config();
    config.rag.search_mode = SearchMode::VectorOnly;
    let mut mem = Orchestrator::new(&path, config, stub(&calls)).expect("new");

    mem.remember("semantic content", BTreeMap::new()).expect("remember");
    mem.flush().expect("flush");
    let ingest_calls = calls.get();

    let result = mem
        .recall(None, Some(unit_vector("semantic content")))
        .expect("recall");
    assert_eq!(result.items[0].frame_id, Some(0));
    assert_eq!(calls.get(), ingest_calls, "explicit embedding skips the embedder");
    mem.close().expect("close");
}

#[test]
fn text_only_never_calls_the_embedder() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("textonly.mv2s");
    let calls = Rc::new(Cell::new(0));
    let mut config = text_config();
    // An embedder is present but the mode must not consult it.
    config.enable_vector_search = false;
    let mut mem = Orchestrator::new(&path, config, stub(&calls)).expect("new");

    mem.remember("plain text lane", BTreeMap::new()).expect("remember");
    mem.flush().expect("flush");
    mem.recall(Some("plain"), None).expect("recall");
    assert_eq!(calls.get(), 0);
    mem.close().expect("close");
}

#[test]
fn embeddings_are_memoized_across_reopen() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("memo.mv2s");

    {
        let calls = Rc::new(Cell::new(0));
        let mut mem = Orchestrator::new(&path, hybrid_config(), stub(&calls)).expect("new");
        mem.remember("memoized content", BTreeMap::new()).expect("remember");
        mem.flush().expect("flush");
        assert_eq!(calls.get(), 1, "one chunk, one embedding call");
        mem.close().expect("close");
    }

    let calls = Rc::new(Cell::new(0));
    let mut mem = Orchestrator::new(&path, hybrid_config(), stub(&calls)).expect("reopen");
    assert_eq!(calls.get(), 0, "reopen never re-embeds frames");
    assert!(mem.embedding_cache_len() >= 1, "memo rebuilt from journal");

    // The same text resolves from the memo, so only the query is embedded.
    mem.remember("memoized content", BTreeMap::new()).expect("remember");
    mem.flush().expect("flush");
    assert_eq!(calls.get(), 0, "chunk embedding came from the memo");

    mem.recall(Some("memoized"), None).expect("recall");
    assert_eq!(calls.get(), 1, "query embedding is computed once");
    mem.recall(Some("memoized"), None).expect("recall again");
    assert_eq!(calls.get(), 1, "query embedding is cached too");
    mem.close().expect("close");
}

#[test]
fn as_of_scopes_recall_in_time() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("asof.mv2s");
    let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");

    mem.remember("timeline entry", BTreeMap::new()).expect("remember");
    mem.flush().expect("flush");

    let mut request = SearchRequest {
        query: Some("timeline".into()),
        mode: SearchMode::TextOnly,
        ..SearchRequest::default()
    };
    request.as_of_ms = Some(0);
    let early = mem.recall_with_request(request.clone()).expect("recall");
    assert!(early.items.is_empty(), "frames newer than as_of are excluded");

    request.as_of_ms = Some(u64::MAX);
    let late = mem.recall_with_request(request).expect("recall");
    assert_eq!(late.items.len(), 1);
    mem.close().expect("close");
}

#[test]
fn text_lane_rebuilds_from_sealed_segment() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("sealed.mv2s");

    {
        let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");
        mem.remember("sealed lexical state", BTreeMap::new()).expect("remember");
        mem.flush().expect("flush");
        assert!(mem.store().stats().has_lex_index);
        mem.close().expect("close");
    }

    let mut mem = Orchestrator::new(&path, text_config(), None).expect("reopen");
    let result = mem.recall(Some("sealed"), None).expect("recall");
    assert_eq!(result.items.len(), 1);
    mem.close().expect("close");
}

#[test]
fn recall_mode_policy_is_enforced() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("policy.mv2s");
    let mut mem = Orchestrator::new(&path, text_config(), None).expect("new");

    let err = mem
        .recall_with_request(SearchRequest {
            query: Some("q".into()),
            mode: SearchMode::VectorOnly,
            ..SearchRequest::default()
        })
        .expect_err("vector lane disabled");
    assert_eq!(err.kind(), ErrorKind::Policy);
    mem.close().expect("close");

    let err = mem.recall(Some("q"), None).expect_err("closed");
    assert_eq!(err.kind(), ErrorKind::State);
}

#[test]
fn constructor_rejects_incoherent_modes() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("modes.mv2s");

    let mut config = OrchestratorConfig::default();
    config.rag.search_mode = SearchMode::Hybrid { alpha: 0.5 };
    config.enable_vector_search = true;
    let err = Orchestrator::new(&path, config, None).expect_err("no embedder");
    assert_eq!(err.kind(), ErrorKind::Policy);

    let mut config = OrchestratorConfig::default();
    config.enable_text_search = false;
    let err = Orchestrator::new(&path, config, None).expect_err("text lane disabled");
    assert_eq!(err.kind(), ErrorKind::Policy);
}

#[test]
fn chunked_content_spans_multiple_frames() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("chunks.mv2s");
    let mut config = text_config();
    config.chunking.target_tokens = 8;
    config.chunking.overlap_tokens = 2;
    let mut mem = Orchestrator::new(&path, config, None).expect("new");

    let words: Vec<String> = (0..40).map(|i| format!("word{i}")).collect();
    let ids = mem.remember(&words.join(" "), BTreeMap::new()).expect("remember");
    assert!(ids.len() > 1, "long content chunks into several frames");
    mem.flush().expect("flush");

    let result = mem.recall(Some("word17"), None).expect("recall");
    assert!(!result.items.is_empty());
    mem.close().expect("close");
}
