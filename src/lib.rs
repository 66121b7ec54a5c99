//! Crash-safe, deterministic, single-file memory store for on-device
//! retrieval-augmented generation.
//!
//! A `.mv2s` file is a single contiguous object: two 4 KiB header pages, an
//! embedded WAL ring, and an append-only data area holding frame payloads,
//! sealed index segments, and one TOC + footer per commit generation. The
//! [`WaxStore`] write path stages mutations through the WAL and publishes
//! them atomically; the [`Orchestrator`] layers chunked ingestion, embedding
//! memoization, structured-memory journaling, and mode-aware recall on top.
//!
//! ```no_run
//! use waxstore::{Orchestrator, OrchestratorConfig};
//!
//! # fn main() -> waxstore::Result<()> {
//! let mut mem = Orchestrator::new("notes.mv2s", OrchestratorConfig::default(), None)?;
//! mem.remember("the quick brown fox", Default::default())?;
//! mem.flush()?;
//! let hits = mem.recall(Some("fox"), None)?;
//! assert!(!hits.items.is_empty());
//! mem.close()?;
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod constants;
pub mod error;
pub mod footer;
pub mod index;
pub mod io;
pub mod orchestrator;
pub mod search;
pub mod store;
pub mod toc;
pub mod types;
pub mod wal;

pub use error::{ErrorKind, LeaseOwnerHint, Result, WaxError};
pub use index::{
    FactEntry, FactHit, LexSearchHit, LexTextEngine, StructuredMemoryStore, VectorEngine,
    VectorMetric, VectorSearchHit,
};
pub use orchestrator::{
    ChunkingConfig, Orchestrator, OrchestratorConfig, RagConfig, RecallItem, RecallResult,
};
pub use search::{CandidateSource, SearchMode, SearchRequest};
pub use store::{PutOptions, WaxStore};
pub use types::{
    CanonicalEncoding, EmbeddingIdentity, EmbeddingProvider, Frame, FrameId, FrameStatus,
    StoreStats, WalStats,
};
