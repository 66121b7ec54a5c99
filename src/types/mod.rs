//! Shared data model: frames, manifests, embeddings.

mod common;
mod embedding;
mod frame;
mod manifest;

pub use common::{
    CanonicalEncoding, FrameId, FrameStatus, SegmentCompression, SegmentId, SegmentKind,
};
pub use embedding::{
    EMBEDDING_DIMENSION_KEY, EMBEDDING_MODEL_KEY, EMBEDDING_NORMALIZED_KEY,
    EMBEDDING_PROVIDER_KEY, EmbeddingIdentity, EmbeddingProvider, l2_norm,
};
pub use frame::{Frame, StoreStats, WalStats};
pub use manifest::{Header, IndexManifest, ReplaySnapshot, SegmentEntry, Toc};
