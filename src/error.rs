use std::borrow::Cow;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WaxError>;

/// Coarse failure taxonomy surfaced alongside every error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Filesystem or disk error.
    Io,
    /// Checksum/structure mismatch, out-of-range offsets, unsupported version.
    Corruption,
    /// Caller passed an argument the operation cannot accept.
    InvalidArgument,
    /// Writer-lease contention.
    Busy,
    /// Mode/channel configuration invalid for the requested operation.
    Policy,
    /// Operation is not legal in the current store state.
    State,
}

/// Process metadata recorded by a lease holder, used for diagnostics.
#[derive(Debug, Clone)]
pub struct LeaseOwnerHint {
    pub pid: Option<u32>,
    pub command: Option<String>,
    pub started_at: Option<String>,
}

/// Canonical error surface for the store.
#[derive(Debug, Error)]
pub enum WaxError {
    #[error("I/O error: {source}")]
    Io {
        source: std::io::Error,
        path: Option<PathBuf>,
    },

    #[error("store is locked by another writer: {}", path.display())]
    Busy {
        path: PathBuf,
        owner: Option<LeaseOwnerHint>,
    },

    #[error("checksum mismatch while validating {context}")]
    ChecksumMismatch { context: &'static str },

    #[error("header validation failed: {reason}")]
    InvalidHeader { reason: Cow<'static, str> },

    #[error("commit footer validation failed: {reason}")]
    InvalidFooter { reason: Cow<'static, str> },

    #[error("table of contents validation failed: {reason}")]
    InvalidToc { reason: Cow<'static, str> },

    #[error("index segment is invalid: {reason}")]
    InvalidSegment { reason: Cow<'static, str> },

    #[error("embedded WAL is corrupted at offset {offset}: {reason}")]
    WalCorruption {
        offset: u64,
        reason: Cow<'static, str>,
    },

    #[error("{context} decode failed: {reason}")]
    DecodeFailed {
        context: &'static str,
        reason: Cow<'static, str>,
    },

    #[error("WAL ring cannot hold {requested} more bytes ({available} available)")]
    WalCapacity { requested: u64, available: u64 },

    #[error("WAL sequence space exhausted")]
    SequenceOverflow,

    #[error("vector dimension mismatch (expected {expected}, got {actual})")]
    DimensionMismatch { expected: u32, actual: u32 },

    #[error("batch shape mismatch ({frames} frames, {vectors} vectors)")]
    BatchShapeMismatch { frames: usize, vectors: usize },

    #[error("{field} must not be empty")]
    EmptyKey { field: &'static str },

    #[error("cosine search requires a unit-norm query (|q| = {norm})")]
    QueryNotNormalized { norm: f32 },

    #[error("configuration rejected: {reason}")]
    Policy { reason: Cow<'static, str> },

    #[error("operation on a closed store")]
    Closed,

    #[error("frame {frame_id} is unknown to this commit")]
    UnknownFrame { frame_id: u64 },

    #[error("supersede edge would create a cycle through frame {frame_id}")]
    SupersedeCycle { frame_id: u64 },

    #[error("frame {frame_id} already participates in a supersede edge")]
    SupersedeConflict { frame_id: u64 },

    #[error("embedding references frame {frame_id} staged later in the log")]
    EmbeddingForwardReference { frame_id: u64 },

    #[error("commit aborted by failpoint after step {step}")]
    CommitFailpoint { step: u8 },

    #[error("serialization error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("deserialization error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("journal payload error: {0}")]
    Journal(#[from] serde_json::Error),
}

impl WaxError {
    /// Maps every variant onto the coarse taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            WaxError::Io { .. } | WaxError::CommitFailpoint { .. } => ErrorKind::Io,
            WaxError::Busy { .. } => ErrorKind::Busy,
            WaxError::ChecksumMismatch { .. }
            | WaxError::InvalidHeader { .. }
            | WaxError::InvalidFooter { .. }
            | WaxError::InvalidToc { .. }
            | WaxError::InvalidSegment { .. }
            | WaxError::WalCorruption { .. }
            | WaxError::DecodeFailed { .. }
            | WaxError::Encode(_)
            | WaxError::Decode(_)
            | WaxError::Journal(_) => ErrorKind::Corruption,
            WaxError::WalCapacity { .. }
            | WaxError::DimensionMismatch { .. }
            | WaxError::BatchShapeMismatch { .. }
            | WaxError::EmptyKey { .. } => ErrorKind::InvalidArgument,
            WaxError::QueryNotNormalized { .. } | WaxError::Policy { .. } => ErrorKind::Policy,
            WaxError::SequenceOverflow
            | WaxError::Closed
            | WaxError::UnknownFrame { .. }
            | WaxError::SupersedeCycle { .. }
            | WaxError::SupersedeConflict { .. }
            | WaxError::EmbeddingForwardReference { .. } => ErrorKind::State,
        }
    }
}

impl From<std::io::Error> for WaxError {
    fn from(source: std::io::Error) -> Self {
        Self::Io { source, path: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(
            WaxError::ChecksumMismatch { context: "toc" }.kind(),
            ErrorKind::Corruption
        );
        assert_eq!(
            WaxError::EmptyKey { field: "entity" }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            WaxError::Busy {
                path: PathBuf::from("x.mv2s"),
                owner: None
            }
            .kind(),
            ErrorKind::Busy
        );
        assert_eq!(WaxError::Closed.kind(), ErrorKind::State);
        assert_eq!(
            WaxError::QueryNotNormalized { norm: 2.0 }.kind(),
            ErrorKind::Policy
        );
    }
}
