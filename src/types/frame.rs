//! Frame records and store-level statistics.

use std::collections::BTreeMap;

use super::common::{CanonicalEncoding, FrameId, FrameStatus};

/// Frame: the addressable payload unit catalogued by the TOC.
///
/// Identity is a dense, monotonically allocated id. Payload bytes live in the
/// data area at `payload_offset`; the canonical checksum always covers the
/// canonical (uncompressed) form, while `stored_checksum` covers the on-disk
/// bytes and is present exactly when the encoding is not plain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub id: FrameId,
    pub timestamp_ms: u64,
    pub kind: Option<String>,
    pub role: Option<String>,
    pub parent_id: Option<FrameId>,
    /// String-keyed metadata entries. Numeric metadata is serialized as
    /// decimal strings; the map is never widened to arbitrary JSON.
    pub entries: BTreeMap<String, String>,
    pub payload_offset: u64,
    pub payload_length: u64,
    pub canonical_encoding: CanonicalEncoding,
    pub canonical_length: u64,
    pub canonical_checksum: [u8; 32],
    pub stored_checksum: Option<[u8; 32]>,
    pub status: FrameStatus,
    pub supersedes: Option<FrameId>,
    pub superseded_by: Option<FrameId>,
}

impl Frame {
    /// End offset of the payload bytes in the data area.
    #[must_use]
    pub fn payload_end(&self) -> u64 {
        self.payload_offset.saturating_add(self.payload_length)
    }

    /// Internal journal frames are excluded from recall lanes.
    #[must_use]
    pub fn is_journal(&self) -> bool {
        self.kind
            .as_deref()
            .is_some_and(|kind| kind.starts_with(crate::constants::JOURNAL_KIND_PREFIX))
    }
}

/// Aggregate store statistics for quick health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub frame_count: u64,
    pub active_frame_count: u64,
    pub deleted_frame_count: u64,
    pub generation: u64,
    pub file_size_bytes: u64,
    pub wal_size: u64,
    pub pending_mutations: u64,
    pub payload_bytes: u64,
    pub vector_count: u64,
    pub has_lex_index: bool,
    pub has_vec_index: bool,
    pub has_time_index: bool,
}

/// Counters and positions exposed by the WAL writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalStats {
    pub write_pos: u64,
    pub checkpoint_pos: u64,
    pub pending_bytes: u64,
    pub last_sequence: u64,
    pub wrap_count: u64,
    pub checkpoint_count: u64,
    pub sentinel_write_count: u64,
    pub write_call_count: u64,
    pub auto_commit_count: u64,
}
