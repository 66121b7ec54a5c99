/// File magic for `.mv2s` stores.
pub const MAGIC: [u8; 4] = *b"MV2S";
/// Logical header page size (4 KiB) reserving space for future upgrades.
pub const HEADER_PAGE_SIZE: usize = 4096;
/// Offset of the primary header page.
pub const HEADER_PAGE_A_OFFSET: u64 = 0;
/// Offset of the secondary header page.
pub const HEADER_PAGE_B_OFFSET: u64 = HEADER_PAGE_SIZE as u64;
/// Binary format schema version.
pub const FORMAT_VERSION: u16 = 1;
/// Table-of-contents schema version.
pub const TOC_VERSION: u64 = 1;

/// Embedded WAL ring begins immediately after the two header pages.
pub const WAL_OFFSET: u64 = 2 * HEADER_PAGE_SIZE as u64;
/// Default WAL ring size for new stores.
pub const WAL_SIZE_DEFAULT: u64 = 256 * 1024;
/// Smallest ring a store will accept; anything below cannot hold a record.
pub const WAL_SIZE_MIN: u64 = 4 * 1024;

/// Fixed WAL record header size: sequence + length + flags + payload digest.
pub const RECORD_HEADER_SIZE: usize = 8 + 4 + 4 + 32;
/// Flag bit marking a padding record written to wrap the ring.
pub const RECORD_FLAG_PADDING: u32 = 1;

/// How far back from end-of-file the footer scan will look during recovery.
pub const MAX_FOOTER_SCAN_BYTES: u64 = 4 * 1024 * 1024;

/// Magic bytes for the embedded vector segment.
pub const VEC_SEGMENT_MAGIC: [u8; 4] = *b"MVVS";
/// Magic bytes for the embedded lexical segment.
pub const LEX_SEGMENT_MAGIC: [u8; 4] = *b"MVLS";
/// Magic bytes for the time index segment.
pub const TIME_SEGMENT_MAGIC: [u8; 4] = *b"MVTI";
/// On-disk version for all embedded index segments.
pub const SEGMENT_VERSION: u16 = 1;

/// Frame kind reserved for structured-memory journal records.
pub const JOURNAL_FACT_KIND: &str = "wax/journal.fact";
/// Frame kind reserved for embedding memo journal records.
pub const JOURNAL_EMBED_KIND: &str = "wax/journal.embed";
/// Prefix marking internal journal kinds excluded from recall lanes.
pub const JOURNAL_KIND_PREFIX: &str = "wax/journal.";
/// Version prefix of fact journal payloads.
pub const JOURNAL_FACT_PREFIX: &[u8] = b"WAXFACT1";
/// Version prefix of embedding memo journal payloads.
pub const JOURNAL_EMBED_PREFIX: &[u8] = b"WAXEM1";

/// Reciprocal-rank-fusion constant.
pub const RRF_K: f64 = 60.0;
/// Minimum per-lane candidate window during recall.
pub const DEFAULT_CANDIDATE_WINDOW: usize = 32;
