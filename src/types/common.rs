//! Foundational enums and marker types shared across store data structures.

/// Frame IDs are dense u64 indexes into the committed frame list.
pub type FrameId = u64;

/// Segment IDs identify embedded index segments; monotonic within a file.
pub type SegmentId = u64;

/// Encoding used for the canonical payload bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CanonicalEncoding {
    #[default]
    Plain,
    Zstd,
}

impl CanonicalEncoding {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(CanonicalEncoding::Plain),
            1 => Some(CanonicalEncoding::Zstd),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            CanonicalEncoding::Plain => 0,
            CanonicalEncoding::Zstd => 1,
        }
    }

    /// Compressed encodings must carry a checksum over the on-disk bytes.
    #[must_use]
    pub const fn requires_stored_checksum(self) -> bool {
        !matches!(self, CanonicalEncoding::Plain)
    }
}

/// Lifecycle state of a frame. Deletion is logical; the TOC entry remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    #[default]
    Live,
    Deleted,
}

impl FrameStatus {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(FrameStatus::Live),
            1 => Some(FrameStatus::Deleted),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            FrameStatus::Live => 0,
            FrameStatus::Deleted => 1,
        }
    }
}

/// Compression applied to an embedded index segment blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SegmentCompression {
    #[default]
    None,
    Zstd,
}

impl SegmentCompression {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(SegmentCompression::None),
            1 => Some(SegmentCompression::Zstd),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            SegmentCompression::None => 0,
            SegmentCompression::Zstd => 1,
        }
    }
}

/// Kind of an embedded index segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Lexical,
    Vector,
    Time,
}

impl SegmentKind {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(SegmentKind::Lexical),
            1 => Some(SegmentKind::Vector),
            2 => Some(SegmentKind::Time),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            SegmentKind::Lexical => 0,
            SegmentKind::Vector => 1,
            SegmentKind::Time => 2,
        }
    }
}
