//! WAL record framing.
//!
//! ```text
//! record: [ sequence (u64) | payload_len (u32) | flags (u32) | payload sha-256 (32) | payload ]
//! ```
//!
//! Records never span the ring end. A zero-filled header at the write position
//! is the terminal marker readers use to detect the end of written data.

use crate::{
    codec::sha256,
    constants::{RECORD_FLAG_PADDING, RECORD_HEADER_SIZE},
};

/// Fixed-size record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub sequence: u64,
    pub payload_len: u32,
    pub flags: u32,
    pub payload_sha256: [u8; 32],
}

impl RecordHeader {
    #[must_use]
    pub fn for_payload(sequence: u64, payload: &[u8], flags: u32) -> Self {
        Self {
            sequence,
            payload_len: u32::try_from(payload.len()).unwrap_or(u32::MAX),
            flags,
            payload_sha256: sha256(payload),
        }
    }

    #[must_use]
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        let mut buf = [0u8; RECORD_HEADER_SIZE];
        buf[..8].copy_from_slice(&self.sequence.to_le_bytes());
        buf[8..12].copy_from_slice(&self.payload_len.to_le_bytes());
        buf[12..16].copy_from_slice(&self.flags.to_le_bytes());
        buf[16..].copy_from_slice(&self.payload_sha256);
        buf
    }

    #[must_use]
    pub fn decode(bytes: &[u8; RECORD_HEADER_SIZE]) -> Self {
        let mut sequence = [0u8; 8];
        sequence.copy_from_slice(&bytes[..8]);
        let mut payload_len = [0u8; 4];
        payload_len.copy_from_slice(&bytes[8..12]);
        let mut flags = [0u8; 4];
        flags.copy_from_slice(&bytes[12..16]);
        let mut payload_sha256 = [0u8; 32];
        payload_sha256.copy_from_slice(&bytes[16..]);
        Self {
            sequence: u64::from_le_bytes(sequence),
            payload_len: u32::from_le_bytes(payload_len),
            flags: u32::from_le_bytes(flags),
            payload_sha256,
        }
    }

    #[must_use]
    pub fn is_padding(&self) -> bool {
        self.flags & RECORD_FLAG_PADDING != 0
    }

    /// Verifies the payload digest.
    #[must_use]
    pub fn payload_matches(&self, payload: &[u8]) -> bool {
        payload.len() == self.payload_len as usize && sha256(payload) == self.payload_sha256
    }
}

/// A zero 48-byte block concludes a scan in O(1).
#[must_use]
pub fn is_terminal_marker(bytes: &[u8]) -> bool {
    bytes.len() == RECORD_HEADER_SIZE && bytes.iter().all(|byte| *byte == 0)
}
