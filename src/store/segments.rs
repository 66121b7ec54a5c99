//! Time-index segment codec and segment read helpers.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

use crate::{
    codec::{ByteReader, ByteWriter, sha256},
    constants::{SEGMENT_VERSION, TIME_SEGMENT_MAGIC},
    error::{Result, WaxError},
    types::{FrameId, SegmentEntry},
};

/// Sorted `(timestamp_ms, frame_id)` pairs for time-scoped recall.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimeSegment {
    pub entries: Vec<(u64, FrameId)>,
}

impl TimeSegment {
    /// Builds a segment from unsorted pairs.
    #[must_use]
    pub fn from_entries(mut entries: Vec<(u64, FrameId)>) -> Self {
        entries.sort_unstable();
        Self { entries }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(14 + self.entries.len() * 16);
        writer.put_bytes(&TIME_SEGMENT_MAGIC);
        writer.put_u16(SEGMENT_VERSION);
        writer.put_u64(self.entries.len() as u64);
        for (timestamp_ms, frame_id) in &self.entries {
            writer.put_u64(*timestamp_ms);
            writer.put_u64(*frame_id);
        }
        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, "time segment");
        let magic = reader.get_array::<4>()?;
        if magic != TIME_SEGMENT_MAGIC {
            return Err(WaxError::InvalidSegment {
                reason: "time segment magic mismatch".into(),
            });
        }
        let version = reader.get_u16()?;
        if version != SEGMENT_VERSION {
            return Err(WaxError::InvalidSegment {
                reason: format!("unsupported time segment version {version}").into(),
            });
        }
        let count = reader.get_u64()?;
        if reader.remaining() as u64 != count.saturating_mul(16) {
            return Err(WaxError::InvalidSegment {
                reason: "time segment length mismatch".into(),
            });
        }
        let mut entries = Vec::with_capacity(usize::try_from(count).unwrap_or(0));
        for _ in 0..count {
            let timestamp_ms = reader.get_u64()?;
            let frame_id = reader.get_u64()?;
            entries.push((timestamp_ms, frame_id));
        }
        reader.expect_end()?;
        Ok(Self { entries })
    }

    /// Frame ids whose timestamp does not exceed `as_of_ms`.
    #[must_use]
    pub fn frames_as_of(&self, as_of_ms: u64) -> Vec<FrameId> {
        self.entries
            .iter()
            .take_while(|(timestamp_ms, _)| *timestamp_ms <= as_of_ms)
            .map(|(_, frame_id)| *frame_id)
            .collect()
    }
}

/// Reads a catalogued segment blob and verifies its checksum.
pub fn read_segment_bytes(file: &mut File, entry: &SegmentEntry) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; usize::try_from(entry.bytes_length).unwrap_or(0)];
    file.seek(SeekFrom::Start(entry.bytes_offset))?;
    file.read_exact(&mut bytes)?;
    if sha256(&bytes) != entry.checksum {
        return Err(WaxError::ChecksumMismatch { context: "segment" });
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_sorted() {
        let segment = TimeSegment::from_entries(vec![(300, 2), (100, 0), (200, 1)]);
        let decoded = TimeSegment::decode(&segment.encode()).expect("decode");
        assert_eq!(decoded.entries, vec![(100, 0), (200, 1), (300, 2)]);
    }

    #[test]
    fn as_of_clips_newer_frames() {
        let segment = TimeSegment::from_entries(vec![(100, 0), (200, 1), (300, 2)]);
        assert_eq!(segment.frames_as_of(250), vec![0, 1]);
        assert_eq!(segment.frames_as_of(50), Vec::<FrameId>::new());
    }

    #[test]
    fn rejects_magic_and_length_tampering() {
        let segment = TimeSegment::from_entries(vec![(1, 0)]);
        let bytes = segment.encode();

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xFF;
        assert!(TimeSegment::decode(&bad_magic).is_err());

        let mut truncated = bytes;
        truncated.pop();
        assert!(TimeSegment::decode(&truncated).is_err());
    }
}
