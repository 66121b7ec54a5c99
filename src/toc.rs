//! Table-of-contents codec.
//!
//! The TOC is the authoritative committed catalog: frame records, optional
//! index manifests (lex/vec/time), the segment catalog, a Merkle root over
//! frame checksums, a reserved signing envelope, and a trailing SHA-256 over
//! all preceding bytes.

use crate::{
    codec::{ByteReader, ByteWriter, sha256},
    constants::TOC_VERSION,
    error::{Result, WaxError},
    types::{
        CanonicalEncoding, Frame, FrameStatus, IndexManifest, SegmentCompression, SegmentEntry,
        SegmentKind, Toc,
    },
};

/// Reserved signing envelope: scheme byte (0 = unsigned) plus signature slot.
const SIGNING_ENVELOPE_LEN: usize = 1 + 64;

impl Toc {
    /// Serialises the TOC, stamping `toc_checksum` and `merkle_root`.
    pub fn encode(&mut self) -> Result<Vec<u8>> {
        self.merkle_root = merkle_root(&self.frames);

        let mut writer = ByteWriter::with_capacity(256 + self.frames.len() * 128);
        writer.put_u64(self.toc_version);
        writer.put_u32(u32::try_from(self.frames.len()).map_err(|_| WaxError::InvalidToc {
            reason: "frame count exceeds u32".into(),
        })?);
        for frame in &self.frames {
            encode_frame(&mut writer, frame)?;
        }
        encode_manifest(&mut writer, self.lex.as_ref());
        encode_manifest(&mut writer, self.vec.as_ref());
        encode_manifest(&mut writer, self.time.as_ref());
        writer.put_u32(u32::try_from(self.segments.len()).unwrap_or(u32::MAX));
        for segment in &self.segments {
            writer.put_u64(segment.segment_id);
            writer.put_u64(segment.bytes_offset);
            writer.put_u64(segment.bytes_length);
            writer.put_bytes(&segment.checksum);
            writer.put_u8(segment.compression.as_byte());
            writer.put_u8(segment.kind.as_byte());
        }
        writer.put_bytes(&self.merkle_root);
        writer.put_bytes(&[0u8; SIGNING_ENVELOPE_LEN]);

        self.toc_checksum = sha256(writer.as_slice());
        writer.put_bytes(&self.toc_checksum);
        Ok(writer.into_bytes())
    }

    /// Deserialises and validates TOC bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 32 {
            return Err(WaxError::InvalidToc {
                reason: "shorter than the trailing checksum".into(),
            });
        }
        let (body, stored) = bytes.split_at(bytes.len() - 32);
        if sha256(body) != stored {
            return Err(WaxError::ChecksumMismatch { context: "toc" });
        }

        let mut reader = ByteReader::new(body, "toc");
        let toc_version = reader.get_u64()?;
        if toc_version != TOC_VERSION {
            return Err(WaxError::InvalidToc {
                reason: format!("unsupported toc version {toc_version}").into(),
            });
        }
        let frame_count = reader.get_u32()? as usize;
        let mut frames = Vec::with_capacity(frame_count.min(1 << 20));
        for expected_id in 0..frame_count {
            let frame = decode_frame(&mut reader)?;
            if frame.id != expected_id as u64 {
                return Err(WaxError::InvalidToc {
                    reason: format!(
                        "frame ids are not dense (expected {expected_id}, got {})",
                        frame.id
                    )
                    .into(),
                });
            }
            frames.push(frame);
        }
        let lex = decode_manifest(&mut reader)?;
        let vec = decode_manifest(&mut reader)?;
        let time = decode_manifest(&mut reader)?;
        let segment_count = reader.get_u32()? as usize;
        let mut segments = Vec::with_capacity(segment_count.min(1 << 16));
        for _ in 0..segment_count {
            let segment_id = reader.get_u64()?;
            let bytes_offset = reader.get_u64()?;
            let bytes_length = reader.get_u64()?;
            let checksum = reader.get_array::<32>()?;
            let compression = SegmentCompression::from_byte(reader.get_u8()?).ok_or(
                WaxError::InvalidToc {
                    reason: "unknown segment compression".into(),
                },
            )?;
            let kind = SegmentKind::from_byte(reader.get_u8()?).ok_or(WaxError::InvalidToc {
                reason: "unknown segment kind".into(),
            })?;
            segments.push(SegmentEntry {
                segment_id,
                bytes_offset,
                bytes_length,
                checksum,
                compression,
                kind,
            });
        }
        let merkle_root = reader.get_array::<32>()?;
        let envelope = reader.get_array::<{ SIGNING_ENVELOPE_LEN }>()?;
        if envelope[0] != 0 {
            return Err(WaxError::InvalidToc {
                reason: "unsupported signing scheme".into(),
            });
        }
        reader.expect_end()?;

        let mut toc_checksum = [0u8; 32];
        toc_checksum.copy_from_slice(stored);
        let toc = Self {
            toc_version,
            frames,
            lex,
            vec,
            time,
            segments,
            merkle_root,
            toc_checksum,
        };
        toc.validate_structure()?;
        Ok(toc)
    }

    /// Cross-field validation run after a successful decode.
    fn validate_structure(&self) -> Result<()> {
        if self.merkle_root != merkle_root(&self.frames) {
            return Err(WaxError::ChecksumMismatch {
                context: "toc merkle root",
            });
        }
        for (manifest, kind) in [
            (self.lex.as_ref(), SegmentKind::Lexical),
            (self.vec.as_ref(), SegmentKind::Vector),
            (self.time.as_ref(), SegmentKind::Time),
        ] {
            if manifest.is_some() && self.segment_for_kind(kind).is_none() {
                return Err(WaxError::InvalidToc {
                    reason: format!("index manifest has no {kind:?} segment catalog entry").into(),
                });
            }
        }
        Ok(())
    }
}

fn encode_frame(writer: &mut ByteWriter, frame: &Frame) -> Result<()> {
    writer.put_u64(frame.id);
    writer.put_u64(frame.timestamp_ms);
    writer.put_opt_str(frame.kind.as_deref());
    writer.put_opt_str(frame.role.as_deref());
    writer.put_opt_u64(frame.parent_id);
    writer.put_opt_u64(frame.supersedes);
    writer.put_opt_u64(frame.superseded_by);
    writer.put_str_map(&frame.entries);
    writer.put_u64(frame.payload_offset);
    writer.put_u64(frame.payload_length);
    writer.put_u8(frame.canonical_encoding.as_byte());
    writer.put_u64(frame.canonical_length);
    writer.put_bytes(&frame.canonical_checksum);
    if frame.canonical_encoding.requires_stored_checksum() {
        let stored = frame.stored_checksum.ok_or(WaxError::InvalidToc {
            reason: "compressed frame lacks a stored checksum".into(),
        })?;
        writer.put_bytes(&stored);
    }
    writer.put_u8(frame.status.as_byte());
    Ok(())
}

fn decode_frame(reader: &mut ByteReader<'_>) -> Result<Frame> {
    let id = reader.get_u64()?;
    let timestamp_ms = reader.get_u64()?;
    let kind = reader.get_opt_str()?;
    let role = reader.get_opt_str()?;
    let parent_id = reader.get_opt_u64()?;
    let supersedes = reader.get_opt_u64()?;
    let superseded_by = reader.get_opt_u64()?;
    let entries = reader.get_str_map()?;
    let payload_offset = reader.get_u64()?;
    let payload_length = reader.get_u64()?;
    let canonical_encoding =
        CanonicalEncoding::from_byte(reader.get_u8()?).ok_or(WaxError::InvalidToc {
            reason: "unknown canonical encoding".into(),
        })?;
    let canonical_length = reader.get_u64()?;
    let canonical_checksum = reader.get_array::<32>()?;
    let stored_checksum = if canonical_encoding.requires_stored_checksum() {
        Some(reader.get_array::<32>()?)
    } else {
        None
    };
    let status = FrameStatus::from_byte(reader.get_u8()?).ok_or(WaxError::InvalidToc {
        reason: "unknown frame status".into(),
    })?;
    Ok(Frame {
        id,
        timestamp_ms,
        kind,
        role,
        parent_id,
        entries,
        payload_offset,
        payload_length,
        canonical_encoding,
        canonical_length,
        canonical_checksum,
        stored_checksum,
        status,
        supersedes,
        superseded_by,
    })
}

fn encode_manifest(writer: &mut ByteWriter, manifest: Option<&IndexManifest>) {
    writer.put_opt(manifest, |w, m| {
        w.put_u64(m.doc_count);
        w.put_u64(m.bytes_offset);
        w.put_u64(m.bytes_length);
        w.put_bytes(&m.checksum);
        w.put_u16(m.version);
    });
}

fn decode_manifest(reader: &mut ByteReader<'_>) -> Result<Option<IndexManifest>> {
    reader.get_opt(|r| {
        Ok(IndexManifest {
            doc_count: r.get_u64()?,
            bytes_offset: r.get_u64()?,
            bytes_length: r.get_u64()?,
            checksum: r.get_array::<32>()?,
            version: r.get_u16()?,
        })
    })
}

/// Binary Merkle root over frame canonical checksums; zeroed when empty.
#[must_use]
pub fn merkle_root(frames: &[Frame]) -> [u8; 32] {
    if frames.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<[u8; 32]> = frames.iter().map(|f| f.canonical_checksum).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let mut buf = [0u8; 64];
            buf[..32].copy_from_slice(&pair[0]);
            // An odd tail is paired with itself.
            buf[32..].copy_from_slice(pair.get(1).unwrap_or(&pair[0]));
            next.push(sha256(&buf));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_frame(id: u64) -> Frame {
        let mut entries = BTreeMap::new();
        entries.insert("source".to_string(), "test".to_string());
        Frame {
            id,
            timestamp_ms: 1_700_000_000_000 + id,
            kind: Some("text".into()),
            role: None,
            parent_id: None,
            entries,
            payload_offset: 16_384 + id * 128,
            payload_length: 128,
            canonical_encoding: CanonicalEncoding::Plain,
            canonical_length: 128,
            canonical_checksum: [id as u8; 32],
            stored_checksum: None,
            status: FrameStatus::Live,
            supersedes: None,
            superseded_by: None,
        }
    }

    fn sample_toc() -> Toc {
        let mut toc = Toc::empty();
        toc.frames = vec![sample_frame(0), sample_frame(1), sample_frame(2)];
        toc.vec = Some(IndexManifest {
            doc_count: 3,
            bytes_offset: 20_000,
            bytes_length: 512,
            checksum: [0x44; 32],
            version: 1,
        });
        toc.segments = vec![SegmentEntry {
            segment_id: 0,
            bytes_offset: 20_000,
            bytes_length: 512,
            checksum: [0x44; 32],
            compression: SegmentCompression::None,
            kind: SegmentKind::Vector,
        }];
        toc
    }

    #[test]
    fn serialize_deserialize_roundtrip() {
        let mut toc = sample_toc();
        let encoded = toc.encode().expect("encode toc");
        let decoded = Toc::decode(&encoded).expect("decode toc");
        assert_eq!(decoded, toc);
    }

    #[test]
    fn detect_checksum_mismatch() {
        let mut toc = sample_toc();
        let mut bytes = toc.encode().expect("encode toc");
        bytes[12] ^= 0xFF;
        let err = Toc::decode(&bytes).expect_err("must fail");
        assert!(matches!(err, WaxError::ChecksumMismatch { .. }));
    }

    #[test]
    fn reject_non_dense_ids() {
        let mut toc = sample_toc();
        toc.frames[1].id = 5;
        let bytes = toc.encode().expect("encode toc");
        let err = Toc::decode(&bytes).expect_err("must fail");
        assert!(matches!(err, WaxError::InvalidToc { .. }));
    }

    #[test]
    fn reject_manifest_without_segment() {
        let mut toc = sample_toc();
        toc.segments.clear();
        let bytes = toc.encode().expect("encode toc");
        let err = Toc::decode(&bytes).expect_err("must fail");
        assert!(matches!(err, WaxError::InvalidToc { .. }));
    }

    #[test]
    fn compressed_frame_requires_stored_checksum() {
        let mut toc = sample_toc();
        toc.frames[0].canonical_encoding = CanonicalEncoding::Zstd;
        let err = toc.encode().expect_err("must fail");
        assert!(matches!(err, WaxError::InvalidToc { .. }));

        toc.frames[0].stored_checksum = Some([0x77; 32]);
        let bytes = toc.encode().expect("encode toc");
        let decoded = Toc::decode(&bytes).expect("decode toc");
        assert_eq!(decoded.frames[0].stored_checksum, Some([0x77; 32]));
    }

    #[test]
    fn empty_toc_roundtrip() {
        let mut toc = Toc::empty();
        let bytes = toc.encode().expect("encode toc");
        let decoded = Toc::decode(&bytes).expect("decode toc");
        assert!(decoded.frames.is_empty());
        assert_eq!(decoded.merkle_root, [0u8; 32]);
    }
}
