//! Mutation payload codec for WAL records.

use std::collections::BTreeMap;

use crate::{
    codec::{ByteReader, ByteWriter},
    error::{Result, WaxError},
    types::{CanonicalEncoding, FrameId},
};

const TAG_PUT_FRAME: u8 = 1;
const TAG_DELETE_FRAME: u8 = 2;
const TAG_SUPERSEDE: u8 = 3;
const TAG_PUT_EMBEDDING: u8 = 4;

/// Frame insertion carried through the WAL. The payload bytes themselves are
/// written directly into the data area before the record that references them.
#[derive(Debug, Clone, PartialEq)]
pub struct PutFrame {
    pub frame_id: FrameId,
    pub timestamp_ms: u64,
    pub kind: Option<String>,
    pub role: Option<String>,
    pub parent_id: Option<FrameId>,
    pub entries: BTreeMap<String, String>,
    pub payload_offset: u64,
    pub payload_length: u64,
    pub canonical_encoding: CanonicalEncoding,
    pub canonical_length: u64,
    pub canonical_checksum: [u8; 32],
    pub stored_checksum: Option<[u8; 32]>,
}

impl PutFrame {
    #[must_use]
    pub fn payload_end(&self) -> u64 {
        self.payload_offset.saturating_add(self.payload_length)
    }
}

/// Decoded store mutation staged in the WAL until commit.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    PutFrame(PutFrame),
    DeleteFrame { frame_id: FrameId },
    Supersede { new_id: FrameId, old_id: FrameId },
    PutEmbedding { frame_id: FrameId, vector: Vec<f32> },
}

impl Mutation {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        match self {
            Mutation::PutFrame(put) => {
                writer.put_u8(TAG_PUT_FRAME);
                writer.put_u64(put.frame_id);
                writer.put_u64(put.timestamp_ms);
                writer.put_opt_str(put.kind.as_deref());
                writer.put_opt_str(put.role.as_deref());
                writer.put_opt_u64(put.parent_id);
                writer.put_str_map(&put.entries);
                writer.put_u64(put.payload_offset);
                writer.put_u64(put.payload_length);
                writer.put_u8(put.canonical_encoding.as_byte());
                writer.put_u64(put.canonical_length);
                writer.put_bytes(&put.canonical_checksum);
                if let Some(stored) = put.stored_checksum {
                    writer.put_bytes(&stored);
                }
            }
            Mutation::DeleteFrame { frame_id } => {
                writer.put_u8(TAG_DELETE_FRAME);
                writer.put_u64(*frame_id);
            }
            Mutation::Supersede { new_id, old_id } => {
                writer.put_u8(TAG_SUPERSEDE);
                writer.put_u64(*new_id);
                writer.put_u64(*old_id);
            }
            Mutation::PutEmbedding { frame_id, vector } => {
                writer.put_u8(TAG_PUT_EMBEDDING);
                writer.put_u64(*frame_id);
                writer.put_u32(u32::try_from(vector.len()).unwrap_or(u32::MAX));
                for value in vector {
                    writer.put_f32(*value);
                }
            }
        }
        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, "wal mutation");
        let mutation = match reader.get_u8()? {
            TAG_PUT_FRAME => {
                let frame_id = reader.get_u64()?;
                let timestamp_ms = reader.get_u64()?;
                let kind = reader.get_opt_str()?;
                let role = reader.get_opt_str()?;
                let parent_id = reader.get_opt_u64()?;
                let entries = reader.get_str_map()?;
                let payload_offset = reader.get_u64()?;
                let payload_length = reader.get_u64()?;
                let canonical_encoding = CanonicalEncoding::from_byte(reader.get_u8()?).ok_or(
                    WaxError::DecodeFailed {
                        context: "wal mutation",
                        reason: "unknown canonical encoding".into(),
                    },
                )?;
                let canonical_length = reader.get_u64()?;
                let canonical_checksum = reader.get_array::<32>()?;
                let stored_checksum = if canonical_encoding.requires_stored_checksum() {
                    Some(reader.get_array::<32>()?)
                } else {
                    None
                };
                Mutation::PutFrame(PutFrame {
                    frame_id,
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
                })
            }
            TAG_DELETE_FRAME => Mutation::DeleteFrame {
                frame_id: reader.get_u64()?,
            },
            TAG_SUPERSEDE => Mutation::Supersede {
                new_id: reader.get_u64()?,
                old_id: reader.get_u64()?,
            },
            TAG_PUT_EMBEDDING => {
                let frame_id = reader.get_u64()?;
                let dimension = reader.get_u32()? as usize;
                let mut vector = Vec::with_capacity(dimension.min(1 << 16));
                for _ in 0..dimension {
                    vector.push(reader.get_f32()?);
                }
                Mutation::PutEmbedding { frame_id, vector }
            }
            tag => {
                return Err(WaxError::DecodeFailed {
                    context: "wal mutation",
                    reason: format!("unknown mutation tag {tag}").into(),
                });
            }
        };
        reader.expect_end()?;
        Ok(mutation)
    }
}
