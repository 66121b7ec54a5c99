//! Dual header-page codec.
//!
//! The same logical header is duplicated at file offsets 0 and 4096. Each page
//! carries a `header_page_generation` and a trailing SHA-256 over the
//! preceding bytes; open selects the valid page with the higher generation.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
};

use crate::{
    codec::sha256,
    constants::{
        FORMAT_VERSION, HEADER_PAGE_A_OFFSET, HEADER_PAGE_B_OFFSET, HEADER_PAGE_SIZE, MAGIC,
        WAL_OFFSET, WAL_SIZE_MIN,
    },
    error::{Result, WaxError},
    types::{Header, ReplaySnapshot},
};

const VERSION_OFFSET: usize = 4;
const FILE_GENERATION_POS: usize = 8;
const WAL_OFFSET_POS: usize = 16;
const WAL_SIZE_POS: usize = 24;
const WAL_WRITE_POS: usize = 32;
const WAL_CHECKPOINT_POS: usize = 40;
const WAL_COMMITTED_SEQ_POS: usize = 48;
const FOOTER_OFFSET_POS: usize = 56;
const REPLAY_TAG_POS: usize = 64;
const REPLAY_FOOTER_POS: usize = 65;
const REPLAY_GENERATION_POS: usize = 73;
const PAGE_GENERATION_POS: usize = 81;
const CHECKSUM_POS: usize = HEADER_PAGE_SIZE - 32;

/// Deterministic encoder/decoder for the fixed-size header pages.
pub struct HeaderCodec;

impl HeaderCodec {
    /// Encodes a header into the canonical 4 KiB page, zero-filling unused
    /// bytes and stamping the trailing checksum.
    pub fn encode(header: &Header) -> Result<[u8; HEADER_PAGE_SIZE]> {
        if header.wal_offset < WAL_OFFSET {
            return Err(WaxError::InvalidHeader {
                reason: "wal_offset precedes the header pages".into(),
            });
        }
        if header.wal_size < WAL_SIZE_MIN {
            return Err(WaxError::InvalidHeader {
                reason: "wal_size below minimum".into(),
            });
        }
        if header.wal_write_pos >= header.wal_size || header.wal_checkpoint_pos >= header.wal_size
        {
            return Err(WaxError::InvalidHeader {
                reason: "wal position outside the ring".into(),
            });
        }

        let mut buf = [0u8; HEADER_PAGE_SIZE];
        buf[..MAGIC.len()].copy_from_slice(&MAGIC);
        buf[VERSION_OFFSET..VERSION_OFFSET + 2].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[FILE_GENERATION_POS..FILE_GENERATION_POS + 8]
            .copy_from_slice(&header.file_generation.to_le_bytes());
        buf[WAL_OFFSET_POS..WAL_OFFSET_POS + 8].copy_from_slice(&header.wal_offset.to_le_bytes());
        buf[WAL_SIZE_POS..WAL_SIZE_POS + 8].copy_from_slice(&header.wal_size.to_le_bytes());
        buf[WAL_WRITE_POS..WAL_WRITE_POS + 8].copy_from_slice(&header.wal_write_pos.to_le_bytes());
        buf[WAL_CHECKPOINT_POS..WAL_CHECKPOINT_POS + 8]
            .copy_from_slice(&header.wal_checkpoint_pos.to_le_bytes());
        buf[WAL_COMMITTED_SEQ_POS..WAL_COMMITTED_SEQ_POS + 8]
            .copy_from_slice(&header.wal_committed_seq.to_le_bytes());
        buf[FOOTER_OFFSET_POS..FOOTER_OFFSET_POS + 8]
            .copy_from_slice(&header.footer_offset.to_le_bytes());
        match header.replay_snapshot {
            Some(snapshot) => {
                buf[REPLAY_TAG_POS] = 1;
                buf[REPLAY_FOOTER_POS..REPLAY_FOOTER_POS + 8]
                    .copy_from_slice(&snapshot.footer_offset.to_le_bytes());
                buf[REPLAY_GENERATION_POS..REPLAY_GENERATION_POS + 8]
                    .copy_from_slice(&snapshot.generation.to_le_bytes());
            }
            None => buf[REPLAY_TAG_POS] = 0,
        }
        buf[PAGE_GENERATION_POS..PAGE_GENERATION_POS + 8]
            .copy_from_slice(&header.header_page_generation.to_le_bytes());
        let checksum = sha256(&buf[..CHECKSUM_POS]);
        buf[CHECKSUM_POS..].copy_from_slice(&checksum);
        Ok(buf)
    }

    /// Decodes and validates one header page.
    pub fn decode(bytes: &[u8; HEADER_PAGE_SIZE]) -> Result<Header> {
        let stored: [u8; 32] = extract_array(bytes, CHECKSUM_POS)?;
        if sha256(&bytes[..CHECKSUM_POS]) != stored {
            return Err(WaxError::ChecksumMismatch { context: "header" });
        }

        let magic: [u8; 4] = extract_array(bytes, 0)?;
        if magic != MAGIC {
            return Err(WaxError::InvalidHeader {
                reason: "magic mismatch".into(),
            });
        }
        let version = u16::from_le_bytes(extract_array(bytes, VERSION_OFFSET)?);
        if version != FORMAT_VERSION {
            return Err(WaxError::InvalidHeader {
                reason: "unsupported version".into(),
            });
        }

        let file_generation = u64::from_le_bytes(extract_array(bytes, FILE_GENERATION_POS)?);
        let wal_offset = u64::from_le_bytes(extract_array(bytes, WAL_OFFSET_POS)?);
        if wal_offset < WAL_OFFSET {
            return Err(WaxError::InvalidHeader {
                reason: "wal_offset precedes the header pages".into(),
            });
        }
        let wal_size = u64::from_le_bytes(extract_array(bytes, WAL_SIZE_POS)?);
        if wal_size < WAL_SIZE_MIN {
            return Err(WaxError::InvalidHeader {
                reason: "wal_size below minimum".into(),
            });
        }
        let wal_write_pos = u64::from_le_bytes(extract_array(bytes, WAL_WRITE_POS)?);
        let wal_checkpoint_pos = u64::from_le_bytes(extract_array(bytes, WAL_CHECKPOINT_POS)?);
        if wal_write_pos >= wal_size || wal_checkpoint_pos >= wal_size {
            return Err(WaxError::InvalidHeader {
                reason: "wal position outside the ring".into(),
            });
        }
        let wal_committed_seq = u64::from_le_bytes(extract_array(bytes, WAL_COMMITTED_SEQ_POS)?);
        let footer_offset = u64::from_le_bytes(extract_array(bytes, FOOTER_OFFSET_POS)?);
        let replay_snapshot = match bytes[REPLAY_TAG_POS] {
            0 => None,
            1 => Some(ReplaySnapshot {
                footer_offset: u64::from_le_bytes(extract_array(bytes, REPLAY_FOOTER_POS)?),
                generation: u64::from_le_bytes(extract_array(bytes, REPLAY_GENERATION_POS)?),
            }),
            _ => {
                return Err(WaxError::InvalidHeader {
                    reason: "invalid replay snapshot tag".into(),
                });
            }
        };
        let header_page_generation = u64::from_le_bytes(extract_array(bytes, PAGE_GENERATION_POS)?);

        Ok(Header {
            file_generation,
            wal_offset,
            wal_size,
            wal_write_pos,
            wal_checkpoint_pos,
            wal_committed_seq,
            footer_offset,
            replay_snapshot,
            header_page_generation,
        })
    }

    /// Writes one header page at the given file offset.
    pub fn write_page(file: &mut File, offset: u64, header: &Header) -> Result<()> {
        let bytes = Self::encode(header)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&bytes)?;
        Ok(())
    }

    /// Reads both header pages and selects the winner: the valid page with the
    /// higher page generation; a single valid page wins by default; no valid
    /// page is a corruption error.
    pub fn read_active(file: &mut File) -> Result<Header> {
        let page_a = Self::read_page(file, HEADER_PAGE_A_OFFSET);
        let page_b = Self::read_page(file, HEADER_PAGE_B_OFFSET);
        match (page_a, page_b) {
            (Ok(a), Ok(b)) => {
                if b.header_page_generation > a.header_page_generation {
                    Ok(b)
                } else {
                    Ok(a)
                }
            }
            (Ok(a), Err(_)) => Ok(a),
            (Err(_), Ok(b)) => Ok(b),
            (Err(_), Err(_)) => Err(WaxError::InvalidHeader {
                reason: "neither header page validates".into(),
            }),
        }
    }

    fn read_page(file: &mut File, offset: u64) -> Result<Header> {
        let mut buf = [0u8; HEADER_PAGE_SIZE];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Self::decode(&buf)
    }
}

/// Extracts a fixed-size array from a byte slice at the given offset.
#[inline]
fn extract_array<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N]> {
    bytes
        .get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or(WaxError::InvalidHeader {
            reason: "header truncated".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::WAL_SIZE_DEFAULT;

    fn sample_header() -> Header {
        Header {
            file_generation: 3,
            wal_offset: WAL_OFFSET,
            wal_size: WAL_SIZE_DEFAULT,
            wal_write_pos: 96,
            wal_checkpoint_pos: 96,
            wal_committed_seq: 2,
            footer_offset: 1_048_576,
            replay_snapshot: Some(ReplaySnapshot {
                footer_offset: 524_288,
                generation: 2,
            }),
            header_page_generation: 7,
        }
    }

    #[test]
    fn roundtrip_encode_decode() {
        let header = sample_header();
        let encoded = HeaderCodec::encode(&header).expect("encode header");
        let decoded = HeaderCodec::decode(&encoded).expect("decode header");
        assert_eq!(decoded, header);
    }

    #[test]
    fn corrupted_page_fails_checksum() {
        let header = sample_header();
        let mut encoded = HeaderCodec::encode(&header).expect("encode header");
        encoded[FOOTER_OFFSET_POS] ^= 0xFF;
        let err = HeaderCodec::decode(&encoded).expect_err("should fail");
        assert!(matches!(err, WaxError::ChecksumMismatch { .. }));
    }

    #[test]
    fn reject_wal_position_outside_ring() {
        let mut header = sample_header();
        header.wal_write_pos = header.wal_size;
        assert!(HeaderCodec::encode(&header).is_err());
    }

    #[test]
    fn reject_unsupported_version() {
        let header = sample_header();
        let mut encoded = HeaderCodec::encode(&header).expect("encode header");
        encoded[VERSION_OFFSET] = 0xFF;
        // Restamp the checksum so version is the only defect.
        let checksum = sha256(&encoded[..CHECKSUM_POS]);
        encoded[CHECKSUM_POS..].copy_from_slice(&checksum);
        let err = HeaderCodec::decode(&encoded).expect_err("decode should fail");
        assert!(matches!(err, WaxError::InvalidHeader { .. }));
    }

    #[test]
    fn higher_page_generation_wins() {
        use std::io::Write as _;
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("pages.mv2s");
        let mut file = File::create(&path).expect("create");
        let older = sample_header();
        let mut newer = sample_header();
        newer.file_generation = 4;
        newer.header_page_generation = 8;
        file.write_all(&HeaderCodec::encode(&older).unwrap()).unwrap();
        file.write_all(&HeaderCodec::encode(&newer).unwrap()).unwrap();
        file.flush().unwrap();
        drop(file);

        let mut file = File::options().read(true).write(true).open(&path).unwrap();
        let active = HeaderCodec::read_active(&mut file).expect("read active");
        assert_eq!(active.file_generation, 4);
        assert_eq!(active.header_page_generation, 8);
    }
}
