use std::convert::TryInto;

use memchr::memrchr_iter;

use crate::codec::sha256;

/// Magic trailer marker appended to every committed TOC.
pub const FOOTER_MAGIC: &[u8; 8] = b"MV2SFOOT";

/// Total size of a commit footer in bytes.
pub const FOOTER_SIZE: usize = FOOTER_MAGIC.len() + 8 + 32 + 8 + 8;

/// Parsed representation of the footer trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitFooter {
    pub toc_len: u64,
    pub toc_hash: [u8; 32],
    pub generation: u64,
    /// Highest WAL sequence durable in this commit.
    pub wal_committed_seq: u64,
}

impl CommitFooter {
    /// Serialises the footer into a fixed-size byte array.
    #[must_use]
    pub fn encode(&self) -> [u8; FOOTER_SIZE] {
        let mut buf = [0u8; FOOTER_SIZE];
        let magic_len = FOOTER_MAGIC.len();
        buf[..magic_len].copy_from_slice(FOOTER_MAGIC);
        buf[magic_len..magic_len + 8].copy_from_slice(&self.toc_len.to_le_bytes());
        buf[magic_len + 8..magic_len + 40].copy_from_slice(&self.toc_hash);
        buf[magic_len + 40..magic_len + 48].copy_from_slice(&self.generation.to_le_bytes());
        buf[magic_len + 48..].copy_from_slice(&self.wal_committed_seq.to_le_bytes());
        buf
    }

    /// Attempts to decode a footer from a byte slice.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != FOOTER_SIZE {
            return None;
        }
        let magic_len = FOOTER_MAGIC.len();
        if &bytes[..magic_len] != FOOTER_MAGIC {
            return None;
        }
        let toc_len = u64::from_le_bytes(bytes[magic_len..magic_len + 8].try_into().ok()?);
        let mut toc_hash = [0u8; 32];
        toc_hash.copy_from_slice(&bytes[magic_len + 8..magic_len + 40]);
        let generation =
            u64::from_le_bytes(bytes[magic_len + 40..magic_len + 48].try_into().ok()?);
        let wal_committed_seq = u64::from_le_bytes(bytes[magic_len + 48..].try_into().ok()?);
        Some(Self {
            toc_len,
            toc_hash,
            generation,
            wal_committed_seq,
        })
    }

    #[must_use]
    pub fn hash_matches(&self, toc_bytes: &[u8]) -> bool {
        sha256(toc_bytes) == self.toc_hash
    }
}

/// Result of scanning a byte window for the last valid commit footer.
#[derive(Debug)]
pub struct FooterSlice<'a> {
    /// Offset of the footer within the scanned window.
    pub footer_offset: usize,
    /// Offset of the TOC bytes within the scanned window.
    pub toc_offset: usize,
    pub footer: CommitFooter,
    pub toc_bytes: &'a [u8],
}

/// Scan a byte window backwards for the newest footer whose hash seals the
/// TOC bytes directly before it.
///
/// Every occurrence of the magic's lead byte is a candidate; lookalikes fall
/// out when the fixed-size decode or the hash check fails, so arbitrary frame
/// payloads in the window cannot be mistaken for a commit.
#[must_use]
pub fn find_last_valid_footer(window: &[u8]) -> Option<FooterSlice<'_>> {
    for candidate_at in memrchr_iter(FOOTER_MAGIC[0], window) {
        let Some(raw) = window.get(candidate_at..candidate_at + FOOTER_SIZE) else {
            // Too close to the window end to hold a whole footer.
            continue;
        };
        let Some(footer) = CommitFooter::decode(raw) else {
            continue;
        };
        let Ok(sealed_len) = usize::try_from(footer.toc_len) else {
            continue;
        };
        if sealed_len == 0 {
            continue;
        }
        let Some(sealed_start) = candidate_at.checked_sub(sealed_len) else {
            // The claimed TOC would begin before the window.
            continue;
        };
        let sealed = &window[sealed_start..candidate_at];
        if footer.hash_matches(sealed) {
            return Some(FooterSlice {
                footer_offset: candidate_at,
                toc_offset: sealed_start,
                footer,
                toc_bytes: sealed,
            });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Appends a TOC blob and its sealing footer to `buffer`; returns the
    /// footer offset within the buffer.
    fn seal(buffer: &mut Vec<u8>, generation: u64, wal_committed_seq: u64, toc: &[u8]) -> usize {
        buffer.extend_from_slice(toc);
        let footer_at = buffer.len();
        let footer = CommitFooter {
            toc_len: toc.len() as u64,
            toc_hash: sha256(toc),
            generation,
            wal_committed_seq,
        };
        buffer.extend_from_slice(&footer.encode());
        footer_at
    }

    fn fake_toc(seed: u8, len: usize) -> Vec<u8> {
        (0..len).map(|i| seed.wrapping_add(i as u8)).collect()
    }

    #[test]
    fn encode_decode_roundtrip() {
        let footer = CommitFooter {
            toc_len: 4096,
            toc_hash: sha256(b"sealed bytes"),
            generation: 12,
            wal_committed_seq: 305,
        };
        let decoded = CommitFooter::decode(&footer.encode()).expect("decode");
        assert_eq!(decoded, footer);
    }

    #[test]
    fn decode_rejects_wrong_magic_and_length() {
        let mut raw = CommitFooter {
            toc_len: 1,
            toc_hash: [0u8; 32],
            generation: 1,
            wal_committed_seq: 0,
        }
        .encode();
        assert!(CommitFooter::decode(&raw[..FOOTER_SIZE - 1]).is_none());
        raw[0] = b'X';
        assert!(CommitFooter::decode(&raw).is_none());
    }

    #[test]
    fn scan_returns_the_newest_sealed_commit() {
        let mut buffer = vec![0x11u8; 64]; // leading noise before any commit
        seal(&mut buffer, 3, 40, &fake_toc(0x20, 96));
        let newest_at = seal(&mut buffer, 4, 55, &fake_toc(0x60, 33));

        let found = find_last_valid_footer(&buffer).expect("footer present");
        assert_eq!(found.footer_offset, newest_at);
        assert_eq!(found.footer.generation, 4);
        assert_eq!(found.footer.wal_committed_seq, 55);
        assert_eq!(found.toc_bytes, fake_toc(0x60, 33));
    }

    #[test]
    fn scan_falls_back_when_the_newest_toc_is_tampered() {
        let mut buffer = Vec::new();
        seal(&mut buffer, 8, 100, &fake_toc(0x30, 50));
        let newest_toc_at = buffer.len();
        seal(&mut buffer, 9, 120, &fake_toc(0x90, 50));
        // Flip one sealed TOC byte; the newest hash no longer matches.
        buffer[newest_toc_at + 7] ^= 0x01;

        let found = find_last_valid_footer(&buffer).expect("older commit survives");
        assert_eq!(found.footer.generation, 8);
    }

    #[test]
    fn magic_lookalikes_in_payload_bytes_are_skipped() {
        // A window full of the magic's lead byte, then one real commit.
        let mut buffer = vec![FOOTER_MAGIC[0]; 200];
        seal(&mut buffer, 2, 9, &fake_toc(0x44, 40));
        let mut tail = vec![FOOTER_MAGIC[0]; 30]; // lookalikes after the commit too
        tail.extend_from_slice(&[0u8; 40]);
        buffer.extend_from_slice(&tail);

        let found = find_last_valid_footer(&buffer).expect("real footer found");
        assert_eq!(found.footer.generation, 2);
    }

    #[test]
    fn scan_rejects_when_nothing_seals() {
        assert!(find_last_valid_footer(&[]).is_none());
        assert!(find_last_valid_footer(&vec![0xEEu8; 300]).is_none());
        // A footer whose claimed TOC would start before the window.
        let lying = CommitFooter {
            toc_len: 10_000,
            toc_hash: [0x55; 32],
            generation: 1,
            wal_committed_seq: 0,
        };
        assert!(find_last_valid_footer(&lying.encode()).is_none());
    }
}
