//! WAL ring scanner.
//!
//! Two modes share one walk: the state scan recovers `{write_pos,
//! pending_bytes, last_sequence}` and tolerates a single undecodable record by
//! skipping it via its length field; the mutation scan additionally decodes
//! payloads but halts collection at the first undecodable payload so mutations
//! are never reordered past a hole. A zero 48-byte block at the current
//! position concludes either scan immediately.

use std::{
    fs::File,
    io::{Read, Seek, SeekFrom},
};

use tracing::{debug, warn};

use crate::{
    constants::RECORD_HEADER_SIZE,
    error::Result,
    wal::{
        mutation::Mutation,
        record::{RecordHeader, is_terminal_marker},
    },
};

const HEADER_LEN: u64 = RECORD_HEADER_SIZE as u64;

/// Recovered ring positions after a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalScanState {
    pub write_pos: u64,
    pub pending_bytes: u64,
    pub last_sequence: u64,
}

/// One uncommitted mutation recovered from the ring.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    pub sequence: u64,
    pub mutation: Mutation,
}

/// Result of a combined state + mutation scan.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingScan {
    pub state: WalScanState,
    pub mutations: Vec<PendingRecord>,
    /// True when mutation collection stopped early at an undecodable payload.
    pub mutations_halted: bool,
}

/// Recovers ring state without decoding mutation payloads.
pub fn scan_state(
    file: &mut File,
    wal_offset: u64,
    wal_size: u64,
    checkpoint_pos: u64,
    committed_seq: u64,
) -> Result<WalScanState> {
    Ok(scan(file, wal_offset, wal_size, checkpoint_pos, committed_seq, false)?.state)
}

/// Recovers ring state and decodes every pending mutation past the committed
/// watermark, in sequence order.
pub fn scan_pending_mutations_with_state(
    file: &mut File,
    wal_offset: u64,
    wal_size: u64,
    checkpoint_pos: u64,
    committed_seq: u64,
) -> Result<PendingScan> {
    scan(file, wal_offset, wal_size, checkpoint_pos, committed_seq, true)
}

fn scan(
    file: &mut File,
    wal_offset: u64,
    wal_size: u64,
    checkpoint_pos: u64,
    committed_seq: u64,
    decode_mutations: bool,
) -> Result<PendingScan> {
    let mut pos = checkpoint_pos.min(wal_size.saturating_sub(1));
    let mut scanned = 0u64;
    let mut prev_seq: Option<u64> = None;
    let mut last_sequence = committed_seq;
    let mut pending_bytes = 0u64;
    let mut in_pending = false;
    let mut tolerated_hole = false;
    let mut mutations_halted = false;
    let mut mutations = Vec::new();

    while scanned < wal_size {
        let tail = wal_size - pos;
        if tail < HEADER_LEN {
            // A record can never start here; both sides wrap implicitly.
            scanned += tail;
            if in_pending {
                pending_bytes += tail;
            }
            pos = 0;
            continue;
        }

        let mut header_buf = [0u8; RECORD_HEADER_SIZE];
        read_at(file, wal_offset + pos, &mut header_buf)?;
        if is_terminal_marker(&header_buf) {
            break;
        }
        let header = RecordHeader::decode(&header_buf);
        if header.sequence == 0 {
            // Sequences start at 1; a zero here is residue, not a record.
            break;
        }
        if let Some(prev) = prev_seq {
            if header.sequence != prev + 1 {
                // Discontinuity marks stale bytes from an earlier lap.
                break;
            }
        }
        let record_size = HEADER_LEN + u64::from(header.payload_len);
        if record_size > tail {
            // Records never span the ring end; this header is not ours.
            break;
        }

        let mut payload = vec![0u8; header.payload_len as usize];
        read_at(file, wal_offset + pos + HEADER_LEN, &mut payload)?;

        let record_pending = header.sequence > committed_seq;
        if record_pending {
            in_pending = true;
            pending_bytes += record_size;
        }

        if !header.payload_matches(&payload) {
            if tolerated_hole {
                warn!(offset = pos, "second undecodable wal record, stopping scan");
                break;
            }
            warn!(
                offset = pos,
                sequence = header.sequence,
                "skipping undecodable wal record"
            );
            tolerated_hole = true;
            mutations_halted = true;
        } else if record_pending && decode_mutations && !header.is_padding() && !mutations_halted {
            match Mutation::decode(&payload) {
                Ok(mutation) => mutations.push(PendingRecord {
                    sequence: header.sequence,
                    mutation,
                }),
                Err(err) => {
                    warn!(
                        offset = pos,
                        sequence = header.sequence,
                        error = %err,
                        "undecodable mutation payload halts collection"
                    );
                    mutations_halted = true;
                }
            }
        }

        prev_seq = Some(header.sequence);
        last_sequence = last_sequence.max(header.sequence);
        pos += record_size;
        scanned += record_size;
        if pos == wal_size {
            pos = 0;
        }
    }

    debug!(
        write_pos = pos,
        pending_bytes,
        last_sequence,
        mutations = mutations.len(),
        "wal scan complete"
    );
    Ok(PendingScan {
        state: WalScanState {
            write_pos: pos,
            pending_bytes,
            last_sequence,
        },
        mutations,
        mutations_halted,
    })
}

fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::sha256;
    use crate::wal::writer::WalWriter;
    use std::io::Write;

    fn ring_file(size: u64) -> (tempfile::TempDir, File) {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("ring.mv2s");
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .expect("open");
        file.set_len(size).expect("set_len");
        (dir, file)
    }

    #[test]
    fn scan_recovers_writer_state() {
        let (_dir, mut file) = ring_file(4096);
        let mut writer = WalWriter::new(0, 4096, 0, 0, 0, 0);
        let m1 = Mutation::DeleteFrame { frame_id: 1 }.encode();
        let m2 = Mutation::Supersede { new_id: 2, old_id: 0 }.encode();
        writer.append(&mut file, &m1).expect("append");
        writer.append(&mut file, &m2).expect("append");

        let scan = scan_pending_mutations_with_state(&mut file, 0, 4096, 0, 0).expect("scan");
        assert_eq!(scan.state.write_pos, writer.write_pos());
        assert_eq!(scan.state.pending_bytes, writer.pending_bytes());
        assert_eq!(scan.state.last_sequence, writer.last_sequence());
        assert_eq!(scan.mutations.len(), 2);
        assert_eq!(
            scan.mutations[0].mutation,
            Mutation::DeleteFrame { frame_id: 1 }
        );
        assert!(!scan.mutations_halted);
    }

    #[test]
    fn committed_records_are_not_pending() {
        let (_dir, mut file) = ring_file(4096);
        let mut writer = WalWriter::new(0, 4096, 0, 0, 0, 0);
        let m = Mutation::DeleteFrame { frame_id: 7 }.encode();
        let seq1 = writer.append(&mut file, &m).expect("append");
        writer.append(&mut file, &m).expect("append");

        // Scan as if the first record was already committed.
        let scan = scan_pending_mutations_with_state(&mut file, 0, 4096, 0, seq1).expect("scan");
        assert_eq!(scan.mutations.len(), 1);
        assert_eq!(scan.mutations[0].sequence, seq1 + 1);
        assert!(scan.state.pending_bytes < writer.pending_bytes());
    }

    #[test]
    fn terminal_marker_stops_scan_immediately() {
        let (_dir, mut file) = ring_file(4096);
        let scan = scan_state(&mut file, 0, 4096, 0, 0).expect("scan");
        assert_eq!(scan.write_pos, 0);
        assert_eq!(scan.pending_bytes, 0);
        assert_eq!(scan.last_sequence, 0);
    }

    #[test]
    fn corrupt_payload_halts_mutations_but_not_state() {
        let (_dir, mut file) = ring_file(4096);
        let mut writer = WalWriter::new(0, 4096, 0, 0, 0, 0);
        let m = Mutation::DeleteFrame { frame_id: 1 }.encode();
        writer.append(&mut file, &m).expect("append one");
        let corrupt_pos = writer.write_pos();
        writer.append(&mut file, &m).expect("append two");
        writer.append(&mut file, &m).expect("append three");

        // Flip one payload byte of the middle record.
        file.seek(SeekFrom::Start(corrupt_pos + HEADER_LEN)).unwrap();
        file.write_all(&[0xFF]).unwrap();

        let scan = scan_pending_mutations_with_state(&mut file, 0, 4096, 0, 0).expect("scan");
        assert!(scan.mutations_halted);
        assert_eq!(scan.mutations.len(), 1, "collection stops at the hole");
        assert_eq!(scan.state.write_pos, writer.write_pos(), "state scan continues");
        assert_eq!(scan.state.last_sequence, writer.last_sequence());
    }

    #[test]
    fn wrapped_ring_is_scanned_across_the_boundary() {
        let ring = 1024u64;
        let (_dir, mut file) = ring_file(ring);
        let mut writer = WalWriter::new(0, ring, 0, 0, 0, 0);
        let big = Mutation::PutEmbedding {
            frame_id: 0,
            vector: vec![0.5f32; 150],
        }
        .encode();
        writer.append(&mut file, &big).expect("first");
        writer.record_checkpoint();
        let checkpoint = writer.checkpoint_pos();
        let committed = writer.last_sequence();
        writer.append(&mut file, &big).expect("wraps");

        let scan =
            scan_pending_mutations_with_state(&mut file, 0, ring, checkpoint, committed)
                .expect("scan");
        assert_eq!(scan.state.write_pos, writer.write_pos());
        assert_eq!(scan.mutations.len(), 1);
        assert_eq!(scan.state.pending_bytes, writer.pending_bytes());
    }

    #[test]
    fn stale_lap_bytes_stop_the_scan() {
        let (_dir, mut file) = ring_file(4096);
        // Hand-craft a record whose sequence jumps, simulating stale bytes.
        let payload = Mutation::DeleteFrame { frame_id: 3 }.encode();
        let first = RecordHeader {
            sequence: 1,
            payload_len: payload.len() as u32,
            flags: 0,
            payload_sha256: sha256(&payload),
        };
        let stale = RecordHeader {
            sequence: 9,
            payload_len: payload.len() as u32,
            flags: 0,
            payload_sha256: sha256(&payload),
        };
        file.seek(SeekFrom::Start(0)).unwrap();
        file.write_all(&first.encode()).unwrap();
        file.write_all(&payload).unwrap();
        file.write_all(&stale.encode()).unwrap();
        file.write_all(&payload).unwrap();

        let scan = scan_pending_mutations_with_state(&mut file, 0, 4096, 0, 0).expect("scan");
        assert_eq!(scan.mutations.len(), 1);
        assert_eq!(scan.state.last_sequence, 1);
    }
}
