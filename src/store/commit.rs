//! Commit: atomically publish pending WAL mutations into a new sealed TOC.
//!
//! The step sequence is fixed so crash windows are testable one by one:
//!
//! 1. write the new TOC after the data region, fsync data
//! 2. write the new footer right after it, fsync data
//! 3. advance the WAL checkpoint and the in-memory header fields
//! 4. publish header page A, fsync
//! 5. publish header page B, fsync
//!
//! A crash before the footer leaves the previous generation authoritative and
//! the pending mutations recoverable from the WAL; any later crash is
//! recovered to the new generation (by backward footer scan until the header
//! pages catch up).

use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom, Write};

use tracing::{debug, info};

use crate::{
    codec::sha256,
    constants::{HEADER_PAGE_A_OFFSET, HEADER_PAGE_B_OFFSET, SEGMENT_VERSION},
    error::{Result, WaxError},
    footer::{CommitFooter, FOOTER_SIZE},
    index::vector::VectorSegment,
    io::HeaderCodec,
    store::segments::TimeSegment,
    types::{
        Frame, FrameId, FrameStatus, Header, IndexManifest, ReplaySnapshot, SegmentCompression,
        SegmentEntry, SegmentKind, Toc,
    },
    wal::Mutation,
};

use super::WaxStore;

impl WaxStore {
    /// Publishes every pending mutation; returns the new generation.
    pub fn commit(&mut self) -> Result<u64> {
        self.check_open()?;
        if self.pending.is_empty() && self.staged_lex_artifact.is_none() {
            return Ok(self.generation);
        }

        // Step 0: validation. A rejected commit publishes nothing.
        let (mut new_toc, new_vectors) = self.build_committed_state()?;
        let new_generation = self.generation + 1;

        // Seal index segments into the data area ahead of the TOC.
        let mut cursor = self.data_end;
        let mut next_segment_id = self.toc.next_segment_id();
        let mut segments: Vec<SegmentEntry> = Vec::new();

        if !new_vectors.is_empty() {
            let dimension = new_vectors
                .values()
                .next()
                .map(|vector| u32::try_from(vector.len()).unwrap_or(0))
                .unwrap_or(0);
            let segment = VectorSegment {
                similarity: self.vector_metric,
                dimension,
                entries: new_vectors
                    .iter()
                    .map(|(id, vector)| (*id, vector.clone()))
                    .collect(),
            };
            let bytes = segment.encode();
            let entry = self.write_segment(&bytes, &mut cursor, &mut next_segment_id, SegmentKind::Vector)?;
            new_toc.vec = Some(IndexManifest {
                doc_count: new_vectors.len() as u64,
                bytes_offset: entry.bytes_offset,
                bytes_length: entry.bytes_length,
                checksum: entry.checksum,
                version: SEGMENT_VERSION,
            });
            segments.push(entry);
        } else {
            new_toc.vec = None;
        }

        if let Some(artifact) = self.staged_lex_artifact.clone() {
            let entry =
                self.write_segment(&artifact.bytes, &mut cursor, &mut next_segment_id, SegmentKind::Lexical)?;
            new_toc.lex = Some(IndexManifest {
                doc_count: artifact.doc_count,
                bytes_offset: entry.bytes_offset,
                bytes_length: entry.bytes_length,
                checksum: entry.checksum,
                version: SEGMENT_VERSION,
            });
            segments.push(entry);
        } else {
            // A stale lexical view is worse than a rebuild from frames.
            new_toc.lex = None;
        }

        let time_segment = TimeSegment::from_entries(
            new_toc
                .frames
                .iter()
                .map(|frame| (frame.timestamp_ms, frame.id))
                .collect(),
        );
        if !time_segment.entries.is_empty() {
            let bytes = time_segment.encode();
            let entry = self.write_segment(&bytes, &mut cursor, &mut next_segment_id, SegmentKind::Time)?;
            new_toc.time = Some(IndexManifest {
                doc_count: time_segment.entries.len() as u64,
                bytes_offset: entry.bytes_offset,
                bytes_length: entry.bytes_length,
                checksum: entry.checksum,
                version: SEGMENT_VERSION,
            });
            segments.push(entry);
        } else {
            new_toc.time = None;
        }
        new_toc.segments = segments;

        // Step 1: TOC write + data fsync.
        let toc_bytes = new_toc.encode()?;
        let toc_offset = cursor;
        self.file.seek(SeekFrom::Start(toc_offset))?;
        self.file.write_all(&toc_bytes)?;
        self.file.sync_data()?;
        self.hit_failpoint(1)?;

        // Step 2: footer write + data fsync.
        let footer_offset = toc_offset + toc_bytes.len() as u64;
        let footer = CommitFooter {
            toc_len: toc_bytes.len() as u64,
            toc_hash: sha256(&toc_bytes),
            generation: new_generation,
            wal_committed_seq: self.wal.last_sequence(),
        };
        self.file.seek(SeekFrom::Start(footer_offset))?;
        self.file.write_all(&footer.encode())?;
        self.file.sync_data()?;
        self.hit_failpoint(2)?;

        // Step 3: advance the WAL checkpoint; stage the new header fields.
        self.wal.record_checkpoint();
        let new_header = Header {
            file_generation: new_generation,
            wal_offset: self.header.wal_offset,
            wal_size: self.header.wal_size,
            wal_write_pos: self.wal.write_pos(),
            wal_checkpoint_pos: self.wal.checkpoint_pos(),
            wal_committed_seq: footer.wal_committed_seq,
            footer_offset,
            replay_snapshot: Some(ReplaySnapshot {
                footer_offset: self.header.footer_offset,
                generation: self.generation,
            }),
            header_page_generation: self.header.header_page_generation + 1,
        };
        self.hit_failpoint(3)?;

        // Step 4: publish header page A.
        HeaderCodec::write_page(&mut self.file, HEADER_PAGE_A_OFFSET, &new_header)?;
        self.file.sync_all()?;
        self.hit_failpoint(4)?;

        // Step 5: publish header page B.
        HeaderCodec::write_page(&mut self.file, HEADER_PAGE_B_OFFSET, &new_header)?;
        self.file.sync_all()?;
        self.hit_failpoint(5)?;

        info!(
            generation = new_generation,
            frames = new_toc.frames.len(),
            footer_offset,
            "commit published"
        );
        self.header = new_header;
        self.toc = new_toc;
        self.committed_vectors = new_vectors;
        self.time_index = time_segment;
        self.generation = new_generation;
        self.data_end = footer_offset + FOOTER_SIZE as u64;
        self.pending.clear();
        self.staged_lex_artifact = None;
        Ok(new_generation)
    }

    fn hit_failpoint(&self, step: u8) -> Result<()> {
        if self.failpoint == Some(step) {
            debug!(step, "commit failpoint fired");
            return Err(WaxError::CommitFailpoint { step });
        }
        Ok(())
    }

    fn write_segment(
        &mut self,
        bytes: &[u8],
        cursor: &mut u64,
        next_segment_id: &mut u64,
        kind: SegmentKind,
    ) -> Result<SegmentEntry> {
        let entry = SegmentEntry {
            segment_id: *next_segment_id,
            bytes_offset: *cursor,
            bytes_length: bytes.len() as u64,
            checksum: sha256(bytes),
            compression: SegmentCompression::None,
            kind,
        };
        self.file.seek(SeekFrom::Start(*cursor))?;
        self.file.write_all(bytes)?;
        *cursor += bytes.len() as u64;
        *next_segment_id += 1;
        Ok(entry)
    }

    /// Applies pending mutations in WAL order against a clone of the committed
    /// state, validating the supersede DAG and embedding references as it goes.
    fn build_committed_state(&self) -> Result<(Toc, BTreeMap<FrameId, Vec<f32>>)> {
        let mut frames = self.toc.frames.clone();
        let mut vectors = self.committed_vectors.clone();
        let mut dimension = vectors.values().next().map(Vec::len);

        for entry in &self.pending {
            match &entry.mutation {
                Mutation::PutFrame(put) => {
                    if put.frame_id != frames.len() as u64 {
                        return Err(WaxError::InvalidToc {
                            reason: format!(
                                "staged frame ids are not dense (expected {}, got {})",
                                frames.len(),
                                put.frame_id
                            )
                            .into(),
                        });
                    }
                    frames.push(Frame {
                        id: put.frame_id,
                        timestamp_ms: put.timestamp_ms,
                        kind: put.kind.clone(),
                        role: put.role.clone(),
                        parent_id: put.parent_id,
                        entries: put.entries.clone(),
                        payload_offset: put.payload_offset,
                        payload_length: put.payload_length,
                        canonical_encoding: put.canonical_encoding,
                        canonical_length: put.canonical_length,
                        canonical_checksum: put.canonical_checksum,
                        stored_checksum: put.stored_checksum,
                        status: FrameStatus::Live,
                        supersedes: None,
                        superseded_by: None,
                    });
                }
                Mutation::DeleteFrame { frame_id } => {
                    let frame = frames
                        .get_mut(usize::try_from(*frame_id).unwrap_or(usize::MAX))
                        .ok_or(WaxError::UnknownFrame {
                            frame_id: *frame_id,
                        })?;
                    frame.status = FrameStatus::Deleted;
                }
                Mutation::Supersede { new_id, old_id } => {
                    validate_supersede(&frames, *new_id, *old_id)?;
                    frames[*new_id as usize].supersedes = Some(*old_id);
                    frames[*old_id as usize].superseded_by = Some(*new_id);
                }
                Mutation::PutEmbedding { frame_id, vector } => {
                    if *frame_id >= frames.len() as u64 {
                        return Err(WaxError::EmbeddingForwardReference {
                            frame_id: *frame_id,
                        });
                    }
                    if let Some(expected) = dimension {
                        if vector.len() != expected {
                            return Err(WaxError::DimensionMismatch {
                                expected: u32::try_from(expected).unwrap_or(u32::MAX),
                                actual: u32::try_from(vector.len()).unwrap_or(u32::MAX),
                            });
                        }
                    } else {
                        dimension = Some(vector.len());
                    }
                    vectors.insert(*frame_id, vector.clone());
                }
            }
        }

        // Merkle root and checksum are stamped during encode.
        let toc = Toc {
            toc_version: crate::constants::TOC_VERSION,
            frames,
            lex: None,
            vec: None,
            time: None,
            segments: Vec::new(),
            merkle_root: [0u8; 32],
            toc_checksum: [0u8; 32],
        };
        Ok((toc, vectors))
    }
}

/// Rejects conflicting edges and cycles for one pending supersede edge.
fn validate_supersede(frames: &[Frame], new_id: FrameId, old_id: FrameId) -> Result<()> {
    let len = frames.len() as u64;
    for frame_id in [new_id, old_id] {
        if frame_id >= len {
            return Err(WaxError::UnknownFrame { frame_id });
        }
    }
    if new_id == old_id {
        return Err(WaxError::SupersedeCycle { frame_id: new_id });
    }
    if frames[new_id as usize].supersedes.is_some() {
        return Err(WaxError::SupersedeConflict { frame_id: new_id });
    }
    if frames[old_id as usize].superseded_by.is_some() {
        return Err(WaxError::SupersedeConflict { frame_id: old_id });
    }
    // Walk the replacement chain from the old frame; reaching the new frame
    // would close a cycle. Bounded by the frame count.
    let mut cursor = old_id;
    let mut steps = 0usize;
    while let Some(next) = frames[cursor as usize].supersedes {
        if next == new_id {
            return Err(WaxError::SupersedeCycle { frame_id: new_id });
        }
        cursor = next;
        steps += 1;
        if steps > frames.len() {
            return Err(WaxError::SupersedeCycle { frame_id: new_id });
        }
    }
    Ok(())
}
