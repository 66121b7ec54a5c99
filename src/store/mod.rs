//! `WaxStore`: the single-file store with a crash-recoverable write path.
//!
//! One logical writer per file, enforced by the writer lease. Mutations stage
//! into the embedded WAL (payload bytes go straight into the data area) and
//! become visible only when `commit` seals a new TOC + footer and republishes
//! the header pages.

mod commit;
pub mod lease;
pub mod segments;

use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use tracing::{debug, info, warn};

use crate::{
    codec::sha256,
    constants::{FORMAT_VERSION, MAX_FOOTER_SCAN_BYTES, WAL_OFFSET, WAL_SIZE_DEFAULT, WAL_SIZE_MIN},
    error::{Result, WaxError},
    footer::{CommitFooter, FOOTER_SIZE, find_last_valid_footer},
    index::lex::LexIndexArtifact,
    index::vector::{VectorMetric, VectorSegment},
    io::HeaderCodec,
    types::{
        CanonicalEncoding, Frame, FrameId, Header, SegmentKind, StoreStats, Toc, WalStats,
    },
    wal::{Mutation, PutFrame, WalWriter, scan_pending_mutations_with_state},
};

pub use lease::{WriterLease, lease_path};
pub use segments::TimeSegment;

/// Caller-supplied frame metadata for the write path.
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub kind: Option<String>,
    pub role: Option<String>,
    pub parent_id: Option<FrameId>,
    pub entries: BTreeMap<String, String>,
    /// Defaults to the ingestion clock when unset.
    pub timestamp_ms: Option<u64>,
    pub encoding: CanonicalEncoding,
}

/// One staged mutation plus its WAL bookkeeping.
#[derive(Debug, Clone)]
pub(crate) struct PendingEntry {
    pub sequence: u64,
    pub mutation: Mutation,
    /// Staged by this session (`true`) or recovered from a crashed one.
    pub local: bool,
}

/// A staged embedding mutation surfaced to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEmbedding {
    pub sequence: u64,
    pub frame_id: FrameId,
    pub vector: Vec<f32>,
}

#[derive(Debug)]
pub struct WaxStore {
    path: PathBuf,
    file: File,
    // Dropped last; releasing it re-opens the store to other writers.
    lease: Option<WriterLease>,
    header: Header,
    toc: Toc,
    pub(crate) committed_vectors: BTreeMap<FrameId, Vec<f32>>,
    pub(crate) vector_metric: VectorMetric,
    time_index: TimeSegment,
    wal: WalWriter,
    pub(crate) pending: Vec<PendingEntry>,
    pub(crate) staged_lex_artifact: Option<LexIndexArtifact>,
    /// Next free offset in the data area; payloads append here.
    data_end: u64,
    next_frame_id: FrameId,
    generation: u64,
    pub(crate) failpoint: Option<u8>,
    closed: bool,
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

impl WaxStore {
    /// Creates a new store file with an empty committed TOC.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::create_with_wal_size(path, WAL_SIZE_DEFAULT)
    }

    /// Creation with an explicit WAL ring size (tests use tiny rings).
    pub fn create_with_wal_size(path: impl AsRef<Path>, wal_size: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if wal_size < WAL_SIZE_MIN {
            return Err(WaxError::Policy {
                reason: "wal size below minimum".into(),
            });
        }
        let lease = WriterLease::acquire(&path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|source| WaxError::Io {
                source,
                path: Some(path.clone()),
            })?;

        let wal_end = WAL_OFFSET + wal_size;
        file.set_len(wal_end)?;

        // Seal the empty first generation: TOC + footer right after the WAL.
        let mut toc = Toc::empty();
        let toc_bytes = toc.encode()?;
        let footer = CommitFooter {
            toc_len: toc_bytes.len() as u64,
            toc_hash: sha256(&toc_bytes),
            generation: 1,
            wal_committed_seq: 0,
        };
        let footer_offset = wal_end + toc_bytes.len() as u64;
        file.seek(SeekFrom::Start(wal_end))?;
        file.write_all(&toc_bytes)?;
        file.write_all(&footer.encode())?;
        file.sync_data()?;

        let header = Header {
            file_generation: 1,
            wal_offset: WAL_OFFSET,
            wal_size,
            wal_write_pos: 0,
            wal_checkpoint_pos: 0,
            wal_committed_seq: 0,
            footer_offset,
            replay_snapshot: None,
            header_page_generation: 1,
        };
        HeaderCodec::write_page(&mut file, crate::constants::HEADER_PAGE_A_OFFSET, &header)?;
        HeaderCodec::write_page(&mut file, crate::constants::HEADER_PAGE_B_OFFSET, &header)?;
        file.sync_all()?;

        info!(path = %path.display(), version = FORMAT_VERSION, "store created");
        let data_end = footer_offset + FOOTER_SIZE as u64;
        Ok(Self {
            path,
            file,
            lease: Some(lease),
            wal: WalWriter::new(WAL_OFFSET, wal_size, 0, 0, 0, 0),
            header,
            toc,
            committed_vectors: BTreeMap::new(),
            vector_metric: VectorMetric::Cosine,
            time_index: TimeSegment::default(),
            pending: Vec::new(),
            staged_lex_artifact: None,
            data_end,
            next_frame_id: 0,
            generation: 1,
            failpoint: None,
            closed: false,
        })
    }

    /// Opens an existing store, recovering pending WAL mutations.
    ///
    /// `repair` truncates trailing garbage beyond the committed footer while
    /// preserving every byte a pending frame still references.
    pub fn open(path: impl AsRef<Path>, repair: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let lease = WriterLease::acquire(&path)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|source| WaxError::Io {
                source,
                path: Some(path.clone()),
            })?;
        let file_len = file.metadata()?.len();

        let mut header = HeaderCodec::read_active(&mut file)?;
        let wal_end = header.wal_offset + header.wal_size;

        // Footer arbitration: header pointer, replay snapshot, backward scan.
        // The candidate with the largest valid generation wins.
        let mut best: Option<(u64, CommitFooter, Toc)> = None;
        for candidate in [
            Some(header.footer_offset),
            header.replay_snapshot.map(|snapshot| snapshot.footer_offset),
        ]
        .into_iter()
        .flatten()
        {
            if let Some((footer, toc)) = read_footer_candidate(&mut file, file_len, candidate) {
                if best
                    .as_ref()
                    .is_none_or(|(_, b, _)| footer.generation > b.generation)
                {
                    best = Some((candidate, footer, toc));
                }
            }
        }
        if let Some((offset, footer, toc)) = scan_for_footer(&mut file, file_len, wal_end)? {
            if best
                .as_ref()
                .is_none_or(|(_, b, _)| footer.generation > b.generation)
            {
                debug!(offset, generation = footer.generation, "backward scan found newer footer");
                best = Some((offset, footer, toc));
            }
        }
        let (footer_offset, footer, toc) = best.ok_or(WaxError::InvalidFooter {
            reason: "no valid commit footer".into(),
        })?;
        validate_layout(&toc, file_len)?;
        let committed_seq = footer.wal_committed_seq;
        let generation = footer.generation;

        // Recover pending mutations and the effective ring positions.
        let scan = scan_pending_mutations_with_state(
            &mut file,
            header.wal_offset,
            header.wal_size,
            header.wal_checkpoint_pos,
            committed_seq,
        )?;
        let pending: Vec<PendingEntry> = scan
            .mutations
            .into_iter()
            .map(|record| PendingEntry {
                sequence: record.sequence,
                mutation: record.mutation,
                local: false,
            })
            .collect();

        // Any pending frame whose payload lies beyond the file is fatal.
        let committed_end = footer_offset + FOOTER_SIZE as u64;
        let mut required_end = committed_end;
        for entry in &pending {
            if let Mutation::PutFrame(put) = &entry.mutation {
                if put.payload_end() > file_len {
                    return Err(WaxError::WalCorruption {
                        offset: put.payload_offset,
                        reason: "pending frame payload lies beyond end of file".into(),
                    });
                }
                required_end = required_end.max(put.payload_end());
            }
        }
        if repair && file_len > required_end {
            warn!(
                from = file_len,
                to = required_end,
                "open-time repair truncating trailing bytes"
            );
            file.set_len(required_end)?;
            file.sync_data()?;
        }

        let effective_checkpoint = if scan.state.pending_bytes == 0 {
            scan.state.write_pos
        } else {
            (scan.state.write_pos + header.wal_size - scan.state.pending_bytes) % header.wal_size
        };
        let wal = WalWriter::new(
            header.wal_offset,
            header.wal_size,
            scan.state.write_pos,
            effective_checkpoint,
            scan.state.pending_bytes,
            scan.state.last_sequence,
        );

        header.footer_offset = footer_offset;
        header.file_generation = generation;
        header.wal_committed_seq = committed_seq;
        header.wal_write_pos = scan.state.write_pos;
        header.wal_checkpoint_pos = effective_checkpoint;

        let next_frame_id = toc.frames.len() as u64
            + pending
                .iter()
                .filter(|entry| matches!(entry.mutation, Mutation::PutFrame(_)))
                .count() as u64;

        let mut store = Self {
            path: path.clone(),
            file,
            lease: Some(lease),
            wal,
            header,
            toc,
            committed_vectors: BTreeMap::new(),
            vector_metric: VectorMetric::Cosine,
            time_index: TimeSegment::default(),
            pending,
            staged_lex_artifact: None,
            data_end: required_end,
            next_frame_id,
            generation,
            failpoint: None,
            closed: false,
        };
        store.load_index_segments()?;
        info!(
            path = %path.display(),
            generation,
            frames = store.toc.frames.len(),
            pending = store.pending.len(),
            "store opened"
        );
        Ok(store)
    }

    fn load_index_segments(&mut self) -> Result<()> {
        if let Some(manifest) = self.toc.vec {
            let entry = self
                .toc
                .segment_for_kind(SegmentKind::Vector)
                .copied()
                .ok_or(WaxError::InvalidToc {
                    reason: "vector manifest without segment".into(),
                })?;
            if manifest.checksum != entry.checksum {
                return Err(WaxError::ChecksumMismatch {
                    context: "vector manifest",
                });
            }
            let bytes = segments::read_segment_bytes(&mut self.file, &entry)?;
            let segment = VectorSegment::decode(&bytes)?;
            self.vector_metric = segment.similarity;
            self.committed_vectors = segment.entries.into_iter().collect();
        }
        if let Some(_manifest) = self.toc.time {
            let entry = self
                .toc
                .segment_for_kind(SegmentKind::Time)
                .copied()
                .ok_or(WaxError::InvalidToc {
                    reason: "time manifest without segment".into(),
                })?;
            let bytes = segments::read_segment_bytes(&mut self.file, &entry)?;
            self.time_index = TimeSegment::decode(&bytes)?;
        } else {
            self.time_index = TimeSegment::from_entries(
                self.toc
                    .frames
                    .iter()
                    .map(|frame| (frame.timestamp_ms, frame.id))
                    .collect(),
            );
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.closed {
            Err(WaxError::Closed)
        } else {
            Ok(())
        }
    }

    // ── Write path ──────────────────────────────────────────────────────

    /// Stages one frame; returns its dense id.
    pub fn put(&mut self, bytes: &[u8]) -> Result<FrameId> {
        self.put_with_options(bytes, PutOptions::default())
    }

    pub fn put_with_options(&mut self, bytes: &[u8], options: PutOptions) -> Result<FrameId> {
        let ids = self.put_batch_with_options(&[(bytes.to_vec(), options)])?;
        Ok(ids[0])
    }

    /// Stages several frames; WAL records land all-or-nothing.
    pub fn put_batch(&mut self, payloads: &[Vec<u8>], options: &[PutOptions]) -> Result<Vec<FrameId>> {
        if payloads.len() != options.len() {
            return Err(WaxError::BatchShapeMismatch {
                frames: payloads.len(),
                vectors: options.len(),
            });
        }
        let items: Vec<(Vec<u8>, PutOptions)> = payloads
            .iter()
            .cloned()
            .zip(options.iter().cloned())
            .collect();
        self.put_batch_with_options(&items)
    }

    fn put_batch_with_options(&mut self, items: &[(Vec<u8>, PutOptions)]) -> Result<Vec<FrameId>> {
        self.check_open()?;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let saved_data_end = self.data_end;
        let result = self.stage_put_batch(items);
        if result.is_err() {
            // Payload bytes already written past the old end are unreferenced
            // garbage; rewinding the cursor lets the next put reuse the space.
            self.data_end = saved_data_end;
        }
        result
    }

    fn stage_put_batch(&mut self, items: &[(Vec<u8>, PutOptions)]) -> Result<Vec<FrameId>> {
        let mut payloads = Vec::with_capacity(items.len());
        let mut puts = Vec::with_capacity(items.len());
        let mut frame_id = self.next_frame_id;

        for (bytes, options) in items {
            let canonical_checksum = sha256(bytes);
            let (disk_bytes, stored_checksum) = match options.encoding {
                CanonicalEncoding::Plain => (bytes.clone(), None),
                CanonicalEncoding::Zstd => {
                    let compressed = zstd::stream::encode_all(&bytes[..], 3)
                        .map_err(|source| WaxError::Io { source, path: None })?;
                    let stored = sha256(&compressed);
                    (compressed, Some(stored))
                }
            };

            let payload_offset = self.data_end;
            self.file.seek(SeekFrom::Start(payload_offset))?;
            self.file.write_all(&disk_bytes)?;
            self.data_end += disk_bytes.len() as u64;

            let put = PutFrame {
                frame_id,
                timestamp_ms: options.timestamp_ms.unwrap_or_else(now_ms),
                kind: options.kind.clone(),
                role: options.role.clone(),
                parent_id: options.parent_id,
                entries: options.entries.clone(),
                payload_offset,
                payload_length: disk_bytes.len() as u64,
                canonical_encoding: options.encoding,
                canonical_length: bytes.len() as u64,
                canonical_checksum,
                stored_checksum,
            };
            payloads.push(Mutation::PutFrame(put.clone()).encode());
            puts.push(put);
            frame_id += 1;
        }

        let sequences = self.wal.append_batch(&mut self.file, &payloads)?;
        let mut ids = Vec::with_capacity(puts.len());
        for (put, sequence) in puts.into_iter().zip(sequences) {
            ids.push(put.frame_id);
            self.pending.push(PendingEntry {
                sequence,
                mutation: Mutation::PutFrame(put),
                local: true,
            });
        }
        self.next_frame_id = frame_id;
        Ok(ids)
    }

    /// Stages a logical delete; the TOC entry is retained with deleted status.
    pub fn delete(&mut self, frame_id: FrameId) -> Result<()> {
        self.check_open()?;
        if frame_id >= self.next_frame_id {
            return Err(WaxError::UnknownFrame { frame_id });
        }
        self.stage_simple(Mutation::DeleteFrame { frame_id })
    }

    /// Stages a supersede edge `new → old`. DAG validation happens at commit.
    pub fn supersede(&mut self, new_id: FrameId, old_id: FrameId) -> Result<()> {
        self.check_open()?;
        for frame_id in [new_id, old_id] {
            if frame_id >= self.next_frame_id {
                return Err(WaxError::UnknownFrame { frame_id });
            }
        }
        self.stage_simple(Mutation::Supersede { new_id, old_id })
    }

    /// Stages a dense embedding for a known (or earlier-pending) frame.
    pub fn put_embedding(&mut self, frame_id: FrameId, vector: Vec<f32>) -> Result<()> {
        self.check_open()?;
        if frame_id >= self.next_frame_id {
            return Err(WaxError::EmbeddingForwardReference { frame_id });
        }
        self.stage_simple(Mutation::PutEmbedding { frame_id, vector })
    }

    pub fn put_embedding_batch(
        &mut self,
        frame_ids: &[FrameId],
        vectors: &[Vec<f32>],
    ) -> Result<()> {
        self.check_open()?;
        if frame_ids.len() != vectors.len() {
            return Err(WaxError::BatchShapeMismatch {
                frames: frame_ids.len(),
                vectors: vectors.len(),
            });
        }
        for frame_id in frame_ids {
            if *frame_id >= self.next_frame_id {
                return Err(WaxError::EmbeddingForwardReference {
                    frame_id: *frame_id,
                });
            }
        }
        let mutations: Vec<Mutation> = frame_ids
            .iter()
            .zip(vectors.iter())
            .map(|(frame_id, vector)| Mutation::PutEmbedding {
                frame_id: *frame_id,
                vector: vector.clone(),
            })
            .collect();
        let payloads: Vec<Vec<u8>> = mutations.iter().map(Mutation::encode).collect();
        let sequences = self.wal.append_batch(&mut self.file, &payloads)?;
        for (mutation, sequence) in mutations.into_iter().zip(sequences) {
            self.pending.push(PendingEntry {
                sequence,
                mutation,
                local: true,
            });
        }
        Ok(())
    }

    fn stage_simple(&mut self, mutation: Mutation) -> Result<()> {
        let payload = mutation.encode();
        let sequence = self.wal.append(&mut self.file, &payload)?;
        self.pending.push(PendingEntry {
            sequence,
            mutation,
            local: true,
        });
        Ok(())
    }

    /// Stages a serialized lexical index to be sealed by the next commit.
    pub fn stage_lex_artifact(&mut self, artifact: LexIndexArtifact) {
        self.staged_lex_artifact = Some(artifact);
    }

    /// Staged embedding mutations, optionally after a sequence watermark.
    #[must_use]
    pub fn pending_embedding_mutations(&self, since: Option<u64>) -> Vec<PendingEmbedding> {
        self.pending
            .iter()
            .filter(|entry| since.is_none_or(|watermark| entry.sequence > watermark))
            .filter_map(|entry| match &entry.mutation {
                Mutation::PutEmbedding { frame_id, vector } => Some(PendingEmbedding {
                    sequence: entry.sequence,
                    frame_id: *frame_id,
                    vector: vector.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    // ── Reads over the committed view ───────────────────────────────────

    pub fn frame_meta(&self, frame_id: FrameId) -> Result<&Frame> {
        self.toc
            .frame(frame_id)
            .ok_or(WaxError::UnknownFrame { frame_id })
    }

    #[must_use]
    pub fn frame_metas(&self) -> &[Frame] {
        &self.toc.frames
    }

    /// Canonical payload bytes of a committed frame, checksum-validated.
    pub fn frame_content(&mut self, frame_id: FrameId) -> Result<Vec<u8>> {
        let frame = self
            .toc
            .frame(frame_id)
            .ok_or(WaxError::UnknownFrame { frame_id })?
            .clone();
        let mut disk_bytes = vec![0u8; usize::try_from(frame.payload_length).unwrap_or(0)];
        self.file.seek(SeekFrom::Start(frame.payload_offset))?;
        self.file.read_exact(&mut disk_bytes)?;

        let canonical = match frame.canonical_encoding {
            CanonicalEncoding::Plain => disk_bytes,
            CanonicalEncoding::Zstd => {
                let stored = frame.stored_checksum.ok_or(WaxError::InvalidToc {
                    reason: "compressed frame lacks a stored checksum".into(),
                })?;
                if sha256(&disk_bytes) != stored {
                    return Err(WaxError::ChecksumMismatch {
                        context: "frame payload",
                    });
                }
                zstd::stream::decode_all(&disk_bytes[..])
                    .map_err(|source| WaxError::Io { source, path: None })?
            }
        };
        if sha256(&canonical) != frame.canonical_checksum {
            return Err(WaxError::ChecksumMismatch {
                context: "frame payload",
            });
        }
        Ok(canonical)
    }

    pub fn frame_contents(&mut self, frame_ids: &[FrameId]) -> Result<Vec<Vec<u8>>> {
        frame_ids
            .iter()
            .map(|frame_id| self.frame_content(*frame_id))
            .collect()
    }

    #[must_use]
    pub fn toc(&self) -> &Toc {
        &self.toc
    }

    #[must_use]
    pub fn time_index(&self) -> &TimeSegment {
        &self.time_index
    }

    #[must_use]
    pub fn committed_vectors(&self) -> &BTreeMap<FrameId, Vec<f32>> {
        &self.committed_vectors
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn vector_metric(&self) -> VectorMetric {
        self.vector_metric
    }

    /// Sets the metric recorded in sealed vector segments. Only meaningful
    /// before the first embeddings are committed.
    pub fn set_vector_metric(&mut self, metric: VectorMetric) {
        self.vector_metric = metric;
    }

    /// Whether this session has staged mutations of its own (recovered
    /// pending mutations from an earlier crash do not count).
    #[must_use]
    pub fn has_local_staged(&self) -> bool {
        self.pending.iter().any(|entry| entry.local)
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the persisted lexical segment blob, when one was sealed.
    pub fn lex_segment_bytes(&mut self) -> Result<Option<Vec<u8>>> {
        let Some(manifest) = self.toc.lex else {
            return Ok(None);
        };
        let entry = self
            .toc
            .segment_for_kind(SegmentKind::Lexical)
            .copied()
            .ok_or(WaxError::InvalidToc {
                reason: "lexical manifest without segment".into(),
            })?;
        if manifest.checksum != entry.checksum {
            return Err(WaxError::ChecksumMismatch {
                context: "lexical manifest",
            });
        }
        segments::read_segment_bytes(&mut self.file, &entry).map(Some)
    }

    // ── Verification & stats ────────────────────────────────────────────

    /// Re-validates footer and TOC integrity from disk; `deep` additionally
    /// recomputes every frame payload checksum and segment checksum.
    /// Verification never mutates the file.
    pub fn verify(&mut self, deep: bool) -> Result<()> {
        self.check_open()?;
        let file_len = self.file.metadata()?.len();
        let (footer, toc) =
            read_footer_candidate(&mut self.file, file_len, self.header.footer_offset).ok_or(
                WaxError::InvalidFooter {
                    reason: "committed footer failed verification".into(),
                },
            )?;
        if footer.generation != self.generation {
            return Err(WaxError::InvalidFooter {
                reason: "footer generation diverged from the open snapshot".into(),
            });
        }
        if !deep {
            return Ok(());
        }
        for frame in toc.frames.clone() {
            let mut disk_bytes = vec![0u8; usize::try_from(frame.payload_length).unwrap_or(0)];
            self.file.seek(SeekFrom::Start(frame.payload_offset))?;
            self.file.read_exact(&mut disk_bytes)?;
            match frame.canonical_encoding {
                CanonicalEncoding::Plain => {
                    if sha256(&disk_bytes) != frame.canonical_checksum {
                        return Err(WaxError::ChecksumMismatch {
                            context: "frame payload",
                        });
                    }
                }
                CanonicalEncoding::Zstd => {
                    // The canonical form is not materialized here; the stored
                    // checksum covers the on-disk bytes.
                    let stored = frame.stored_checksum.ok_or(WaxError::InvalidToc {
                        reason: "compressed frame lacks a stored checksum".into(),
                    })?;
                    if sha256(&disk_bytes) != stored {
                        return Err(WaxError::ChecksumMismatch {
                            context: "frame payload",
                        });
                    }
                }
            }
        }
        for entry in toc.segments.clone() {
            segments::read_segment_bytes(&mut self.file, &entry)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let deleted = self
            .toc
            .frames
            .iter()
            .filter(|frame| frame.status == crate::types::FrameStatus::Deleted)
            .count() as u64;
        StoreStats {
            frame_count: self.toc.frames.len() as u64,
            active_frame_count: self.toc.frames.len() as u64 - deleted,
            deleted_frame_count: deleted,
            generation: self.generation,
            file_size_bytes: self.data_end,
            wal_size: self.header.wal_size,
            pending_mutations: self.pending.len() as u64,
            payload_bytes: self.toc.frames.iter().map(|f| f.payload_length).sum(),
            vector_count: self.committed_vectors.len() as u64,
            has_lex_index: self.toc.lex.is_some(),
            has_vec_index: self.toc.vec.is_some(),
            has_time_index: self.toc.time.is_some(),
        }
    }

    #[must_use]
    pub fn wal_stats(&self) -> WalStats {
        self.wal.stats()
    }

    /// Test hook: abort the next commit right after the numbered step (1..5).
    pub fn set_commit_failpoint(&mut self, step: Option<u8>) {
        self.failpoint = step;
    }

    /// Auto-commits locally staged mutations (never recovered-pending ones)
    /// and releases the writer lease. The lease is released even when the
    /// final commit fails.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let commit_result = if self.has_local_staged() {
            self.wal.note_auto_commit();
            self.commit().map(|_| ())
        } else {
            Ok(())
        };
        self.closed = true;
        self.lease = None;
        commit_result
    }
}

impl Drop for WaxStore {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                warn!(error = %err, "close during drop failed");
            }
        }
    }
}

/// Every catalogued byte range (frame payloads, sealed segments) must lie
/// inside the file and ranges must not overlap one another.
fn validate_layout(toc: &Toc, file_len: u64) -> Result<()> {
    let mut ranges: Vec<(u64, u64)> = Vec::new();
    for frame in &toc.frames {
        if frame.payload_length > 0 {
            ranges.push((frame.payload_offset, frame.payload_end()));
        }
    }
    for segment in &toc.segments {
        ranges.push((
            segment.bytes_offset,
            segment.bytes_offset.saturating_add(segment.bytes_length),
        ));
    }
    for (_, end) in &ranges {
        if *end > file_len {
            return Err(WaxError::InvalidToc {
                reason: "catalogued bytes extend past end of file".into(),
            });
        }
    }
    ranges.sort_unstable();
    for pair in ranges.windows(2) {
        if pair[1].0 < pair[0].1 {
            return Err(WaxError::InvalidToc {
                reason: "catalogued byte ranges overlap".into(),
            });
        }
    }
    Ok(())
}

/// Validates one footer candidate: decode, bounds, TOC hash, TOC decode.
fn read_footer_candidate(
    file: &mut File,
    file_len: u64,
    footer_offset: u64,
) -> Option<(CommitFooter, Toc)> {
    if footer_offset == 0 || footer_offset + FOOTER_SIZE as u64 > file_len {
        return None;
    }
    let mut footer_bytes = [0u8; FOOTER_SIZE];
    file.seek(SeekFrom::Start(footer_offset)).ok()?;
    file.read_exact(&mut footer_bytes).ok()?;
    let footer = CommitFooter::decode(&footer_bytes)?;
    if footer.toc_len == 0 || footer.toc_len > footer_offset {
        return None;
    }
    let toc_offset = footer_offset - footer.toc_len;
    let mut toc_bytes = vec![0u8; usize::try_from(footer.toc_len).ok()?];
    file.seek(SeekFrom::Start(toc_offset)).ok()?;
    file.read_exact(&mut toc_bytes).ok()?;
    if !footer.hash_matches(&toc_bytes) {
        return None;
    }
    let toc = Toc::decode(&toc_bytes).ok()?;
    Some((footer, toc))
}

/// Backward scan of the trailing window for the newest decodable footer.
fn scan_for_footer(
    file: &mut File,
    file_len: u64,
    wal_end: u64,
) -> Result<Option<(u64, CommitFooter, Toc)>> {
    if file_len <= wal_end {
        return Ok(None);
    }
    let window_start = wal_end.max(file_len.saturating_sub(MAX_FOOTER_SCAN_BYTES));
    let mut window = vec![0u8; usize::try_from(file_len - window_start).unwrap_or(0)];
    file.seek(SeekFrom::Start(window_start))?;
    file.read_exact(&mut window)?;

    let mut search_len = window.len();
    while search_len >= FOOTER_SIZE {
        let Some(slice) = find_last_valid_footer(&window[..search_len]) else {
            return Ok(None);
        };
        let absolute = window_start + slice.footer_offset as u64;
        match Toc::decode(slice.toc_bytes) {
            Ok(toc) => return Ok(Some((absolute, slice.footer.clone(), toc))),
            Err(err) => {
                // Hash-valid but structurally stale; keep scanning earlier.
                debug!(offset = absolute, error = %err, "skipping undecodable toc candidate");
                search_len = slice.footer_offset;
            }
        }
    }
    Ok(None)
}
