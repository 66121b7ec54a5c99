//! WAL ring writer.
//!
//! The ring is a fixed window of sequenced records. Records never span the
//! ring end: when the tail cannot hold the next record a padding record fills
//! it and the logical position wraps to zero. After every data record a
//! zero-filled terminal marker is laid down so readers can find the end of
//! written data in O(1).

use std::{
    fs::File,
    io::{Seek, SeekFrom, Write},
};

use tracing::debug;

use crate::{
    constants::{RECORD_FLAG_PADDING, RECORD_HEADER_SIZE},
    error::{Result, WaxError},
    types::WalStats,
    wal::record::RecordHeader,
};

const HEADER_LEN: u64 = RECORD_HEADER_SIZE as u64;

/// Planned cost of one append, computed before any byte is written.
#[derive(Debug, Clone, Copy)]
struct AppendPlan {
    /// Zero-fill from the current position to the ring end (tail < header).
    pre_fill: u64,
    /// Total size of the padding record when the tail cannot hold the data.
    padding: Option<u64>,
    record_pos: u64,
    record_size: u64,
    total_cost: u64,
    sequences: u64,
}

/// Exclusive writer over the embedded ring. Positions are ring-relative; the
/// file offset of position `p` is `wal_offset + p`.
#[derive(Debug)]
pub struct WalWriter {
    wal_offset: u64,
    wal_size: u64,
    write_pos: u64,
    checkpoint_pos: u64,
    pending_bytes: u64,
    last_sequence: u64,
    wrap_count: u64,
    checkpoint_count: u64,
    sentinel_write_count: u64,
    write_call_count: u64,
    auto_commit_count: u64,
}

impl WalWriter {
    /// Restores a writer from recovered state.
    #[must_use]
    pub fn new(
        wal_offset: u64,
        wal_size: u64,
        write_pos: u64,
        checkpoint_pos: u64,
        pending_bytes: u64,
        last_sequence: u64,
    ) -> Self {
        Self {
            wal_offset,
            wal_size,
            write_pos,
            checkpoint_pos,
            pending_bytes,
            last_sequence,
            wrap_count: 0,
            checkpoint_count: 0,
            sentinel_write_count: 0,
            write_call_count: 0,
            auto_commit_count: 0,
        }
    }

    #[must_use]
    pub fn write_pos(&self) -> u64 {
        self.write_pos
    }

    #[must_use]
    pub fn checkpoint_pos(&self) -> u64 {
        self.checkpoint_pos
    }

    #[must_use]
    pub fn pending_bytes(&self) -> u64 {
        self.pending_bytes
    }

    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    #[must_use]
    pub fn stats(&self) -> WalStats {
        WalStats {
            write_pos: self.write_pos,
            checkpoint_pos: self.checkpoint_pos,
            pending_bytes: self.pending_bytes,
            last_sequence: self.last_sequence,
            wrap_count: self.wrap_count,
            checkpoint_count: self.checkpoint_count,
            sentinel_write_count: self.sentinel_write_count,
            write_call_count: self.write_call_count,
            auto_commit_count: self.auto_commit_count,
        }
    }

    /// Whether a payload of this size can currently be appended.
    #[must_use]
    pub fn can_append(&self, payload_len: usize) -> bool {
        self.plan(payload_len as u64, self.write_pos, self.pending_bytes, 0)
            .is_ok()
    }

    /// Appends one data record and returns its sequence.
    pub fn append(&mut self, file: &mut File, payload: &[u8]) -> Result<u64> {
        let plan = self.plan(payload.len() as u64, self.write_pos, self.pending_bytes, 0)?;
        self.execute(file, payload, &plan)
    }

    /// Appends a batch atomically: capacity and sequence space are validated
    /// for the whole batch before the first byte is written, and in-memory
    /// state is rolled back if any write fails.
    pub fn append_batch(&mut self, file: &mut File, payloads: &[Vec<u8>]) -> Result<Vec<u64>> {
        // Dry-run the plans against simulated state.
        let mut pos = self.write_pos;
        let mut pending = self.pending_bytes;
        let mut sequences = 0u64;
        for payload in payloads {
            let plan = self.plan(payload.len() as u64, pos, pending, sequences)?;
            pos = (plan.record_pos + plan.record_size) % self.wal_size;
            pending += plan.total_cost;
            sequences += plan.sequences;
        }

        let snapshot = (
            self.write_pos,
            self.pending_bytes,
            self.last_sequence,
            self.wrap_count,
            self.sentinel_write_count,
            self.write_call_count,
        );
        let mut sequences = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let plan = match self.plan(payload.len() as u64, self.write_pos, self.pending_bytes, 0)
            {
                Ok(plan) => plan,
                Err(err) => {
                    self.restore(snapshot);
                    return Err(err);
                }
            };
            match self.execute(file, payload, &plan) {
                Ok(sequence) => sequences.push(sequence),
                Err(err) => {
                    self.restore(snapshot);
                    return Err(err);
                }
            }
        }
        Ok(sequences)
    }

    /// Advances the checkpoint to the write position and clears pending bytes.
    pub fn record_checkpoint(&mut self) {
        self.checkpoint_pos = self.write_pos;
        self.pending_bytes = 0;
        self.checkpoint_count += 1;
        debug!(checkpoint_pos = self.checkpoint_pos, "wal checkpoint recorded");
    }

    /// Counts one close-time auto-commit; surfaced through `WalStats`.
    pub fn note_auto_commit(&mut self) {
        self.auto_commit_count += 1;
    }

    fn restore(&mut self, snapshot: (u64, u64, u64, u64, u64, u64)) {
        (
            self.write_pos,
            self.pending_bytes,
            self.last_sequence,
            self.wrap_count,
            self.sentinel_write_count,
            self.write_call_count,
        ) = snapshot;
    }

    fn plan(
        &self,
        payload_len: u64,
        write_pos: u64,
        pending_bytes: u64,
        extra_sequences: u64,
    ) -> Result<AppendPlan> {
        let record_size = HEADER_LEN + payload_len;
        let available = self.wal_size.saturating_sub(pending_bytes);
        if record_size > self.wal_size {
            return Err(WaxError::WalCapacity {
                requested: record_size,
                available,
            });
        }

        let mut pos = write_pos;
        let mut cost = 0u64;
        let mut sequences = 1u64;
        let mut pre_fill = 0u64;
        let mut padding = None;

        let tail = self.wal_size - pos;
        if tail < HEADER_LEN {
            pre_fill = tail;
            cost += tail;
            pos = 0;
        }
        let tail = self.wal_size - pos;
        if tail < record_size {
            padding = Some(tail);
            cost += tail;
            sequences += 1;
            pos = 0;
        }
        cost += record_size;

        if cost > available {
            return Err(WaxError::WalCapacity {
                requested: cost,
                available,
            });
        }
        self.last_sequence
            .checked_add(extra_sequences + sequences)
            .ok_or(WaxError::SequenceOverflow)?;

        Ok(AppendPlan {
            pre_fill,
            padding,
            record_pos: pos,
            record_size,
            total_cost: cost,
            sequences,
        })
    }

    fn execute(&mut self, file: &mut File, payload: &[u8], plan: &AppendPlan) -> Result<u64> {
        if plan.pre_fill > 0 {
            self.write_at(file, self.write_pos, &vec![0u8; plan.pre_fill as usize])?;
            self.wrap_count += 1;
        }
        if let Some(padding_size) = plan.padding {
            // Padding always starts at the current position and fills the tail.
            let pad_pos = self.write_pos;
            self.last_sequence += 1;
            let pad_payload = vec![0u8; (padding_size - HEADER_LEN) as usize];
            let header =
                RecordHeader::for_payload(self.last_sequence, &pad_payload, RECORD_FLAG_PADDING);
            let mut bytes = Vec::with_capacity(padding_size as usize);
            bytes.extend_from_slice(&header.encode());
            bytes.extend_from_slice(&pad_payload);
            self.write_at(file, pad_pos, &bytes)?;
            self.wrap_count += 1;
            debug!(
                sequence = self.last_sequence,
                size = padding_size,
                "wal padding record wrapped the ring"
            );
        }

        self.last_sequence += 1;
        let sequence = self.last_sequence;
        let header = RecordHeader::for_payload(sequence, payload, 0);
        let mut bytes = Vec::with_capacity(plan.record_size as usize);
        bytes.extend_from_slice(&header.encode());
        bytes.extend_from_slice(payload);
        self.write_at(file, plan.record_pos, &bytes)?;

        self.write_pos = plan.record_pos + plan.record_size;
        if self.write_pos == self.wal_size {
            self.write_pos = 0;
            self.wrap_count += 1;
        }
        self.pending_bytes += plan.total_cost;
        self.write_call_count += 1;
        self.write_terminal_marker(file)?;
        Ok(sequence)
    }

    /// Lays down the terminal marker at the write position when the free
    /// region can hold it; the next append simply overwrites it.
    fn write_terminal_marker(&mut self, file: &mut File) -> Result<()> {
        let free = self.wal_size.saturating_sub(self.pending_bytes);
        let tail = self.wal_size - self.write_pos;
        let marker_len = HEADER_LEN.min(tail).min(free);
        if marker_len == 0 {
            return Ok(());
        }
        self.write_at(file, self.write_pos, &vec![0u8; marker_len as usize])?;
        self.sentinel_write_count += 1;
        Ok(())
    }

    fn write_at(&self, file: &mut File, pos: u64, bytes: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(self.wal_offset + pos))?;
        file.write_all(bytes)?;
        Ok(())
    }
}
