//! In-memory dense-vector index with two-phase staging.
//!
//! Brute-force scoring over every stored vector is the baseline here; search
//! sorts descending and breaks ties by lower frame id. Cosine search demands
//! a unit-norm query.

use std::collections::BTreeMap;

use crate::{
    codec::{ByteReader, ByteWriter},
    constants::{SEGMENT_VERSION, VEC_SEGMENT_MAGIC},
    error::{Result, WaxError},
    types::{FrameId, l2_norm},
};

/// Tolerance used when validating that a cosine query is unit-norm.
const UNIT_NORM_EPSILON: f32 = 1e-3;

/// Scalar similarity used to score vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VectorMetric {
    #[default]
    Cosine,
    Dot,
    L2,
}

impl VectorMetric {
    #[must_use]
    pub const fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(VectorMetric::Cosine),
            1 => Some(VectorMetric::Dot),
            2 => Some(VectorMetric::L2),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_byte(self) -> u8 {
        match self {
            VectorMetric::Cosine => 0,
            VectorMetric::Dot => 1,
            VectorMetric::L2 => 2,
        }
    }
}

/// One ranked vector hit; higher score is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchHit {
    pub frame_id: FrameId,
    pub score: f32,
}

#[derive(Debug, Clone)]
enum VecOp {
    Add { frame_id: FrameId, vector: Vec<f32> },
    Remove { frame_id: FrameId },
}

/// Dense-vector engine holding `(frame_id, vector)` tuples under one metric.
#[derive(Debug, Default)]
pub struct VectorEngine {
    metric: VectorMetric,
    dimension: Option<u32>,
    entries: BTreeMap<FrameId, Vec<f32>>,
    staged: Vec<VecOp>,
}

impl VectorEngine {
    #[must_use]
    pub fn new(metric: VectorMetric) -> Self {
        Self {
            metric,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn metric(&self) -> VectorMetric {
        self.metric
    }

    #[must_use]
    pub fn dimension(&self) -> Option<u32> {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn vector_for(&self, frame_id: FrameId) -> Option<&[f32]> {
        self.entries.get(&frame_id).map(Vec::as_slice)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<u32> {
        let actual = u32::try_from(vector.len()).map_err(|_| WaxError::DimensionMismatch {
            expected: self.dimension.unwrap_or(0),
            actual: u32::MAX,
        })?;
        if actual == 0 {
            return Err(WaxError::DimensionMismatch {
                expected: self.dimension.unwrap_or(1),
                actual: 0,
            });
        }
        if let Some(expected) = self.dimension {
            if expected != actual {
                return Err(WaxError::DimensionMismatch { expected, actual });
            }
        }
        Ok(actual)
    }

    /// Adds or replaces a vector immediately.
    pub fn add(&mut self, frame_id: FrameId, vector: Vec<f32>) -> Result<()> {
        let dimension = self.check_dimension(&vector)?;
        self.dimension.get_or_insert(dimension);
        self.entries.insert(frame_id, vector);
        Ok(())
    }

    /// Adds a batch; frame/vector count mismatch and any dimension mismatch
    /// reject the whole batch.
    pub fn add_batch(&mut self, frame_ids: &[FrameId], vectors: &[Vec<f32>]) -> Result<()> {
        if frame_ids.len() != vectors.len() {
            return Err(WaxError::BatchShapeMismatch {
                frames: frame_ids.len(),
                vectors: vectors.len(),
            });
        }
        // All vectors must agree before any of them lands.
        let expected = match self.dimension {
            Some(dim) => Some(dim),
            None => vectors
                .first()
                .map(|v| u32::try_from(v.len()).unwrap_or(u32::MAX)),
        };
        if let Some(expected) = expected {
            for vector in vectors {
                let actual = u32::try_from(vector.len()).unwrap_or(u32::MAX);
                if actual != expected || actual == 0 {
                    return Err(WaxError::DimensionMismatch { expected, actual });
                }
            }
        }
        for (frame_id, vector) in frame_ids.iter().zip(vectors.iter()) {
            self.add(*frame_id, vector.clone())?;
        }
        Ok(())
    }

    pub fn remove(&mut self, frame_id: FrameId) -> bool {
        self.entries.remove(&frame_id).is_some()
    }

    /// Brute-force ranked search. Cosine requires a unit-norm query.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<VectorSearchHit>> {
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(query)?;
        if self.metric == VectorMetric::Cosine {
            let norm = l2_norm(query);
            if (norm - 1.0).abs() > UNIT_NORM_EPSILON {
                return Err(WaxError::QueryNotNormalized { norm });
            }
        }

        let mut hits: Vec<VectorSearchHit> = self
            .entries
            .iter()
            .map(|(frame_id, vector)| VectorSearchHit {
                frame_id: *frame_id,
                score: self.score(query, vector),
            })
            .collect();
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.frame_id.cmp(&b.frame_id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    fn score(&self, query: &[f32], vector: &[f32]) -> f32 {
        match self.metric {
            VectorMetric::Cosine => {
                let norm = l2_norm(vector);
                if norm == 0.0 {
                    0.0
                } else {
                    dot(query, vector) / norm
                }
            }
            VectorMetric::Dot => dot(query, vector),
            VectorMetric::L2 => -l2_distance(query, vector),
        }
    }

    // Staged twins: invisible to search until commit_staged.

    pub fn stage_add(&mut self, frame_id: FrameId, vector: Vec<f32>) -> Result<()> {
        self.check_dimension(&vector)?;
        self.staged.push(VecOp::Add { frame_id, vector });
        Ok(())
    }

    pub fn stage_add_batch(&mut self, frame_ids: &[FrameId], vectors: &[Vec<f32>]) -> Result<()> {
        if frame_ids.len() != vectors.len() {
            return Err(WaxError::BatchShapeMismatch {
                frames: frame_ids.len(),
                vectors: vectors.len(),
            });
        }
        for (frame_id, vector) in frame_ids.iter().zip(vectors.iter()) {
            self.stage_add(*frame_id, vector.clone())?;
        }
        Ok(())
    }

    pub fn stage_remove(&mut self, frame_id: FrameId) {
        self.staged.push(VecOp::Remove { frame_id });
    }

    /// Publishes staged mutations in insertion order.
    pub fn commit_staged(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        for op in staged {
            match op {
                VecOp::Add { frame_id, vector } => self.add(frame_id, vector)?,
                VecOp::Remove { frame_id } => {
                    self.remove(frame_id);
                }
            }
        }
        Ok(())
    }

    pub fn rollback_staged(&mut self) {
        self.staged.clear();
    }

    #[must_use]
    pub fn pending_mutation_count(&self) -> usize {
        self.staged.len()
    }

    /// Serializes committed entries into a sealed segment blob.
    #[must_use]
    pub fn serialize_segment(&self) -> Vec<u8> {
        VectorSegment {
            similarity: self.metric,
            dimension: self.dimension.unwrap_or(0),
            entries: self
                .entries
                .iter()
                .map(|(id, vector)| (*id, vector.clone()))
                .collect(),
        }
        .encode()
    }

    /// Restores an engine from a sealed segment blob.
    pub fn load_segment(bytes: &[u8]) -> Result<Self> {
        let segment = VectorSegment::decode(bytes)?;
        let mut engine = Self::new(segment.similarity);
        for (frame_id, vector) in segment.entries {
            engine.add(frame_id, vector)?;
        }
        Ok(engine)
    }
}

/// Sealed vector segment: header plus frame-id/vector pairs.
///
/// ```text
/// [ magic (4) | version (u16) | encoding (u8) | similarity (u8)
///   | dimension (u32) | vector_count (u64) | payload_length (u64) | payload ]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSegment {
    pub similarity: VectorMetric,
    pub dimension: u32,
    pub entries: Vec<(FrameId, Vec<f32>)>,
}

/// Only dense f32 payloads are defined today.
const VEC_ENCODING_F32: u8 = 0;

impl VectorSegment {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let entry_size = 8 + 4 * self.dimension as usize;
        let payload_length = (self.entries.len() * entry_size) as u64;
        let mut writer = ByteWriter::with_capacity(28 + payload_length as usize);
        writer.put_bytes(&VEC_SEGMENT_MAGIC);
        writer.put_u16(SEGMENT_VERSION);
        writer.put_u8(VEC_ENCODING_F32);
        writer.put_u8(self.similarity.as_byte());
        writer.put_u32(self.dimension);
        writer.put_u64(self.entries.len() as u64);
        writer.put_u64(payload_length);
        for (frame_id, vector) in &self.entries {
            writer.put_u64(*frame_id);
            for value in vector {
                writer.put_f32(*value);
            }
        }
        writer.into_bytes()
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes, "vector segment");
        let magic = reader.get_array::<4>()?;
        if magic != VEC_SEGMENT_MAGIC {
            return Err(WaxError::InvalidSegment {
                reason: "vector segment magic mismatch".into(),
            });
        }
        let version = reader.get_u16()?;
        if version != SEGMENT_VERSION {
            return Err(WaxError::InvalidSegment {
                reason: format!("unsupported vector segment version {version}").into(),
            });
        }
        let encoding = reader.get_u8()?;
        if encoding != VEC_ENCODING_F32 {
            return Err(WaxError::InvalidSegment {
                reason: format!("unsupported vector encoding {encoding}").into(),
            });
        }
        let similarity =
            VectorMetric::from_byte(reader.get_u8()?).ok_or(WaxError::InvalidSegment {
                reason: "unknown similarity".into(),
            })?;
        let dimension = reader.get_u32()?;
        let vector_count = reader.get_u64()?;
        let payload_length = reader.get_u64()?;
        let entry_size = 8u64 + 4 * u64::from(dimension);
        if payload_length != vector_count.saturating_mul(entry_size)
            || payload_length != reader.remaining() as u64
        {
            return Err(WaxError::InvalidSegment {
                reason: "vector segment payload length mismatch".into(),
            });
        }
        let mut entries = Vec::with_capacity(usize::try_from(vector_count).unwrap_or(0));
        for _ in 0..vector_count {
            let frame_id = reader.get_u64()?;
            let mut vector = Vec::with_capacity(dimension as usize);
            for _ in 0..dimension {
                vector.push(reader.get_f32()?);
            }
            entries.push((frame_id, vector));
        }
        reader.expect_end()?;
        Ok(Self {
            similarity,
            dimension,
            entries,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tie_break_prefers_lower_frame_id() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        engine.add(10, vec![1.0, 0.0, 0.0]).unwrap();
        engine.add(2, vec![1.0, 0.0, 0.0]).unwrap();
        engine.add(7, vec![0.0, 1.0, 0.0]).unwrap();

        let hits = engine.search(&[1.0, 0.0, 0.0], 3).expect("search");
        assert_eq!(hits.iter().map(|h| h.frame_id).collect::<Vec<_>>(), vec![2, 10, 7]);
        assert!((hits[0].score - hits[1].score).abs() < f32::EPSILON);
    }

    #[test]
    fn cosine_rejects_non_unit_query() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        engine.add(0, vec![1.0, 0.0]).unwrap();
        let err = engine.search(&[3.0, 4.0], 1).expect_err("must fail");
        assert!(matches!(err, WaxError::QueryNotNormalized { .. }));
    }

    #[test]
    fn dot_and_l2_metrics_rank_consistently() {
        let mut dot_engine = VectorEngine::new(VectorMetric::Dot);
        dot_engine.add(0, vec![2.0, 0.0]).unwrap();
        dot_engine.add(1, vec![1.0, 0.0]).unwrap();
        let hits = dot_engine.search(&[5.0, 0.0], 2).expect("search");
        assert_eq!(hits[0].frame_id, 0);

        let mut l2_engine = VectorEngine::new(VectorMetric::L2);
        l2_engine.add(0, vec![0.0, 0.0]).unwrap();
        l2_engine.add(1, vec![5.0, 0.0]).unwrap();
        let hits = l2_engine.search(&[0.1, 0.0], 2).expect("search");
        assert_eq!(hits[0].frame_id, 0, "closer vector wins under l2");
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        engine.add(0, vec![1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            engine.add(1, vec![1.0, 0.0]),
            Err(WaxError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(engine.search(&[1.0, 0.0], 1).is_err());
    }

    #[test]
    fn add_batch_rejects_shape_mismatch() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        let err = engine
            .add_batch(&[0, 1], &[vec![1.0, 0.0]])
            .expect_err("must fail");
        assert!(matches!(err, WaxError::BatchShapeMismatch { .. }));
    }

    #[test]
    fn staging_gates_visibility() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        engine.stage_add(3, vec![1.0, 0.0]).unwrap();
        assert!(engine.search(&[1.0, 0.0], 5).unwrap().is_empty());
        engine.commit_staged().unwrap();
        assert_eq!(engine.search(&[1.0, 0.0], 5).unwrap().len(), 1);

        engine.stage_remove(3);
        engine.rollback_staged();
        engine.commit_staged().unwrap();
        assert_eq!(engine.len(), 1, "rollback discarded the remove");
    }

    #[test]
    fn segment_roundtrip() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        engine.add(0, vec![1.0, 0.0, 0.0]).unwrap();
        engine.add(4, vec![0.0, 0.6, 0.8]).unwrap();
        let bytes = engine.serialize_segment();

        let restored = VectorEngine::load_segment(&bytes).expect("load");
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.dimension(), Some(3));
        assert_eq!(restored.metric(), VectorMetric::Cosine);
        assert_eq!(restored.vector_for(4).unwrap(), &[0.0, 0.6, 0.8]);
    }

    #[test]
    fn segment_rejects_header_tampering() {
        let mut engine = VectorEngine::new(VectorMetric::Cosine);
        engine.add(0, vec![1.0, 0.0]).unwrap();
        let bytes = engine.serialize_segment();

        let mut bad_magic = bytes.clone();
        bad_magic[0] ^= 0xFF;
        assert!(VectorSegment::decode(&bad_magic).is_err());

        let mut bad_count = bytes.clone();
        bad_count[12] = 9;
        assert!(VectorSegment::decode(&bad_count).is_err());
    }
}
