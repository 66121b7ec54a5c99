//! Capacity-bounded embedding memo keyed by content hash.

use std::collections::{HashMap, VecDeque};

use crate::{codec::sha256, types::EmbeddingIdentity};

/// Default number of cached embeddings.
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Cache key: SHA-256 over the text and the vector-space identity, so the
/// same text embedded under a different model never collides.
#[must_use]
pub fn content_key(text: &str, identity: Option<&EmbeddingIdentity>) -> [u8; 32] {
    let mut buf = Vec::with_capacity(text.len() + 64);
    buf.extend_from_slice(text.as_bytes());
    buf.push(0x1f);
    if let Some(identity) = identity {
        buf.extend_from_slice(identity.cache_tag().as_bytes());
    }
    sha256(&buf)
}

/// LRU-ish memo: lookups refresh recency, inserts evict the oldest entry
/// once capacity is reached.
#[derive(Debug)]
pub struct EmbeddingCache {
    capacity: usize,
    entries: HashMap<[u8; 32], Vec<f32>>,
    order: VecDeque<[u8; 32]>,
}

impl EmbeddingCache {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, key: &[u8; 32]) -> Option<Vec<f32>> {
        let vector = self.entries.get(key)?.clone();
        self.touch(key);
        Some(vector)
    }

    pub fn insert(&mut self, key: [u8; 32], vector: Vec<f32>) {
        if self.entries.insert(key, vector).is_none() {
            self.order.push_back(key);
            while self.entries.len() > self.capacity {
                if let Some(oldest) = self.order.pop_front() {
                    self.entries.remove(&oldest);
                }
            }
        } else {
            self.touch(&key);
        }
    }

    fn touch(&mut self, key: &[u8; 32]) {
        if let Some(index) = self.order.iter().position(|candidate| candidate == key) {
            self.order.remove(index);
            self.order.push_back(*key);
        }
    }
}
