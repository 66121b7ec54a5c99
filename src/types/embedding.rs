//! Embedding provider interface and vector-space identity.

use std::collections::BTreeMap;

use crate::error::Result;

/// Frame-level embedding metadata keys (stored in `Frame.entries`).
///
/// Persisted per-frame so a reopened store can tell which vector space its
/// embeddings belong to without consulting the provider.
pub const EMBEDDING_PROVIDER_KEY: &str = "wax.embedding.provider";
pub const EMBEDDING_MODEL_KEY: &str = "wax.embedding.model";
pub const EMBEDDING_DIMENSION_KEY: &str = "wax.embedding.dimension";
pub const EMBEDDING_NORMALIZED_KEY: &str = "wax.embedding.normalized";

/// Identifies an embedding "vector space" used for semantic search.
///
/// Dimensions alone are not sufficient to guarantee compatibility (multiple
/// models can share a dimension), so cache keys and identity comparisons use
/// provider + model + dimension + normalization together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbeddingIdentity {
    pub provider: String,
    pub model: String,
    pub dimension: u32,
    pub normalized: bool,
}

impl EmbeddingIdentity {
    /// Stable key fragment used when hashing cache entries.
    #[must_use]
    pub fn cache_tag(&self) -> String {
        format!(
            "{}\u{1f}{}\u{1f}{}\u{1f}{}",
            self.provider, self.model, self.dimension, self.normalized
        )
    }

    /// Writes the identity into a frame's metadata entries.
    pub fn apply_to_entries(&self, entries: &mut BTreeMap<String, String>) {
        entries.insert(EMBEDDING_PROVIDER_KEY.to_string(), self.provider.clone());
        entries.insert(EMBEDDING_MODEL_KEY.to_string(), self.model.clone());
        entries.insert(
            EMBEDDING_DIMENSION_KEY.to_string(),
            self.dimension.to_string(),
        );
        entries.insert(
            EMBEDDING_NORMALIZED_KEY.to_string(),
            self.normalized.to_string(),
        );
    }

    /// Parses an identity back out of frame metadata entries.
    ///
    /// Returns `None` unless both provider and model are present.
    #[must_use]
    pub fn from_entries(entries: &BTreeMap<String, String>) -> Option<Self> {
        let provider = entries
            .get(EMBEDDING_PROVIDER_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())?;
        let model = entries
            .get(EMBEDDING_MODEL_KEY)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())?;
        let dimension = entries
            .get(EMBEDDING_DIMENSION_KEY)
            .and_then(|value| value.trim().parse::<u32>().ok())
            .unwrap_or(0);
        let normalized = entries
            .get(EMBEDDING_NORMALIZED_KEY)
            .is_some_and(|value| matches!(value.trim(), "true" | "1" | "yes"));
        Some(Self {
            provider: provider.to_string(),
            model: model.to_string(),
            dimension,
            normalized,
        })
    }
}

/// Abstract dense-embedding provider. The concrete neural implementation is
/// external; the store only depends on this capability set.
pub trait EmbeddingProvider {
    /// Output dimensionality of every produced vector.
    fn dimensions(&self) -> u32;

    /// Whether produced vectors are L2-normalized. Normalized providers pair
    /// with the cosine metric.
    fn normalized(&self) -> bool;

    /// Optional identity tag describing the vector space.
    fn identity(&self) -> Option<EmbeddingIdentity>;

    /// Embeds a single text. May suspend on an external provider.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds a batch of texts. The default implementation loops `embed`;
    /// providers with a native batch path should override it.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// L2 norm of a vector.
#[must_use]
pub fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_tag_distinguishes_models() {
        let a = EmbeddingIdentity {
            provider: "local".into(),
            model: "bge-small".into(),
            dimension: 384,
            normalized: true,
        };
        let mut b = a.clone();
        b.model = "bge-base".into();
        assert_ne!(a.cache_tag(), b.cache_tag());
    }

    #[test]
    fn l2_norm_of_unit_vector() {
        assert!((l2_norm(&[0.6, 0.8]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn identity_roundtrips_through_frame_entries() {
        let identity = EmbeddingIdentity {
            provider: "local".into(),
            model: "bge-small".into(),
            dimension: 384,
            normalized: true,
        };
        let mut entries = BTreeMap::new();
        identity.apply_to_entries(&mut entries);
        assert_eq!(EmbeddingIdentity::from_entries(&entries), Some(identity));
        assert_eq!(EmbeddingIdentity::from_entries(&BTreeMap::new()), None);
    }
}
