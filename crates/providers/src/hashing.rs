//! Offline embedder using the hashing trick.
//!
//! Each lowercased alphanumeric token is hashed with SHA-256; the digest
//! picks a bucket and a sign. Vectors are L2-normalised, so texts sharing
//! vocabulary land close together without any model download or network.

use async_trait::async_trait;
use docchat_core::error::ProviderError;
use docchat_core::provider::EmbeddingProvider;
use sha2::{Digest, Sha256};

pub const DEFAULT_DIMENSIONS: usize = 384;

pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_DIMENSIONS,
        }
    }
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Result<Self, ProviderError> {
        if dimensions == 0 {
            return Err(ProviderError::Unavailable(
                "hashing embedder needs at least one dimension".into(),
            ));
        }
        Ok(Self { dimensions })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embed one text. Text without any token maps to the zero vector.
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];

        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = HashingEmbedder::default();
        let v = embedder.embed_one("Refunds are processed within fourteen days");
        assert_eq!(v.len(), DEFAULT_DIMENSIONS);
        assert!((dot(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn deterministic_and_case_insensitive() {
        let embedder = HashingEmbedder::new(64).unwrap();
        assert_eq!(embedder.embed_one("Refund Policy"), embedder.embed_one("refund policy"));
    }

    #[test]
    fn shared_words_score_higher() {
        let embedder = HashingEmbedder::default();
        let query = embedder.embed_one("refund policy");
        let related = embedder.embed_one("Our refund policy allows returns");
        let unrelated = embedder.embed_one("Shipping takes three business days");
        assert!(dot(&query, &related) > dot(&query, &unrelated));
    }

    #[test]
    fn empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16).unwrap();
        assert!(embedder.embed_one("  ... ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn zero_dimensions_rejected() {
        assert!(HashingEmbedder::new(0).is_err());
    }

    #[tokio::test]
    async fn batch_preserves_order() {
        let embedder = HashingEmbedder::new(32).unwrap();
        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let vectors = embedder.embed(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], embedder.embed_one("alpha"));
        assert_eq!(vectors[1], embedder.embed_one("beta"));
    }
}
