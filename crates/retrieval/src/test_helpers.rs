//! Shared test helpers for retrieval tests.

use async_trait::async_trait;
use docchat_core::error::ProviderError;
use docchat_core::provider::EmbeddingProvider;
use std::sync::Mutex;

/// Embeds text by counting a fixed vocabulary of keywords.
///
/// Dimension `i` is the number of times `vocabulary[i]` appears in the
/// lowercased text, so texts sharing words get similar vectors.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    calls: Mutex<Vec<usize>>,
    fail: Mutex<bool>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: Vec<&'static str>) -> Self {
        Self {
            vocabulary,
            calls: Mutex::new(Vec::new()),
            fail: Mutex::new(false),
        }
    }

    /// Make every following call fail (or succeed again).
    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }

    /// Batch sizes of every call made so far.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        self.vocabulary
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword_mock"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.lock().unwrap().push(texts.len());
        if *self.fail.lock().unwrap() {
            return Err(ProviderError::Network("embedding backend offline".into()));
        }
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Returns a fixed number of vectors regardless of input.
pub struct ShortBatchEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    fn name(&self) -> &str {
        "short_batch"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(vec![vec![1.0, 0.0]])
    }
}
