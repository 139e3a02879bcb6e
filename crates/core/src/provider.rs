//! Provider traits: the abstraction over the two external models.
//!
//! An [`EmbeddingProvider`] maps a batch of strings to fixed-length vectors.
//! A [`GenerationProvider`] turns a prompt into text, either in one piece or
//! as a stream of fragments.
//!
//! Implementations: OpenAI-compatible endpoints, an offline hashing
//! embedder, fallback chains, and scripted mocks in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;

/// Token usage information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A single fragment of a streaming generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,

    /// Usage info (typically only in the final chunk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl StreamChunk {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            done: false,
            usage: None,
        }
    }

    pub fn finished(usage: Option<Usage>) -> Self {
        Self {
            content: None,
            done: true,
            usage,
        }
    }
}

/// Receiving half of a generation stream.
///
/// Dropping the receiver tells the producer to stop.
pub type GenerationStream = mpsc::Receiver<Result<StreamChunk, ProviderError>>;

/// Maps text to embedding vectors.
///
/// Calls are batched and order-preserving: `embed(texts)[i]` is the vector
/// for `texts[i]`. Identical batches yield identical vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "hashing").
    fn name(&self) -> &str;

    /// Embed every input in one call.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Turns a prompt into text.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// A human-readable name for this provider.
    fn name(&self) -> &str;

    /// Generate the complete answer for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;

    /// Generate the answer as a stream of fragments that concatenate to the
    /// final text.
    ///
    /// Default implementation calls `generate()` and wraps the result as a
    /// single chunk.
    async fn generate_stream(&self, prompt: &str) -> Result<GenerationStream, ProviderError> {
        let text = self.generate(prompt).await?;
        let (tx, rx) = mpsc::channel(2);
        let _ = tx.send(Ok(StreamChunk::text(text))).await;
        let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        Ok(rx)
    }

    /// Health check: can we reach the provider?
    async fn health_check(&self) -> Result<bool, ProviderError> {
        Ok(true)
    }
}
