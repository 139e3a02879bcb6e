//! Shared test helpers for session tests.

use async_trait::async_trait;
use docchat_core::error::ProviderError;
use docchat_core::provider::{
    EmbeddingProvider, GenerationProvider, GenerationStream, StreamChunk,
};
use std::sync::Mutex;
use std::time::Duration;

/// A mock generator that returns a sequence of scripted answers.
///
/// Each call to `generate` returns the next answer in the queue.
/// Panics if more calls are made than answers provided.
pub struct SequentialMockGenerator {
    answers: Vec<String>,
    prompts: Mutex<Vec<String>>,
}

impl SequentialMockGenerator {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn single(answer: &str) -> Self {
        Self::new(&[answer])
    }

    /// Every prompt received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for SequentialMockGenerator {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        let call = prompts.len();
        prompts.push(prompt.to_string());
        match self.answers.get(call) {
            Some(answer) => Ok(answer.clone()),
            None => panic!(
                "SequentialMockGenerator: no more answers (call #{}, have {})",
                call + 1,
                self.answers.len()
            ),
        }
    }
}

/// Always fails with the given error.
pub struct FailingGenerator(pub ProviderError);

#[async_trait]
impl GenerationProvider for FailingGenerator {
    fn name(&self) -> &str {
        "failing_mock"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Err(self.0.clone())
    }
}

/// Streams scripted fragments with a pause between each one.
pub struct SlowStreamGenerator {
    fragments: Vec<String>,
    delay: Duration,
    fail_after: Option<usize>,
}

impl SlowStreamGenerator {
    pub fn new(fragments: &[&str], delay: Duration) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            delay,
            fail_after: None,
        }
    }

    /// Emit a stream error after `n` fragments.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }
}

#[async_trait]
impl GenerationProvider for SlowStreamGenerator {
    fn name(&self) -> &str {
        "slow_stream_mock"
    }

    async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
        Ok(self.fragments.concat())
    }

    async fn generate_stream(&self, _prompt: &str) -> Result<GenerationStream, ProviderError> {
        let (tx, rx) = tokio::sync::mpsc::channel(4);
        let fragments = self.fragments.clone();
        let delay = self.delay;
        let fail_after = self.fail_after;

        tokio::spawn(async move {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if fail_after == Some(i) {
                    let _ = tx
                        .send(Err(ProviderError::StreamInterrupted("connection reset".into())))
                        .await;
                    return;
                }
                if tx.send(Ok(StreamChunk::text(fragment))).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
            }
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        });

        Ok(rx)
    }
}

/// Embeds text by counting a fixed vocabulary of keywords.
pub struct KeywordEmbedder {
    vocabulary: Vec<&'static str>,
    fail: Mutex<bool>,
}

impl KeywordEmbedder {
    pub fn new(vocabulary: &[&'static str]) -> Self {
        Self {
            vocabulary: vocabulary.to_vec(),
            fail: Mutex::new(false),
        }
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword_mock"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if *self.fail.lock().unwrap() {
            return Err(ProviderError::Network("embedding backend offline".into()));
        }
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                self.vocabulary
                    .iter()
                    .map(|w| lower.matches(w).count() as f32)
                    .collect()
            })
            .collect())
    }
}
