//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/v1/embeddings` and `/v1/chat/completions`.
//!
//! Supports:
//! - Batched embeddings
//! - Chat completions (non-streaming and streaming SSE)
//! - Health checks

use std::time::Duration;

use async_trait::async_trait;
use docchat_core::error::ProviderError;
use docchat_core::provider::{
    EmbeddingProvider, GenerationProvider, GenerationStream, StreamChunk, Usage,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

/// A provider speaking the OpenAI HTTP API.
///
/// One instance serves both embeddings and generation; each side uses its
/// own model name.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    chat_model: String,
    embedding_model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chat_model: "gpt-4o-mini".into(),
            embedding_model: "text-embedding-3-small".into(),
            temperature: 0.7,
            max_tokens: None,
            client,
        })
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Self::new(
            "openrouter",
            "https://openrouter.ai/api/v1",
            api_key,
            Duration::from_secs(120),
        )
    }

    /// Create an Ollama provider (convenience constructor).
    pub fn ollama(base_url: Option<&str>) -> Result<Self, ProviderError> {
        Self::new(
            "ollama",
            base_url.unwrap_or("http://localhost:11434/v1"),
            "ollama", // Ollama doesn't need a real key
            Duration::from_secs(300),
        )
    }

    pub fn with_chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = model.into();
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The prompt goes out as a single user message.
    fn chat_body(&self, prompt: &str, stream: bool) -> serde_json::Value {
        let message = ApiMessage {
            role: "user".into(),
            content: Some(prompt.to_string()),
        };
        let mut body = serde_json::json!({
            "model": self.chat_model,
            "messages": [message],
            "temperature": self.temperature,
            "stream": stream,
        });
        if stream {
            body["stream_options"] = serde_json::json!({ "include_usage": true });
        }
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
        accept_sse: bool,
    ) -> Result<reqwest::Response, ProviderError> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json");
        if accept_sse {
            request = request.header("Accept", "text/event-stream");
        }

        let response = request.json(body).send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout(e.to_string())
            } else {
                ProviderError::Network(e.to_string())
            }
        })?;

        check_status(response).await
    }
}

/// Map non-success statuses onto provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status != 200 {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.embedding_model,
            "input": texts,
            "encoding_format": "float",
        });

        debug!(
            provider = %self.name,
            model = %self.embedding_model,
            count = texts.len(),
            "Sending embedding request"
        );

        let response = self.post("/embeddings", &body, false).await?;
        let api_resp: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("embedding response: {e}")))?;

        if let Some(usage) = &api_resp.usage {
            trace!(provider = %self.name, tokens = usage.total_tokens, "Embedding usage");
        }

        Ok(into_ordered_vectors(api_resp.data))
    }
}

#[async_trait]
impl GenerationProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let body = self.chat_body(prompt, false);
        debug!(provider = %self.name, model = %self.chat_model, "Sending completion request");

        let response = self.post("/chat/completions", &body, false).await?;
        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("completion response: {e}")))?;

        if let Some(usage) = &api_response.usage {
            debug!(
                provider = %self.name,
                model = %api_response.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Completion finished"
            );
        }

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".into()))?;

        Ok(choice.message.content.unwrap_or_default())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<GenerationStream, ProviderError> {
        let body = self.chat_body(prompt, true);
        debug!(provider = %self.name, model = %self.chat_model, "Sending streaming request");

        let response = self.post("/chat/completions", &body, true).await?;

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.name.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer: Vec<u8> = Vec::new();

            while let Some(chunk_result) = byte_stream.next().await {
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx
                            .send(Err(ProviderError::StreamInterrupted(e.to_string())))
                            .await;
                        return;
                    }
                };

                buffer.extend_from_slice(&bytes);

                // Process complete lines
                while let Some(line) = take_line(&mut buffer) {
                    match parse_sse_line(&line) {
                        SseLine::Skip => {}
                        SseLine::Done => {
                            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
                            return;
                        }
                        SseLine::Delta(text) => {
                            if tx.send(Ok(StreamChunk::text(text))).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                        SseLine::Usage(usage) => {
                            let _ = tx.send(Ok(StreamChunk::finished(Some(usage)))).await;
                            return;
                        }
                        SseLine::Unparseable(data) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(Ok(StreamChunk::finished(None))).await;
        });

        Ok(rx)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// --- SSE line parsing ---

#[derive(Debug, PartialEq)]
enum SseLine {
    /// Blank line, comment, or a chunk with nothing to forward.
    Skip,
    Done,
    Delta(String),
    Usage(Usage),
    Unparseable(String),
}

/// Pop the next complete line off `buffer`.
///
/// Lines are split on raw bytes so a character cut across two network
/// frames is only decoded once both halves have arrived.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let line_end = buffer.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=line_end).collect();
    line.pop();
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    Some(match String::from_utf8(line) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

fn parse_sse_line(line: &str) -> SseLine {
    if line.is_empty() || line.starts_with(':') {
        return SseLine::Skip;
    }
    let Some(data) = line.strip_prefix("data:") else {
        return SseLine::Skip;
    };
    let data = data.trim();
    if data == "[DONE]" {
        return SseLine::Done;
    }

    match serde_json::from_str::<StreamResponse>(data) {
        Ok(stream_resp) => {
            if let Some(usage) = stream_resp.usage {
                return SseLine::Usage(usage.into());
            }
            match stream_resp
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
            {
                Some(content) if !content.is_empty() => SseLine::Delta(content),
                _ => SseLine::Skip,
            }
        }
        Err(_) => SseLine::Unparseable(data.to_string()),
    }
}

/// Order vectors by the `index` the API reports, not by arrival order.
fn into_ordered_vectors(mut data: Vec<EmbeddingData>) -> Vec<Vec<f32>> {
    data.sort_by_key(|d| d.index);
    data.into_iter().map(|d| d.embedding).collect()
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl From<ApiUsage> for Usage {
    fn from(u: ApiUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        }
    }
}

// --- Embedding API types ---

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
    #[serde(default)]
    usage: Option<EmbeddingApiUsage>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiUsage {
    total_tokens: u32,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
