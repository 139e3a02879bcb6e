//! Generation fallback: ordered retry chain with per-provider timeouts.
//!
//! When a generator fails (timeout, rate limit, error), the next one in the
//! configured chain is tried. Streams fall back only until a provider hands
//! back a receiver; errors after that surface on the stream itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docchat_core::error::ProviderError;
use docchat_core::provider::{GenerationProvider, GenerationStream};
use tracing::{debug, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Tries each wrapped generator in order until one answers.
pub struct FallbackGenerator {
    name: String,
    links: Vec<Link>,
}

struct Link {
    generator: Arc<dyn GenerationProvider>,
    timeout: Duration,
}

impl FallbackGenerator {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            links: Vec::new(),
        }
    }

    /// Append `generator`, giving it `timeout` to respond.
    pub fn add(mut self, generator: Arc<dyn GenerationProvider>, timeout: Duration) -> Self {
        self.links.push(Link { generator, timeout });
        self
    }

    /// Append `generator` with a 120s timeout.
    pub fn add_default(self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.add(generator, DEFAULT_TIMEOUT)
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Run `call` against each link in turn; the last failure is returned
    /// when every link fails.
    async fn first_success<'a, T, F, Fut>(&'a self, mode: &'static str, call: F) -> Result<T, ProviderError>
    where
        F: Fn(&'a dyn GenerationProvider) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut last_error = ProviderError::Unavailable("fallback chain is empty".into());

        for (attempt, link) in self.links.iter().enumerate() {
            let generator = link.generator.as_ref();
            debug!(
                chain = %self.name,
                provider = generator.name(),
                attempt = attempt + 1,
                of = self.links.len(),
                mode,
                "Trying generator"
            );

            last_error = match tokio::time::timeout(link.timeout, call(generator)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => e,
                Err(_) => ProviderError::Timeout(format!(
                    "{} did not respond within {}s",
                    generator.name(),
                    link.timeout.as_secs()
                )),
            };
            warn!(
                chain = %self.name,
                provider = generator.name(),
                mode,
                error = %last_error,
                remaining = self.links.len() - attempt - 1,
                "Generator failed"
            );
        }

        Err(last_error)
    }
}

#[async_trait]
impl GenerationProvider for FallbackGenerator {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        self.first_success("full", |g| g.generate(prompt)).await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<GenerationStream, ProviderError> {
        self.first_success("stream", |g| g.generate_stream(prompt)).await
    }

    /// Healthy when any link is.
    async fn health_check(&self) -> Result<bool, ProviderError> {
        for link in &self.links {
            if matches!(link.generator.health_check().await, Ok(true)) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
