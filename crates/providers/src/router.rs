//! Provider construction from configuration.
//!
//! A provider that cannot be built (unknown name, missing key, "none")
//! comes back as `None`; the chat session treats that as unavailable.

use std::sync::Arc;
use std::time::Duration;

use docchat_config::AppConfig;
use docchat_core::provider::{EmbeddingProvider, GenerationProvider};
use tracing::{info, warn};

use crate::fallback::FallbackGenerator;
use crate::hashing::HashingEmbedder;
use crate::openai_compat::OpenAiCompatProvider;

/// The collaborators a chat session is built from.
#[derive(Clone, Default)]
pub struct ProviderSet {
    pub embedder: Option<Arc<dyn EmbeddingProvider>>,
    pub generator: Option<Arc<dyn GenerationProvider>>,
}

/// Build the embedding and generation providers named in `config`.
pub fn build_from_config(config: &AppConfig) -> ProviderSet {
    ProviderSet {
        embedder: build_embedder(config),
        generator: build_generator(config),
    }
}

/// Resolve `config.embedding.provider`.
pub fn build_embedder(config: &AppConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    let name = config.embedding.provider.as_str();
    match name {
        "none" | "" => None,
        "hashing" => match HashingEmbedder::new(config.embedding.dimensions) {
            Ok(embedder) => Some(Arc::new(embedder)),
            Err(e) => {
                warn!(error = %e, "Hashing embedder unavailable");
                None
            }
        },
        _ => {
            let provider = remote_provider(config, name)?
                .with_embedding_model(&config.embedding.model);
            info!(provider = %name, model = %config.embedding.model, "Embedding provider ready");
            Some(Arc::new(provider))
        }
    }
}

/// Resolve `config.generation.provider` plus its fallbacks.
///
/// A single usable provider is returned as-is; several are wrapped in a
/// [`FallbackGenerator`] in configuration order.
pub fn build_generator(config: &AppConfig) -> Option<Arc<dyn GenerationProvider>> {
    let timeout = Duration::from_secs(config.generation.timeout_secs);
    let names = std::iter::once(&config.generation.provider).chain(&config.generation.fallbacks);

    let mut chain: Vec<Arc<dyn GenerationProvider>> = Vec::new();
    for name in names {
        if name == "none" || name.is_empty() {
            continue;
        }
        let Some(provider) = remote_provider(config, name) else {
            continue;
        };
        let provider = provider
            .with_chat_model(&config.generation.model)
            .with_temperature(config.generation.temperature)
            .with_max_tokens(config.generation.max_tokens);
        chain.push(Arc::new(provider));
    }

    match chain.len() {
        0 => {
            warn!("No generation provider available");
            None
        }
        1 => chain.pop(),
        n => {
            info!(providers = n, "Generation fallback chain ready");
            let fallback = chain
                .into_iter()
                .fold(FallbackGenerator::new("fallback"), |f, p| f.add(p, timeout));
            Some(Arc::new(fallback))
        }
    }
}

/// An OpenAI-compatible client for a named provider, or `None` when it
/// needs a key and none is configured.
fn remote_provider(config: &AppConfig, name: &str) -> Option<OpenAiCompatProvider> {
    let api_key = config.api_key_for(name);
    if api_key.is_none() && !is_local(name) {
        warn!(provider = %name, "No API key configured, provider unavailable");
        return None;
    }

    let base_url = config
        .api_url_for(name)
        .unwrap_or_else(|| default_base_url(name));
    let timeout = Duration::from_secs(config.generation.timeout_secs);

    match OpenAiCompatProvider::new(name, base_url, api_key.unwrap_or_default(), timeout) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(provider = %name, error = %e, "Failed to build provider");
            None
        }
    }
}

/// Providers served from the local machine, which take no key.
fn is_local(provider_name: &str) -> bool {
    matches!(provider_name, "ollama" | "vllm" | "llamacpp" | "llama.cpp")
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "fireworks" => "https://api.fireworks.ai/inference/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_config::ProviderConfig;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn default_config_has_offline_embedder_only() {
        let config = AppConfig::default();
        let set = build_from_config(&config);

        let embedder = set.embedder.unwrap();
        assert_eq!(embedder.name(), "hashing");
        // openai without a key is unavailable
        assert!(set.generator.is_none());
    }

    #[test]
    fn api_key_enables_generator() {
        let config = AppConfig {
            api_key: Some("sk-test".into()),
            ..Default::default()
        };
        let generator = build_generator(&config).unwrap();
        assert_eq!(generator.name(), "openai");
    }

    #[test]
    fn local_provider_needs_no_key() {
        let mut config = AppConfig::default();
        config.generation.provider = "ollama".into();
        assert_eq!(build_generator(&config).unwrap().name(), "ollama");
    }

    #[test]
    fn fallbacks_build_a_chain() {
        let mut config = AppConfig::default();
        config.generation.provider = "openai".into();
        config.generation.fallbacks = vec!["ollama".into(), "vllm".into()];
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-test".into()),
                api_url: None,
            },
        );

        let generator = build_generator(&config).unwrap();
        assert_eq!(generator.name(), "fallback");
    }

    #[test]
    fn none_disables_providers() {
        let mut config = AppConfig::default();
        config.embedding.provider = "none".into();
        config.generation.provider = "none".into();
        let set = build_from_config(&config);
        assert!(set.embedder.is_none());
        assert!(set.generator.is_none());
    }

    #[test]
    fn remote_embedder_uses_provider_url() {
        let mut config = AppConfig::default();
        config.embedding.provider = "local-embed".into();
        config.providers.insert(
            "local-embed".into(),
            ProviderConfig {
                api_key: Some("key".into()),
                api_url: Some("http://localhost:9999/v1".into()),
            },
        );
        assert_eq!(build_embedder(&config).unwrap().name(), "local-embed");
    }
}
