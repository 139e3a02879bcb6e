//! Embedding and generation provider implementations for docchat.
//!
//! Embedders implement `docchat_core::EmbeddingProvider`; generators
//! implement `docchat_core::GenerationProvider`. The router builds both
//! from configuration.

pub mod fallback;
pub mod hashing;
pub mod openai_compat;
pub mod router;

pub use fallback::FallbackGenerator;
pub use hashing::HashingEmbedder;
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderSet, build_from_config};
