//! # docchat Core
//!
//! Domain types, provider traits, and error definitions for docchat.
//! This crate has **no runtime framework dependencies**; it defines the
//! model that the retrieval, provider, and agent crates build on.
//!
//! ## Design Philosophy
//!
//! The embedding model and the generative model are external collaborators.
//! Both are expressed as traits here and injected by the caller, so the
//! retrieval pipeline never looks up a global model and tests can swap in
//! scripted implementations.

pub mod conversation;
pub mod document;
pub mod error;
pub mod provider;

// Re-export key types at crate root for ergonomics
pub use conversation::{ConversationTurn, ConversationWindow};
pub use document::{Chunk, Document, RetrievalResult};
pub use error::{Error, Result};
pub use provider::{EmbeddingProvider, GenerationProvider, StreamChunk};
