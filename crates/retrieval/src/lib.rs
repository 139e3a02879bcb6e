//! Retrieval pipeline for docchat.
//!
//! - [`chunker`] splits documents into overlapping, bounded chunks
//! - [`similarity`] scores vectors by cosine similarity
//! - [`index`] holds chunk/embedding snapshots that are swapped whole
//! - [`retriever`] embeds a query and ranks the current snapshot
//! - [`knowledge`] owns the document set and keeps the index in step with it

pub mod chunker;
pub mod index;
pub mod knowledge;
pub mod retriever;
pub mod similarity;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use chunker::Chunker;
pub use index::{IndexSnapshot, VectorIndex};
pub use knowledge::KnowledgeBase;
pub use retriever::Retriever;
pub use similarity::cosine_similarity;
