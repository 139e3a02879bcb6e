//! Document, chunk, and retrieval-result value objects.
//!
//! These flow through the whole pipeline:
//! document text → chunks → index snapshot → retrieval results → context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A source document held by the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier (usually the file name).
    pub name: String,

    /// Full extracted text.
    pub content: String,

    /// When the document was ingested.
    pub added_at: DateTime<Utc>,
}

impl Document {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            added_at: Utc::now(),
        }
    }

    /// The first `max_chars` characters of the content, never splitting a
    /// character. Returns the whole content when it is shorter.
    pub fn excerpt(&self, max_chars: usize) -> &str {
        match self.content.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &self.content[..byte_idx],
            None => &self.content,
        }
    }
}

/// A bounded, trimmed slice of a document: the unit of retrieval.
///
/// Chunks are created once at ingestion and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique per (document, ordinal).
    pub id: String,

    /// Owning document.
    pub document_name: String,

    /// Non-empty, trimmed text.
    pub content: String,

    /// Zero-based position within the owning document.
    pub chunk_index: usize,
}

impl Chunk {
    pub fn new(document_name: &str, chunk_index: usize, content: impl Into<String>) -> Self {
        Self {
            id: format!("{document_name}#chunk_{chunk_index}"),
            document_name: document_name.to_string(),
            content: content.into(),
            chunk_index,
        }
    }
}

/// A chunk matched against a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The matched chunk.
    pub chunk: Chunk,

    /// Cosine similarity in [-1, 1].
    pub similarity: f32,

    /// Position in the index snapshot's aligned chunk/embedding arrays.
    pub index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_combines_document_and_ordinal() {
        let chunk = Chunk::new("policy.txt", 2, "Refunds take five days");
        assert_eq!(chunk.id, "policy.txt#chunk_2");
        assert_eq!(chunk.chunk_index, 2);
    }

    #[test]
    fn excerpt_respects_char_boundaries() {
        let doc = Document::new("notes", "héllo wörld");
        assert_eq!(doc.excerpt(4), "héll");
        assert_eq!(doc.excerpt(100), "héllo wörld");
        assert_eq!(doc.excerpt(0), "");
    }
}
