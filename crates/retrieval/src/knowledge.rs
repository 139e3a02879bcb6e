//! The document set and the index built from it.
//!
//! Documents are kept even when indexing fails, so a later successful
//! build (or the excerpt fallback) can still use them.

use docchat_core::document::{Chunk, Document};
use docchat_core::error::IndexError;
use docchat_core::provider::EmbeddingProvider;
use tracing::{debug, info};

use crate::chunker::Chunker;
use crate::index::VectorIndex;

pub struct KnowledgeBase {
    documents: Vec<Document>,
    chunker: Chunker,
    index: VectorIndex,
    /// Set when the index no longer reflects `documents`.
    pending: bool,
}

impl KnowledgeBase {
    pub fn new(chunker: Chunker) -> Self {
        Self {
            documents: Vec::new(),
            chunker,
            index: VectorIndex::new(),
            pending: false,
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// True when documents were added or removed since the last successful build.
    pub fn needs_reindex(&self) -> bool {
        self.pending
    }

    /// Store `document` (replacing one with the same name) and return its chunks.
    ///
    /// Does not touch the index.
    pub fn insert_document(&mut self, document: Document) -> Vec<Chunk> {
        let chunks = self.chunker.chunk(&document.content, &document.name);
        let replaced = self.remove_entry(&document.name);
        if replaced {
            debug!(document = %document.name, "Replacing existing document");
        }
        self.documents.push(document);
        self.pending = true;
        chunks
    }

    /// Store `document` and index it.
    ///
    /// Only the new chunks are embedded when the index is current. After a
    /// replacement or an earlier failure the whole set is rebuilt. Returns
    /// the number of chunks the document produced.
    pub async fn add_document(
        &mut self,
        document: Document,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<usize, IndexError> {
        let name = document.name.clone();
        let was_current = !self.pending;
        let replaced = self.documents.iter().any(|d| d.name == name);
        let chunks = self.insert_document(document);
        let count = chunks.len();

        if was_current && !replaced {
            self.index.extend(chunks, embedder).await?;
            self.pending = false;
        } else {
            self.reindex(embedder).await?;
        }

        info!(document = %name, chunks = count, total = self.index.len(), "Document indexed");
        Ok(count)
    }

    /// Rebuild the index from every stored document.
    pub async fn reindex(&mut self, embedder: &dyn EmbeddingProvider) -> Result<(), IndexError> {
        let chunks = self.all_chunks();
        self.index.rebuild(chunks, embedder).await?;
        self.pending = false;
        Ok(())
    }

    /// Remove a document and its index entries. Returns false when unknown.
    pub fn remove_document(&mut self, name: &str) -> bool {
        if !self.remove_entry(name) {
            return false;
        }
        self.index.retain_documents(|c| c.document_name != name);
        info!(document = %name, remaining = self.documents.len(), "Document removed");
        true
    }

    /// Chunks of every stored document, in insertion order.
    pub fn all_chunks(&self) -> Vec<Chunk> {
        self.documents
            .iter()
            .flat_map(|d| self.chunker.chunk(&d.content, &d.name))
            .collect()
    }

    /// Leading excerpts of every document, used when retrieval finds too
    /// little context.
    ///
    /// Each block reads `Document: {name}\nContent: {excerpt}...`; blocks
    /// are separated by a blank line. Empty when there are no documents.
    pub fn fallback_text(&self, excerpt_chars: usize) -> String {
        self.documents
            .iter()
            .map(|d| format!("Document: {}\nContent: {}...", d.name, d.excerpt(excerpt_chars)))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn remove_entry(&mut self, name: &str) -> bool {
        let before = self.documents.len();
        self.documents.retain(|d| d.name != name);
        self.documents.len() != before
    }
}
