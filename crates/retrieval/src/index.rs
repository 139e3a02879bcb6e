//! In-memory vector index built from chunk embeddings.
//!
//! The index holds one immutable [`IndexSnapshot`] behind an `Arc`. Builds
//! embed into a fresh snapshot and swap it in only after every vector has
//! been produced and validated, so readers observe either the old snapshot
//! or the new one and never a mix. A failed build leaves the previous
//! snapshot (and readiness) untouched.

use std::sync::{Arc, PoisonError, RwLock};

use docchat_core::document::Chunk;
use docchat_core::error::IndexError;
use docchat_core::provider::EmbeddingProvider;
use tracing::{debug, info, warn};

/// Aligned chunks and embeddings: `embeddings[i]` is the vector of `chunks[i]`.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    chunks: Vec<Chunk>,
    embeddings: Vec<Vec<f32>>,
    dimension: usize,
}

impl IndexSnapshot {
    /// Pair chunks with their vectors, checking alignment and dimension.
    pub fn new(chunks: Vec<Chunk>, embeddings: Vec<Vec<f32>>) -> Result<Self, IndexError> {
        if chunks.len() != embeddings.len() {
            return Err(IndexError::BatchMismatch {
                expected: chunks.len(),
                got: embeddings.len(),
            });
        }
        let dimension = embeddings.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = embeddings.iter().find(|v| v.len() != dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                got: bad.len(),
            });
        }
        Ok(Self {
            chunks,
            embeddings,
            dimension,
        })
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    /// Vector length shared by every embedding; 0 when empty.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// The current searchable snapshot plus a readiness flag.
pub struct VectorIndex {
    state: RwLock<IndexState>,
}

struct IndexState {
    snapshot: Arc<IndexSnapshot>,
    ready: bool,
}

impl Default for VectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VectorIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState {
                snapshot: Arc::new(IndexSnapshot::default()),
                ready: false,
            }),
        }
    }

    /// True once a build has swapped in a non-empty snapshot.
    pub fn is_ready(&self) -> bool {
        self.read_state(|s| s.ready)
    }

    /// The snapshot readers should search. Cheap to clone and unaffected by
    /// later swaps.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.read_state(|s| Arc::clone(&s.snapshot))
    }

    pub fn len(&self) -> usize {
        self.read_state(|s| s.snapshot.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace the whole index with embeddings of `chunks`.
    ///
    /// All chunks are embedded in a single batch call.
    pub async fn rebuild(
        &self,
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<(), IndexError> {
        let count = chunks.len();
        let embeddings = match embed_chunks(&chunks, embedder).await {
            Ok(e) => e,
            Err(e) => {
                warn!(provider = embedder.name(), chunks = count, error = %e, "Index rebuild failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let snapshot = IndexSnapshot::new(chunks, embeddings)?;
        self.swap(snapshot);
        info!(provider = embedder.name(), chunks = count, "Index rebuilt");
        Ok(())
    }

    /// Embed only `new_chunks` and append them to the current snapshot.
    ///
    /// Fails with [`IndexError::DimensionMismatch`] when the new vectors do
    /// not match the existing ones.
    pub async fn extend(
        &self,
        new_chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<(), IndexError> {
        if new_chunks.is_empty() {
            return Ok(());
        }
        let count = new_chunks.len();
        let new_embeddings = match embed_chunks(&new_chunks, embedder).await {
            Ok(e) => e,
            Err(e) => {
                warn!(provider = embedder.name(), chunks = count, error = %e, "Index extend failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let current = self.snapshot();
        let mut chunks = current.chunks.clone();
        let mut embeddings = current.embeddings.clone();
        chunks.extend(new_chunks);
        embeddings.extend(new_embeddings);

        let snapshot = IndexSnapshot::new(chunks, embeddings)?;
        self.swap(snapshot);
        debug!(added = count, total = self.len(), "Index extended");
        Ok(())
    }

    /// Drop every entry whose chunk fails `keep`, without re-embedding.
    pub fn retain_documents<F>(&self, keep: F)
    where
        F: Fn(&Chunk) -> bool,
    {
        let current = self.snapshot();
        let (chunks, embeddings): (Vec<_>, Vec<_>) = current
            .chunks
            .iter()
            .zip(current.embeddings.iter())
            .filter(|(chunk, _)| keep(chunk))
            .map(|(c, e)| (c.clone(), e.clone()))
            .unzip();

        let removed = current.len() - chunks.len();
        if removed == 0 {
            return;
        }
        let dimension = if chunks.is_empty() { 0 } else { current.dimension };
        self.swap(IndexSnapshot {
            chunks,
            embeddings,
            dimension,
        });
        debug!(removed, total = self.len(), "Index entries removed");
    }

    fn swap(&self, snapshot: IndexSnapshot) {
        let ready = !snapshot.is_empty();
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.snapshot = Arc::new(snapshot);
        state.ready = ready;
    }

    fn read_state<T>(&self, f: impl FnOnce(&IndexState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }
}

/// Embed chunk contents in one batch and check the response shape.
async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
) -> Result<Vec<Vec<f32>>, IndexError> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }
    let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embedder
        .embed(&texts)
        .await
        .map_err(|e| IndexError::EmbeddingFailed(e.to_string()))?;

    if embeddings.len() != texts.len() {
        return Err(IndexError::BatchMismatch {
            expected: texts.len(),
            got: embeddings.len(),
        });
    }
    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{KeywordEmbedder, ShortBatchEmbedder};

    fn chunks(doc: &str, texts: &[&str]) -> Vec<Chunk> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new(doc, i, *t))
            .collect()
    }

    #[tokio::test]
    async fn new_index_is_empty_and_not_ready() {
        let index = VectorIndex::new();
        assert!(!index.is_ready());
        assert!(index.is_empty());
        assert_eq!(index.snapshot().dimension(), 0);
    }

    #[tokio::test]
    async fn rebuild_embeds_in_one_batch() {
        let embedder = KeywordEmbedder::new(vec!["refund", "shipping"]);
        let index = VectorIndex::new();

        index
            .rebuild(
                chunks("policy", &["refund policy", "shipping times", "refund window"]),
                &embedder,
            )
            .await
            .unwrap();

        assert!(index.is_ready());
        assert_eq!(index.len(), 3);
        assert_eq!(embedder.calls(), vec![3]);

        let snapshot = index.snapshot();
        assert_eq!(snapshot.dimension(), 2);
        assert_eq!(snapshot.embeddings()[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_previous_snapshot() {
        let embedder = KeywordEmbedder::new(vec!["refund"]);
        let index = VectorIndex::new();
        index
            .rebuild(chunks("a", &["refund one", "refund two"]), &embedder)
            .await
            .unwrap();
        let before = index.snapshot();

        embedder.set_failing(true);
        let err = index
            .rebuild(chunks("b", &["other text"]), &embedder)
            .await
            .unwrap_err();

        assert!(matches!(err, IndexError::EmbeddingFailed(_)));
        assert!(index.is_ready());
        assert!(Arc::ptr_eq(&before, &index.snapshot()));
    }

    #[tokio::test]
    async fn short_batch_is_rejected() {
        let index = VectorIndex::new();
        let err = index
            .rebuild(chunks("a", &["one", "two", "three"]), &ShortBatchEmbedder)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::BatchMismatch {
                expected: 3,
                got: 1
            }
        ));
        assert!(!index.is_ready());
    }

    #[tokio::test]
    async fn rebuild_with_no_chunks_clears_readiness() {
        let embedder = KeywordEmbedder::new(vec!["x"]);
        let index = VectorIndex::new();
        index.rebuild(chunks("a", &["x"]), &embedder).await.unwrap();
        assert!(index.is_ready());

        index.rebuild(Vec::new(), &embedder).await.unwrap();
        assert!(!index.is_ready());
        assert!(embedder.calls() == vec![1]);
    }

    #[tokio::test]
    async fn extend_embeds_only_new_chunks() {
        let embedder = KeywordEmbedder::new(vec!["refund", "shipping"]);
        let index = VectorIndex::new();
        index
            .rebuild(chunks("a", &["refund", "shipping"]), &embedder)
            .await
            .unwrap();
        index
            .extend(chunks("b", &["shipping refund"]), &embedder)
            .await
            .unwrap();

        assert_eq!(embedder.calls(), vec![2, 1]);
        let snapshot = index.snapshot();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.chunks()[2].document_name, "b");
        assert_eq!(snapshot.embeddings()[2], vec![1.0, 1.0]);
    }

    #[tokio::test]
    async fn extend_rejects_dimension_change() {
        let index = VectorIndex::new();
        index
            .rebuild(
                chunks("a", &["refund"]),
                &KeywordEmbedder::new(vec!["refund", "shipping"]),
            )
            .await
            .unwrap();

        let err = index
            .extend(
                chunks("b", &["refund"]),
                &KeywordEmbedder::new(vec!["refund"]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
        assert_eq!(index.len(), 1);
    }

    #[tokio::test]
    async fn retain_documents_drops_entries_without_embedding() {
        let embedder = KeywordEmbedder::new(vec!["refund"]);
        let index = VectorIndex::new();
        let mut all = chunks("a", &["refund a"]);
        all.extend(chunks("b", &["refund b", "refund b2"]));
        index.rebuild(all, &embedder).await.unwrap();

        index.retain_documents(|c| c.document_name != "b");
        assert_eq!(index.len(), 1);
        assert!(index.is_ready());
        assert_eq!(embedder.calls(), vec![3]);

        index.retain_documents(|_| false);
        assert!(!index.is_ready());
        assert_eq!(index.snapshot().dimension(), 0);
    }

    #[test]
    fn snapshot_rejects_misaligned_input() {
        let err = IndexSnapshot::new(chunks("a", &["x", "y"]), vec![vec![1.0]]).unwrap_err();
        assert!(matches!(err, IndexError::BatchMismatch { .. }));

        let err = IndexSnapshot::new(chunks("a", &["x", "y"]), vec![vec![1.0], vec![1.0, 2.0]])
            .unwrap_err();
        assert!(matches!(err, IndexError::DimensionMismatch { .. }));
    }
}
