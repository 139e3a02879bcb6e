//! Query-time ranking over the current index snapshot.

use std::sync::Arc;

use docchat_core::document::RetrievalResult;
use docchat_core::provider::EmbeddingProvider;
use tracing::{debug, warn};

use crate::index::{IndexSnapshot, VectorIndex};
use crate::similarity::{compare_scores, cosine_similarity};

/// Similarity reported for entries whose score is undefined.
pub const UNDEFINED_SIMILARITY: f32 = -1.0;

/// Embeds queries and ranks chunks by cosine similarity.
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { embedder }
    }

    /// Return up to `top_k` chunks most similar to `query`, best first.
    ///
    /// Never fails: an unready index or an embedding failure yields an
    /// empty list. A `top_k` of zero and a query that is empty or only
    /// whitespace also return empty, without calling the embedder.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        index: &VectorIndex,
    ) -> Vec<RetrievalResult> {
        if top_k == 0 || query.trim().is_empty() || !index.is_ready() {
            return Vec::new();
        }
        let snapshot = index.snapshot();

        let query_vec = match self.embedder.embed(&[query.to_string()]).await {
            Ok(mut vectors) if vectors.len() == 1 => vectors.remove(0),
            Ok(vectors) => {
                warn!(
                    provider = self.embedder.name(),
                    got = vectors.len(),
                    "Query embedding returned unexpected batch size"
                );
                return Vec::new();
            }
            Err(e) => {
                warn!(provider = self.embedder.name(), error = %e, "Query embedding failed");
                return Vec::new();
            }
        };

        let results = rank(&query_vec, &snapshot, top_k);
        debug!(
            top_k,
            returned = results.len(),
            best = results.first().map(|r| r.similarity),
            "Retrieved chunks"
        );
        results
    }
}

/// Rank every entry of `snapshot` against `query_vec`.
///
/// The sort is stable, so equal scores keep snapshot order. Undefined
/// scores rank after every defined one.
pub fn rank(query_vec: &[f32], snapshot: &IndexSnapshot, top_k: usize) -> Vec<RetrievalResult> {
    let mut scored: Vec<(usize, Option<f32>)> = snapshot
        .embeddings()
        .iter()
        .enumerate()
        .map(|(i, emb)| (i, cosine_similarity(query_vec, emb)))
        .collect();

    scored.sort_by(|a, b| compare_scores(a.1, b.1));

    scored
        .into_iter()
        .take(top_k)
        .map(|(index, score)| RetrievalResult {
            chunk: snapshot.chunks()[index].clone(),
            similarity: score.unwrap_or(UNDEFINED_SIMILARITY),
            index,
        })
        .collect()
}
