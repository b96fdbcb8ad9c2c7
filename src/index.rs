//! Per-document in-memory vector index.
//!
//! Brute-force cosine similarity over the document's chunk vectors. The
//! index is owned by its document's store entry and lives exactly as long as
//! the document — scoping a query to one document is structural, not a
//! filter, so results can never leak across documents sharing a session.

use crate::embedding::cosine_similarity;
use crate::models::RetrievalResult;

/// Nearest-neighbor index over one document's chunk vectors.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    dims: usize,
    entries: Vec<(usize, Vec<f32>)>,
}

impl VectorIndex {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            entries: Vec::new(),
        }
    }

    /// Add a chunk's vector. Vectors of the wrong width are rejected —
    /// the dimension is fixed per session.
    pub fn add(&mut self, chunk_index: usize, vector: Vec<f32>) {
        if vector.len() != self.dims {
            tracing::warn!(
                chunk_index,
                expected = self.dims,
                got = vector.len(),
                "dropping vector with wrong dimension"
            );
            return;
        }
        self.entries.push((chunk_index, vector));
    }

    /// Top-`k` entries by descending cosine similarity to `query`.
    ///
    /// `k` is clamped to the number of stored vectors; asking for more than
    /// exist returns all of them. Ties break on ascending chunk index so
    /// results are deterministic.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<RetrievalResult> {
        let mut results: Vec<RetrievalResult> = self
            .entries
            .iter()
            .map(|(chunk_index, vector)| RetrievalResult {
                chunk_index: *chunk_index,
                score: cosine_similarity(query, vector),
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.chunk_index.cmp(&b.chunk_index))
        });
        results.truncate(k.min(results.len()));
        results
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
