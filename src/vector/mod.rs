// Vector index module
// Similarity search over embedded chunks with relevance-score thresholding

pub mod flat;
pub mod relevance;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::embeddings::{Chunk, Embedder};

pub use flat::FlatIndex;
pub use relevance::RelevanceFn;

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.8;
pub const DEFAULT_MAX_RESULTS: usize = 4;

/// A chunk paired with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A query hit
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Relevance in `[0, 1]`, higher is better
    pub score: f32,
}

/// Threshold and optional top-k cut applied to a query
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    pub threshold: f32,
    pub limit: Option<usize>,
}

impl Default for SearchOptions {
    #[inline]
    fn default() -> Self {
        Self {
            threshold: DEFAULT_SCORE_THRESHOLD,
            limit: Some(DEFAULT_MAX_RESULTS),
        }
    }
}

/// An immutable, queryable collection of embedded chunks.
///
/// Indexes are created by [`VectorIndex::build`] or [`VectorIndex::load`] and
/// are never mutated afterwards, so a shared index may be queried from many
/// threads at once.
pub trait VectorIndex: Sized + Send + Sync {
    /// Embed `chunks` and assemble an index. Nothing is returned on failure.
    fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        relevance: RelevanceFn,
    ) -> Result<Self>;

    /// Write the index to the artifact directory at `path`
    fn persist(&self, path: &Path) -> Result<()>;

    /// Read a previously persisted index.
    ///
    /// Fails with `ConfigMismatch` when the artifact was produced with a
    /// different embedding model or relevance function.
    fn load(path: &Path, embedder: Arc<dyn Embedder>, relevance: RelevanceFn) -> Result<Self>;

    /// Chunks scoring at least `score_threshold`, best first
    fn query(&self, text: &str, score_threshold: f32) -> Result<Vec<ScoredChunk>>;

    /// [`VectorIndex::query`] followed by the optional result limit
    #[inline]
    fn search(&self, text: &str, options: &SearchOptions) -> Result<Vec<ScoredChunk>> {
        let mut hits = self.query(text, options.threshold)?;
        if let Some(limit) = options.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }

    fn len(&self) -> usize;

    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
