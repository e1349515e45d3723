#[cfg(test)]
mod tests;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{IndexEntry, RelevanceFn, ScoredChunk, VectorIndex};
use crate::embeddings::{Chunk, Embedder};
use crate::{Result, RetrievalError};

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ENTRIES_FILE: &str = "entries.json";
const FORMAT_VERSION: u32 = 1;
const EMBED_BATCH_SIZE: usize = 32;

/// Metadata stored next to the entries of a persisted index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub model_id: String,
    pub relevance: RelevanceFn,
    pub dimension: usize,
    pub count: usize,
    pub created_at: DateTime<Utc>,
}

/// Exhaustive-search index over L2-normalised vectors
pub struct FlatIndex {
    entries: Vec<IndexEntry>,
    dimension: usize,
    embedder: Arc<dyn Embedder>,
    relevance: RelevanceFn,
    created_at: DateTime<Utc>,
}

impl std::fmt::Debug for FlatIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlatIndex")
            .field("entries", &self.entries.len())
            .field("dimension", &self.dimension)
            .field("model_id", &self.embedder.model_id())
            .field("relevance", &self.relevance)
            .finish()
    }
}

impl FlatIndex {
    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn relevance(&self) -> RelevanceFn {
        self.relevance
    }

    #[inline]
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    #[inline]
    pub fn manifest(&self) -> Manifest {
        Manifest {
            format_version: FORMAT_VERSION,
            model_id: self.embedder.model_id().to_string(),
            relevance: self.relevance,
            dimension: self.dimension,
            count: self.entries.len(),
            created_at: self.created_at,
        }
    }

    /// Read only the manifest of a persisted index
    #[inline]
    pub fn read_manifest(path: &Path) -> Result<Manifest> {
        let content = read_artifact_file(path, MANIFEST_FILE)?;
        serde_json::from_str(&content).map_err(|e| RetrievalError::Load {
            path: path.to_path_buf(),
            message: format!("Corrupt manifest: {}", e),
        })
    }
}

impl VectorIndex for FlatIndex {
    #[inline]
    fn build(
        chunks: Vec<Chunk>,
        embedder: Arc<dyn Embedder>,
        relevance: RelevanceFn,
    ) -> Result<Self> {
        if chunks.is_empty() {
            return Err(RetrievalError::Build(
                "No chunks to index: the corpus is empty".to_string(),
            ));
        }

        info!(
            "Building index from {} chunks with {}",
            chunks.len(),
            embedder.model_id()
        );

        let mut entries = Vec::with_capacity(chunks.len());
        let mut dimension = None;

        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder
                .embed_batch(&texts)
                .map_err(|e| RetrievalError::Build(format!("Embedding failed: {}", e)))?;

            if vectors.len() != batch.len() {
                return Err(RetrievalError::Build(format!(
                    "Embedder returned {} vectors for {} chunks",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (chunk, vector) in batch.iter().zip(vectors) {
                let expected = *dimension.get_or_insert(vector.len());
                if vector.len() != expected || expected == 0 {
                    return Err(RetrievalError::Build(format!(
                        "Inconsistent embedding dimension for chunk {}: expected {}, got {}",
                        chunk.position,
                        expected,
                        vector.len()
                    )));
                }
                if !vector.iter().all(|x| x.is_finite()) {
                    return Err(RetrievalError::Build(format!(
                        "Embedding for chunk {} contains non-finite values",
                        chunk.position
                    )));
                }
                entries.push(IndexEntry {
                    chunk: chunk.clone(),
                    vector: normalize(vector),
                });
            }
            debug!("Embedded {}/{} chunks", entries.len(), chunks.len());
        }

        let dimension = dimension.unwrap_or_default();
        info!(
            "Built index with {} entries of dimension {}",
            entries.len(),
            dimension
        );

        Ok(Self {
            entries,
            dimension,
            embedder,
            relevance,
            created_at: Utc::now(),
        })
    }

    #[inline]
    fn persist(&self, path: &Path) -> Result<()> {
        let persist_err = |message: String| RetrievalError::Persist {
            path: path.to_path_buf(),
            message,
        };

        if path.exists() && !path.is_dir() {
            return Err(persist_err(
                "Artifact path exists and is not a directory".to_string(),
            ));
        }
        fs::create_dir_all(path)
            .map_err(|e| persist_err(format!("Failed to create directory: {}", e)))?;

        let entries = serde_json::to_vec(&self.entries)
            .map_err(|e| persist_err(format!("Failed to serialize entries: {}", e)))?;
        let manifest = serde_json::to_vec_pretty(&self.manifest())
            .map_err(|e| persist_err(format!("Failed to serialize manifest: {}", e)))?;

        // A directory without a manifest never loads: drop the old manifest
        // first and write the new one last
        match fs::remove_file(path.join(MANIFEST_FILE)) {
            Ok(()) => debug!("Invalidated previous manifest in {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(persist_err(format!(
                    "Failed to remove previous manifest: {}",
                    e
                )));
            }
        }
        write_atomically(&path.join(ENTRIES_FILE), &entries).map_err(&persist_err)?;
        write_atomically(&path.join(MANIFEST_FILE), &manifest).map_err(&persist_err)?;

        info!(
            "Persisted {} entries to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    #[inline]
    fn load(path: &Path, embedder: Arc<dyn Embedder>, relevance: RelevanceFn) -> Result<Self> {
        let load_err = |message: String| RetrievalError::Load {
            path: path.to_path_buf(),
            message,
        };

        if !path.is_dir() {
            return Err(load_err("No persisted index at this location".to_string()));
        }

        let manifest = Self::read_manifest(path)?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(load_err(format!(
                "Unsupported format version {}",
                manifest.format_version
            )));
        }
        if manifest.model_id != embedder.model_id() {
            return Err(RetrievalError::ConfigMismatch {
                path: path.to_path_buf(),
                expected: format!("model {}", embedder.model_id()),
                found: format!("model {}", manifest.model_id),
            });
        }
        if manifest.relevance != relevance {
            return Err(RetrievalError::ConfigMismatch {
                path: path.to_path_buf(),
                expected: format!("relevance {}", relevance.describe()),
                found: format!("relevance {}", manifest.relevance.describe()),
            });
        }

        let content = read_artifact_file(path, ENTRIES_FILE)?;
        let entries: Vec<IndexEntry> = serde_json::from_str(&content)
            .map_err(|e| load_err(format!("Corrupt entries: {}", e)))?;

        if entries.len() != manifest.count {
            return Err(load_err(format!(
                "Manifest lists {} entries but {} were found",
                manifest.count,
                entries.len()
            )));
        }
        if let Some(bad) = entries
            .iter()
            .find(|e| e.vector.len() != manifest.dimension)
        {
            return Err(load_err(format!(
                "Entry {} has dimension {}, manifest says {}",
                bad.chunk.position,
                bad.vector.len(),
                manifest.dimension
            )));
        }

        info!(
            "Loaded index with {} entries from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            entries,
            dimension: manifest.dimension,
            embedder,
            relevance,
            created_at: manifest.created_at,
        })
    }

    #[inline]
    fn query(&self, text: &str, score_threshold: f32) -> Result<Vec<ScoredChunk>> {
        let query = self.embedder.embed(text)?;
        if query.len() != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        let query = normalize(query);

        let mut hits: Vec<ScoredChunk> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = self
                    .relevance
                    .score(squared_distance(&query, &entry.vector));
                (score >= score_threshold).then(|| ScoredChunk {
                    chunk: entry.chunk.clone(),
                    score,
                })
            })
            .collect();

        // Stable: equal scores keep insertion order
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(
            "Query matched {} of {} entries at threshold {}",
            hits.len(),
            self.entries.len(),
            score_threshold
        );
        Ok(hits)
    }

    #[inline]
    fn len(&self) -> usize {
        self.entries.len()
    }
}

fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in &mut vector {
            *x /= norm;
        }
    } else {
        warn!("Cannot normalise vector with norm {}", norm);
    }
    vector
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn read_artifact_file(dir: &Path, name: &str) -> Result<String> {
    let file = dir.join(name);
    fs::read_to_string(&file).map_err(|e| RetrievalError::Load {
        path: dir.to_path_buf(),
        message: format!("Failed to read {}: {}", name, e),
    })
}

fn write_atomically(target: &Path, bytes: &[u8]) -> std::result::Result<(), String> {
    let tmp: PathBuf = target.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
    fs::rename(&tmp, target).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        format!("Failed to replace {}: {}", target.display(), e)
    })
}
