// Embeddings module
// Text-to-vector conversion (Ollama) and corpus chunking

pub mod chunking;
pub mod ollama;


use std::sync::{Arc, Mutex};

use tracing::info;

use crate::{Result, RetrievalError};

pub use chunking::{Chunk, ChunkingConfig, SeparatorMode, TextSplitter};
pub use ollama::OllamaClient;

/// Converts text into fixed-length vectors.
///
/// Implementations must return vectors of the same dimension for every input;
/// `model_id` identifies the model and is stored alongside persisted indexes.
pub trait Embedder: Send + Sync {
    /// Stable identifier of the embedding model
    fn model_id(&self) -> &str;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts, preserving input order
    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

impl<E: Embedder + ?Sized> Embedder for Arc<E> {
    #[inline]
    fn model_id(&self) -> &str {
        (**self).model_id()
    }

    #[inline]
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text)
    }

    #[inline]
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(texts)
    }
}

/// Holds one shared embedder, created on first use.
///
/// The check-and-create runs under a mutex so concurrent first callers load
/// the model exactly once; everyone receives a clone of the same `Arc`.
#[derive(Debug)]
pub struct EmbedderCell<E> {
    slot: Mutex<Option<Arc<E>>>,
}

impl<E> Default for EmbedderCell<E> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<E> EmbedderCell<E> {
    #[inline]
    pub const fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Return the shared embedder, running `init` if none exists yet.
    ///
    /// A failed `init` leaves the cell empty so a later call may try again.
    #[inline]
    pub fn get_or_try_init<F>(&self, init: F) -> Result<Arc<E>>
    where
        F: FnOnce() -> Result<E>,
    {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| RetrievalError::ModelLoad("embedder lock poisoned".to_string()))?;

        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }

        let created = Arc::new(init()?);
        *slot = Some(Arc::clone(&created));
        info!("Embedding model initialized");
        Ok(created)
    }

    /// The embedder, if it has been created
    #[inline]
    pub fn get(&self) -> Option<Arc<E>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}
