// Index lifecycle: decide between building and loading, then act on it


use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::embeddings::{Embedder, TextSplitter};
use crate::vector::{FlatIndex, RelevanceFn, VectorIndex};
use crate::{Result, RetrievalError};

pub const ARTIFACT_EXTENSION: &str = "db";

/// What [`IndexManager::get_or_build`] will do for a source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexIntent {
    /// Read the source, split, embed and persist
    Build,
    /// Read the persisted artifact
    Load,
}

/// Decide how to obtain an index. Performs no I/O.
///
/// | artifact exists | rebuild | intent |
/// |-----------------|---------|--------|
/// | no              | any     | Build  |
/// | yes             | false   | Load   |
/// | yes             | true    | Build  |
#[inline]
pub const fn plan_index(artifact_exists: bool, rebuild: bool) -> IndexIntent {
    if artifact_exists && !rebuild {
        IndexIntent::Load
    } else {
        IndexIntent::Build
    }
}

/// Location of the persisted index for `source`: its extension replaced by `.db`.
///
/// A source that already has the artifact extension is rejected, since the
/// index would overwrite its own corpus.
#[inline]
pub fn artifact_path_for(source: &Path) -> Result<PathBuf> {
    if source.file_name().is_none() {
        return Err(RetrievalError::Config(format!(
            "Source path has no file name: {}",
            source.display()
        )));
    }
    let is_artifact = source
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(ARTIFACT_EXTENSION));
    if is_artifact {
        return Err(RetrievalError::Config(format!(
            "Source path {} already has the .{} index extension",
            source.display(),
            ARTIFACT_EXTENSION
        )));
    }
    Ok(source.with_extension(ARTIFACT_EXTENSION))
}

/// Shared, swappable reference to the current index.
///
/// Readers take an `Arc` snapshot and keep using it even while a refresh
/// installs a newer index.
#[derive(Debug)]
pub struct IndexHandle<I> {
    current: RwLock<Arc<I>>,
}

impl<I> IndexHandle<I> {
    #[inline]
    pub fn new(index: I) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index as of now
    #[inline]
    pub fn snapshot(&self) -> Arc<I> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn replace(&self, index: I) {
        let index = Arc::new(index);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *guard = index;
    }
}

/// Builds, persists and loads indexes for corpus files
pub struct IndexManager<I: VectorIndex = FlatIndex> {
    embedder: Arc<dyn Embedder>,
    splitter: TextSplitter,
    relevance: RelevanceFn,
    recover_corrupt: bool,
    path_locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
    _index: PhantomData<fn() -> I>,
}

impl<I: VectorIndex> IndexManager<I> {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, splitter: TextSplitter, relevance: RelevanceFn) -> Self {
        Self {
            embedder,
            splitter,
            relevance,
            recover_corrupt: false,
            path_locks: Mutex::new(HashMap::new()),
            _index: PhantomData,
        }
    }

    /// Rebuild from the source when the persisted index is unreadable
    #[inline]
    pub fn with_recover_corrupt(mut self, recover_corrupt: bool) -> Self {
        self.recover_corrupt = recover_corrupt;
        self
    }

    #[inline]
    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    #[inline]
    pub fn relevance(&self) -> RelevanceFn {
        self.relevance
    }

    /// Return the index for `source`, building it when there is no artifact
    /// or `rebuild` is set, loading it otherwise.
    ///
    /// # Errors
    /// * `SourceNotFound` when a build is needed and `source` does not exist
    /// * `Load` / `ConfigMismatch` when the artifact cannot be used
    /// * `Build` when chunking or embedding fails
    /// * `Persist` when the built index cannot be written; any previous
    ///   artifact at that location no longer loads
    #[inline]
    pub fn get_or_build(&self, source: &Path, rebuild: bool) -> Result<I> {
        let artifact = artifact_path_for(source)?;
        let (key, lock) = self.lock_for(&artifact)?;
        let result = lock
            .lock()
            .map_err(|_| {
                RetrievalError::Other(anyhow::anyhow!(
                    "Index lock for {} poisoned",
                    artifact.display()
                ))
            })
            .and_then(|_guard| self.obtain(source, &artifact, rebuild));
        self.release_lock(&key, &lock);
        result
    }

    fn obtain(&self, source: &Path, artifact: &Path, rebuild: bool) -> Result<I> {
        let intent = plan_index(artifact.exists(), rebuild);
        debug!(
            "Index intent for {}: {:?} (rebuild={})",
            source.display(),
            intent,
            rebuild
        );

        match intent {
            IndexIntent::Build => self.build_and_persist(source, artifact),
            IndexIntent::Load => {
                match I::load(artifact, Arc::clone(&self.embedder), self.relevance) {
                    Ok(index) => Ok(index),
                    Err(e @ RetrievalError::Load { .. })
                        if self.recover_corrupt && source.exists() =>
                    {
                        warn!("{}; rebuilding from {}", e, source.display());
                        self.build_and_persist(source, artifact)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    /// [`IndexManager::get_or_build`] wrapped in a shareable handle
    #[inline]
    pub fn open(&self, source: &Path, rebuild: bool) -> Result<IndexHandle<I>> {
        self.get_or_build(source, rebuild).map(IndexHandle::new)
    }

    /// Obtain a fresh index and install it in `handle`.
    ///
    /// On failure the handle keeps serving the index it already had.
    #[inline]
    pub fn refresh(&self, handle: &IndexHandle<I>, source: &Path, rebuild: bool) -> Result<()> {
        let index = self.get_or_build(source, rebuild)?;
        handle.replace(index);
        info!("Index for {} refreshed", source.display());
        Ok(())
    }

    fn build_and_persist(&self, source: &Path, artifact: &Path) -> Result<I> {
        let text = read_source(source)?;
        let chunks = self.splitter.split(&text)?;
        info!(
            "Building index for {} ({} chunks)",
            source.display(),
            chunks.len()
        );

        let index = I::build(chunks, Arc::clone(&self.embedder), self.relevance)?;

        index.persist(artifact)?;
        Ok(index)
    }

    fn lock_for(&self, artifact: &Path) -> Result<(PathBuf, Arc<Mutex<()>>)> {
        let key = std::path::absolute(artifact).unwrap_or_else(|_| artifact.to_path_buf());
        let mut locks = self
            .path_locks
            .lock()
            .map_err(|_| anyhow::anyhow!("Index lock table poisoned"))?;
        let lock = Arc::clone(locks.entry(key.clone()).or_default());
        Ok((key, lock))
    }

    /// Drop the table entry once no other caller holds or waits on it
    fn release_lock(&self, key: &Path, lock: &Arc<Mutex<()>>) {
        let mut locks = self
            .path_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the table plus ours
        if Arc::strong_count(lock) == 2 {
            locks.remove(key);
        }
    }
}

fn read_source(source: &Path) -> Result<String> {
    let bytes = match fs::read(source) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RetrievalError::SourceNotFound(source.to_path_buf()));
        }
        Err(e) => return Err(e.into()),
    };

    let text = String::from_utf8(bytes).map_err(|e| {
        RetrievalError::Build(format!(
            "Source {} is not valid UTF-8: {}",
            source.display(),
            e
        ))
    })?;

    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}
