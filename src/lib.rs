use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load embedding model: {0}")]
    ModelLoad(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Index build failed: {0}")]
    Build(String),

    #[error("Failed to persist index to {}: {message}", .path.display())]
    Persist { path: PathBuf, message: String },

    #[error("Failed to load index from {}: {message}", .path.display())]
    Load { path: PathBuf, message: String },

    #[error("Source corpus not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error(
        "Index at {} was built with {found}, but {expected} was supplied; rebuild the index",
        .path.display()
    )]
    ConfigMismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RetrievalError {
    /// Errors after which retrieval cannot proceed without operator action.
    #[inline]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::ModelLoad(_) | Self::SourceNotFound(_))
    }
}

pub mod commands;
pub mod config;
pub mod embeddings;
pub mod generation;
pub mod index_manager;
pub mod qa;
pub mod vector;
