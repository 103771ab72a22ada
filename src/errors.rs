// src/errors.rs

//! Crate-wide error taxonomy and helpers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipetreeError {
    /// Unresolvable configuration inheritance, e.g. a `base_config_path`
    /// that cannot be located, or a spec that cannot be decoded.
    #[error("Configuration conflict in {path}: {reason}")]
    ConfigConflict { path: PathBuf, reason: String },

    /// Malformed task hierarchy. Cannot occur from plain filesystem nesting,
    /// but is checked defensively.
    #[error("Invalid task tree: {0}")]
    InvalidTree(String),

    /// A stage raised an error while processing one input item.
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: anyhow::Error,
    },

    /// A stored cache entry could not be validated or deserialized.
    ///
    /// Single corrupt entries are downgraded to cache misses by the store;
    /// this variant surfaces only where the store itself cannot continue.
    #[error("Cache corruption at {path}: {reason}")]
    CacheCorruption { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipetreeError {
    pub fn conflict(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        PipetreeError::ConfigConflict {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipetreeError>;
