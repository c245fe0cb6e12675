use std::{io, path::PathBuf};

use thiserror::Error;
use tokio::task::JoinError;

use crate::image_model::GenerateError;

/// Errors surfaced by the cache and the run orchestration.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Cache file {} is corrupt: {source}", .path.display())]
    CacheCorrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Failed to read {}: {source}", .path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    #[error("Failed to persist {}: {source}", .path.display())]
    PersistFailed { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Generate(#[from] GenerateError),

    #[error("Worker task failed: {0}")]
    Worker(#[from] JoinError),
}

impl Error {
    pub fn persist(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::PersistFailed {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
