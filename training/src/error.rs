use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("no audio data found")]
    EmptyDataset,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("manifest {path}, line {line}: {reason}")]
    Manifest {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] store::StoreError),
}
