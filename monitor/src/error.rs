use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriftError {
    #[error("column {column} is empty")]
    EmptyColumn { column: String },

    #[error("column {column} contains non-finite values")]
    NonFinite { column: String },

    #[error("frame has no data")]
    EmptyFrame,

    #[error("column {column} has {found} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("{names} column names for {columns} columns")]
    NameMismatch { names: usize, columns: usize },

    #[error("failed to read frame {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse frame {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("every drift strategy failed, last error: {last}")]
    Exhausted { last: Box<DriftError> },

    #[error("no drift strategies configured")]
    NoStrategies,
}
