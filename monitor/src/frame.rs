use std::path::Path;

use features::{FeatureVector, FEATURE_NAMES};
use serde::{Deserialize, Serialize};

use crate::DriftError;

/// Column-major table of named numeric features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct FeatureFrame {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

#[derive(Deserialize)]
struct RawFrame {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl TryFrom<RawFrame> for FeatureFrame {
    type Error = DriftError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        Self::from_columns(raw.names, raw.columns)
    }
}

impl FeatureFrame {
    /// Checks that there is one name per column and that every column has
    /// the same number of rows.
    pub fn from_columns(names: Vec<String>, columns: Vec<Vec<f64>>) -> Result<Self, DriftError> {
        if names.len() != columns.len() {
            return Err(DriftError::NameMismatch {
                names: names.len(),
                columns: columns.len(),
            });
        }
        let expected = columns.first().map_or(0, Vec::len);
        for (name, column) in names.iter().zip(&columns) {
            if column.len() != expected {
                return Err(DriftError::RaggedColumn {
                    column: name.clone(),
                    expected,
                    found: column.len(),
                });
            }
        }
        Ok(Self { names, columns })
    }

    /// One row per vector, columns named after the extracted features.
    pub fn from_vectors(vectors: &[FeatureVector]) -> Self {
        let names = FEATURE_NAMES.iter().map(|n| n.to_string()).collect();
        let columns = (0..FEATURE_NAMES.len())
            .map(|j| vectors.iter().map(|v| v.0[j] as f64).collect())
            .collect();
        Self { names, columns }
    }

    /// Reads a frame serialised as JSON.
    pub fn load(path: &Path) -> Result<Self, DriftError> {
        let bytes = std::fs::read(path).map_err(|source| DriftError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| DriftError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Columns present in both frames, in `self`'s order, as
    /// `(name, self column, other column)`.
    pub fn shared_columns<'a>(
        &'a self,
        other: &'a FeatureFrame,
    ) -> Vec<(&'a str, &'a [f64], &'a [f64])> {
        self.columns()
            .filter_map(|(name, ours)| other.column(name).map(|theirs| (name, ours, theirs)))
            .collect()
    }
}
