use std::{fs, path::PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode artifact {name}: {source}")]
    Encode {
        name: String,
        source: serde_json::Error,
    },

    #[error("failed to decode artifact {name}: {source}")]
    Decode {
        name: String,
        source: serde_json::Error,
    },
}

/// A directory of independently loadable, named artifacts.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Opens `root` for writing, creating it (and its parents) if absent.
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| StoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    /// Opens an existing store without touching the filesystem.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Writes `value` under `name`. The payload goes to a sibling temp file
    /// first so a reader never sees a half-written artifact.
    #[instrument(skip(self, value), fields(root = %self.root.display()), level = "trace")]
    pub fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
            name: name.to_string(),
            source,
        })?;

        let path = self.path_of(name);
        let tmp = self.path_of(&format!(".{name}.tmp"));
        fs::write(&tmp, &bytes).map_err(|source| StoreError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        debug!(n_bytes = bytes.len(), path = %path.display(), "wrote artifact");
        Ok(path)
    }

    #[instrument(skip(self), fields(root = %self.root.display()), level = "trace")]
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Result<T, StoreError> {
        let path = self.path_of(name);
        let bytes = fs::read(&path).map_err(|source| StoreError::Io { path, source })?;
        serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            name: name.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Weights {
        name: String,
        values: Vec<f32>,
    }

    #[test]
    fn create_makes_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("b");
        let store = ArtifactStore::create(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.path_of("model.json"), root.join("model.json"));
    }

    #[test]
    fn artifact_is_readable_from_a_fresh_handle() {
        let dir = tempfile::tempdir().unwrap();
        let weights = Weights {
            name: "w".into(),
            values: vec![0.5, -1.0],
        };
        ArtifactStore::create(dir.path())
            .unwrap()
            .write("weights.json", &weights)
            .unwrap();

        let reopened = ArtifactStore::open(dir.path());
        assert!(reopened.path_of("weights.json").is_file());
        assert!(!reopened.path_of(".weights.json.tmp").exists());
        assert_eq!(reopened.read::<Weights>("weights.json").unwrap(), weights);
    }

    #[test]
    fn missing_artifact_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ArtifactStore::open(dir.path())
            .read::<Weights>("nope.json")
            .unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }

    #[test]
    fn wrong_shape_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::create(dir.path()).unwrap();
        store.write("weights.json", &vec![1, 2, 3]).unwrap();
        let err = store.read::<Weights>("weights.json").unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }
}
