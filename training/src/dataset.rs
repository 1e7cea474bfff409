use std::path::{Path, PathBuf};

use features::{FeatureExtractor, FeatureVector};
use tracing::{debug, info, instrument, warn};

use crate::{manifest, TrainingError};

/// Feature vectors and their raw labels, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    features: Vec<FeatureVector>,
    labels: Vec<String>,
}

impl LabeledDataset {
    pub fn push(&mut self, features: FeatureVector, label: impl Into<String>) {
        self.features.push(features);
        self.labels.push(label.into());
    }

    pub fn features(&self) -> &[FeatureVector] {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Walks a labelled corpus and extracts features for every clip.
#[derive(Clone)]
pub struct DatasetBuilder {
    extractor: FeatureExtractor,
    audio_extension: String,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self::new(FeatureExtractor::default(), "wav")
    }
}

impl DatasetBuilder {
    pub fn new(extractor: FeatureExtractor, audio_extension: impl Into<String>) -> Self {
        Self {
            extractor,
            audio_extension: audio_extension.into(),
        }
    }

    /// Builds a dataset from `source`.
    ///
    /// With an existing `manifest` the `Filename`/`Class` rows drive the
    /// walk and files are resolved under `source`. Otherwise every immediate
    /// subdirectory of `source` is a class holding its clips. Clips that fail
    /// extraction are skipped.
    #[instrument(skip(self), level = "trace")]
    pub fn build(
        &self,
        source: &Path,
        manifest: Option<&Path>,
    ) -> Result<LabeledDataset, TrainingError> {
        let dataset = match manifest {
            Some(manifest) if manifest.is_file() => self.build_from_manifest(source, manifest)?,
            Some(manifest) => {
                warn!(
                    manifest = %manifest.display(),
                    "manifest not found, falling back to directory labels"
                );
                self.build_from_directories(source)?
            }
            None => self.build_from_directories(source)?,
        };

        if dataset.is_empty() {
            return Err(TrainingError::EmptyDataset);
        }
        info!(n_samples = dataset.len(), source = %source.display(), "built dataset");
        Ok(dataset)
    }

    fn build_from_manifest(
        &self,
        source: &Path,
        manifest: &Path,
    ) -> Result<LabeledDataset, TrainingError> {
        let rows = manifest::read(manifest)?;
        debug!(n_rows = rows.len(), "read manifest");

        let mut dataset = LabeledDataset::default();
        for row in rows {
            let path = source.join(&row.filename);
            if !path.is_file() {
                warn!(path = %path.display(), "audio file not found");
                continue;
            }
            if let Some(features) = self.extractor.extract(&path) {
                dataset.push(features, row.label);
            }
        }
        Ok(dataset)
    }

    fn build_from_directories(&self, source: &Path) -> Result<LabeledDataset, TrainingError> {
        let mut dataset = LabeledDataset::default();
        for class_dir in sorted_entries(source)? {
            if !class_dir.is_dir() {
                continue;
            }
            let Some(label) = class_dir.file_name().and_then(|n| n.to_str()) else {
                warn!(path = %class_dir.display(), "skipping class directory with non utf-8 name");
                continue;
            };

            for clip in sorted_entries(&class_dir)? {
                if !clip.is_file() || !self.is_audio(&clip) {
                    continue;
                }
                if let Some(features) = self.extractor.extract(&clip) {
                    dataset.push(features, label);
                }
            }
        }
        Ok(dataset)
    }

    fn is_audio(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == self.audio_extension)
    }
}

/// Directory listing sorted by path so extraction order is reproducible.
fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, TrainingError> {
    let io_err = |source| TrainingError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    entries.sort();
    Ok(entries)
}
