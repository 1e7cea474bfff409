use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use features::ExtractorConfig;
use monitor::simulate::SimulationConfig;
use serde::{Deserialize, Serialize};
use training::ForestParams;

/// Where the monitor stage gets its reference and current features.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MonitorSource {
    /// Generated normal data with a configurable shift.
    Synthetic(SimulationConfig),
    /// The training features compared against themselves.
    Training,
    /// Two JSON-encoded feature frames.
    Files { reference: PathBuf, current: PathBuf },
}

impl Default for MonitorSource {
    fn default() -> Self {
        Self::Synthetic(SimulationConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub model_dir: PathBuf,
    pub audio_extension: String,
    pub test_fraction: f64,
    pub drift_threshold: f64,
    pub experiment: String,
    pub extractor: ExtractorConfig,
    pub forest: ForestParams,
    pub monitor: MonitorSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/audio_files"),
            manifest: None,
            model_dir: PathBuf::from("models"),
            audio_extension: "wav".into(),
            test_fraction: 0.3,
            drift_threshold: 0.1,
            experiment: "audio_sentiment".into(),
            extractor: ExtractorConfig::default(),
            forest: ForestParams::default(),
            monitor: MonitorSource::default(),
        }
    }
}

impl PipelineConfig {
    /// Reads a TOML config; without a path, or when the file does not exist,
    /// the defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("parsing config {}", path.display()))
            }
            _ => Ok(Self::default()),
        }
    }
}
