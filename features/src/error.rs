use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("audio decode failed: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("no decodable audio track")]
    NoTrack,

    #[error("track does not declare a sample rate")]
    UnknownSampleRate,

    #[error("failed to build resampler: {0}")]
    ResamplerInit(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),

    #[error("decoded audio is empty")]
    EmptyAudio,

    #[error("feature {name} is not finite")]
    NonFinite { name: &'static str },
}
