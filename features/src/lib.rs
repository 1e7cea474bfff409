use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, instrument};

pub mod decode;
mod error;
pub mod spectral;
pub mod spectrogram;

pub use error::FeatureError;
pub use spectrogram::{SpectrogramConfig, SpectrogramGenerator};

pub const N_MFCC: usize = 13;
pub const N_FEATURES: usize = N_MFCC + 2;

/// Column names of a [`FeatureVector`], in order.
pub const FEATURE_NAMES: [&str; N_FEATURES] = [
    "mfcc_0",
    "mfcc_1",
    "mfcc_2",
    "mfcc_3",
    "mfcc_4",
    "mfcc_5",
    "mfcc_6",
    "mfcc_7",
    "mfcc_8",
    "mfcc_9",
    "mfcc_10",
    "mfcc_11",
    "mfcc_12",
    "spectral_centroid",
    "zero_crossing_rate",
];

/// 13 time-averaged MFCCs followed by the mean spectral centroid and the
/// mean zero-crossing rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f32; N_FEATURES]);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn spectral_centroid(&self) -> f32 {
        self.0[N_MFCC]
    }

    pub fn zero_crossing_rate(&self) -> f32 {
        self.0[N_MFCC + 1]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub sample_rate: u32,
    pub duration_secs: f32,
    pub n_fft: usize,
    pub hop_length: usize,
    pub n_mels: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 22_050,
            duration_secs: 3.0,
            n_fft: 2048,
            hop_length: 512,
            n_mels: 128,
        }
    }
}

/// Turns one audio clip into a [`FeatureVector`].
///
/// Output depends only on the clip and the config; the generator and
/// filterbank are caches.
#[derive(Clone)]
pub struct FeatureExtractor {
    config: ExtractorConfig,
    spectrogram: SpectrogramGenerator,
    filterbank: Vec<Vec<f32>>,
    bin_freqs: Vec<f32>,
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        let filterbank = spectral::mel_filterbank(config.sample_rate, config.n_fft, config.n_mels);
        let bin_freqs = spectrogram::bin_frequencies(config.sample_rate, config.n_fft);
        Self {
            config,
            spectrogram: SpectrogramGenerator::default(),
            filterbank,
            bin_freqs,
        }
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extracts features from an audio file. Any failure is logged and
    /// reported as `None`.
    pub fn extract(&self, path: &Path) -> Option<FeatureVector> {
        match self.try_extract(path) {
            Ok(features) => Some(features),
            Err(err) => {
                error!(path = %path.display(), %err, "error processing audio file");
                None
            }
        }
    }

    #[instrument(skip(self), level = "trace")]
    pub fn try_extract(&self, path: &Path) -> Result<FeatureVector, FeatureError> {
        let samples =
            decode::load_file(path, self.config.sample_rate, self.config.duration_secs)?;
        self.extract_samples(&samples)
    }

    /// Extracts features from an encoded clip held in memory.
    pub fn extract_bytes(&self, bytes: Vec<u8>) -> Result<FeatureVector, FeatureError> {
        let samples =
            decode::load_bytes(bytes, self.config.sample_rate, self.config.duration_secs)?;
        self.extract_samples(&samples)
    }

    /// Extracts features from mono samples already at the configured rate.
    #[instrument(skip(self, samples), fields(n_samples = samples.len()), level = "trace")]
    pub fn extract_samples(&self, samples: &[f32]) -> Result<FeatureVector, FeatureError> {
        if samples.is_empty() {
            return Err(FeatureError::EmptyAudio);
        }
        let max_len = (self.config.sample_rate as f32 * self.config.duration_secs) as usize;
        let samples = &samples[..samples.len().min(max_len)];

        let spect_config = SpectrogramConfig {
            fft_len: self.config.n_fft,
            hop_length: self.config.hop_length,
        };
        let magnitudes = self.spectrogram.run(samples, &spect_config);

        let mut out = [0.0f32; N_FEATURES];
        let mfccs = spectral::mfcc(&magnitudes, &self.filterbank, N_MFCC);
        for (coefficient, slot) in out[..N_MFCC].iter_mut().enumerate() {
            let track = mfccs.iter().map(|frame| frame[coefficient]).collect::<Vec<_>>();
            *slot = spectral::mean(&track);
        }
        out[N_MFCC] = spectral::mean(&spectral::spectral_centroid(&magnitudes, &self.bin_freqs));
        out[N_MFCC + 1] = spectral::mean(&spectral::zero_crossing_rate(
            samples,
            self.config.n_fft,
            self.config.hop_length,
        ));

        if let Some(index) = out.iter().position(|v| !v.is_finite()) {
            return Err(FeatureError::NonFinite {
                name: FEATURE_NAMES[index],
            });
        }
        Ok(FeatureVector(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| 0.5 * (std::f32::consts::TAU * freq * i as f32 / rate as f32).sin())
            .collect()
    }

    fn write_wav(path: &Path, samples: &[f32], rate: u32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for s in samples {
            writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn default_config() {
        let extractor = FeatureExtractor::default();
        assert_eq!(extractor.config().sample_rate, 22_050);
        assert_eq!(extractor.config().duration_secs, 3.0);
    }

    #[test]
    fn extracts_fifteen_features_from_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, &tone(440.0, 22_050, 22_050 * 3), 22_050);

        let features = FeatureExtractor::default().extract(&path).unwrap();
        assert_eq!(features.as_slice().len(), N_FEATURES);
        assert!(features.as_slice().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn unreadable_path_is_absent() {
        let extractor = FeatureExtractor::default();
        assert!(extractor.extract(Path::new("nonexistent_file.wav")).is_none());
    }

    #[test]
    fn corrupt_file_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.wav");
        std::fs::write(&path, b"RIFF nonsense").unwrap();
        assert!(FeatureExtractor::default().extract(&path).is_none());
    }

    #[test]
    fn extraction_is_deterministic() {
        let extractor = FeatureExtractor::default();
        let samples = tone(300.0, 22_050, 10_000);
        let a = extractor.extract_samples(&samples).unwrap();
        let b = extractor.extract_samples(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn higher_tone_has_higher_centroid() {
        let extractor = FeatureExtractor::default();
        let low = extractor.extract_samples(&tone(200.0, 22_050, 22_050)).unwrap();
        let high = extractor.extract_samples(&tone(4000.0, 22_050, 22_050)).unwrap();
        assert!(high.spectral_centroid() > low.spectral_centroid());
        assert!(high.zero_crossing_rate() > low.zero_crossing_rate());
    }

    #[test]
    fn empty_samples_are_rejected() {
        let err = FeatureExtractor::default().extract_samples(&[]).unwrap_err();
        assert!(matches!(err, FeatureError::EmptyAudio));
    }

    #[test]
    fn in_memory_clip_matches_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        write_wav(&path, &tone(880.0, 22_050, 8_000), 22_050);

        let extractor = FeatureExtractor::default();
        let from_file = extractor.try_extract(&path).unwrap();
        let from_bytes = extractor
            .extract_bytes(std::fs::read(&path).unwrap())
            .unwrap();
        assert_eq!(from_file, from_bytes);
    }
}
