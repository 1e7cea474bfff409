use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError, RwLock},
};

use num_complex::Complex;
use rustfft::FftPlanner;
use tracing::instrument;

/// Short-time Fourier transform over centred, Hann-windowed frames.
///
/// FFT plans and windows are cached per frame length, so one generator can
/// be shared by every extraction in a run.
#[derive(Clone)]
pub struct SpectrogramGenerator {
    planner: Arc<Mutex<FftPlanner<f32>>>,
    hanns: Arc<RwLock<HashMap<usize, Arc<Vec<f32>>>>>,
}

impl Default for SpectrogramGenerator {
    fn default() -> Self {
        Self {
            planner: Arc::new(Mutex::new(FftPlanner::new())),
            hanns: Default::default(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SpectrogramConfig {
    pub fft_len: usize,
    pub hop_length: usize,
}

impl Default for SpectrogramConfig {
    fn default() -> Self {
        Self {
            fft_len: 2048,
            hop_length: 512,
        }
    }
}

impl SpectrogramConfig {
    pub fn n_bins(&self) -> usize {
        self.fft_len / 2 + 1
    }
}

impl SpectrogramGenerator {
    /// Returns one magnitude spectrum of `fft_len / 2 + 1` bins per frame.
    ///
    /// The signal is zero padded by `fft_len / 2` on both sides so frame `t`
    /// is centred on sample `t * hop_length`.
    #[instrument(skip(self, samples), fields(n_samples = samples.len()), level = "trace")]
    pub fn run(&self, samples: &[f32], config: &SpectrogramConfig) -> Vec<Vec<f32>> {
        let fft = self
            .planner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .plan_fft_forward(config.fft_len);
        let hann = self.get_hann(config.fft_len);

        let pad = config.fft_len / 2;
        let mut padded = vec![0.0; samples.len() + 2 * pad];
        padded[pad..pad + samples.len()].copy_from_slice(samples);

        padded
            .windows(config.fft_len)
            .step_by(config.hop_length.max(1))
            .map(|window| {
                let mut buffer = window
                    .iter()
                    .zip(hann.iter())
                    .map(|(sample, hann)| Complex::new(sample * hann, 0.0))
                    .collect::<Vec<_>>();
                fft.process(&mut buffer);
                buffer
                    .into_iter()
                    // upper half mirrors the lower half for real input
                    .take(config.n_bins())
                    .map(|val| val.norm())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn get_hann(&self, size: usize) -> Arc<Vec<f32>> {
        let cached = self
            .hanns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&size)
            .cloned();

        match cached {
            Some(hann) => hann,
            None => self.generate_hann(size),
        }
    }

    #[instrument(skip(self), level = "trace")]
    fn generate_hann(&self, size: usize) -> Arc<Vec<f32>> {
        let hann = Arc::new(generate_hanning_window(size));
        self.hanns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(size, hann.clone());
        hann
    }
}

/// Periodic Hann window.
fn generate_hanning_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (std::f32::consts::TAU * (i as f32 / size as f32)).cos()))
        .collect()
}

/// Centre frequency in Hz of every bin of a `fft_len`-point spectrum.
pub fn bin_frequencies(sample_rate: u32, fft_len: usize) -> Vec<f32> {
    (0..fft_len / 2 + 1)
        .map(|k| k as f32 * sample_rate as f32 / fft_len as f32)
        .collect()
}
