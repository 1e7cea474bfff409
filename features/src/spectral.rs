//! Frame-level spectral descriptors computed from a magnitude spectrogram
//! or directly from the waveform.

const F_SP: f32 = 200.0 / 3.0;
const MIN_LOG_HZ: f32 = 1000.0;
const MIN_LOG_MEL: f32 = MIN_LOG_HZ / F_SP;

fn log_step() -> f32 {
    6.4f32.ln() / 27.0
}

/// Slaney mel scale: linear below 1 kHz, logarithmic above.
pub fn hz_to_mel(hz: f32) -> f32 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f32) -> f32 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        mel * F_SP
    }
}

/// Triangular mel filters over `0..sample_rate / 2` with Slaney area
/// normalisation. Returns `n_mels` rows of `fft_len / 2 + 1` weights.
pub fn mel_filterbank(sample_rate: u32, fft_len: usize, n_mels: usize) -> Vec<Vec<f32>> {
    let fft_freqs = crate::spectrogram::bin_frequencies(sample_rate, fft_len);
    let mel_max = hz_to_mel(sample_rate as f32 / 2.0);
    let mel_points = (0..n_mels + 2)
        .map(|i| mel_to_hz(mel_max * i as f32 / (n_mels + 1) as f32))
        .collect::<Vec<_>>();

    (0..n_mels)
        .map(|m| {
            let (lo, centre, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
            let enorm = 2.0 / (hi - lo);
            fft_freqs
                .iter()
                .map(|&f| {
                    let lower = (f - lo) / (centre - lo);
                    let upper = (hi - f) / (hi - centre);
                    lower.min(upper).max(0.0) * enorm
                })
                .collect()
        })
        .collect()
}

/// Converts a power value to decibels relative to 1.0 with a 1e-10 floor.
fn power_to_db(power: f32) -> f32 {
    10.0 * power.max(1e-10).log10()
}

/// Orthonormal DCT-II, keeping the first `n_out` coefficients.
fn dct_ortho(input: &[f32], n_out: usize) -> Vec<f32> {
    let n = input.len() as f32;
    (0..n_out)
        .map(|k| {
            let sum = input
                .iter()
                .enumerate()
                .map(|(i, x)| {
                    x * (std::f32::consts::PI * k as f32 * (2.0 * i as f32 + 1.0) / (2.0 * n)).cos()
                })
                .sum::<f32>();
            let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
            sum * scale
        })
        .collect()
}

/// Mel-frequency cepstral coefficients for each frame of a magnitude
/// spectrogram. Log-mel energies are clipped to 80 dB below the loudest
/// value of the clip before the DCT.
pub fn mfcc(spectrogram: &[Vec<f32>], filterbank: &[Vec<f32>], n_mfcc: usize) -> Vec<Vec<f32>> {
    let mel_db = spectrogram
        .iter()
        .map(|frame| {
            filterbank
                .iter()
                .map(|filter| {
                    let energy = filter
                        .iter()
                        .zip(frame)
                        .map(|(w, mag)| w * mag * mag)
                        .sum::<f32>();
                    power_to_db(energy)
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let peak = mel_db
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = peak - 80.0;

    mel_db
        .into_iter()
        .map(|frame| {
            let clipped = frame.into_iter().map(|db| db.max(floor)).collect::<Vec<_>>();
            dct_ortho(&clipped, n_mfcc)
        })
        .collect()
}

/// Magnitude-weighted mean frequency of each frame; silent frames yield 0.
pub fn spectral_centroid(spectrogram: &[Vec<f32>], bin_freqs: &[f32]) -> Vec<f32> {
    spectrogram
        .iter()
        .map(|frame| {
            let total = frame.iter().sum::<f32>();
            if total <= f32::MIN_POSITIVE {
                return 0.0;
            }
            frame.iter().zip(bin_freqs).map(|(m, f)| m * f).sum::<f32>() / total
        })
        .collect()
}

/// Fraction of sign changes inside each `frame_len` window, hopping by
/// `hop_length`. The signal is edge padded so frames are centred, and
/// values within 1e-10 of zero count as positive.
pub fn zero_crossing_rate(samples: &[f32], frame_len: usize, hop_length: usize) -> Vec<f32> {
    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        return Vec::new();
    };

    let pad = frame_len / 2;
    let padded = std::iter::repeat(*first)
        .take(pad)
        .chain(samples.iter().copied())
        .chain(std::iter::repeat(*last).take(pad))
        .map(|x| if x.abs() <= 1e-10 { 0.0 } else { x })
        .collect::<Vec<_>>();

    padded
        .windows(frame_len)
        .step_by(hop_length.max(1))
        .map(|frame| {
            let crossings = frame
                .windows(2)
                .filter(|pair| (pair[0] < 0.0) != (pair[1] < 0.0))
                .count();
            crossings as f32 / frame_len as f32
        })
        .collect()
}

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
