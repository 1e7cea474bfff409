use std::{io::Cursor, path::Path};

use symphonia::core::{
    audio::{AudioBuffer, Signal},
    codecs::DecoderOptions,
    formats::FormatOptions,
    io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::{debug, instrument, trace, warn};

use crate::FeatureError;

const RESAMPLE_CHUNK: usize = 1024;

/// Decodes the file at `path` to mono samples at `target_rate`, keeping at
/// most `max_duration_secs` of audio.
#[instrument(level = "trace")]
pub fn load_file(
    path: &Path,
    target_rate: u32,
    max_duration_secs: f32,
) -> Result<Vec<f32>, FeatureError> {
    let file = std::fs::File::open(path).map_err(|source| FeatureError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    load_source(Box::new(file), hint, target_rate, max_duration_secs)
}

/// Same as [`load_file`] for an in-memory encoded clip, e.g. an upload body.
#[instrument(skip(bytes), fields(len = bytes.len()), level = "trace")]
pub fn load_bytes(
    bytes: Vec<u8>,
    target_rate: u32,
    max_duration_secs: f32,
) -> Result<Vec<f32>, FeatureError> {
    load_source(
        Box::new(Cursor::new(bytes)),
        Hint::new(),
        target_rate,
        max_duration_secs,
    )
}

fn load_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
    target_rate: u32,
    max_duration_secs: f32,
) -> Result<Vec<f32>, FeatureError> {
    let stream = MediaSourceStream::new(source, MediaSourceStreamOptions::default());
    let mut probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let tracks = probed.format.tracks();
    if tracks.len() != 1 {
        warn!(n_tracks = tracks.len(), "file has multiple tracks, using only default");
    }
    let track = probed.format.default_track().ok_or(FeatureError::NoTrack)?;
    let track_id = track.id;
    let source_rate = track
        .codec_params
        .sample_rate
        .ok_or(FeatureError::UnknownSampleRate)?;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;
    debug!(params = ?track.codec_params, "read codec params");

    let max_source_frames = (source_rate as f32 * max_duration_secs).ceil() as usize;
    let mut channels: Vec<Vec<f32>> = Vec::new();

    while let Ok(packet) = probed.format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let mut converted: AudioBuffer<f32> =
            AudioBuffer::new(decoded.capacity() as u64, decoded.spec().to_owned());
        decoded.convert(&mut converted);
        let planes = converted.planes();
        let planes_slice = planes.planes();
        if channels.len() != planes_slice.len() {
            trace!("resizing channels due to size mismatch");
            channels.resize_with(planes_slice.len(), Vec::new);
        }
        channels
            .iter_mut()
            .zip(planes_slice)
            .for_each(|(d, v)| d.extend(*v));

        if channels.first().map_or(0, Vec::len) >= max_source_frames {
            break;
        }
    }

    let mut mono = downmix(&channels);
    mono.truncate(max_source_frames);
    if mono.is_empty() {
        return Err(FeatureError::EmptyAudio);
    }

    let mut samples = resample(&mono, source_rate, target_rate)?;
    samples.truncate((target_rate as f32 * max_duration_secs) as usize);
    debug!(source_rate, target_rate, n_samples = samples.len(), "decoded audio");
    Ok(samples)
}

/// Averages planar channels into one.
pub fn downmix(channels: &[Vec<f32>]) -> Vec<f32> {
    match channels {
        [] => Vec::new(),
        [only] => only.clone(),
        many => {
            let frames = many.iter().map(Vec::len).min().unwrap_or(0);
            let scale = 1.0 / many.len() as f32;
            (0..frames)
                .map(|i| many.iter().map(|c| c[i]).sum::<f32>() * scale)
                .collect()
        }
    }
}

/// Band-limited sinc resampler. Content above the lower of the two Nyquist
/// frequencies is filtered out. Returns the input unchanged when the rates
/// already match.
#[instrument(skip(samples), fields(len = samples.len()), level = "trace")]
pub fn resample(
    samples: &[f32],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<f32>, FeatureError> {
    if source_rate == target_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, params, RESAMPLE_CHUNK, 1)?;

    let delay = resampler.output_delay();
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(output_len + delay);

    let mut chunks = samples.chunks_exact(RESAMPLE_CHUNK);
    for chunk in &mut chunks {
        let block = resampler.process(std::slice::from_ref(&chunk), None)?;
        out.extend_from_slice(&block[0]);
    }
    let rest = chunks.remainder();
    if !rest.is_empty() {
        let block = resampler.process_partial(Some(std::slice::from_ref(&rest)), None)?;
        out.extend_from_slice(&block[0]);
    }
    // drain the filter delay
    while out.len() < output_len + delay {
        let block = resampler.process_partial::<&[f32]>(None, None)?;
        if block[0].is_empty() {
            break;
        }
        out.extend_from_slice(&block[0]);
    }

    out.drain(..delay.min(out.len()));
    out.truncate(output_len);
    trace!(delay, n_out = out.len(), "resampled");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let v = ((i as f32 * 0.05).sin() * 8000.0) as i16;
            for _ in 0..channels {
                writer.write_sample(v).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn long_clip_is_truncated_to_duration_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.wav");
        write_wav(&path, 22_050, 1, 22_050 * 4);

        let samples = load_file(&path, 22_050, 3.0).unwrap();
        assert_eq!(samples.len(), 22_050 * 3);
    }

    #[test]
    fn short_clip_is_used_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        write_wav(&path, 22_050, 2, 5_000);

        let samples = load_file(&path, 22_050, 3.0).unwrap();
        assert_eq!(samples.len(), 5_000);
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hi.wav");
        write_wav(&path, 44_100, 1, 44_100);

        let samples = load_file(&path, 22_050, 3.0).unwrap();
        assert_eq!(samples.len(), 22_050);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let err = load_file(Path::new("does/not/exist.wav"), 22_050, 3.0).unwrap_err();
        assert!(matches!(err, FeatureError::Open { .. }));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(load_bytes(b"definitely not audio".to_vec(), 22_050, 3.0).is_err());
    }

    #[test]
    fn downmix_averages_channels() {
        let mono = downmix(&[vec![1.0, 0.5], vec![-1.0, 0.5]]);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn resample_halves_length() {
        let out = resample(&[0.25; 4_800], 48_000, 24_000).unwrap();
        assert_eq!(out.len(), 2_400);
        // away from the edges a constant signal passes through unchanged
        assert!(out[200..2_200].iter().all(|v| (v - 0.25).abs() < 1e-2));
    }

    #[test]
    fn tone_above_target_nyquist_is_filtered_out() {
        let rms = |x: &[f32]| (x.iter().map(|v| v * v).sum::<f32>() / x.len() as f32).sqrt();
        let tone: Vec<f32> = (0..44_100)
            .map(|i| 0.5 * (std::f32::consts::TAU * 15_000.0 * i as f32 / 44_100.0).sin())
            .collect();

        let out = resample(&tone, 44_100, 22_050).unwrap();
        assert_eq!(out.len(), 22_050);
        assert!(rms(&tone) > 0.35);
        assert!(rms(&out[500..21_500]) < 0.01);
    }

    #[test]
    fn matching_rates_are_untouched() {
        let samples = [0.1, -0.2, 0.3];
        assert_eq!(resample(&samples, 22_050, 22_050).unwrap(), samples);
    }
}
