use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use hound::{SampleFormat, WavReader};
use ndarray::{Array2, Axis};
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::{Result, TranscribeError};

/// Mono samples in [-1, 1] plus what the source file said about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    pub samples: Vec<f64>,
    pub sample_rate: u32,
    /// Channel count of the source before downmixing.
    pub channels: u16,
}

impl DecodedAudio {
    pub fn duration_seconds(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decode a WAV file, `-` meaning standard input.
pub fn load_audio<P: AsRef<Path>>(path: P) -> Result<DecodedAudio> {
    let path = path.as_ref();
    if path == Path::new("-") {
        read_wav(WavReader::new(BufReader::new(io::stdin().lock()))?)
    } else {
        read_wav(WavReader::new(BufReader::new(File::open(path)?))?)
    }
}

/// Read every sample, scale to [-1, 1] and fold stereo down to mono.
pub fn read_wav<R: Read>(reader: WavReader<R>) -> Result<DecodedAudio> {
    let spec = reader.spec();
    if spec.channels != 1 && spec.channels != 2 {
        return Err(TranscribeError::UnsupportedChannels(spec.channels));
    }

    log::info!(
        "{} Hz, {} bit {:?}, {} channel(s)",
        spec.sample_rate,
        spec.bits_per_sample,
        spec.sample_format,
        spec.channels
    );

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let full_scale = 2.0_f64.powi(spec.bits_per_sample as i32 - 1);
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|s| s as f64 / full_scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let samples = downmix(interleaved, spec.channels as usize)?;
    Ok(DecodedAudio {
        samples,
        sample_rate: spec.sample_rate,
        channels: spec.channels,
    })
}

/// Average interleaved channels into one. A trailing partial frame is dropped.
pub fn downmix(mut interleaved: Vec<f64>, channels: usize) -> Result<Vec<f64>> {
    if channels == 1 {
        return Ok(interleaved);
    }

    let frames = interleaved.len() / channels;
    interleaved.truncate(frames * channels);
    let matrix = Array2::from_shape_vec((frames, channels), interleaved)
        .map_err(|e| TranscribeError::MalformedAudio(e.to_string()))?;

    match matrix.mean_axis(Axis(1)) {
        Some(mono) => Ok(mono.to_vec()),
        None => Ok(Vec::new()),
    }
}

/// Convert `audio` to `target_sample_rate` in one pass.
pub fn resample(audio: DecodedAudio, target_sample_rate: u32) -> Result<DecodedAudio> {
    if audio.sample_rate == target_sample_rate || audio.samples.is_empty() {
        return Ok(DecodedAudio { sample_rate: target_sample_rate, ..audio });
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let expected_len = (audio.samples.len() as f64 * ratio) as usize;
    let mut resampler = SincFixedIn::<f64>::new(ratio, 2.0, params, audio.samples.len(), 1)
        .map_err(|e| TranscribeError::Resample(e.to_string()))?;

    let mut resampled = resampler
        .process(&[audio.samples], None)
        .map_err(|e| TranscribeError::Resample(e.to_string()))?;
    let mut samples = resampled.pop().unwrap_or_default();
    samples.truncate(expected_len);

    log::info!("resampled {} Hz -> {} Hz", audio.sample_rate, target_sample_rate);

    Ok(DecodedAudio {
        samples,
        sample_rate: target_sample_rate,
        channels: audio.channels,
    })
}
