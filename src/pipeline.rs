use std::fs;
use std::path::Path;

use crate::analysis::note_intensity::{NoteIntensity, VelocityVector};
use crate::analysis::parallel_windower::{analyze_sequential, ParallelWindower};
use crate::analysis::phase_vocoder::PhaseVocoder;
use crate::analysis::spectral_transform::{SpectralEstimate, SpectralTransform};
use crate::config::TranscriptionConfig;
use crate::constants::{NOTE_COUNT, PROGRESS_INTERVAL_SECONDS};
use crate::error::{Result, TranscribeError};
use crate::postprocessing::midi::{division_for, generate_midi_file_data};
use crate::postprocessing::note_events::{NoteTracker, Thresholds, Timeline};
use crate::preprocessing::load_audio::{load_audio, resample};

/// `mm:ss` for progress lines.
fn format_time(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// The cleaned timeline plus what is needed to time it.
#[derive(Debug, Clone)]
pub struct Transcription {
    pub timeline: Timeline,
    pub sample_rate: u32,
    pub hop_size: usize,
    pub frames: usize,
}

impl Transcription {
    pub fn division(&self) -> u16 {
        division_for(self.sample_rate, self.hop_size)
    }

    pub fn to_midi_bytes(&self) -> Result<Vec<u8>> {
        generate_midi_file_data(&self.timeline, self.division())
    }

    pub fn write_midi<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let bytes = self.to_midi_bytes()?;
        fs::write(path.as_ref(), bytes)?;
        log::info!("wrote {}", path.as_ref().display());
        Ok(())
    }
}

pub struct Transcriber {
    config: TranscriptionConfig,
}

impl Transcriber {
    pub fn new(config: TranscriptionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TranscriptionConfig {
        &self.config
    }

    /// Decode `path` (`-` for stdin), resample if configured, and transcribe.
    pub fn transcribe_file<P: AsRef<Path>>(&self, path: P) -> Result<Transcription> {
        let mut audio = load_audio(path)?;
        if let Some(rate) = self.config.runtime.sample_rate {
            audio = resample(audio, rate)?;
        }
        log::info!("estimated length {}", format_time(audio.duration_seconds()));

        self.transcribe(audio.samples, audio.sample_rate)
    }

    /// Run the whole chain over a mono sample stream.
    pub fn transcribe<I>(&self, samples: I, sample_rate: u32) -> Result<Transcription>
    where
        I: IntoIterator<Item = f64>,
        I::IntoIter: Send + 'static,
    {
        if sample_rate == 0 {
            return Err(TranscribeError::InvalidConfig("sample rate must be positive".into()));
        }

        let analysis = &self.config.analysis;
        let frame_length = analysis.frame_length;
        let hop_size = analysis.hop();
        let transform = SpectralTransform::new(analysis.window, frame_length).with_conjugate(analysis.conjugate);

        log::info!(
            "{} sample frames, {:.4} s per step",
            frame_length,
            hop_size as f64 / sample_rate as f64
        );

        let runtime = &self.config.runtime;
        if runtime.threads == 1 {
            let frames = analyze_sequential(transform, samples, frame_length, hop_size);
            self.track(frames, sample_rate)
        } else {
            let windower =
                ParallelWindower::new(transform, frame_length, hop_size, runtime.threads, runtime.max_in_flight)?;
            let frames = windower.process(samples)?;
            self.track(frames, sample_rate)
        }
    }

    /// The sequential stages: frequency correction, peak picking, note
    /// tracking, then cleanup.
    fn track<F>(&self, frames: F, sample_rate: u32) -> Result<Transcription>
    where
        F: Iterator<Item = Result<SpectralEstimate>>,
    {
        let analysis = &self.config.analysis;
        let detection = &self.config.detection;
        let hop_size = analysis.hop();
        let rate = sample_rate as f64;

        let mut vocoder = PhaseVocoder::new(analysis.frame_length, hop_size, rate);
        let intensity = NoteIntensity::new(detection, analysis.frame_length, rate);
        let mut tracker = NoteTracker::new(Thresholds::from(detection));
        let mut velocity: VelocityVector = [0; NOTE_COUNT];

        let steps_per_report = ((PROGRESS_INTERVAL_SECONDS * rate / hop_size as f64).ceil() as usize).max(1);
        let mut count = 0;

        for (index, estimate) in frames.enumerate() {
            let estimate = estimate?;
            let step = u32::try_from(index).map_err(|_| TranscribeError::TooManyFrames(index))?;

            let mut corrected = if analysis.phase_correction {
                vocoder.correct(estimate)
            } else {
                vocoder.nominal(estimate)
            };
            intensity.estimate(&mut corrected.power, &corrected.frequency, &mut velocity);
            tracker.check(step, &velocity);

            count = index + 1;
            if count % steps_per_report == 0 {
                log::info!("{}", format_time((count * hop_size) as f64 / rate));
            }
        }

        let mut timeline = tracker.finish();
        let raw_events = timeline.len();
        timeline.clean_up(&self.config.cleanup);
        log::info!(
            "{} frames, {} events ({} before cleanup), {} notes",
            count,
            timeline.len(),
            raw_events,
            timeline.onsets().count()
        );

        Ok(Transcription {
            timeline,
            sample_rate,
            hop_size,
            frames: count,
        })
    }
}
