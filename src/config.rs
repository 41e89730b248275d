//! Transcription settings, loadable from JSON.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::analysis::note_intensity::{PeakSuppression, ThresholdMode};
use crate::analysis::window_function::WindowFunction;
use crate::constants::{
    CUT_RATIO, FRAME_LENGTH, HOP_DIVISOR, NOTE_COUNT, NOTE_HIGH, NOTE_LOW, OFF_THRESHOLD, ON_THRESHOLD,
    PEAK_THRESHOLD, SHORT_NOTE_PASSES,
};
use crate::error::{Result, TranscribeError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub analysis: AnalysisConfig,
    pub detection: DetectionConfig,
    pub cleanup: CleanupConfig,
    pub runtime: RuntimeConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub frame_length: usize,
    /// Samples between frames, `frame_length / 8` when unset.
    pub hop_size: Option<usize>,
    pub window: WindowFunction,
    pub conjugate: bool,
    pub phase_correction: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            frame_length: FRAME_LENGTH,
            hop_size: None,
            window: WindowFunction::default(),
            conjugate: false,
            phase_correction: true,
        }
    }
}

impl AnalysisConfig {
    pub fn hop(&self) -> usize {
        self.hop_size.unwrap_or(self.frame_length / HOP_DIVISOR)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// log10 of the lowest power that counts as a peak.
    pub cut_ratio: f64,
    pub threshold_mode: ThresholdMode,
    pub peak_suppression: PeakSuppression,
    pub on_threshold: u8,
    pub off_threshold: u8,
    /// Velocity rise over the held onset that re-attacks a sounding note.
    pub peak_threshold: u8,
    pub note_low: u8,
    pub note_high: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            cut_ratio: CUT_RATIO,
            threshold_mode: ThresholdMode::default(),
            peak_suppression: PeakSuppression::default(),
            on_threshold: ON_THRESHOLD,
            off_threshold: OFF_THRESHOLD,
            peak_threshold: PEAK_THRESHOLD,
            note_low: NOTE_LOW,
            note_high: NOTE_HIGH,
        }
    }
}

/// Duration (in steps) and onset velocity bounds for a pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePass {
    pub duration: u32,
    pub velocity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    /// Applied in order after regulation.
    pub short_notes: Vec<NotePass>,
    pub long_notes: Option<NotePass>,
    pub remove_octaves: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            short_notes: SHORT_NOTE_PASSES
                .iter()
                .map(|&(duration, velocity)| NotePass { duration, velocity })
                .collect(),
            long_notes: None,
            remove_octaves: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Spectral workers, 0 for one per core. 1 runs everything on the calling thread.
    pub threads: usize,
    pub max_in_flight: Option<usize>,
    /// Resample the input to this rate before analysis.
    pub sample_rate: Option<u32>,
}

impl TranscriptionConfig {
    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.frame_length < 4 {
            return Err(TranscribeError::InvalidConfig(format!(
                "frame length {} is too small",
                analysis.frame_length
            )));
        }
        let hop = analysis.hop();
        if hop == 0 || hop >= analysis.frame_length {
            return Err(TranscribeError::InvalidConfig(format!(
                "hop size {} must be between 1 and {}",
                hop,
                analysis.frame_length - 1
            )));
        }

        let detection = &self.detection;
        if !(detection.cut_ratio < 0.0) {
            return Err(TranscribeError::InvalidConfig(format!(
                "cut ratio {} must be negative",
                detection.cut_ratio
            )));
        }
        if detection.note_low > detection.note_high {
            return Err(TranscribeError::InvalidConfig(format!(
                "note range {}..={} is empty",
                detection.note_low, detection.note_high
            )));
        }
        if detection.note_high as usize >= NOTE_COUNT {
            return Err(TranscribeError::InvalidConfig(format!(
                "highest note {} is not a MIDI note",
                detection.note_high
            )));
        }

        if self.runtime.max_in_flight == Some(0) {
            return Err(TranscribeError::InvalidConfig("in-flight bound must be at least 1".into()));
        }
        if self.runtime.sample_rate == Some(0) {
            return Err(TranscribeError::InvalidConfig("target sample rate must be positive".into()));
        }

        Ok(())
    }
}

/// Read a JSON configuration file. Missing fields take their defaults.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<TranscriptionConfig> {
    let file = File::open(path.as_ref())?;
    let config: TranscriptionConfig = serde_json::from_reader(BufReader::new(file))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TranscriptionConfig::default();
        assert_eq!(config.analysis.frame_length, 4096);
        assert_eq!(config.analysis.hop(), 512);
        assert_eq!(config.detection.cut_ratio, -5.0);
        assert_eq!(config.cleanup.short_notes.len(), 2);
        assert_eq!(config.cleanup.short_notes[1], NotePass { duration: 2, velocity: 28 });
        assert!(config.cleanup.long_notes.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{ "analysis": { "frame_length": 2048, "window": "hamming" },
                        "detection": { "threshold_mode": { "relative": { "ratio": 0.5 } } } }"#;
        let config: TranscriptionConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.analysis.frame_length, 2048);
        assert_eq!(config.analysis.hop(), 256);
        assert_eq!(config.analysis.window, WindowFunction::Hamming);
        assert_eq!(config.detection.threshold_mode, ThresholdMode::Relative { ratio: 0.5 });
        assert_eq!(config.detection.on_threshold, 8);
        assert!(config.cleanup.remove_octaves);
    }

    #[test]
    fn test_json_round_trip() {
        let mut config = TranscriptionConfig::default();
        config.cleanup.long_notes = Some(NotePass { duration: 400, velocity: 20 });
        config.detection.peak_suppression = PeakSuppression::Flank;
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: TranscriptionConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rejects_bad_hop() {
        let mut config = TranscriptionConfig::default();
        config.analysis.hop_size = Some(4096);
        assert!(matches!(config.validate(), Err(TranscribeError::InvalidConfig(_))));
        config.analysis.hop_size = Some(0);
        assert!(matches!(config.validate(), Err(TranscribeError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_detection() {
        let mut config = TranscriptionConfig::default();
        config.detection.cut_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = TranscriptionConfig::default();
        config.detection.note_low = 80;
        config.detection.note_high = 60;
        assert!(config.validate().is_err());

        let mut config = TranscriptionConfig::default();
        config.detection.note_high = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_in_flight() {
        let mut config = TranscriptionConfig::default();
        config.runtime.max_in_flight = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/audio-to-midi.json");
        assert!(matches!(result, Err(TranscribeError::Io(_))));
    }
}
