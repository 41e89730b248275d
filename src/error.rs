//! Error types for transcription

use thiserror::Error;

/// Transcription errors
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("Failed to read audio: {0}")]
    Audio(#[from] hound::Error),

    #[error("Unsupported channel count: {0} (only mono and stereo inputs are supported)")]
    UnsupportedChannels(u16),

    #[error("Malformed audio data: {0}")]
    MalformedAudio(String),

    #[error("Sample rate conversion failed: {0}")]
    Resample(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("Spectral transform failed on frame {frame}: {reason}")]
    Transform { frame: usize, reason: String },

    #[error("Worker panicked while analysing frame {0}")]
    WorkerPanicked(usize),

    #[error("Worker for frame {0} exited without a result")]
    WorkerLost(usize),

    #[error("Frame producer panicked")]
    ProducerPanicked,

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Too many frames for a MIDI timeline: {0}")]
    TooManyFrames(usize),

    #[error("Failed to write MIDI: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for transcription operations
pub type Result<T> = std::result::Result<T, TranscribeError>;
