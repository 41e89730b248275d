pub mod analysis {
    pub mod note_intensity;
    pub mod parallel_windower;
    pub mod phase_vocoder;
    pub mod spectral_transform;
    pub mod window_function;
}
pub mod config;
pub mod constants;
pub mod error;
pub mod pipeline;
pub mod preprocessing {
    pub mod load_audio;
    pub mod windowed_audio;
}
pub mod postprocessing {
    pub mod helpers {
        pub mod pitch;
    }
    pub mod cleanup;
    pub mod midi;
    pub mod note_events;
}

pub use config::{load_config, TranscriptionConfig};
pub use error::{Result, TranscribeError};
pub use pipeline::{Transcriber, Transcription};
