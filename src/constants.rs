// Analysis
pub const FRAME_LENGTH: usize = 4096;
pub const HOP_DIVISOR: usize = 8;
pub const NOTE_COUNT: usize = 128;

// Note detection
pub const CUT_RATIO: f64 = -5.0;
pub const RELATIVE_CUT_RATIO: f64 = 1.0;
pub const ON_THRESHOLD: u8 = 8;
pub const OFF_THRESHOLD: u8 = 0;
/// 128 can never be reached by a velocity delta, so re-attacks are off by default.
pub const PEAK_THRESHOLD: u8 = 128;
pub const NOTE_LOW: u8 = 0;
pub const NOTE_HIGH: u8 = 127;
pub const RELEASE_VELOCITY: u8 = 64;

// Cleanup
pub const SHORT_NOTE_PASSES: [(u32, u8); 2] = [(1, 64), (2, 28)];

// MIDI Conversion
pub const A4_NOTE: f64 = 69.0;
pub const A4_FREQUENCY: f64 = 440.0;
pub const TEMPO_MICROS_PER_QUARTER: u32 = 500_000;

// Runtime
pub const IN_FLIGHT_PER_THREAD: usize = 3;
pub const PROGRESS_INTERVAL_SECONDS: f64 = 10.0;
