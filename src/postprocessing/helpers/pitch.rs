use std::f64::consts::LN_2;
use std::sync::LazyLock;

use crate::constants::{A4_FREQUENCY, A4_NOTE, NOTE_COUNT};

/// 12 / ln(2): semitones per unit of natural log frequency.
const SEMITONES_PER_NEPER: f64 = 12.0 / LN_2;

/// Equal-tempered frequency of every MIDI note, A4 (69) = 440 Hz.
pub static MIDI_FREQUENCIES: LazyLock<[f64; NOTE_COUNT]> = LazyLock::new(|| {
    let mut table = [0.0; NOTE_COUNT];
    for (note, freq) in table.iter_mut().enumerate() {
        *freq = midi_to_hz(note as f64);
    }
    table
});

/// Converts a MIDI pitch to the corresponding frequency in Hz.
///
/// # Arguments
///
/// * `midi` - A MIDI pitch.
///
/// # Returns
///
/// * The corresponding frequency in Hz.
pub fn midi_to_hz(midi: f64) -> f64 {
    A4_FREQUENCY * 2.0f64.powf((midi - A4_NOTE) / 12.0)
}

/// Maps a frequency to the MIDI note whose semitone band contains it.
///
/// The note is `trunc(69.5 + 12/ln2 * ln(freq / 440))`, so each note owns
/// the half-open band from half a semitone below to half a semitone above
/// its centre. Returns `None` for non-positive or non-finite frequencies.
/// The result is not range-checked: very low or high frequencies produce
/// numbers outside 0..=127.
pub fn note_of(freq: f64) -> Option<i32> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    let note = A4_NOTE + 0.5 + SEMITONES_PER_NEPER * (freq / A4_FREQUENCY).ln();
    Some(note as i32)
}
