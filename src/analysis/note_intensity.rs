use serde::{Deserialize, Serialize};

use crate::config::DetectionConfig;
use crate::constants::{NOTE_COUNT, RELATIVE_CUT_RATIO};
use crate::postprocessing::helpers::pitch::{note_of, MIDI_FREQUENCIES};

/// Per-note velocity for one frame, 0 meaning silent.
pub type VelocityVector = [u8; NOTE_COUNT];

/// What to clear around a picked peak before looking for the next one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeakSuppression {
    /// Only the peak bin.
    #[default]
    SingleBin,
    /// The peak bin and the bins falling away from it on both sides.
    Flank,
}

/// Where the peak search starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// `10^cut_ratio`.
    #[default]
    Absolute,
    /// Mean power of the search range times `10^ratio`.
    Relative { ratio: f64 },
}

impl ThresholdMode {
    pub fn relative() -> Self {
        ThresholdMode::Relative { ratio: RELATIVE_CUT_RATIO }
    }
}

/// Bins `[i0, i1)` covering the notes `low..=high` for the given frame length.
///
/// # Arguments
///
/// * `frame_length` - FFT length `L`.
/// * `sample_rate` - Sample rate in Hz.
/// * `low` - Lowest MIDI note of interest.
/// * `high` - Highest MIDI note of interest.
///
/// # Returns
///
/// * The half-open bin range, clamped to `[1, L/2 - 1]`. Empty when the notes
///   fall outside the analysable band.
pub fn search_bin_range(frame_length: usize, sample_rate: f64, low: u8, high: u8) -> (usize, usize) {
    let t0 = frame_length as f64 / sample_rate;
    let upper_limit = (frame_length / 2).saturating_sub(1);

    let low_bin = (MIDI_FREQUENCIES[low as usize] * t0 - 0.5).max(0.0) as usize;
    let high_bin = (MIDI_FREQUENCIES[high as usize] * t0 - 0.5).max(0.0) as usize + 1;

    let i0 = low_bin.max(1);
    let i1 = high_bin.min(upper_limit);
    (i0, i1.max(i0))
}

/// Peak picker turning a power spectrum into note velocities.
#[derive(Debug, Clone)]
pub struct NoteIntensity {
    cut_ratio: f64,
    threshold_mode: ThresholdMode,
    suppression: PeakSuppression,
    note_low: i32,
    note_high: i32,
    bin_range: (usize, usize),
}

impl NoteIntensity {
    pub fn new(config: &DetectionConfig, frame_length: usize, sample_rate: f64) -> Self {
        let bin_range = search_bin_range(frame_length, sample_rate, config.note_low, config.note_high);
        log::debug!(
            "searching bins {}..{} for notes {}..={}",
            bin_range.0,
            bin_range.1,
            config.note_low,
            config.note_high
        );

        Self {
            cut_ratio: config.cut_ratio,
            threshold_mode: config.threshold_mode,
            suppression: config.peak_suppression,
            note_low: config.note_low as i32,
            note_high: config.note_high as i32,
            bin_range,
        }
    }

    pub fn bin_range(&self) -> (usize, usize) {
        self.bin_range
    }

    fn threshold(&self, power: &[f64]) -> f64 {
        let (i0, i1) = self.bin_range;
        match self.threshold_mode {
            ThresholdMode::Absolute => 10f64.powf(self.cut_ratio),
            ThresholdMode::Relative { ratio } => {
                let mean = power[i0..i1].iter().sum::<f64>() / (i1 - i0) as f64;
                mean * 10f64.powf(ratio)
            }
        }
    }

    /// Velocity for a peak of power `p`, `None` below the cut.
    fn velocity_of(&self, p: f64) -> Option<u8> {
        let v = 127.0 / (-self.cut_ratio) * (p.log10() - self.cut_ratio);
        if v >= 128.0 {
            Some(127)
        } else if v > 0.0 {
            Some(v as u8)
        } else {
            None
        }
    }

    /// Pick peaks out of `power` (which is consumed) until none rises above
    /// the threshold, writing one velocity per note into `velocity`.
    ///
    /// # Arguments
    ///
    /// * `power` - Power per bin, zeroed in place as peaks are taken.
    /// * `frequency` - Frequency per bin in Hz.
    /// * `velocity` - Output, cleared first.
    pub fn estimate(&self, power: &mut [f64], frequency: &[f64], velocity: &mut VelocityVector) {
        velocity.fill(0);

        let (i0, i1) = self.bin_range;
        if i0 >= i1 {
            return;
        }
        let threshold = self.threshold(power);

        loop {
            let mut max = threshold;
            let mut peak = None;
            for (i, &p) in power.iter().enumerate().take(i1).skip(i0) {
                if p > max {
                    max = p;
                    peak = Some(i);
                }
            }
            let Some(peak) = peak else {
                break;
            };

            if let Some(note) = note_of(frequency[peak]) {
                if (self.note_low..=self.note_high).contains(&note) && velocity[note as usize] == 0 {
                    if let Some(v) = self.velocity_of(power[peak]) {
                        velocity[note as usize] = v;
                    }
                }
            }

            match self.suppression {
                PeakSuppression::SingleBin => power[peak] = 0.0,
                PeakSuppression::Flank => suppress_flanks(power, peak, i0, i1),
            }
        }
    }
}

/// Zero the peak and the descending run on either side of it, staying inside
/// `[i0, i1)`.
fn suppress_flanks(power: &mut [f64], peak: usize, i0: usize, i1: usize) {
    power[peak] = 0.0;

    let mut i = peak + 1;
    while i + 1 < i1 && power[i] != 0.0 && power[i] >= power[i + 1] {
        power[i] = 0.0;
        i += 1;
    }
    if i + 1 == i1 {
        power[i] = 0.0;
    }

    if peak == i0 {
        return;
    }
    let mut i = peak - 1;
    while i > i0 && power[i] != 0.0 && power[i - 1] <= power[i] {
        power[i] = 0.0;
        i -= 1;
    }
    if i == i0 {
        power[i] = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: usize = 4096;
    const RATE: f64 = 44100.0;

    fn nominal_frequencies() -> Vec<f64> {
        (0..=LEN / 2).map(|i| i as f64 / LEN as f64 * RATE).collect()
    }

    fn estimator(config: DetectionConfig) -> NoteIntensity {
        NoteIntensity::new(&config, LEN, RATE)
    }

    #[test]
    fn test_default_bin_range() {
        let (i0, i1) = search_bin_range(LEN, RATE, 0, 127);
        assert_eq!(i0, 1);
        // 12543.85 Hz * 4096 / 44100 - 0.5 = 1164.56
        assert_eq!(i1, 1165);
    }

    #[test]
    fn test_bin_range_clamped_to_nyquist() {
        let (_, i1) = search_bin_range(1024, 8000.0, 0, 127);
        assert_eq!(i1, 511);
    }

    #[test]
    fn test_silence_yields_zero_vector() {
        let estimator = estimator(DetectionConfig::default());
        let mut power = vec![0.0; LEN / 2 + 1];
        let mut velocity = [9u8; NOTE_COUNT];
        estimator.estimate(&mut power, &nominal_frequencies(), &mut velocity);
        assert!(velocity.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_single_peak_velocity() {
        let estimator = estimator(DetectionConfig::default());
        let mut frequency = nominal_frequencies();
        frequency[41] = 440.0;
        let mut power = vec![0.0; LEN / 2 + 1];
        power[41] = 1e-2;
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &frequency, &mut velocity);

        // 127 / 5 * (-2 + 5) = 76.2
        assert_eq!(velocity[69], 76);
        assert_eq!(velocity.iter().filter(|&&v| v > 0).count(), 1);
        assert_eq!(power[41], 0.0);
    }

    #[test]
    fn test_full_scale_peak_clamps_to_127() {
        let estimator = estimator(DetectionConfig::default());
        let mut frequency = nominal_frequencies();
        frequency[41] = 440.0;
        let mut power = vec![0.0; LEN / 2 + 1];
        power[41] = 10.0;
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &frequency, &mut velocity);
        assert_eq!(velocity[69], 127);
    }

    #[test]
    fn test_strongest_peak_wins_shared_note() {
        let estimator = estimator(DetectionConfig::default());
        let mut frequency = nominal_frequencies();
        frequency[40] = 438.0;
        frequency[41] = 441.0;
        let mut power = vec![0.0; LEN / 2 + 1];
        power[40] = 1e-4;
        power[41] = 1e-1;
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &frequency, &mut velocity);

        // 127 / 5 * 4 = 101.6
        assert_eq!(velocity[69], 101);
        assert!(power.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_notes_outside_range_are_skipped() {
        let config = DetectionConfig { note_low: 60, note_high: 72, ..DetectionConfig::default() };
        let estimator = estimator(config);
        let frequency = nominal_frequencies();
        let mut power = vec![0.0; LEN / 2 + 1];
        // bin 41 is ~441 Hz (note 69), bin 93 is ~1001 Hz (note 83)
        power[41] = 1e-2;
        power[93] = 1e-2;
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &frequency, &mut velocity);
        assert!(velocity[69] > 0);
        assert_eq!(velocity[83], 0);
    }

    #[test]
    fn test_peak_below_cut_is_ignored() {
        let estimator = estimator(DetectionConfig::default());
        let mut power = vec![0.0; LEN / 2 + 1];
        power[41] = 1e-6;
        let mut velocity = [0u8; NOTE_COUNT];
        estimator.estimate(&mut power, &nominal_frequencies(), &mut velocity);
        assert!(velocity.iter().all(|&v| v == 0));
        assert_eq!(power[41], 1e-6);
    }

    fn shoulder_spectrum() -> Vec<f64> {
        // bins 40..=41 land on note 69, bin 39 on note 68
        let mut power = vec![0.0; LEN / 2 + 1];
        power[39] = 1e-3;
        power[40] = 5e-3;
        power[41] = 1e-2;
        power
    }

    #[test]
    fn test_single_bin_picks_shoulder_as_own_note() {
        let estimator = estimator(DetectionConfig::default());
        let mut power = shoulder_spectrum();
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &nominal_frequencies(), &mut velocity);
        assert_eq!(velocity[69], 76);
        // 127 / 5 * 2 = 50.8
        assert_eq!(velocity[68], 50);
    }

    #[test]
    fn test_flank_suppression_swallows_shoulder() {
        let config = DetectionConfig { peak_suppression: PeakSuppression::Flank, ..DetectionConfig::default() };
        let estimator = estimator(config);
        let mut power = shoulder_spectrum();
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &nominal_frequencies(), &mut velocity);
        assert_eq!(velocity[69], 76);
        assert_eq!(velocity[68], 0);
    }

    #[test]
    fn test_flank_suppression_clears_lobe() {
        let config = DetectionConfig { peak_suppression: PeakSuppression::Flank, ..DetectionConfig::default() };
        let estimator = estimator(config);
        let frequency = nominal_frequencies();
        let mut power = vec![0.0; LEN / 2 + 1];
        power[38] = 1e-4;
        power[39] = 1e-3;
        power[40] = 1e-2;
        power[41] = 1e-1;
        power[42] = 1e-2;
        power[43] = 1e-3;
        let mut velocity = [0u8; NOTE_COUNT];

        estimator.estimate(&mut power, &frequency, &mut velocity);
        assert!(velocity[69] > 0);
        assert_eq!(velocity.iter().filter(|&&v| v > 0).count(), 1);
        assert!(power.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn test_flank_suppression_at_range_edges() {
        let mut power = vec![5.0, 4.0, 3.0, 9.0, 2.0, 1.0, 7.0];
        suppress_flanks(&mut power, 1, 1, 6);
        assert_eq!(power, vec![5.0, 0.0, 3.0, 9.0, 2.0, 1.0, 7.0]);

        let mut power = vec![5.0, 2.0, 3.0, 9.0, 2.0, 1.0, 7.0];
        suppress_flanks(&mut power, 3, 1, 6);
        assert_eq!(power, vec![5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 7.0]);

        // a rising neighbour ends the flank
        let mut power = vec![5.0, 4.0, 3.0, 9.0, 2.0, 1.0, 7.0];
        suppress_flanks(&mut power, 3, 1, 6);
        assert_eq!(power, vec![5.0, 4.0, 3.0, 0.0, 0.0, 0.0, 7.0]);
    }

    #[test]
    fn test_relative_threshold_follows_mean() {
        let config = DetectionConfig { threshold_mode: ThresholdMode::relative(), ..DetectionConfig::default() };
        let estimator = estimator(config);
        let (i0, i1) = estimator.bin_range();
        let frequency = nominal_frequencies();

        // uniform floor: nothing rises ten times above the mean
        let mut power = vec![1e-3; LEN / 2 + 1];
        let mut velocity = [0u8; NOTE_COUNT];
        estimator.estimate(&mut power, &frequency, &mut velocity);
        assert!(velocity.iter().all(|&v| v == 0));

        let mut power = vec![0.0; LEN / 2 + 1];
        power[i0..i1].fill(1e-4);
        power[41] = 1e-2;
        estimator.estimate(&mut power, &frequency, &mut velocity);
        assert_eq!(velocity.iter().filter(|&&v| v > 0).count(), 1);
        assert!(velocity[69] > 0);
    }
}
