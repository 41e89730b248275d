use std::f64::consts::{PI, TAU};

use crate::analysis::spectral_transform::SpectralEstimate;

/// Smoothed power and instantaneous frequency (Hz) per bin.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedFrame {
    pub power: Vec<f64>,
    pub frequency: Vec<f64>,
}

/// Wrap a phase difference into `[-π, π)`.
///
/// Agrees with repeatedly adding or subtracting 2π until the value lands in
/// range, including at the `-π` boundary where a sign-symmetric `%` would
/// return `+π`.
pub fn wrap_phase(d: f64) -> f64 {
    let wrapped = (d + PI).rem_euclid(TAU) - PI;
    // rem_euclid may round up to exactly TAU
    if wrapped >= PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

/// Sequential frequency corrector. Feed it every frame of a stream in order.
pub struct PhaseVocoder {
    frame_length: usize,
    hop_size: usize,
    sample_rate: f64,
    previous: Option<SpectralEstimate>,
}

impl PhaseVocoder {
    pub fn new(frame_length: usize, hop_size: usize, sample_rate: f64) -> Self {
        Self {
            frame_length,
            hop_size,
            sample_rate,
            previous: None,
        }
    }

    /// Centre frequency of bin `i`.
    fn nominal_frequency(&self, bin: usize) -> f64 {
        bin as f64 / self.frame_length as f64 * self.sample_rate
    }

    /// Correct the next frame against the previous one. The first frame gets
    /// nominal bin frequencies and its own power.
    pub fn correct(&mut self, estimate: SpectralEstimate) -> CorrectedFrame {
        let bins = estimate.bins();
        let len = self.frame_length as f64;
        let hop = self.hop_size as f64;

        let corrected = match self.previous.as_ref() {
            None => CorrectedFrame {
                power: estimate.power.clone(),
                frequency: (0..bins).map(|i| self.nominal_frequency(i)).collect(),
            },
            Some(previous) => {
                let mut power = Vec::with_capacity(bins);
                let mut frequency = Vec::with_capacity(bins);
                for i in 0..bins {
                    let expected = TAU * i as f64 / len * hop;
                    let d = wrap_phase(estimate.phase[i] - previous.phase[i] - expected);
                    let deviation = d / (TAU * hop);
                    frequency.push((i as f64 / len + deviation) * self.sample_rate);

                    let amplitude = (estimate.power[i].sqrt() + previous.power[i].sqrt()) / 2.0;
                    power.push(amplitude * amplitude);
                }
                CorrectedFrame { power, frequency }
            }
        };

        self.previous = Some(estimate);
        corrected
    }

    /// Pass a frame through without correction: raw power, nominal bin
    /// frequencies.
    pub fn nominal(&self, estimate: SpectralEstimate) -> CorrectedFrame {
        let frequency = (0..estimate.bins()).map(|i| self.nominal_frequency(i)).collect();
        CorrectedFrame {
            power: estimate.power,
            frequency,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::spectral_transform::{FrameAnalyzer, SpectralTransform};
    use crate::analysis::window_function::WindowFunction;
    use crate::preprocessing::windowed_audio::window_audio;
    use approx::assert_relative_eq;
    use rand::Rng;

    fn wrap_phase_iterative(mut d: f64) -> f64 {
        while d >= PI {
            d -= TAU;
        }
        while d < -PI {
            d += TAU;
        }
        d
    }

    #[test]
    fn test_wrap_matches_iterative_reduction() {
        let mut rng = rand::rng();
        for _ in 0..100_000 {
            let d = rng.random_range(-3.0 * PI..3.0 * PI);
            assert_relative_eq!(wrap_phase(d), wrap_phase_iterative(d), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_wrap_boundaries() {
        assert_eq!(wrap_phase(-PI), -PI);
        assert_relative_eq!(wrap_phase(PI), -PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(0.5), 0.5, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(0.5 + 4.0 * PI), 0.5, epsilon = 1e-12);
        for d in [-3.0 * PI, -PI, 0.0, PI, 3.0 * PI] {
            let w = wrap_phase(d);
            assert!((-PI..PI).contains(&w), "{} wrapped to {}", d, w);
        }
    }

    #[test]
    fn test_first_frame_uses_nominal_frequencies() {
        let mut vocoder = PhaseVocoder::new(8, 2, 800.0);
        let estimate = SpectralEstimate {
            power: vec![1.0, 2.0, 3.0, 4.0, 5.0],
            phase: vec![0.0, 0.3, -0.2, 1.0, 0.0],
        };
        let corrected = vocoder.correct(estimate.clone());

        assert_eq!(corrected.power, estimate.power);
        assert_eq!(corrected.frequency, vec![0.0, 100.0, 200.0, 300.0, 400.0]);
    }

    #[test]
    fn test_power_is_smoothed_in_amplitude() {
        let mut vocoder = PhaseVocoder::new(8, 2, 800.0);
        vocoder.correct(SpectralEstimate { power: vec![4.0; 5], phase: vec![0.0; 5] });
        let corrected = vocoder.correct(SpectralEstimate { power: vec![16.0; 5], phase: vec![0.0; 5] });

        // ((2 + 4) / 2)^2
        for &p in &corrected.power {
            assert_relative_eq!(p, 9.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_state_tracks_raw_frame_not_smoothed() {
        let mut vocoder = PhaseVocoder::new(8, 2, 800.0);
        vocoder.correct(SpectralEstimate { power: vec![0.0; 5], phase: vec![0.0; 5] });
        vocoder.correct(SpectralEstimate { power: vec![4.0; 5], phase: vec![0.0; 5] });
        let third = vocoder.correct(SpectralEstimate { power: vec![4.0; 5], phase: vec![0.0; 5] });

        for &p in &third.power {
            assert_relative_eq!(p, 4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_recovers_off_bin_sinusoid() {
        let sample_rate = 8000.0;
        let len = 1024;
        let hop = 128;
        let freq = 1234.5;
        let samples: Vec<f64> = (0..len * 4)
            .map(|i| 0.3 * (TAU * freq * i as f64 / sample_rate).sin())
            .collect();

        let transform = SpectralTransform::new(WindowFunction::Hann, len);
        let mut vocoder = PhaseVocoder::new(len, hop, sample_rate);
        let mut last = None;
        for frame in window_audio(samples, len, hop).take(3) {
            last = Some(vocoder.correct(transform.analyze(&frame).unwrap()));
        }
        let corrected = last.unwrap();

        let peak = corrected
            .power
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // nominal resolution is ~7.8 Hz, the corrected estimate is far tighter
        assert_relative_eq!(corrected.frequency[peak], freq, epsilon = 0.05);
        assert_relative_eq!(corrected.frequency[peak + 1], freq, epsilon = 0.05);
    }

    #[test]
    fn test_nominal_passthrough() {
        let vocoder = PhaseVocoder::new(8, 2, 800.0);
        let corrected = vocoder.nominal(SpectralEstimate { power: vec![1.0; 5], phase: vec![0.4; 5] });
        assert_eq!(corrected.power, vec![1.0; 5]);
        assert_eq!(corrected.frequency[4], 400.0);
    }
}
