use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Analysis window applied to every frame before the Fourier transform.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    #[default]
    Hann,
    Hamming,
}

impl WindowFunction {
    /// Taper coefficient for sample `i` of an `n`-sample frame.
    pub fn coefficient(self, i: usize, n: usize) -> f64 {
        let phase = 2.0 * PI * i as f64 / (n - 1) as f64;
        match self {
            WindowFunction::Hann => 0.5 * (1.0 - phase.cos()),
            WindowFunction::Hamming => 0.54 - 0.46 * phase.cos(),
        }
    }

    pub fn coefficients(self, n: usize) -> Vec<f64> {
        (0..n).map(|i| self.coefficient(i, n)).collect()
    }

    /// Power normalization denominator: the summed squared coefficients times `n`.
    pub fn energy(self, n: usize) -> f64 {
        let sum: f64 = (0..n).map(|i| self.coefficient(i, n).powi(2)).sum();
        sum * n as f64
    }
}
