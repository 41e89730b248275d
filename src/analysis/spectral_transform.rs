//! Windowed real FFT producing per-bin power and phase.
//!
//! The forward transform is packed into the half-complex layout (real parts
//! in `X[0..=L/2]`, the imaginary part of bin `i` in `X[L - i]`) before the
//! polar conversion, so the normalization and sign conventions are the same
//! for every frame length.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use realfft::num_complex::Complex64;
use realfft::{RealFftPlanner, RealToComplex};

use crate::analysis::window_function::WindowFunction;
use crate::error::{Result, TranscribeError};
use crate::preprocessing::windowed_audio::Frame;

/// Power and phase of one frame, `L/2 + 1` bins each.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectralEstimate {
    pub power: Vec<f64>,
    pub phase: Vec<f64>,
}

impl SpectralEstimate {
    pub fn bins(&self) -> usize {
        self.power.len()
    }
}

/// Turns a frame into a spectral estimate. Implementations run on worker
/// threads, one frame per call.
pub trait FrameAnalyzer: Send + Sync + 'static {
    fn analyze(&self, frame: &Frame) -> Result<SpectralEstimate>;
}

struct WorkerPlan {
    fft: Arc<dyn RealToComplex<f64>>,
    input: Vec<f64>,
    spectrum: Vec<Complex64>,
    scratch: Vec<Complex64>,
    half_complex: Vec<f64>,
}

struct WorkerPlans {
    planner: RealFftPlanner<f64>,
    plans: HashMap<usize, WorkerPlan>,
}

impl WorkerPlans {
    fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
            plans: HashMap::new(),
        }
    }

    fn get(&mut self, length: usize) -> &mut WorkerPlan {
        let planner = &mut self.planner;
        self.plans.entry(length).or_insert_with(|| {
            log::debug!(
                "planning {}-point FFT on {}",
                length,
                std::thread::current().name().unwrap_or("unnamed thread")
            );
            let fft = planner.plan_fft_forward(length);
            WorkerPlan {
                input: fft.make_input_vec(),
                spectrum: fft.make_output_vec(),
                scratch: fft.make_scratch_vec(),
                half_complex: vec![0.0; length],
                fft,
            }
        })
    }
}

thread_local! {
    // Lives as long as the worker thread, so the pool's shutdown releases it.
    static WORKER_PLANS: RefCell<WorkerPlans> = RefCell::new(WorkerPlans::new());
}

#[derive(Debug, Clone)]
pub struct SpectralTransform {
    window: Arc<[f64]>,
    energy: f64,
    conjugate: bool,
}

impl SpectralTransform {
    pub fn new(window: WindowFunction, frame_length: usize) -> Self {
        Self {
            window: window.coefficients(frame_length).into(),
            energy: window.energy(frame_length),
            conjugate: false,
        }
    }

    /// Negate the imaginary part before taking the phase.
    pub fn with_conjugate(mut self, conjugate: bool) -> Self {
        self.conjugate = conjugate;
        self
    }

    pub fn frame_length(&self) -> usize {
        self.window.len()
    }

    pub fn energy(&self) -> f64 {
        self.energy
    }
}

impl FrameAnalyzer for SpectralTransform {
    fn analyze(&self, frame: &Frame) -> Result<SpectralEstimate> {
        let length = self.window.len();
        if frame.samples.len() != length {
            return Err(TranscribeError::Transform {
                frame: frame.index,
                reason: format!("expected {} samples, got {}", length, frame.samples.len()),
            });
        }

        WORKER_PLANS.with(|plans| {
            let mut plans = plans.borrow_mut();
            let plan = plans.get(length);

            for ((dst, &sample), &w) in plan.input.iter_mut().zip(&frame.samples).zip(self.window.iter()) {
                *dst = sample * w;
            }

            plan.fft
                .process_with_scratch(&mut plan.input, &mut plan.spectrum, &mut plan.scratch)
                .map_err(|e| TranscribeError::Transform {
                    frame: frame.index,
                    reason: e.to_string(),
                })?;

            pack_half_complex(&plan.spectrum, &mut plan.half_complex);

            let bins = length / 2 + 1;
            let mut estimate = SpectralEstimate {
                power: vec![0.0; bins],
                phase: vec![0.0; bins],
            };
            half_complex_to_polar(
                &plan.half_complex,
                self.energy,
                self.conjugate,
                &mut estimate.power,
                &mut estimate.phase,
            );
            Ok(estimate)
        })
    }
}

/// Pack a real-input spectrum (`L/2 + 1` complex bins) into the
/// half-complex layout of length `L`.
pub fn pack_half_complex(spectrum: &[Complex64], half_complex: &mut [f64]) {
    let len = half_complex.len();
    half_complex[0] = spectrum[0].re;
    for i in 1..(len + 1) / 2 {
        half_complex[i] = spectrum[i].re;
        half_complex[len - i] = spectrum[i].im;
    }
    if len % 2 == 0 {
        half_complex[len / 2] = spectrum[len / 2].re;
    }
}

/// Convert a half-complex spectrum to power (`|X|^2 / den`) and phase per bin.
pub fn half_complex_to_polar(
    half_complex: &[f64],
    den: f64,
    conjugate: bool,
    power: &mut [f64],
    phase: &mut [f64],
) {
    let len = half_complex.len();

    power[0] = half_complex[0] * half_complex[0] / den;
    phase[0] = 0.0;
    for i in 1..(len + 1) / 2 {
        let re = half_complex[i];
        let im = half_complex[len - i];
        power[i] = (re * re + im * im) / den;
        phase[i] = if power[i] > 0.0 {
            if conjugate {
                (-im).atan2(re)
            } else {
                im.atan2(re)
            }
        } else {
            0.0
        };
    }
    if len % 2 == 0 {
        power[len / 2] = half_complex[len / 2] * half_complex[len / 2] / den;
        phase[len / 2] = 0.0;
    }
}
