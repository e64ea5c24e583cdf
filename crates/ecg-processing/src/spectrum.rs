//! Frequency-domain view of a captured signal

use ecg_core::{EcgError, EcgResult, Voltage};
use num_complex::Complex;
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Floor added to magnitudes before taking the logarithm
const MAGNITUDE_FLOOR: f32 = 1e-10;

/// Positive-frequency magnitude spectrum in dB
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    pub frequencies_hz: Vec<f32>,
    pub magnitude_db: Vec<f32>,
}

impl Spectrum {
    pub fn len(&self) -> usize {
        self.frequencies_hz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frequencies_hz.is_empty()
    }

    /// Frequency resolution in Hz
    pub fn bin_width_hz(&self) -> f32 {
        self.frequencies_hz.get(1).copied().unwrap_or(0.0)
    }

    /// Strongest bin, ignoring DC
    pub fn dominant_frequency(&self) -> Option<f32> {
        self.magnitude_db
            .iter()
            .enumerate()
            .skip(1)
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, _)| self.frequencies_hz[i])
    }

    /// Magnitude of the bin closest to `frequency_hz`
    pub fn magnitude_at(&self, frequency_hz: f32) -> Option<f32> {
        let width = self.bin_width_hz();
        if width <= 0.0 {
            return None;
        }
        let index = (frequency_hz / width).round() as usize;
        self.magnitude_db.get(index).copied()
    }

    /// (frequency, magnitude) pairs for plotting
    pub fn points(&self) -> impl Iterator<Item = [f64; 2]> + '_ {
        self.frequencies_hz
            .iter()
            .zip(&self.magnitude_db)
            .map(|(&f, &m)| [f as f64, m as f64])
    }
}

/// Spectrum analyzer reusing FFT plans across calls
pub struct SpectrumAnalyzer {
    planner: RealFftPlanner<f32>,
}

impl SpectrumAnalyzer {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
        }
    }

    /// Magnitude spectrum of the whole signal, `n/2` bins
    pub fn magnitude_spectrum_db(
        &mut self,
        signal: &[Voltage],
        sample_rate_hz: f32,
    ) -> EcgResult<Spectrum> {
        let n = signal.len();
        if n < 2 {
            return Ok(Spectrum::default());
        }

        let fft = self.planner.plan_fft_forward(n);
        let mut input = signal.to_vec();
        let mut output: Vec<Complex<f32>> = fft.make_output_vec();
        fft.process(&mut input, &mut output)
            .map_err(|e| EcgError::InvalidConfig {
                reason: format!("spectrum of {} samples failed: {}", n, e),
            })?;

        let resolution = sample_rate_hz / n as f32;
        let bins = n / 2;

        Ok(Spectrum {
            frequencies_hz: (0..bins).map(|k| k as f32 * resolution).collect(),
            magnitude_db: output[..bins]
                .iter()
                .map(|c| 20.0 * (c.norm() + MAGNITUDE_FLOOR).log10())
                .collect(),
        })
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// One-shot spectrum of `signal`
pub fn magnitude_spectrum_db(signal: &[Voltage], sample_rate_hz: f32) -> EcgResult<Spectrum> {
    SpectrumAnalyzer::new().magnitude_spectrum_db(signal, sample_rate_hz)
}
