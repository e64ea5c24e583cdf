//! Digital filters for ECG conditioning
//!
//! Both filters are single second-order IIR sections evaluated one sample at
//! a time, so the per-sample cost is fixed and history carries over between
//! capture blocks.

use crate::processor::SampleFilter;
use ecg_core::Voltage;
use num_complex::Complex;
use serde::{Deserialize, Serialize};

/// Coefficients of `y = b0*x + b1*x1 + b2*x2 - a1*y1 - a2*y2` (a0 normalized to 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BiquadCoefficients {
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    pub a1: f32,
    pub a2: f32,
}

/// Second-order bandpass, roughly 0.5-35 Hz at a 1000 Hz sample rate
///
/// Removes baseline wander below the passband and muscle/mains noise above
/// it. DC gain is exactly zero (`b0 + b1 + b2 == 0`).
pub const BANDPASS_0_5_35HZ_AT_1KHZ: BiquadCoefficients = BiquadCoefficients {
    b0: 0.0675,
    b1: 0.0,
    b2: -0.0675,
    a1: -1.8650,
    a2: 0.8651,
};

impl BiquadCoefficients {
    /// Pass-through section
    pub const IDENTITY: BiquadCoefficients = BiquadCoefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// Notch (band-reject) section centred on `frequency_hz`
    pub fn notch(frequency_hz: f32, q: f32, sample_rate_hz: f32) -> Self {
        let omega = 2.0 * std::f32::consts::PI * frequency_hz / sample_rate_hz;
        let alpha = omega.sin() / (2.0 * q);
        let cos_omega = omega.cos();
        let a0 = 1.0 + alpha;

        Self {
            b0: 1.0 / a0,
            b1: -2.0 * cos_omega / a0,
            b2: 1.0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Magnitude response at `frequency_hz`
    pub fn gain_at(&self, frequency_hz: f32, sample_rate_hz: f32) -> f32 {
        let omega = 2.0 * std::f64::consts::PI * frequency_hz as f64 / sample_rate_hz as f64;
        let z1 = Complex::from_polar(1.0, -omega);
        let z2 = z1 * z1;

        let numerator = z1 * self.b1 as f64 + z2 * self.b2 as f64 + self.b0 as f64;
        let denominator = z1 * self.a1 as f64 + z2 * self.a2 as f64 + 1.0;
        (numerator / denominator).norm() as f32
    }
}

/// Two past inputs and two past outputs of a section
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FilterState {
    pub x1: Voltage,
    pub x2: Voltage,
    pub y1: Voltage,
    pub y2: Voltage,
}

impl FilterState {
    pub fn is_zero(&self) -> bool {
        *self == FilterState::default()
    }
}

/// Single biquad section (2nd order, direct form I)
#[derive(Debug, Clone)]
pub struct Biquad {
    coefficients: BiquadCoefficients,
    state: FilterState,
}

impl Biquad {
    pub fn new(coefficients: BiquadCoefficients) -> Self {
        Self {
            coefficients,
            state: FilterState::default(),
        }
    }

    #[inline]
    pub fn process_sample(&mut self, input: Voltage) -> Voltage {
        let c = &self.coefficients;
        let s = &mut self.state;

        let output = c.b0 * input + c.b1 * s.x1 + c.b2 * s.x2 - c.a1 * s.y1 - c.a2 * s.y2;

        s.x2 = s.x1;
        s.x1 = input;
        s.y2 = s.y1;
        s.y1 = output;

        output
    }

    pub fn reset(&mut self) {
        self.state = FilterState::default();
    }

    pub fn state(&self) -> &FilterState {
        &self.state
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coefficients
    }
}

/// Fixed-coefficient ECG bandpass filter
#[derive(Debug, Clone)]
pub struct BandpassFilter {
    section: Biquad,
}

impl BandpassFilter {
    /// Bandpass with the built-in 0.5-35 Hz coefficients
    pub fn new() -> Self {
        Self {
            section: Biquad::new(BANDPASS_0_5_35HZ_AT_1KHZ),
        }
    }

    pub fn state(&self) -> &FilterState {
        self.section.state()
    }

    pub fn coefficients(&self) -> &BiquadCoefficients {
        self.section.coefficients()
    }
}

impl Default for BandpassFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleFilter for BandpassFilter {
    fn process(&mut self, input: Voltage) -> Voltage {
        self.section.process_sample(input)
    }

    fn reset(&mut self) {
        self.section.reset();
    }

    fn name(&self) -> &str {
        "bandpass"
    }
}

/// Notch filter for powerline interference
#[derive(Debug, Clone)]
pub struct NotchFilter {
    section: Biquad,
    frequency_hz: f32,
    q: f32,
}

impl NotchFilter {
    pub fn new(frequency_hz: f32, q: f32, sample_rate_hz: f32) -> Self {
        Self {
            section: Biquad::new(BiquadCoefficients::notch(frequency_hz, q, sample_rate_hz)),
            frequency_hz,
            q,
        }
    }

    pub fn frequency_hz(&self) -> f32 {
        self.frequency_hz
    }

    pub fn q(&self) -> f32 {
        self.q
    }

    pub fn state(&self) -> &FilterState {
        self.section.state()
    }
}

impl SampleFilter for NotchFilter {
    fn process(&mut self, input: Voltage) -> Voltage {
        self.section.process_sample(input)
    }

    fn reset(&mut self) {
        self.section.reset();
    }

    fn name(&self) -> &str {
        "notch"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| (2.0 * PI * freq * i as f32 / 1000.0).sin())
            .collect()
    }

    fn settled_amplitude(filter: &mut dyn SampleFilter, input: &[f32], tail: usize) -> f32 {
        let output: Vec<f32> = input.iter().map(|&x| filter.process(x)).collect();
        output[output.len() - tail..]
            .iter()
            .fold(0.0f32, |acc, &v| acc.max(v.abs()))
    }

    #[test]
    fn test_zero_input_is_fixed_point() {
        let mut filter = BandpassFilter::new();
        for _ in 0..5000 {
            assert_eq!(filter.process(0.0), 0.0);
        }
        assert!(filter.state().is_zero());
    }

    #[test]
    fn test_difference_equation() {
        let mut filter = BandpassFilter::new();

        // Impulse: y0 = b0, y1 = b1 - a1*y0, y2 = b2 - a1*y1 - a2*y0
        let y0 = filter.process(1.0);
        let y1 = filter.process(0.0);
        let y2 = filter.process(0.0);

        let c = BANDPASS_0_5_35HZ_AT_1KHZ;
        assert_eq!(y0, c.b0);
        assert!((y1 - (c.b1 - c.a1 * y0)).abs() < 1e-7);
        assert!((y2 - (c.b2 - c.a1 * y1 - c.a2 * y0)).abs() < 1e-7);

        let state = filter.state();
        assert_eq!(state.x1, 0.0);
        assert_eq!(state.x2, 0.0);
        assert_eq!(state.y1, y2);
        assert_eq!(state.y2, y1);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut filter = BandpassFilter::new();
        for x in sine(5.0, 100) {
            filter.process(x);
        }
        assert!(!filter.state().is_zero());

        filter.reset();
        assert!(filter.state().is_zero());
    }

    #[test]
    fn test_dc_is_removed() {
        let mut filter = BandpassFilter::new();
        let mut last = 0.0;
        for _ in 0..20_000 {
            last = filter.process(1.65);
        }
        assert!(last.abs() < 1e-3, "DC should decay, got {}", last);
    }

    #[test]
    fn test_bandpass_response() {
        let mut filter = BandpassFilter::new();
        let amplitude = settled_amplitude(&mut filter, &sine(5.0, 6000), 1000);
        assert!(amplitude > 0.9 && amplitude < 1.05, "5 Hz gain {}", amplitude);

        let mut filter = BandpassFilter::new();
        let amplitude = settled_amplitude(&mut filter, &sine(200.0, 6000), 1000);
        assert!(amplitude < 0.15, "200 Hz gain {}", amplitude);
    }

    #[test]
    fn test_gain_at_matches_passband() {
        let c = BANDPASS_0_5_35HZ_AT_1KHZ;
        assert!(c.gain_at(0.0, 1000.0) < 1e-6);
        assert!((c.gain_at(2.0, 1000.0) - 1.0).abs() < 0.02);
        assert!(c.gain_at(35.0, 1000.0) < 0.6);
        assert!(c.gain_at(35.0, 1000.0) > 0.5);
    }

    #[test]
    fn test_notch_rejects_powerline() {
        let mut notch = NotchFilter::new(50.0, 30.0, 1000.0);
        let amplitude = settled_amplitude(&mut notch, &sine(50.0, 3000), 1000);
        assert!(amplitude < 0.01, "50 Hz residual {}", amplitude);

        let mut notch = NotchFilter::new(50.0, 30.0, 1000.0);
        let amplitude = settled_amplitude(&mut notch, &sine(10.0, 3000), 1000);
        assert!(amplitude > 0.98, "10 Hz gain {}", amplitude);
        assert_eq!(notch.name(), "notch");
    }

    #[test]
    fn test_gain_at_agrees_with_simulated_response() {
        let notch = BiquadCoefficients::notch(50.0, 30.0, 1000.0);
        assert!(notch.gain_at(50.0, 1000.0) < 1e-3);
        assert!((BiquadCoefficients::IDENTITY.gain_at(123.0, 1000.0) - 1.0).abs() < 1e-6);

        let mut filter = BandpassFilter::new();
        let simulated = settled_amplitude(&mut filter, &sine(10.0, 6000), 1000);
        let predicted = BANDPASS_0_5_35HZ_AT_1KHZ.gain_at(10.0, 1000.0);
        assert!((simulated - predicted).abs() < 0.02, "{} vs {}", simulated, predicted);
    }

    #[test]
    fn test_identity_section() {
        let mut section = Biquad::new(BiquadCoefficients::IDENTITY);
        assert_eq!(section.process_sample(0.42), 0.42);
        assert_eq!(section.process_sample(-1.0), -1.0);
    }
}
