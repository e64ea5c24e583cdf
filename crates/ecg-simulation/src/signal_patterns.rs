//! Pre-defined ECG waveforms for simulation

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Shape of the simulated heart signal, relative to the electrode baseline
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WaveformPattern {
    /// No cardiac activity
    Flatline,
    /// Slow sine with a narrow rectangular spike once per interval
    SineWithSpike {
        sine_hz: f32,
        sine_amplitude_v: f32,
        spike_amplitude_v: f32,
        spike_width_ms: f32,
        spike_interval_ms: f32,
        /// Offset of the spike within each interval
        spike_phase_ms: f32,
    },
    /// P-QRS-T complex built from Gaussian lobes
    Pqrst { heart_rate_bpm: f32, r_amplitude_v: f32 },
}

/// One Gaussian lobe of a PQRST beat, times relative to the R wave
struct Lobe {
    offset_ms: f64,
    width_ms: f64,
    relative_amplitude: f64,
}

const PQRST_LOBES: [Lobe; 5] = [
    Lobe { offset_ms: -200.0, width_ms: 25.0, relative_amplitude: 0.12 },
    Lobe { offset_ms: -30.0, width_ms: 8.0, relative_amplitude: -0.15 },
    Lobe { offset_ms: 0.0, width_ms: 10.0, relative_amplitude: 1.0 },
    Lobe { offset_ms: 30.0, width_ms: 8.0, relative_amplitude: -0.25 },
    Lobe { offset_ms: 250.0, width_ms: 40.0, relative_amplitude: 0.3 },
];

/// Position of the R wave within each beat period
const R_WAVE_PHASE_MS: f64 = 300.0;

impl WaveformPattern {
    /// Signal value at `time_ms`, without baseline or noise
    pub fn voltage_at(&self, time_ms: f64) -> f32 {
        match *self {
            WaveformPattern::Flatline => 0.0,

            WaveformPattern::SineWithSpike {
                sine_hz,
                sine_amplitude_v,
                spike_amplitude_v,
                spike_width_ms,
                spike_interval_ms,
                spike_phase_ms,
            } => {
                let sine = sine_amplitude_v as f64 * (2.0 * PI * sine_hz as f64 * time_ms / 1000.0).sin();
                let phase = (time_ms - spike_phase_ms as f64).rem_euclid(spike_interval_ms as f64);
                let spike = if phase < spike_width_ms as f64 {
                    spike_amplitude_v as f64
                } else {
                    0.0
                };
                (sine + spike) as f32
            }

            WaveformPattern::Pqrst {
                heart_rate_bpm,
                r_amplitude_v,
            } => {
                let period_ms = 60_000.0 / heart_rate_bpm as f64;
                let beat = (time_ms / period_ms).floor();

                // Lobes of neighbouring beats overlap at high rates
                let mut v = 0.0;
                for k in [beat - 1.0, beat, beat + 1.0] {
                    let r_time = k * period_ms + R_WAVE_PHASE_MS;
                    for lobe in &PQRST_LOBES {
                        let dt = time_ms - (r_time + lobe.offset_ms);
                        v += lobe.relative_amplitude * (-0.5 * (dt / lobe.width_ms).powi(2)).exp();
                    }
                }
                (v * r_amplitude_v as f64) as f32
            }
        }
    }

    /// Expected heart rate of the pattern, if it has one
    pub fn heart_rate_bpm(&self) -> Option<f32> {
        match *self {
            WaveformPattern::Flatline => None,
            WaveformPattern::SineWithSpike { spike_interval_ms, .. } => {
                Some(60_000.0 / spike_interval_ms)
            }
            WaveformPattern::Pqrst { heart_rate_bpm, .. } => Some(heart_rate_bpm),
        }
    }

    /// Get pattern description
    pub fn description(&self) -> &'static str {
        match self {
            WaveformPattern::Flatline => "Flatline",
            WaveformPattern::SineWithSpike { .. } => "Sine with spike",
            WaveformPattern::Pqrst { .. } => "PQRST complex",
        }
    }

    /// The 1 Hz sine with a once-per-second spike used for bench testing
    pub fn bench_spike() -> Self {
        WaveformPattern::SineWithSpike {
            sine_hz: 1.0,
            sine_amplitude_v: 0.3,
            spike_amplitude_v: 1.5,
            spike_width_ms: 20.0,
            spike_interval_ms: 1000.0,
            spike_phase_ms: 500.0,
        }
    }

    pub fn resting_pqrst() -> Self {
        WaveformPattern::Pqrst {
            heart_rate_bpm: 72.0,
            r_amplitude_v: 1.2,
        }
    }

    /// Create common preset patterns
    pub fn presets() -> Vec<(&'static str, WaveformPattern)> {
        vec![
            ("Bench Spike (60 BPM)", Self::bench_spike()),
            ("Resting (72 BPM)", Self::resting_pqrst()),
            ("Bradycardia (45 BPM)", WaveformPattern::Pqrst {
                heart_rate_bpm: 45.0, r_amplitude_v: 1.2
            }),
            ("Exercise (140 BPM)", WaveformPattern::Pqrst {
                heart_rate_bpm: 140.0, r_amplitude_v: 1.0
            }),
            ("Flatline", WaveformPattern::Flatline),
        ]
    }
}

impl Default for WaveformPattern {
    fn default() -> Self {
        Self::resting_pqrst()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spike_timing() {
        let pattern = WaveformPattern::bench_spike();
        // sin(2*pi*0.5) = 0 at 500ms, so only the spike remains
        assert!((pattern.voltage_at(500.0) - 1.5).abs() < 1e-5);
        assert!(pattern.voltage_at(1519.0) > 1.4);
        assert!(pattern.voltage_at(1520.0).abs() < 0.05);
        assert!((pattern.voltage_at(250.0) - 0.3).abs() < 1e-5);
        assert_eq!(pattern.heart_rate_bpm(), Some(60.0));
    }

    #[test]
    fn test_pqrst_r_wave_dominates() {
        let pattern = WaveformPattern::Pqrst { heart_rate_bpm: 60.0, r_amplitude_v: 1.0 };

        let r = pattern.voltage_at(1300.0);
        assert!((r - 1.0).abs() < 0.05, "R wave {}", r);

        for t in (1000..2000).step_by(5) {
            assert!(pattern.voltage_at(t as f64) <= r + 1e-6);
        }
        // S wave dips below the baseline
        assert!(pattern.voltage_at(1330.0) < 0.0);
    }

    #[test]
    fn test_pqrst_is_periodic() {
        let pattern = WaveformPattern::Pqrst { heart_rate_bpm: 75.0, r_amplitude_v: 1.0 };
        for t in [0.0, 123.0, 300.0, 610.0] {
            let a = pattern.voltage_at(t + 1600.0);
            let b = pattern.voltage_at(t + 3200.0);
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn test_flatline() {
        assert_eq!(WaveformPattern::Flatline.voltage_at(1234.0), 0.0);
        assert_eq!(WaveformPattern::Flatline.heart_rate_bpm(), None);
    }

    #[test]
    fn test_presets() {
        let presets = WaveformPattern::presets();
        assert!(presets.len() >= 4);
        assert!(presets.iter().any(|(_, p)| *p == WaveformPattern::Flatline));
    }
}
