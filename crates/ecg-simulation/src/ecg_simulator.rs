//! Synthetic ECG source standing in for the capture board

use crate::signal_patterns::WaveformPattern;
use ecg_core::{config_error, Acquisition, AdcSpec, EcgResult, SampleBlock, Voltage};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::time::Duration;
use tracing::debug;

/// Electrode front-ends bias the signal to mid-rail
pub const MID_RAIL_V: f32 = 1.65;

/// Noise configuration for realistic ECG simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseConfig {
    /// Gaussian noise standard deviation (0.0 = no noise)
    pub gaussian_std_v: f32,
    /// Baseline wander amplitude
    pub baseline_wander_v: f32,
    /// Baseline wander frequency, typically respiration
    pub baseline_wander_hz: f32,
    /// Powerline hum amplitude
    pub powerline_v: f32,
    /// Powerline frequency (50 or 60 Hz)
    pub powerline_hz: f32,
}

impl NoiseConfig {
    pub fn none() -> Self {
        Self {
            gaussian_std_v: 0.0,
            baseline_wander_v: 0.0,
            baseline_wander_hz: 0.25,
            powerline_v: 0.0,
            powerline_hz: 50.0,
        }
    }
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gaussian_std_v: 0.02,
            baseline_wander_v: 0.1,
            baseline_wander_hz: 0.25,
            powerline_v: 0.05,
            powerline_hz: 50.0,
        }
    }
}

/// Configuration for ECG simulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Signal shape
    pub pattern: WaveformPattern,
    /// DC level the pattern rides on
    pub baseline_v: f32,
    pub noise: NoiseConfig,
    /// Converter the samples are quantized for
    pub adc: AdcSpec,
    /// Random seed for reproducibility
    pub seed: Option<u64>,
    /// Block in `acquire_block` for as long as a real capture would take
    pub realtime_pacing: bool,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            pattern: WaveformPattern::default(),
            baseline_v: MID_RAIL_V,
            noise: NoiseConfig::default(),
            adc: AdcSpec::default(),
            seed: None,
            realtime_pacing: false,
        }
    }
}

impl SimulatorConfig {
    /// Noise-free bench signal with a fixed seed
    pub fn bench() -> Self {
        Self {
            pattern: WaveformPattern::bench_spike(),
            noise: NoiseConfig::none(),
            seed: Some(42),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> EcgResult<()> {
        self.adc.validate()?;

        if !(self.noise.gaussian_std_v.is_finite() && self.noise.gaussian_std_v >= 0.0) {
            return Err(config_error!(
                "noise standard deviation must be non-negative, got {}",
                self.noise.gaussian_std_v
            ));
        }

        match self.pattern {
            WaveformPattern::Pqrst { heart_rate_bpm, .. } if !(heart_rate_bpm > 0.0) => {
                Err(config_error!("heart rate must be positive, got {}", heart_rate_bpm))
            }
            WaveformPattern::SineWithSpike { spike_interval_ms, spike_width_ms, .. }
                if !(spike_interval_ms > 0.0 && spike_width_ms < spike_interval_ms) =>
            {
                Err(config_error!(
                    "spike width {}ms must be shorter than its interval {}ms",
                    spike_width_ms,
                    spike_interval_ms
                ))
            }
            _ => Ok(()),
        }
    }
}

/// ECG signal simulator
pub struct EcgSimulator {
    config: SimulatorConfig,
    rng: StdRng,
    normal_dist: Normal<f32>,
    next_time_ms: f64,
    sequence: u64,
}

impl EcgSimulator {
    /// Create new ECG simulator with configuration
    pub fn new(config: SimulatorConfig) -> EcgResult<Self> {
        config.validate()?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let normal_dist = Self::noise_distribution(&config)?;

        Ok(Self {
            config,
            rng,
            normal_dist,
            next_time_ms: 0.0,
            sequence: 0,
        })
    }

    fn noise_distribution(config: &SimulatorConfig) -> EcgResult<Normal<f32>> {
        Normal::new(0.0, config.noise.gaussian_std_v)
            .map_err(|e| config_error!("failed to create noise distribution: {}", e))
    }

    /// Analog electrode voltage at `time_ms`
    pub fn voltage_at(&mut self, time_ms: f64) -> Voltage {
        let noise = &self.config.noise;
        let t_s = time_ms / 1000.0;

        let mut v = self.config.baseline_v + self.config.pattern.voltage_at(time_ms);
        v += noise.baseline_wander_v * (2.0 * PI * noise.baseline_wander_hz as f64 * t_s).sin() as f32;
        v += noise.powerline_v * (2.0 * PI * noise.powerline_hz as f64 * t_s).sin() as f32;
        if noise.gaussian_std_v > 0.0 {
            v += self.normal_dist.sample(&mut self.rng);
        }
        v
    }

    /// Generate the next `capacity` samples as a block
    pub fn generate_block(&mut self, capacity: usize, sample_period_ms: f64) -> EcgResult<SampleBlock> {
        let start = self.next_time_ms;
        let counts: Vec<u16> = (0..capacity)
            .map(|i| {
                let v = self.voltage_at(start + i as f64 * sample_period_ms);
                self.config.adc.quantize(v).value()
            })
            .collect();

        let block = SampleBlock::from_counts(&counts, &self.config.adc, start, sample_period_ms, self.sequence)?;

        self.next_time_ms = block.end_time_ms();
        self.sequence += 1;
        Ok(block)
    }

    /// Restart simulated time and block numbering
    pub fn reset_time(&mut self) {
        self.next_time_ms = 0.0;
        self.sequence = 0;
    }

    /// Get current configuration
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Update configuration; simulated time keeps running
    pub fn update_config(&mut self, config: SimulatorConfig) -> EcgResult<()> {
        config.validate()?;
        self.normal_dist = Self::noise_distribution(&config)?;
        if config.seed.is_some() && config.seed != self.config.seed {
            self.rng = StdRng::seed_from_u64(config.seed.unwrap_or_default());
        }
        self.config = config;
        Ok(())
    }

    pub fn set_pattern(&mut self, pattern: WaveformPattern) -> EcgResult<()> {
        let config = SimulatorConfig {
            pattern,
            ..self.config.clone()
        };
        self.update_config(config)
    }
}

impl Acquisition for EcgSimulator {
    fn acquire_block(&mut self, capacity: usize, sample_period_ms: f64) -> EcgResult<SampleBlock> {
        let block = self.generate_block(capacity, sample_period_ms)?;

        if self.config.realtime_pacing {
            std::thread::sleep(Duration::from_secs_f64(block.duration_ms() / 1000.0));
        }

        debug!(sequence = block.sequence(), start_ms = block.start_time_ms(), "simulated block");
        Ok(block)
    }

    fn name(&self) -> &str {
        "simulator"
    }
}
