//! Configuration management for the ECG pipeline
//!
//! Every tuning value has a compile-time default below. A [`PipelineConfig`]
//! is validated once, before any pipeline is built; an invalid one must stop
//! startup.

use ecg_core::{AdcSpec, EcgError, EcgResult};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sample rate of the capture board in Hz
pub const SAMPLE_RATE_HZ: f32 = 1000.0;

/// Samples per capture block (2.4 seconds at 1 kHz)
pub const CAPTURE_DEPTH: usize = 2400;

/// Columns of the display panel
pub const DISPLAY_WIDTH: usize = 240;

/// Filtered voltage above which a sample counts as an R-peak
pub const R_PEAK_THRESHOLD_V: f32 = 2.3;

/// Minimum time between accepted peaks (caps detection at 300 BPM)
pub const REFRACTORY_MS: f64 = 200.0;

/// Share of the previous heart-rate estimate kept on every new beat
pub const EMA_RETAIN_WEIGHT: f32 = 0.7;

/// Powerline notch defaults
pub const NOTCH_FREQUENCY_HZ: f32 = 50.0;
pub const NOTCH_Q: f32 = 30.0;

/// Optional powerline interference notch ahead of the bandpass
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NotchConfig {
    /// Notch centre frequency in Hz (50 or 60)
    pub frequency_hz: f32,
    /// Quality factor, higher is narrower
    pub q: f32,
}

impl Default for NotchConfig {
    fn default() -> Self {
        Self {
            frequency_hz: NOTCH_FREQUENCY_HZ,
            q: NOTCH_Q,
        }
    }
}

/// Configuration of one processing channel
///
/// The bandpass is not configurable: every channel filters with
/// [`BANDPASS_0_5_35HZ_AT_1KHZ`](crate::filters::BANDPASS_0_5_35HZ_AT_1KHZ).
/// Changing any value here means building a new pipeline with fresh
/// channel state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Sample rate in Hz
    pub sample_rate_hz: f32,
    /// Samples per acquired block
    pub capture_depth: usize,
    /// Display points produced per block
    pub display_width: usize,
    /// Raw count to voltage conversion
    pub adc: AdcSpec,
    /// Powerline notch, disabled unless set
    pub notch: Option<NotchConfig>,
    /// R-peak threshold in volts
    pub threshold_v: f32,
    /// Refractory period in milliseconds
    pub refractory_ms: f64,
    /// Weight of the previous estimate in the heart-rate EMA
    pub ema_retain_weight: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            capture_depth: CAPTURE_DEPTH,
            display_width: DISPLAY_WIDTH,
            adc: AdcSpec::default(),
            notch: None,
            threshold_v: R_PEAK_THRESHOLD_V,
            refractory_ms: REFRACTORY_MS,
            ema_retain_weight: EMA_RETAIN_WEIGHT,
        }
    }
}

impl PipelineConfig {
    /// Five second capture window on a 250 column display
    pub fn long_capture() -> Self {
        Self {
            capture_depth: 5000,
            display_width: 250,
            ..Self::default()
        }
    }

    /// Default configuration with a 50 Hz powerline notch
    pub fn with_powerline_notch() -> Self {
        Self {
            notch: Some(NotchConfig::default()),
            ..Self::default()
        }
    }

    /// Milliseconds between consecutive samples
    pub fn sample_period_ms(&self) -> f64 {
        1000.0 / self.sample_rate_hz as f64
    }

    /// Samples reduced into each display column
    pub fn window_size(&self) -> usize {
        if self.display_width == 0 {
            0
        } else {
            self.capture_depth / self.display_width
        }
    }

    /// Duration covered by one block in milliseconds
    pub fn block_duration_ms(&self) -> f64 {
        self.capture_depth as f64 * self.sample_period_ms()
    }

    /// Upper bound on peaks one block can yield given the refractory period
    pub fn max_peaks_per_block(&self) -> usize {
        (self.block_duration_ms() / self.refractory_ms).floor() as usize + 1
    }

    /// Validate the configuration
    pub fn validate(&self) -> EcgResult<()> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(EcgError::InvalidConfig {
                reason: format!("sample rate must be positive, got {}Hz", self.sample_rate_hz),
            });
        }

        if self.capture_depth == 0 || self.display_width == 0 {
            return Err(EcgError::InvalidConfig {
                reason: "capture depth and display width must be non-zero".to_string(),
            });
        }

        if self.capture_depth % self.display_width != 0 {
            return Err(EcgError::IncompatibleGeometry {
                capture_depth: self.capture_depth,
                display_width: self.display_width,
            });
        }

        self.adc.validate()?;

        if !self.threshold_v.is_finite() {
            return Err(EcgError::InvalidConfig {
                reason: format!("R-peak threshold must be finite, got {}", self.threshold_v),
            });
        }

        if !(self.refractory_ms.is_finite() && self.refractory_ms > 0.0) {
            return Err(EcgError::InvalidConfig {
                reason: format!("refractory period must be positive, got {}ms", self.refractory_ms),
            });
        }

        if !(0.0..1.0).contains(&self.ema_retain_weight) {
            return Err(EcgError::InvalidConfig {
                reason: format!(
                    "EMA retain weight must be in [0, 1), got {}",
                    self.ema_retain_weight
                ),
            });
        }

        if let Some(notch) = &self.notch {
            if notch.frequency_hz <= 0.0 || notch.frequency_hz >= self.sample_rate_hz / 2.0 {
                return Err(EcgError::InvalidConfig {
                    reason: format!(
                        "notch frequency {}Hz must be between 0 and Nyquist ({}Hz)",
                        notch.frequency_hz,
                        self.sample_rate_hz / 2.0
                    ),
                });
            }
            if !(notch.q.is_finite() && notch.q > 0.0) {
                return Err(EcgError::InvalidConfig {
                    reason: format!("notch Q must be positive, got {}", notch.q),
                });
            }
        }

        if self.sample_rate_hz != SAMPLE_RATE_HZ {
            warn!(
                sample_rate_hz = self.sample_rate_hz,
                "bandpass coefficients are designed for {}Hz; passband will shift",
                SAMPLE_RATE_HZ
            );
        }

        Ok(())
    }

    /// Export configuration to JSON
    pub fn to_json(&self) -> EcgResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| EcgError::InvalidConfig {
            reason: format!("failed to serialize configuration: {}", e),
        })
    }

    /// Import configuration from JSON
    pub fn from_json(json: &str) -> EcgResult<Self> {
        serde_json::from_str(json).map_err(|e| EcgError::InvalidConfig {
            reason: format!("failed to deserialize configuration: {}", e),
        })
    }
}
