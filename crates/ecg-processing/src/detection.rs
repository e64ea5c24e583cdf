//! R-peak detection
//!
//! A threshold detector with a refractory window. The detector is armed
//! whenever no peak has been reported within the last `refractory_ms`; an
//! armed detector reports the first sample above the threshold and then
//! goes refractory.

use crate::config::PipelineConfig;
use ecg_core::{PeakEvent, Voltage};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Logical state of a [`PeakDetector`] at a given time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorState {
    /// May report a peak
    Armed,
    /// Suppressing reports until the refractory window has passed
    Refractory,
}

/// Threshold and refractory R-peak detector
#[derive(Debug, Clone)]
pub struct PeakDetector {
    threshold_v: Voltage,
    refractory_ms: f64,
    last_peak_ms: Option<f64>,
}

impl PeakDetector {
    pub fn new(threshold_v: Voltage, refractory_ms: f64) -> Self {
        Self {
            threshold_v,
            refractory_ms,
            last_peak_ms: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.threshold_v, config.refractory_ms)
    }

    /// Feed one filtered sample; returns an event if it qualifies as a peak
    ///
    /// Timestamps must be non-decreasing across calls.
    pub fn observe(&mut self, voltage: Voltage, timestamp_ms: f64) -> Option<PeakEvent> {
        if voltage <= self.threshold_v || self.state_at(timestamp_ms) == DetectorState::Refractory {
            return None;
        }

        self.last_peak_ms = Some(timestamp_ms);
        trace!(timestamp_ms, voltage, "R-peak detected");
        Some(PeakEvent::new(timestamp_ms, voltage))
    }

    /// State the detector would be in for a sample at `timestamp_ms`
    pub fn state_at(&self, timestamp_ms: f64) -> DetectorState {
        match self.last_peak_ms {
            Some(last) if timestamp_ms - last <= self.refractory_ms => DetectorState::Refractory,
            _ => DetectorState::Armed,
        }
    }

    pub fn last_peak_ms(&self) -> Option<f64> {
        self.last_peak_ms
    }

    pub fn threshold_v(&self) -> Voltage {
        self.threshold_v
    }

    pub fn refractory_ms(&self) -> f64 {
        self.refractory_ms
    }

    /// Forget the last peak; the next crossing is reported unconditionally
    pub fn reset(&mut self) {
        self.last_peak_ms = None;
    }
}
