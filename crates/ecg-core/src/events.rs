//! Beat events and heart-rate snapshots

use crate::sample::Voltage;
use serde::{Deserialize, Serialize};

/// A detected heartbeat (R-peak)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeakEvent {
    /// Monotonic time at which the threshold crossing qualified (ms)
    pub timestamp_ms: f64,
    /// Filtered voltage of the qualifying sample
    pub voltage: Voltage,
}

impl PeakEvent {
    pub fn new(timestamp_ms: f64, voltage: Voltage) -> Self {
        Self {
            timestamp_ms,
            voltage,
        }
    }

    /// Interval to a later event in milliseconds
    pub fn interval_to(&self, later: &PeakEvent) -> f64 {
        later.timestamp_ms - self.timestamp_ms
    }
}

/// Snapshot of the heart-rate estimate of one channel
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HeartRateState {
    /// Timestamp of the most recent accepted peak
    pub last_peak_ms: Option<f64>,
    /// Exponentially smoothed beats per minute
    pub smoothed_bpm: f32,
    /// Number of peaks observed since the last reset
    pub peak_count: u64,
}

impl HeartRateState {
    /// True once at least one RR interval has contributed to the estimate
    pub fn has_estimate(&self) -> bool {
        self.peak_count >= 2 && self.smoothed_bpm > 0.0
    }
}

impl std::fmt::Display for HeartRateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HR: {:.0} BPM ({} beats)", self.smoothed_bpm, self.peak_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_interval() {
        let first = PeakEvent::new(1000.0, 2.5);
        let second = PeakEvent::new(1850.0, 2.4);
        assert_eq!(first.interval_to(&second), 850.0);
    }

    #[test]
    fn test_state_display_and_serde() {
        let state = HeartRateState {
            last_peak_ms: Some(3000.0),
            smoothed_bpm: 72.4,
            peak_count: 5,
        };
        assert_eq!(state.to_string(), "HR: 72 BPM (5 beats)");
        assert!(state.has_estimate());

        let json = serde_json::to_string(&state).unwrap();
        let back: HeartRateState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_default_state_has_no_estimate() {
        assert!(!HeartRateState::default().has_estimate());
    }
}
