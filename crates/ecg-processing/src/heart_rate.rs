//! Smoothed heart-rate estimation from R-peak intervals

use crate::config::{PipelineConfig, EMA_RETAIN_WEIGHT};
use ecg_core::{HeartRateState, PeakEvent};
use tracing::warn;

/// Exponentially smoothed BPM from consecutive peak timestamps
#[derive(Debug, Clone)]
pub struct HeartRateEstimator {
    retain_weight: f32,
    previous_peak_ms: Option<f64>,
    smoothed_bpm: f32,
    peak_count: u64,
    last_instant_bpm: Option<f32>,
    last_rr_ms: Option<f64>,
}

impl HeartRateEstimator {
    /// Create an estimator keeping `retain_weight` of the previous estimate per beat
    pub fn new(retain_weight: f32) -> Self {
        Self {
            retain_weight,
            previous_peak_ms: None,
            smoothed_bpm: 0.0,
            peak_count: 0,
            last_instant_bpm: None,
            last_rr_ms: None,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.ema_retain_weight)
    }

    /// Fold one peak into the estimate and return the smoothed BPM
    ///
    /// The first peak only records its timestamp. A non-positive interval
    /// leaves the estimate untouched.
    pub fn update(&mut self, event: &PeakEvent) -> f32 {
        let Some(previous) = self.previous_peak_ms else {
            self.previous_peak_ms = Some(event.timestamp_ms);
            self.peak_count = 1;
            return self.smoothed_bpm;
        };

        let rr_ms = event.timestamp_ms - previous;
        if rr_ms <= 0.0 {
            warn!(
                previous_ms = previous,
                timestamp_ms = event.timestamp_ms,
                "non-positive RR interval, skipping heart-rate update"
            );
            return self.smoothed_bpm;
        }

        let instant_bpm = (60_000.0 / rr_ms) as f32;
        self.smoothed_bpm =
            self.smoothed_bpm * self.retain_weight + instant_bpm * (1.0 - self.retain_weight);

        self.previous_peak_ms = Some(event.timestamp_ms);
        self.peak_count += 1;
        self.last_instant_bpm = Some(instant_bpm);
        self.last_rr_ms = Some(rr_ms);

        self.smoothed_bpm
    }

    pub fn bpm(&self) -> f32 {
        self.smoothed_bpm
    }

    /// Unsmoothed rate from the most recent interval
    pub fn last_instant_bpm(&self) -> Option<f32> {
        self.last_instant_bpm
    }

    /// Most recent RR interval in milliseconds
    pub fn last_rr_ms(&self) -> Option<f64> {
        self.last_rr_ms
    }

    pub fn state(&self) -> HeartRateState {
        HeartRateState {
            last_peak_ms: self.previous_peak_ms,
            smoothed_bpm: self.smoothed_bpm,
            peak_count: self.peak_count,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.retain_weight);
    }
}

impl Default for HeartRateEstimator {
    fn default() -> Self {
        Self::new(EMA_RETAIN_WEIGHT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(estimator: &mut HeartRateEstimator, interval_ms: f64, beats: usize) -> f32 {
        let mut bpm = 0.0;
        for i in 0..beats {
            bpm = estimator.update(&PeakEvent::new(i as f64 * interval_ms, 2.5));
        }
        bpm
    }

    #[test]
    fn test_first_peak_only_records() {
        let mut estimator = HeartRateEstimator::default();
        let bpm = estimator.update(&PeakEvent::new(500.0, 2.5));

        assert_eq!(bpm, 0.0);
        assert_eq!(estimator.state().last_peak_ms, Some(500.0));
        assert_eq!(estimator.state().peak_count, 1);
        assert!(!estimator.state().has_estimate());
        assert_eq!(estimator.last_rr_ms(), None);
    }

    #[test]
    fn test_ema_step() {
        let mut estimator = HeartRateEstimator::default();
        estimator.update(&PeakEvent::new(0.0, 2.5));
        let bpm = estimator.update(&PeakEvent::new(1000.0, 2.5));

        // 0 * 0.7 + 60 * 0.3
        assert!((bpm - 18.0).abs() < 1e-4);
        assert_eq!(estimator.last_instant_bpm(), Some(60.0));
        assert_eq!(estimator.last_rr_ms(), Some(1000.0));

        let bpm = estimator.update(&PeakEvent::new(1500.0, 2.5));
        // 18 * 0.7 + 120 * 0.3
        assert!((bpm - 48.6).abs() < 1e-4);
    }

    #[test]
    fn test_geometric_convergence() {
        // After n intervals the error from 60/T is (0.7^n) * 60/T
        for interval_ms in [500.0, 800.0, 1000.0, 1500.0] {
            let target = (60_000.0 / interval_ms) as f32;
            let mut estimator = HeartRateEstimator::default();
            let bpm = feed(&mut estimator, interval_ms, 21);

            let bound = 0.7f32.powi(20) * target + 1e-3;
            assert!((bpm - target).abs() <= bound, "T={} bpm={}", interval_ms, bpm);
        }
    }

    #[test]
    fn test_error_shrinks_every_beat() {
        let mut estimator = HeartRateEstimator::default();
        estimator.update(&PeakEvent::new(0.0, 2.5));

        let mut last_error = f32::INFINITY;
        for i in 1..15 {
            let bpm = estimator.update(&PeakEvent::new(i as f64 * 750.0, 2.5));
            let error = (bpm - 80.0).abs();
            assert!(error < last_error);
            last_error = error;
        }
    }

    #[test]
    fn test_zero_interval_is_skipped() {
        let mut estimator = HeartRateEstimator::default();
        estimator.update(&PeakEvent::new(1000.0, 2.5));
        let before = estimator.update(&PeakEvent::new(2000.0, 2.5));

        let after = estimator.update(&PeakEvent::new(2000.0, 2.5));
        assert_eq!(after, before);
        assert!(after.is_finite());
        assert_eq!(estimator.state().peak_count, 2);

        let after = estimator.update(&PeakEvent::new(1500.0, 2.5));
        assert_eq!(after, before);
    }

    #[test]
    fn test_reset_keeps_weight() {
        let mut estimator = HeartRateEstimator::new(0.5);
        feed(&mut estimator, 1000.0, 5);
        estimator.reset();

        assert_eq!(estimator.state(), HeartRateState::default());
        estimator.update(&PeakEvent::new(0.0, 2.5));
        let bpm = estimator.update(&PeakEvent::new(1000.0, 2.5));
        assert!((bpm - 30.0).abs() < 1e-4);
    }
}
