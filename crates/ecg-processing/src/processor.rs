//! Core per-sample processor trait and cycle timing

use ecg_core::Voltage;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Core trait for streaming single-sample filters
pub trait SampleFilter: Send {
    /// Filter one sample, updating internal history
    fn process(&mut self, input: Voltage) -> Voltage;

    /// Zero all history
    fn reset(&mut self);

    /// Get filter name/identifier
    fn name(&self) -> &str;

    /// Filter a whole slice in place
    fn process_in_place(&mut self, samples: &mut [Voltage]) {
        for sample in samples.iter_mut() {
            *sample = self.process(*sample);
        }
    }
}

/// Timing of one pipeline cycle
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CycleMetrics {
    /// Wall-clock processing time in microseconds
    pub processing_time_us: u64,
    /// Samples filtered this cycle
    pub samples_processed: usize,
    /// Peaks reported this cycle
    pub peaks_detected: usize,
}

impl CycleMetrics {
    /// Start timing a cycle
    pub fn start_timing() -> CycleTimer {
        CycleTimer {
            start_time: Instant::now(),
        }
    }

    /// Fraction of the real-time budget the cycle consumed
    pub fn realtime_load(&self, block_duration_ms: f64) -> f64 {
        if block_duration_ms <= 0.0 {
            return 0.0;
        }
        self.processing_time_us as f64 / (block_duration_ms * 1000.0)
    }
}

/// Helper for timing a cycle
pub struct CycleTimer {
    start_time: Instant,
}

impl CycleTimer {
    /// Finish timing and return metrics
    pub fn finish(self, samples_processed: usize, peaks_detected: usize) -> CycleMetrics {
        CycleMetrics {
            processing_time_us: self.start_time.elapsed().as_micros() as u64,
            samples_processed,
            peaks_detected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    struct Doubler;

    impl SampleFilter for Doubler {
        fn process(&mut self, input: Voltage) -> Voltage {
            input * 2.0
        }

        fn reset(&mut self) {}

        fn name(&self) -> &str {
            "doubler"
        }
    }

    #[test]
    fn test_process_in_place() {
        let mut samples = [1.0, -0.5, 0.25];
        Doubler.process_in_place(&mut samples);
        assert_eq!(samples, [2.0, -1.0, 0.5]);
    }

    #[test]
    fn test_cycle_timer() {
        let timer = CycleMetrics::start_timing();
        std::thread::sleep(Duration::from_millis(1));
        let metrics = timer.finish(2400, 2);

        assert!(metrics.processing_time_us >= 1000);
        assert_eq!(metrics.samples_processed, 2400);
        assert_eq!(metrics.peaks_detected, 2);
    }

    #[test]
    fn test_realtime_load() {
        let metrics = CycleMetrics {
            processing_time_us: 1200,
            samples_processed: 2400,
            peaks_detected: 0,
        };
        assert!((metrics.realtime_load(2400.0) - 0.0005).abs() < 1e-12);
        assert_eq!(metrics.realtime_load(0.0), 0.0);
    }
}
