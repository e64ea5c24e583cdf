//! Per-block processing: filter, downsample, detect
//!
//! A [`Pipeline`] owns the configuration and the buffers reused by every
//! cycle. The mutable per-channel history (filters, detector, estimator)
//! lives in a [`ChannelContext`] that the caller passes in, so one pipeline
//! can serve any number of channels one after another.

use crate::config::PipelineConfig;
use crate::detection::PeakDetector;
use crate::downsample::Downsampler;
use crate::filters::{BandpassFilter, NotchFilter};
use crate::heart_rate::HeartRateEstimator;
use crate::processor::{CycleMetrics, SampleFilter};
use ecg_core::{EcgResult, HeartRateState, PeakEvent, SampleBlock, Voltage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Mutable state of one signal channel, carried from block to block
///
/// One context per channel; it is not `Clone`.
///
/// ```compile_fail
/// fn duplicable<T: Clone>() {}
/// duplicable::<ecg_processing::ChannelContext>();
/// ```
#[derive(Debug)]
pub struct ChannelContext {
    notch: Option<NotchFilter>,
    bandpass: BandpassFilter,
    detector: PeakDetector,
    heart_rate: HeartRateEstimator,
    cycles: u64,
}

impl ChannelContext {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            notch: config
                .notch
                .map(|n| NotchFilter::new(n.frequency_hz, n.q, config.sample_rate_hz)),
            bandpass: BandpassFilter::new(),
            detector: PeakDetector::from_config(config),
            heart_rate: HeartRateEstimator::from_config(config),
            cycles: 0,
        }
    }

    /// Filter one converted sample through the notch (if any) and the bandpass
    #[inline]
    fn filter(&mut self, voltage: Voltage) -> Voltage {
        let voltage = match self.notch.as_mut() {
            Some(notch) => notch.process(voltage),
            None => voltage,
        };
        self.bandpass.process(voltage)
    }

    pub fn bpm(&self) -> f32 {
        self.heart_rate.bpm()
    }

    pub fn heart_rate(&self) -> &HeartRateEstimator {
        &self.heart_rate
    }

    pub fn detector(&self) -> &PeakDetector {
        &self.detector
    }

    pub fn bandpass(&self) -> &BandpassFilter {
        &self.bandpass
    }

    /// Cycles processed since creation or the last reset
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Zero filter history and forget all beats
    pub fn reset(&mut self) {
        if let Some(notch) = self.notch.as_mut() {
            notch.reset();
        }
        self.bandpass.reset();
        self.detector.reset();
        self.heart_rate.reset();
        self.cycles = 0;
    }
}

/// Result of one cycle, borrowing the pipeline's buffers
#[derive(Debug)]
pub struct CycleOutput<'a> {
    /// One point per display column
    pub display_points: &'a [Voltage],
    /// Smoothed heart rate after this cycle
    pub bpm: f32,
    /// Peaks detected in this block, in time order
    pub peaks: &'a [PeakEvent],
    pub heart_rate: HeartRateState,
    pub sequence: u64,
    pub metrics: CycleMetrics,
}

impl CycleOutput<'_> {
    /// Owned copy for handing to another thread
    pub fn to_report(&self) -> CycleReport {
        CycleReport {
            sequence: self.sequence,
            display_points: self.display_points.to_vec(),
            bpm: self.bpm,
            peaks: self.peaks.to_vec(),
            heart_rate: self.heart_rate,
            metrics: self.metrics,
        }
    }
}

/// Owned result of one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub sequence: u64,
    pub display_points: Vec<Voltage>,
    pub bpm: f32,
    pub peaks: Vec<PeakEvent>,
    pub heart_rate: HeartRateState,
    pub metrics: CycleMetrics,
}

/// The signal-processing pipeline of the monitor
pub struct Pipeline {
    config: PipelineConfig,
    downsampler: Downsampler,
    filtered: Vec<Voltage>,
    display: Vec<Voltage>,
    peaks: Vec<PeakEvent>,
}

impl Pipeline {
    /// Validate `config` and allocate every buffer the pipeline will use
    pub fn new(config: PipelineConfig) -> EcgResult<Self> {
        config.validate()?;
        let downsampler = Downsampler::new(config.capture_depth, config.display_width)?;

        info!(
            capture_depth = config.capture_depth,
            display_width = config.display_width,
            window = downsampler.window_size(),
            notch = config.notch.is_some(),
            "pipeline initialized"
        );

        Ok(Self {
            filtered: vec![0.0; config.capture_depth],
            display: vec![0.0; config.display_width],
            peaks: Vec::with_capacity(config.max_peaks_per_block()),
            downsampler,
            config,
        })
    }

    /// Default configuration
    pub fn realtime_ecg() -> EcgResult<Self> {
        Self::new(PipelineConfig::default())
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fresh channel state matching this pipeline's configuration
    pub fn new_context(&self) -> ChannelContext {
        ChannelContext::new(&self.config)
    }

    /// Process one full block for the channel described by `ctx`
    ///
    /// The block must hold exactly `capture_depth` samples. Filter history
    /// carries over from the previous block of the same context.
    pub fn run_cycle(
        &mut self,
        ctx: &mut ChannelContext,
        block: &SampleBlock,
    ) -> EcgResult<CycleOutput<'_>> {
        block.ensure_capacity(self.config.capture_depth)?;
        let timer = CycleMetrics::start_timing();

        for (slot, voltage) in self.filtered.iter_mut().zip(block.voltages(&self.config.adc)) {
            *slot = ctx.filter(voltage);
        }

        self.downsampler.downsample_into(&self.filtered, &mut self.display)?;

        self.peaks.clear();
        for (i, &voltage) in self.filtered.iter().enumerate() {
            if let Some(event) = ctx.detector.observe(voltage, block.timestamp_ms(i)) {
                ctx.heart_rate.update(&event);
                self.peaks.push(event);
            }
        }

        ctx.cycles += 1;
        let metrics = timer.finish(block.len(), self.peaks.len());
        let bpm = ctx.heart_rate.bpm();

        debug!(
            sequence = block.sequence(),
            peaks = self.peaks.len(),
            bpm,
            processing_time_us = metrics.processing_time_us,
            "cycle complete"
        );

        Ok(CycleOutput {
            display_points: &self.display,
            bpm,
            peaks: &self.peaks,
            heart_rate: ctx.heart_rate.state(),
            sequence: block.sequence(),
            metrics,
        })
    }

    /// Filtered samples of the most recent cycle
    pub fn filtered(&self) -> &[Voltage] {
        &self.filtered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecg_core::{AdcSpec, EcgError};
    use std::f64::consts::PI;

    /// 1.65V baseline, 0.3V sine at 1 Hz and a 20ms 1.5V spike at 500ms of every second
    fn sine_with_spike(t_ms: f64) -> f32 {
        let mut v = 1.65 + 0.3 * (2.0 * PI * t_ms / 1000.0).sin();
        if (500.0..520.0).contains(&(t_ms % 1000.0)) {
            v += 1.5;
        }
        v as f32
    }

    fn block(config: &PipelineConfig, sequence: u64, signal: impl Fn(f64) -> f32) -> SampleBlock {
        let start = sequence as f64 * config.block_duration_ms();
        let counts: Vec<u16> = (0..config.capture_depth)
            .map(|i| {
                let t = start + i as f64 * config.sample_period_ms();
                config.adc.quantize(signal(t)).value()
            })
            .collect();
        SampleBlock::from_counts(&counts, &config.adc, start, config.sample_period_ms(), sequence)
            .unwrap()
    }

    fn spike_config() -> PipelineConfig {
        // The 2.3V default sits above anything a DC-free trace reaches on a 3.3V ADC
        PipelineConfig {
            threshold_v: 1.0,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_sine_with_spike_end_to_end() {
        let config = spike_config();
        let mut pipeline = Pipeline::new(config.clone()).unwrap();
        let mut ctx = pipeline.new_context();

        let mut all_peaks = Vec::new();
        let mut last = None;
        for sequence in 0..10 {
            let output = pipeline
                .run_cycle(&mut ctx, &block(&config, sequence, sine_with_spike))
                .unwrap();

            assert_eq!(output.display_points.len(), 240);
            all_peaks.extend_from_slice(output.peaks);
            last = Some(output.to_report());
        }

        let last = last.unwrap();
        assert!((last.bpm - 60.0).abs() < 1.0, "bpm {}", last.bpm);

        // Settled cycles show the spike in the display trace
        let max_point = last.display_points.iter().cloned().fold(f32::MIN, f32::max);
        assert!(max_point > 1.0, "spike lost in display, max {}", max_point);

        // Settled peaks sit on the spikes, one per second
        assert_eq!(last.peaks.len(), 2);
        for peak in &last.peaks {
            assert!((peak.timestamp_ms % 1000.0 - 508.0).abs() <= 5.0);
        }

        for pair in all_peaks.windows(2) {
            assert!(pair[0].interval_to(&pair[1]) > config.refractory_ms);
        }
        assert_eq!(ctx.cycles(), 10);
    }

    #[test]
    fn test_flat_input_produces_nothing() {
        let config = PipelineConfig::default();
        let mut pipeline = Pipeline::new(config.clone()).unwrap();
        let mut ctx = pipeline.new_context();

        let output = pipeline.run_cycle(&mut ctx, &block(&config, 0, |_| 0.0)).unwrap();
        assert!(output.display_points.iter().all(|&v| v == 0.0));
        assert!(output.peaks.is_empty());
        assert_eq!(output.bpm, 0.0);
        assert_eq!(output.metrics.samples_processed, 2400);
        assert!(ctx.bandpass().state().is_zero());
    }

    #[test]
    fn test_incomplete_block_is_rejected() {
        let mut pipeline = Pipeline::realtime_ecg().unwrap();
        let mut ctx = pipeline.new_context();
        let adc = AdcSpec::default();
        let short = SampleBlock::from_counts(&[2048; 100], &adc, 0.0, 1.0, 0).unwrap();

        let result = pipeline.run_cycle(&mut ctx, &short);
        assert!(matches!(
            result,
            Err(EcgError::IncompleteBlock { expected: 2400, actual: 100 })
        ));
        assert_eq!(ctx.cycles(), 0);
    }

    #[test]
    fn test_invalid_geometry_fails_construction() {
        let config = PipelineConfig {
            capture_depth: 2500,
            ..PipelineConfig::default()
        };
        let error = Pipeline::new(config).err().unwrap();
        assert!(error.is_configuration());
    }

    #[test]
    fn test_filter_state_carries_across_blocks() {
        let config = spike_config();
        let mut pipeline = Pipeline::new(config.clone()).unwrap();

        // One context sees two consecutive blocks
        let mut continuous = pipeline.new_context();
        pipeline.run_cycle(&mut continuous, &block(&config, 0, sine_with_spike)).unwrap();
        let carried = pipeline
            .run_cycle(&mut continuous, &block(&config, 1, sine_with_spike))
            .unwrap()
            .to_report();

        // A fresh context starts the second block from zero history
        let mut fresh = pipeline.new_context();
        let restarted = pipeline
            .run_cycle(&mut fresh, &block(&config, 1, sine_with_spike))
            .unwrap()
            .to_report();

        assert_ne!(carried.display_points, restarted.display_points);
    }

    #[test]
    fn test_contexts_are_independent() {
        let config = spike_config();
        let mut pipeline = Pipeline::new(config.clone()).unwrap();
        let mut active = pipeline.new_context();
        let mut idle = pipeline.new_context();

        for sequence in 0..4 {
            pipeline.run_cycle(&mut active, &block(&config, sequence, sine_with_spike)).unwrap();
            pipeline.run_cycle(&mut idle, &block(&config, sequence, |_| 1.65)).unwrap();
        }

        assert!(active.bpm() > 0.0);
        assert!(active.heart_rate().state().has_estimate());
        // A constant level only crosses the threshold during the start-up transient
        let idle_last_peak = idle.detector().last_peak_ms().unwrap();
        assert!(idle_last_peak < 1000.0);
        assert!(active.detector().last_peak_ms().unwrap() > 8000.0);

        active.reset();
        assert_eq!(active.bpm(), 0.0);
        assert_eq!(active.cycles(), 0);
        assert!(active.bandpass().state().is_zero());
    }

    #[test]
    fn test_notch_configuration_builds_notch_stage() {
        let pipeline = Pipeline::new(PipelineConfig::with_powerline_notch()).unwrap();
        let ctx = pipeline.new_context();
        assert!(ctx.notch.is_some());
        assert!(pipeline.new_context().detector().last_peak_ms().is_none());
    }

    #[test]
    fn test_report_serializes() {
        let config = spike_config();
        let mut pipeline = Pipeline::new(config.clone()).unwrap();
        let mut ctx = pipeline.new_context();
        let report = pipeline
            .run_cycle(&mut ctx, &block(&config, 0, sine_with_spike))
            .unwrap()
            .to_report();

        let json = serde_json::to_string(&report).unwrap();
        let back: CycleReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(pipeline.filtered().len(), 2400);
    }
}
