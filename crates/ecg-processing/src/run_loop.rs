//! Acquire, process, render
//!
//! [`MonitorLoop`] drives a single channel end to end: it pulls a full block
//! from an [`Acquisition`], runs one pipeline cycle and hands the display
//! points to a [`Renderer`]. The pipeline itself never loops or sleeps; pacing
//! comes from the acquisition blocking until a block is ready.

use crate::pipeline::{ChannelContext, CycleReport, Pipeline};
use ecg_core::{Acquisition, EcgResult, Renderer};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// Single-channel monitor loop
pub struct MonitorLoop<A, R> {
    acquisition: A,
    renderer: R,
    pipeline: Pipeline,
    context: ChannelContext,
}

impl<A: Acquisition, R: Renderer> MonitorLoop<A, R> {
    pub fn new(pipeline: Pipeline, acquisition: A, renderer: R) -> Self {
        let context = pipeline.new_context();
        Self {
            acquisition,
            renderer,
            pipeline,
            context,
        }
    }

    /// Run one acquire-process-render cycle
    pub fn step(&mut self) -> EcgResult<CycleReport> {
        let config = self.pipeline.config();
        let block = self
            .acquisition
            .acquire_block(config.capture_depth, config.sample_period_ms())?;

        let output = self.pipeline.run_cycle(&mut self.context, &block)?;
        self.renderer.render(output.display_points, output.bpm)?;
        Ok(output.to_report())
    }

    /// Run cycles until `stop` is set or a cycle fails
    ///
    /// Returns the number of completed cycles. `stop` is checked between
    /// cycles; a started cycle always finishes.
    pub fn run_until(&mut self, stop: &AtomicBool) -> EcgResult<u64> {
        info!(source = self.acquisition.name(), "monitor loop started");
        let mut cycles = 0;

        while !stop.load(Ordering::Relaxed) {
            if let Err(e) = self.step() {
                error!(error = %e, cycles, "monitor loop stopped");
                return Err(e);
            }
            cycles += 1;
        }

        info!(cycles, "monitor loop stopped");
        Ok(cycles)
    }

    pub fn context(&self) -> &ChannelContext {
        &self.context
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Drop all channel history, e.g. after the electrodes were reattached
    pub fn reset(&mut self) {
        self.context.reset();
    }

    pub fn into_parts(self) -> (A, R) {
        (self.acquisition, self.renderer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use ecg_core::{acquisition_error, AdcSpec, EcgError, SampleBlock, Voltage};

    /// Replays a constant level for a fixed number of blocks
    struct ConstantSource {
        count: u16,
        remaining: usize,
        sequence: u64,
    }

    impl Acquisition for ConstantSource {
        fn acquire_block(&mut self, capacity: usize, sample_period_ms: f64) -> EcgResult<SampleBlock> {
            if self.remaining == 0 {
                return Err(acquisition_error!("source exhausted after {} blocks", self.sequence));
            }
            self.remaining -= 1;
            let start = self.sequence as f64 * capacity as f64 * sample_period_ms;
            let block = SampleBlock::from_counts(
                &vec![self.count; capacity],
                &AdcSpec::default(),
                start,
                sample_period_ms,
                self.sequence,
            )?;
            self.sequence += 1;
            Ok(block)
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        frames: Vec<(usize, f32)>,
    }

    impl Renderer for RecordingRenderer {
        fn render(&mut self, display_points: &[Voltage], bpm: f32) -> EcgResult<()> {
            self.frames.push((display_points.len(), bpm));
            Ok(())
        }
    }

    fn monitor(blocks: usize) -> MonitorLoop<ConstantSource, RecordingRenderer> {
        let source = ConstantSource {
            count: 0,
            remaining: blocks,
            sequence: 0,
        };
        MonitorLoop::new(
            Pipeline::new(PipelineConfig::default()).unwrap(),
            source,
            RecordingRenderer::default(),
        )
    }

    #[test]
    fn test_step_renders_one_frame() {
        let mut monitor = monitor(3);
        let report = monitor.step().unwrap();

        assert_eq!(report.sequence, 0);
        assert_eq!(report.display_points.len(), 240);
        assert_eq!(monitor.renderer().frames, vec![(240, 0.0)]);
        assert_eq!(monitor.context().cycles(), 1);
    }

    #[test]
    fn test_acquisition_failure_is_surfaced() {
        let mut monitor = monitor(2);
        let stop = AtomicBool::new(false);

        let result = monitor.run_until(&stop);
        assert!(matches!(result, Err(EcgError::AcquisitionFailed { .. })));

        // Nothing is rendered for the failed cycle
        let (_, renderer) = monitor.into_parts();
        assert_eq!(renderer.frames.len(), 2);
    }

    #[test]
    fn test_stop_flag_is_checked_before_each_cycle() {
        let mut monitor = monitor(5);
        let stop = AtomicBool::new(true);
        assert_eq!(monitor.run_until(&stop).unwrap(), 0);
        assert!(monitor.renderer().frames.is_empty());
    }

    #[test]
    fn test_reset_clears_context() {
        let mut monitor = monitor(2);
        monitor.step().unwrap();
        monitor.reset();
        assert_eq!(monitor.context().cycles(), 0);
    }
}
