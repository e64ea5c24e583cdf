//! Processing service running the pipeline on streamed blocks

use chrono::Utc;
use ecg_core::{EcgResult, SampleBlock, Voltage};
use ecg_processing::{ChannelContext, CycleReport, Pipeline, PipelineConfig};
use ecg_simulation::AcquisitionEvent;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, error, info, warn};

/// Commands for controlling processing
#[derive(Debug, Clone)]
pub enum ProcessingCommand {
    Start,
    Stop,
    Pause,
    Resume,
    /// Rebuild the pipeline; the channel state starts over
    UpdateConfig(PipelineConfig),
    /// Forget filter history, last peak and heart rate
    ResetChannel,
}

/// One processed block for UI consumption
#[derive(Debug, Clone)]
pub struct ProcessedCycle {
    pub report: CycleReport,
    /// Block voltages before filtering
    pub raw: Vec<Voltage>,
    /// Full-resolution filter output
    pub filtered: Vec<Voltage>,
    pub start_time_ms: f64,
    pub sample_period_ms: f64,
}

impl ProcessedCycle {
    pub fn timestamp_ms(&self, index: usize) -> f64 {
        self.start_time_ms + index as f64 * self.sample_period_ms
    }

    pub fn duration_ms(&self) -> f64 {
        self.raw.len() as f64 * self.sample_period_ms
    }
}

/// Output of the processing service
#[derive(Debug, Clone)]
pub enum ProcessingEvent {
    Cycle(ProcessedCycle),
    /// The pipeline rejected a block
    CycleFailed { sequence: u64, reason: String },
    /// Forwarded from the acquisition stream
    AcquisitionFailed { source: String, reason: String },
    /// The acquisition source is gone; another one must be selected
    SourceLost { source: String, reason: String },
}

/// Statistics about processing performance
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub is_running: bool,
    pub cycles_processed: u64,
    pub cycles_failed: u64,
    /// Blocks dropped while stopped or paused
    pub blocks_skipped: u64,
    pub peaks_detected: u64,
    pub total_processing_time_us: u64,
    pub average_latency_us: u64,
    /// Processing time of the last cycle relative to its block duration
    pub realtime_load: f64,
    pub bpm: f32,
    /// Unix time of the last update in milliseconds
    pub last_update_ms: i64,
}

/// Real-time ECG processing service
pub struct ProcessingService {
    pipeline: Pipeline,
    context: ChannelContext,

    // Communication channels
    input_receiver: broadcast::Receiver<AcquisitionEvent>,
    output_sender: broadcast::Sender<ProcessingEvent>,
    command_receiver: mpsc::Receiver<ProcessingCommand>,
    command_sender: Option<mpsc::Sender<ProcessingCommand>>,

    is_running: bool,
    stats: Arc<Mutex<ProcessingStats>>,
}

impl ProcessingService {
    /// Create new processing service
    pub fn new(
        input_receiver: broadcast::Receiver<AcquisitionEvent>,
        config: PipelineConfig,
    ) -> EcgResult<Self> {
        let pipeline = Pipeline::new(config)?;
        let context = pipeline.new_context();
        let (output_sender, _) = broadcast::channel(50);
        let (command_sender, command_receiver) = mpsc::channel(32);

        Ok(ProcessingService {
            pipeline,
            context,
            input_receiver,
            output_sender,
            command_receiver,
            command_sender: Some(command_sender),
            is_running: false,
            stats: Arc::new(Mutex::new(ProcessingStats::default())),
        })
    }

    /// Get output receiver for processed cycles
    pub fn subscribe_output(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.output_sender.subscribe()
    }

    /// Get command sender for controlling processing
    ///
    /// Must be taken before [`run`](Self::run).
    pub fn command_handle(&self) -> Option<mpsc::Sender<ProcessingCommand>> {
        self.command_sender.clone()
    }

    pub fn stats_handle(&self) -> Arc<Mutex<ProcessingStats>> {
        self.stats.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        self.pipeline.config()
    }

    /// Main processing loop, ends when either channel closes
    pub async fn run(&mut self) -> EcgResult<()> {
        self.command_sender = None;
        info!(
            capture_depth = self.pipeline.config().capture_depth,
            display_width = self.pipeline.config().display_width,
            "processing service started"
        );

        loop {
            tokio::select! {
                // Commands queued before a block apply to it
                biased;

                command = self.command_receiver.recv() => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            info!("command channel closed");
                            break;
                        }
                    }
                }

                event = self.input_receiver.recv() => {
                    match event {
                        Ok(AcquisitionEvent::Block(block)) => {
                            if self.is_running {
                                self.process_block(block).await;
                            } else {
                                self.update_stats(|stats| stats.blocks_skipped += 1).await;
                            }
                        }
                        Ok(AcquisitionEvent::Failed { source, reason }) => {
                            warn!(source = %source, reason = %reason, "acquisition failed");
                            let _ = self.output_sender.send(ProcessingEvent::AcquisitionFailed { source, reason });
                        }
                        Ok(AcquisitionEvent::SourceLost { source, reason }) => {
                            warn!(source = %source, reason = %reason, "acquisition source lost");
                            let _ = self.output_sender.send(ProcessingEvent::SourceLost { source, reason });
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "processing lagged behind acquisition");
                            self.update_stats(|stats| stats.blocks_skipped += skipped).await;
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("input channel closed, stopping processing service");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn handle_command(&mut self, command: ProcessingCommand) {
        match command {
            ProcessingCommand::Start | ProcessingCommand::Resume => {
                self.is_running = true;
                self.update_stats(|stats| stats.is_running = true).await;
                info!("processing running");
            }
            ProcessingCommand::Pause => {
                self.is_running = false;
                self.update_stats(|stats| stats.is_running = false).await;
                info!("processing paused");
            }
            ProcessingCommand::Stop => {
                self.is_running = false;
                self.context.reset();
                let skipped = self.stats.lock().await.blocks_skipped;
                self.update_stats(|stats| {
                    *stats = ProcessingStats {
                        blocks_skipped: skipped,
                        ..ProcessingStats::default()
                    }
                })
                .await;
                info!("processing stopped");
            }
            ProcessingCommand::UpdateConfig(config) => match Pipeline::new(config) {
                Ok(pipeline) => {
                    self.context = pipeline.new_context();
                    self.pipeline = pipeline;
                    self.update_stats(|stats| stats.bpm = 0.0).await;
                    info!("pipeline configuration updated");
                }
                Err(e) => warn!(error = %e, "pipeline configuration rejected"),
            },
            ProcessingCommand::ResetChannel => {
                self.context.reset();
                self.update_stats(|stats| stats.bpm = 0.0).await;
                info!("channel state reset");
            }
        }
    }

    /// Run one block through the pipeline and publish the result
    async fn process_block(&mut self, block: SampleBlock) {
        let adc = self.pipeline.config().adc;
        let result = self
            .pipeline
            .run_cycle(&mut self.context, &block)
            .map(|output| output.to_report());

        match result {
            Ok(report) => {
                let metrics = report.metrics;
                let bpm = report.bpm;
                let load = metrics.realtime_load(block.duration_ms());

                let cycle = ProcessedCycle {
                    raw: block.voltages(&adc).collect(),
                    filtered: self.pipeline.filtered().to_vec(),
                    start_time_ms: block.start_time_ms(),
                    sample_period_ms: block.sample_period_ms(),
                    report,
                };
                // No subscribers is not an error
                let _ = self.output_sender.send(ProcessingEvent::Cycle(cycle));

                self.update_stats(|stats| {
                    stats.cycles_processed += 1;
                    stats.peaks_detected += metrics.peaks_detected as u64;
                    stats.total_processing_time_us += metrics.processing_time_us;
                    stats.average_latency_us = stats.total_processing_time_us / stats.cycles_processed;
                    stats.realtime_load = load;
                    stats.bpm = bpm;
                })
                .await;
            }
            Err(e) => {
                error!(sequence = block.sequence(), error = %e, "cycle failed");
                let _ = self.output_sender.send(ProcessingEvent::CycleFailed {
                    sequence: block.sequence(),
                    reason: e.to_string(),
                });
                self.update_stats(|stats| stats.cycles_failed += 1).await;
            }
        }
    }

    /// Update stats with a closure
    async fn update_stats<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut ProcessingStats),
    {
        let mut stats = self.stats.lock().await;
        update_fn(&mut *stats);
        stats.last_update_ms = Utc::now().timestamp_millis();
        debug!(cycles = stats.cycles_processed, bpm = stats.bpm, "stats updated");
    }
}

/// Helper function to start processing service in background
pub fn start_processing_service(
    input_receiver: broadcast::Receiver<AcquisitionEvent>,
    config: PipelineConfig,
) -> EcgResult<(
    broadcast::Receiver<ProcessingEvent>,
    mpsc::Sender<ProcessingCommand>,
    Arc<Mutex<ProcessingStats>>,
)> {
    let mut service = ProcessingService::new(input_receiver, config)?;

    let output_receiver = service.subscribe_output();
    let command_sender = service
        .command_handle()
        .ok_or_else(|| ecg_core::config_error!("processing command channel already released"))?;
    let stats_handle = service.stats_handle();

    tokio::spawn(async move {
        if let Err(e) = service.run().await {
            error!(error = %e, "processing service error");
        }
    });

    Ok((output_receiver, command_sender, stats_handle))
}
