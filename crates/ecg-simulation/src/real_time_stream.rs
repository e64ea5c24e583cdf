//! Real-time block acquisition for live processing
//!
//! Acquisition blocks until a whole capture is ready, so each call runs on
//! tokio's blocking pool. Completed blocks are broadcast by value; the stream
//! keeps nothing once a block is sent.

use crate::ecg_simulator::{EcgSimulator, SimulatorConfig};
use crate::signal_patterns::WaveformPattern;
use ecg_core::{Acquisition, EcgError, EcgResult, SampleBlock};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Configuration for real-time streaming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Samples per block
    pub capture_depth: usize,
    /// Milliseconds between samples
    pub sample_period_ms: f64,
    /// Blocks buffered for slow subscribers
    pub buffer_size: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            capture_depth: 2400,
            sample_period_ms: 1.0,
            buffer_size: 8,
        }
    }
}

impl StreamConfig {
    pub fn validate(&self) -> EcgResult<()> {
        if self.capture_depth == 0 || self.buffer_size == 0 {
            return Err(ecg_core::config_error!(
                "capture depth and buffer size must be non-zero"
            ));
        }
        if !(self.sample_period_ms.is_finite() && self.sample_period_ms > 0.0) {
            return Err(ecg_core::config_error!(
                "sample period must be positive, got {}ms",
                self.sample_period_ms
            ));
        }
        Ok(())
    }
}

/// Output of the stream
#[derive(Debug, Clone)]
pub enum AcquisitionEvent {
    Block(SampleBlock),
    /// The source failed; the stream pauses until told otherwise
    Failed { source: String, reason: String },
    /// The source panicked and was dropped; a new one must be supplied with
    /// [`StreamCommand::UseSource`] before the stream can start again
    SourceLost { source: String, reason: String },
}

/// Commands for controlling the stream
pub enum StreamCommand {
    Start,
    Stop,
    Pause,
    Resume,
    /// Replace the acquisition source, e.g. with a recording
    UseSource(Box<dyn Acquisition>),
    /// Switch the simulator to a new waveform (ignored for other sources)
    SetPattern(WaveformPattern),
}

impl fmt::Debug for StreamCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamCommand::Start => write!(f, "Start"),
            StreamCommand::Stop => write!(f, "Stop"),
            StreamCommand::Pause => write!(f, "Pause"),
            StreamCommand::Resume => write!(f, "Resume"),
            StreamCommand::UseSource(source) => write!(f, "UseSource({})", source.name()),
            StreamCommand::SetPattern(pattern) => write!(f, "SetPattern({})", pattern.description()),
        }
    }
}

/// Stream statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStats {
    pub is_running: bool,
    pub blocks_acquired: u64,
    pub failures: u64,
}

/// Where blocks come from
enum Source {
    Simulator(EcgSimulator),
    Other(Box<dyn Acquisition>),
}

impl Source {
    fn name(&mut self) -> String {
        self.acquisition().name().to_string()
    }

    fn acquisition(&mut self) -> &mut dyn Acquisition {
        match self {
            Source::Simulator(simulator) => simulator,
            Source::Other(source) => source.as_mut(),
        }
    }
}

/// Real-time block stream
pub struct AcquisitionStream {
    config: StreamConfig,
    source: Option<Source>,
    source_name: String,
    data_sender: broadcast::Sender<AcquisitionEvent>,
    control_receiver: mpsc::Receiver<StreamCommand>,
    control_sender: Option<mpsc::Sender<StreamCommand>>,
    stats: StreamStats,
}

impl AcquisitionStream {
    /// Stream from a simulator
    pub fn simulated(config: StreamConfig, simulator: SimulatorConfig) -> EcgResult<Self> {
        Self::with_source(config, Source::Simulator(EcgSimulator::new(simulator)?))
    }

    /// Stream from any acquisition source
    pub fn new(config: StreamConfig, source: Box<dyn Acquisition>) -> EcgResult<Self> {
        Self::with_source(config, Source::Other(source))
    }

    fn with_source(config: StreamConfig, mut source: Source) -> EcgResult<Self> {
        config.validate()?;
        let (data_sender, _) = broadcast::channel(config.buffer_size);
        let (control_sender, control_receiver) = mpsc::channel(32);

        Ok(Self {
            config,
            source_name: source.name(),
            source: Some(source),
            data_sender,
            control_receiver,
            control_sender: Some(control_sender),
            stats: StreamStats::default(),
        })
    }

    /// Get a receiver for data updates
    pub fn subscribe(&self) -> broadcast::Receiver<AcquisitionEvent> {
        self.data_sender.subscribe()
    }

    /// Get control sender for sending commands
    ///
    /// Handles must be taken before [`run`](Self::run); the stream ends once
    /// every handle is dropped.
    pub fn control_handle(&self) -> Option<mpsc::Sender<StreamCommand>> {
        self.control_sender.clone()
    }

    pub fn stats(&self) -> &StreamStats {
        &self.stats
    }

    /// Run until the control channel closes
    ///
    /// Commands are handled between blocks; a block that is being acquired
    /// always completes first.
    pub async fn run(&mut self) -> EcgResult<()> {
        self.control_sender = None;
        info!(
            capture_depth = self.config.capture_depth,
            sample_period_ms = self.config.sample_period_ms,
            "acquisition stream ready"
        );

        'stream: loop {
            // Drain pending commands without waiting
            loop {
                match self.control_receiver.try_recv() {
                    Ok(command) => self.handle_command(command),
                    Err(mpsc::error::TryRecvError::Empty) => break,
                    Err(mpsc::error::TryRecvError::Disconnected) => break 'stream,
                }
            }

            if !self.stats.is_running {
                match self.control_receiver.recv().await {
                    Some(command) => self.handle_command(command),
                    None => break 'stream,
                }
                continue;
            }

            match self.acquire().await {
                Ok(block) => {
                    self.stats.blocks_acquired += 1;
                    // No subscribers is not an error
                    let _ = self.data_sender.send(AcquisitionEvent::Block(block));
                }
                Err(e) => {
                    self.stats.failures += 1;
                    self.stats.is_running = false;
                    let source = self.source_name.clone();
                    let reason = e.to_string();

                    let event = if self.source.is_none() {
                        error!(source = %source, error = %e, "acquisition source lost, stream stopped");
                        AcquisitionEvent::SourceLost { source, reason }
                    } else {
                        error!(source = %source, error = %e, "acquisition failed, pausing stream");
                        AcquisitionEvent::Failed { source, reason }
                    };
                    let _ = self.data_sender.send(event);
                }
            }
        }

        info!(blocks = self.stats.blocks_acquired, "acquisition stream closed");
        Ok(())
    }

    /// Acquire one block on the blocking pool
    async fn acquire(&mut self) -> EcgResult<SampleBlock> {
        let mut source = self
            .source
            .take()
            .ok_or_else(|| ecg_core::acquisition_error!("no acquisition source"))?;
        let capacity = self.config.capture_depth;
        let period = self.config.sample_period_ms;

        let joined = tokio::task::spawn_blocking(move || {
            let result = source.acquisition().acquire_block(capacity, period);
            (source, result)
        })
        .await;

        match joined {
            Ok((source, result)) => {
                self.source = Some(source);
                result
            }
            Err(e) => Err(EcgError::AcquisitionFailed {
                reason: format!("acquisition task panicked: {}", e),
            }),
        }
    }

    fn handle_command(&mut self, command: StreamCommand) {
        match command {
            StreamCommand::Start | StreamCommand::Resume => {
                if self.source.is_none() {
                    warn!("no acquisition source, ignoring {:?}", command);
                    return;
                }
                self.stats.is_running = true;
                info!("acquisition stream running");
            }
            StreamCommand::Pause => {
                self.stats.is_running = false;
                info!("acquisition stream paused");
            }
            StreamCommand::Stop => {
                self.stats.is_running = false;
                self.stats.blocks_acquired = 0;
                if let Some(Source::Simulator(simulator)) = self.source.as_mut() {
                    simulator.reset_time();
                }
                info!("acquisition stream stopped");
            }
            StreamCommand::UseSource(source) => {
                info!(source = source.name(), "acquisition source replaced");
                self.source_name = source.name().to_string();
                self.source = Some(Source::Other(source));
                self.stats.blocks_acquired = 0;
            }
            StreamCommand::SetPattern(pattern) => match self.source.as_mut() {
                Some(Source::Simulator(simulator)) => {
                    if let Err(e) = simulator.set_pattern(pattern) {
                        warn!(error = %e, "pattern rejected");
                    } else {
                        info!(pattern = pattern.description(), "simulator pattern updated");
                    }
                }
                _ => warn!("current source is not a simulator, pattern ignored"),
            },
        }
    }
}

/// Helper function to create and start a simulated stream in the background
pub fn start_acquisition_stream(
    config: StreamConfig,
    simulator: SimulatorConfig,
) -> EcgResult<(broadcast::Receiver<AcquisitionEvent>, mpsc::Sender<StreamCommand>)> {
    let mut stream = AcquisitionStream::simulated(config, simulator)?;
    let data_receiver = stream.subscribe();
    let control_sender = stream
        .control_handle()
        .ok_or_else(|| ecg_core::config_error!("stream control channel already released"))?;

    tokio::spawn(async move {
        if let Err(e) = stream.run().await {
            error!(error = %e, "acquisition stream error");
        }
    });

    Ok((data_receiver, control_sender))
}
