//! Main application state and logic with processing integration

use ecg_core::{Acquisition, EcgError, Renderer};
use ecg_processing::{analyze_recording, NotchConfig, PipelineConfig, RecordingAnalysis, Spectrum, SpectrumAnalyzer};
use ecg_simulation::{
    start_acquisition_stream, AcquisitionEvent, RecordingSource, RecordingWriter, SimulatorConfig,
    StreamCommand, StreamConfig, WaveformPattern,
};
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{error, info, warn};

use crate::processing_service::{
    start_processing_service, ProcessedCycle, ProcessingCommand, ProcessingEvent, ProcessingStats,
};
use crate::render::PanelRenderer;
use crate::ui::{self, ControlPanel, PlotData, UIState};

/// Filtered R waves of the simulated patterns peak near 1V, well below the
/// board's 2.3V default
const MONITOR_THRESHOLD_V: f32 = 0.6;

/// On-screen magnification of the 240x135 panel
const PANEL_SCALE: f32 = 2.0;

/// Pipeline configuration the monitor starts with
pub fn monitor_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        threshold_v: MONITOR_THRESHOLD_V,
        notch: Some(NotchConfig::default()),
        ..PipelineConfig::default()
    }
}

/// A capture log being written
struct ActiveRecording {
    path: PathBuf,
    writer: RecordingWriter<File>,
}

/// Result of analyzing a recording file
pub struct OfflineAnalysis {
    pub name: String,
    pub analysis: RecordingAnalysis,
}

/// Main application state
pub struct MonitorApp {
    // Streaming components
    data_receiver: Option<broadcast::Receiver<AcquisitionEvent>>,
    control_sender: Option<mpsc::Sender<StreamCommand>>,

    // Processing components
    processed_receiver: Option<broadcast::Receiver<ProcessingEvent>>,
    processing_command_sender: Option<mpsc::Sender<ProcessingCommand>>,
    processing_stats: Option<Arc<Mutex<ProcessingStats>>>,

    // Tokio runtime for async operations
    runtime: tokio::runtime::Runtime,

    pub ui_state: UIState,
    pub plot_data: PlotData,
    latest_cycle: Option<ProcessedCycle>,
    cycles_received: u64,

    panel: PanelRenderer,
    panel_texture: Option<egui::TextureHandle>,
    panel_dirty: bool,

    spectrum_analyzer: SpectrumAnalyzer,
    spectra: Option<(Spectrum, Spectrum)>,

    recording: Option<ActiveRecording>,
    offline: Option<OfflineAnalysis>,
    status: Option<String>,

    // Application state
    is_running: bool,
    source_name: String,
    last_update: Instant,
    frame_count: u64,

    // Configuration
    stream_config: StreamConfig,
    simulator_config: SimulatorConfig,
    pipeline_config: PipelineConfig,

    initialized: bool,
}

impl MonitorApp {
    /// Create new application instance
    pub fn new() -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| anyhow::anyhow!("failed to create tokio runtime: {}", e))?;

        let pipeline_config = monitor_pipeline_config();
        pipeline_config.validate()?;

        let simulator_config = SimulatorConfig {
            realtime_pacing: true,
            ..SimulatorConfig::default()
        };
        let stream_config = StreamConfig {
            capture_depth: pipeline_config.capture_depth,
            sample_period_ms: pipeline_config.sample_period_ms(),
            ..StreamConfig::default()
        };

        Ok(MonitorApp {
            data_receiver: None,
            control_sender: None,
            processed_receiver: None,
            processing_command_sender: None,
            processing_stats: None,
            runtime,
            ui_state: UIState::new(&pipeline_config, simulator_config.pattern),
            plot_data: PlotData::new(),
            latest_cycle: None,
            cycles_received: 0,
            panel: PanelRenderer::new(),
            panel_texture: None,
            panel_dirty: false,
            spectrum_analyzer: SpectrumAnalyzer::new(),
            spectra: None,
            recording: None,
            offline: None,
            status: None,
            is_running: false,
            source_name: "simulator".to_string(),
            last_update: Instant::now(),
            frame_count: 0,
            stream_config,
            simulator_config,
            pipeline_config,
            initialized: false,
        })
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline_config
    }

    /// Initialize the streaming and processing components (called on first frame)
    fn initialize_services(&mut self) {
        if self.initialized {
            return;
        }

        info!("initializing acquisition stream and processing service");

        let stream_config = self.stream_config.clone();
        let simulator_config = self.simulator_config.clone();
        let pipeline_config = self.pipeline_config.clone();

        let started = self.runtime.block_on(async {
            let (data_receiver, control_sender) = start_acquisition_stream(stream_config, simulator_config)?;
            let (processed_receiver, processing_command_sender, processing_stats) =
                start_processing_service(data_receiver.resubscribe(), pipeline_config)?;

            Ok::<_, EcgError>((
                data_receiver,
                control_sender,
                processed_receiver,
                processing_command_sender,
                processing_stats,
            ))
        });

        match started {
            Ok((data_receiver, control_sender, processed_receiver, processing_command_sender, processing_stats)) => {
                self.data_receiver = Some(data_receiver);
                self.control_sender = Some(control_sender);
                self.processed_receiver = Some(processed_receiver);
                self.processing_command_sender = Some(processing_command_sender);
                self.processing_stats = Some(processing_stats);
                self.initialized = true;
                info!("services initialized");
            }
            Err(e) => {
                error!(error = %e, "failed to initialize services");
                self.status = Some(format!("Initialization failed: {}", e));
            }
        }
    }

    /// Update application state (called every frame)
    fn update_data(&mut self) {
        if !self.initialized {
            // A failed start is reported once, not retried every frame
            if self.status.is_none() {
                self.initialize_services();
            }
            return;
        }

        // Raw blocks only feed the capture log
        if let Some(receiver) = self.data_receiver.as_mut() {
            loop {
                match receiver.try_recv() {
                    Ok(AcquisitionEvent::Block(block)) => {
                        if let Some(recording) = self.recording.as_mut() {
                            if let Err(e) = recording.writer.write_block(&block) {
                                error!(error = %e, "capture log write failed");
                                self.status = Some(format!("Recording stopped: {}", e));
                                self.recording = None;
                            }
                        }
                    }
                    Ok(AcquisitionEvent::Failed { .. } | AcquisitionEvent::SourceLost { .. }) => {}
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "UI lagged behind acquisition, capture log has gaps");
                    }
                    Err(_) => break,
                }
            }
        }

        let mut latest = None;
        if let Some(receiver) = self.processed_receiver.as_mut() {
            loop {
                match receiver.try_recv() {
                    Ok(ProcessingEvent::Cycle(cycle)) => {
                        self.cycles_received += 1;
                        self.plot_data.add_cycle(&cycle);
                        latest = Some(cycle);
                    }
                    Ok(ProcessingEvent::CycleFailed { sequence, reason }) => {
                        self.status = Some(format!("Block #{} rejected: {}", sequence, reason));
                    }
                    Ok(ProcessingEvent::AcquisitionFailed { source, reason }) => {
                        // The stream has paused itself
                        self.is_running = false;
                        self.status = Some(format!("{} failed: {}", source, reason));
                    }
                    Ok(ProcessingEvent::SourceLost { source, reason }) => {
                        self.is_running = false;
                        self.status = Some(format!(
                            "{} was lost ({}); replay a recording to continue",
                            source, reason
                        ));
                    }
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!(skipped, "UI lagged behind processing");
                    }
                    Err(_) => break,
                }
            }
        }

        if let Some(cycle) = latest {
            self.present_cycle(cycle);
        }

        self.frame_count += 1;
    }

    /// Render the newest cycle to the panel and refresh derived views
    fn present_cycle(&mut self, cycle: ProcessedCycle) {
        let report = &cycle.report;
        match self.panel.render(&report.display_points, report.bpm) {
            Ok(()) => self.panel_dirty = true,
            Err(e) => self.status = Some(e.to_string()),
        }

        if self.ui_state.plot_mode == PlotMode::Spectrum {
            let sample_rate = self.pipeline_config.sample_rate_hz;
            let raw = self.spectrum_analyzer.magnitude_spectrum_db(&cycle.raw, sample_rate);
            let filtered = self.spectrum_analyzer.magnitude_spectrum_db(&cycle.filtered, sample_rate);
            self.spectra = match (raw, filtered) {
                (Ok(raw), Ok(filtered)) => Some((raw, filtered)),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "spectrum unavailable");
                    None
                }
            };
        }

        self.latest_cycle = Some(cycle);
    }

    /// Send control command to stream
    fn send_stream_command(&self, command: StreamCommand) {
        if let Some(ref sender) = self.control_sender {
            if let Err(e) = sender.try_send(command) {
                error!(error = %e, "failed to send stream command");
            }
        } else {
            warn!("stream not initialized, cannot send command");
        }
    }

    /// Send control command to processing
    fn send_processing_command(&self, command: ProcessingCommand) {
        if let Some(ref sender) = self.processing_command_sender {
            if let Err(e) = sender.try_send(command) {
                error!(error = %e, "failed to send processing command");
            }
        } else {
            warn!("processing not initialized, cannot send command");
        }
    }

    /// Start acquisition and processing
    pub fn start_stream(&mut self) {
        // Processing first so the first block is not skipped
        self.send_processing_command(ProcessingCommand::Start);
        self.send_stream_command(StreamCommand::Start);
        self.is_running = true;
        self.status = None;
    }

    /// Stop acquisition and forget the channel state
    pub fn stop_stream(&mut self) {
        self.send_stream_command(StreamCommand::Stop);
        self.send_processing_command(ProcessingCommand::Stop);
        self.is_running = false;
        self.plot_data.clear();
        self.latest_cycle = None;
        self.spectra = None;
    }

    pub fn pause_stream(&mut self) {
        self.send_stream_command(StreamCommand::Pause);
        self.send_processing_command(ProcessingCommand::Pause);
        self.is_running = false;
    }

    pub fn resume_stream(&mut self) {
        self.send_processing_command(ProcessingCommand::Resume);
        self.send_stream_command(StreamCommand::Resume);
        self.is_running = true;
    }

    /// Switch the simulated waveform
    pub fn set_pattern(&mut self, pattern: WaveformPattern) {
        self.send_stream_command(StreamCommand::SetPattern(pattern));
        self.simulator_config.pattern = pattern;
        self.ui_state.selected_pattern = pattern;
    }

    pub fn is_simulated(&self) -> bool {
        self.source_name == "simulator"
    }

    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Replace the simulator with a looping replay of a capture log
    pub fn open_recording(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Capture log", &["csv", "txt", "log"])
            .pick_file()
        else {
            return;
        };

        match RecordingSource::open(&path, self.pipeline_config.adc) {
            Ok(source) => {
                self.source_name = source.name().to_string();
                let source = source.looping(true).realtime_pacing(true);
                self.send_stream_command(StreamCommand::UseSource(Box::new(source)));
                self.send_processing_command(ProcessingCommand::ResetChannel);
                self.plot_data.clear();
                self.status = None;
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to open recording");
                self.status = Some(format!("Cannot replay {}: {}", path.display(), e));
            }
        }
    }

    /// Analyze a whole capture log offline
    pub fn analyze_recording_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Capture log", &["csv", "txt", "log"])
            .pick_file()
        else {
            return;
        };

        let result = RecordingSource::open(&path, self.pipeline_config.adc)
            .and_then(|source| analyze_recording(source.voltages(), &self.pipeline_config));

        match result {
            Ok(analysis) => {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                self.offline = Some(OfflineAnalysis { name, analysis });
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "recording analysis failed");
                self.status = Some(format!("Cannot analyze {}: {}", path.display(), e));
            }
        }
    }

    /// Start writing acquired blocks to a timestamped capture log
    pub fn start_recording(&mut self) {
        let default_name = chrono::Local::now()
            .format("ecg_capture_%Y%m%d_%H%M%S.csv")
            .to_string();
        let Some(path) = rfd::FileDialog::new()
            .add_filter("Capture log", &["csv"])
            .set_file_name(default_name)
            .save_file()
        else {
            return;
        };

        match RecordingWriter::create(&path, self.pipeline_config.adc) {
            Ok(writer) => {
                info!(path = %path.display(), "recording started");
                self.recording = Some(ActiveRecording { path, writer });
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "failed to create capture log");
                self.status = Some(format!("Cannot record to {}: {}", path.display(), e));
            }
        }
    }

    pub fn stop_recording(&mut self) {
        let Some(recording) = self.recording.take() else {
            return;
        };
        let samples = recording.writer.samples_written();
        match recording.writer.finish() {
            Ok(_) => info!(path = %recording.path.display(), samples, "recording finished"),
            Err(e) => {
                error!(error = %e, "failed to flush capture log");
                self.status = Some(format!("Recording incomplete: {}", e));
            }
        }
    }

    /// Path and sample count of the active recording
    pub fn recording_status(&self) -> Option<(String, usize)> {
        self.recording
            .as_ref()
            .map(|r| (r.path.display().to_string(), r.writer.samples_written()))
    }

    /// Apply detection and filter settings; the channel state starts over
    /// Replace the running pipeline with one built from `config`
    ///
    /// This is a re-initialization: the processing service builds a new
    /// pipeline and a fresh channel context.
    pub fn update_pipeline_config(&mut self, config: PipelineConfig) {
        if let Err(e) = config.validate() {
            self.status = Some(format!("Settings rejected: {}", e));
            return;
        }
        self.send_processing_command(ProcessingCommand::UpdateConfig(config.clone()));
        self.pipeline_config = config;
        self.status = None;
    }

    pub fn reset_channel(&mut self) {
        self.send_processing_command(ProcessingCommand::ResetChannel);
    }

    /// Get current statistics
    pub fn get_stats(&self) -> AppStats {
        AppStats {
            is_running: self.is_running,
            initialized: self.initialized,
            cycles_received: self.cycles_received,
            plotted_samples: self.plot_data.len(),
            frame_count: self.frame_count,
            fps: self.calculate_fps(),
        }
    }

    /// Get processing statistics
    pub fn get_processing_stats(&self) -> Option<ProcessingStats> {
        // Never block the UI thread on the service
        let stats_handle = self.processing_stats.as_ref()?;
        stats_handle.try_lock().ok().map(|stats| stats.clone())
    }

    fn calculate_fps(&self) -> f32 {
        let elapsed = self.last_update.elapsed().as_secs_f32();
        if elapsed > 0.0 {
            1.0 / elapsed
        } else {
            0.0
        }
    }

    fn refresh_panel_texture(&mut self, ctx: &egui::Context) {
        if !self.panel_dirty && self.panel_texture.is_some() {
            return;
        }
        let image = ui::panel_image(&self.panel);
        match self.panel_texture.as_mut() {
            Some(texture) => texture.set(image, egui::TextureOptions::NEAREST),
            None => {
                self.panel_texture = Some(ctx.load_texture("ecg_panel", image, egui::TextureOptions::NEAREST));
            }
        }
        self.panel_dirty = false;
    }
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_data();
        self.last_update = Instant::now();

        // Request continuous repaints for real-time updates
        ctx.request_repaint();

        if !self.initialized {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.add_space(200.0);
                    ui.heading("Initializing ECG Monitor...");
                    ui.add_space(20.0);
                    ui.spinner();
                    if let Some(status) = &self.status {
                        ui.colored_label(egui::Color32::RED, status);
                    }
                });
            });
            return;
        }

        self.refresh_panel_texture(ctx);

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    if ui.button("Replay Recording...").clicked() {
                        self.open_recording();
                        ui.close_menu();
                    }
                    if ui.button("Analyze Recording...").clicked() {
                        self.analyze_recording_file();
                        ui.close_menu();
                    }
                });

                ui.menu_button("View", |ui| {
                    ui.checkbox(&mut self.ui_state.show_controls, "Show Controls");
                    ui.checkbox(&mut self.ui_state.show_stats, "Show Statistics");
                    ui.checkbox(&mut self.ui_state.show_plot, "Show Plot");
                    ui.checkbox(&mut self.ui_state.show_panel, "Show Panel");
                });

                ui.menu_button("Processing", |ui| {
                    if ui.button("Reset Heart Rate").clicked() {
                        self.reset_channel();
                        ui.close_menu();
                    }
                    if ui.button("Settings").clicked() {
                        self.ui_state.pipeline_draft = self.pipeline_config.clone();
                        self.ui_state.show_settings = true;
                        ui.close_menu();
                    }
                });

                ui.separator();

                let status_color = if self.is_running {
                    egui::Color32::GREEN
                } else {
                    egui::Color32::RED
                };
                ui.colored_label(status_color, if self.is_running { "● RUNNING" } else { "● STOPPED" });

                if let Some(cycle) = &self.latest_cycle {
                    ui.separator();
                    ui.label(format!("HR: {:.0} BPM", cycle.report.bpm));
                }

                if let Some(status) = &self.status {
                    ui.separator();
                    ui.colored_label(egui::Color32::YELLOW, status);
                }
            });
        });

        if self.ui_state.show_controls {
            egui::SidePanel::left("control_panel")
                .resizable(true)
                .default_width(300.0)
                .show(ctx, |ui| {
                    ControlPanel::show(ui, self);
                });
        }

        if self.ui_state.show_stats || self.ui_state.show_panel {
            egui::SidePanel::right("stats_panel")
                .resizable(true)
                .default_width(PANEL_SCALE * 240.0 + 20.0)
                .show(ctx, |ui| {
                    if self.ui_state.show_panel {
                        ui.heading("Bedside Panel");
                        if let Some(texture) = &self.panel_texture {
                            ui::show_panel(ui, texture, self.panel.overlay(), PANEL_SCALE);
                        }
                        ui.separator();
                    }

                    if self.ui_state.show_stats {
                        ui.heading("Heart Rate");
                        ui.separator();

                        match &self.latest_cycle {
                            Some(cycle) => {
                                let state = cycle.report.heart_rate;
                                ui.label(format!("Smoothed: {:.1} BPM", state.smoothed_bpm));
                                ui.label(format!("Beats: {}", state.peak_count));
                                if let Some(last) = state.last_peak_ms {
                                    ui.label(format!("Last R peak: {:.0}ms", last));
                                }
                                ui.label(format!("Peaks in block: {}", cycle.report.peaks.len()));
                            }
                            None => {
                                ui.label("No cycles yet");
                            }
                        }

                        ui.separator();
                        ui.heading("Processing Statistics");
                        ui.separator();

                        let stats = self.get_stats();
                        ui.label(format!("Cycles received: {}", stats.cycles_received));
                        ui.label(format!("Plotted samples: {}", stats.plotted_samples));
                        ui.label(format!("Frame count: {}", stats.frame_count));
                        ui.label(format!("FPS: {:.1}", stats.fps));

                        if let Some(proc_stats) = self.get_processing_stats() {
                            ui.label(format!("Processing: {}", if proc_stats.is_running { "Running" } else { "Stopped" }));
                            ui.label(format!("Cycles processed: {}", proc_stats.cycles_processed));
                            ui.label(format!("Cycles failed: {}", proc_stats.cycles_failed));
                            ui.label(format!("Blocks skipped: {}", proc_stats.blocks_skipped));
                            ui.label(format!("Avg latency: {}μs", proc_stats.average_latency_us));
                            ui.label(format!("Real-time load: {:.2}%", proc_stats.realtime_load * 100.0));
                        } else {
                            ui.label("Processing stats unavailable");
                        }
                    }
                });
        }

        if self.ui_state.show_plot {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.selectable_value(&mut self.ui_state.plot_mode, PlotMode::Filtered, "Filtered");
                    ui.selectable_value(&mut self.ui_state.plot_mode, PlotMode::Raw, "Raw");
                    ui.selectable_value(&mut self.ui_state.plot_mode, PlotMode::Display, "Display Points");
                    ui.selectable_value(&mut self.ui_state.plot_mode, PlotMode::Spectrum, "Spectrum");
                });

                ui.separator();

                match self.ui_state.plot_mode {
                    PlotMode::Raw | PlotMode::Filtered => {
                        self.plot_data.show_plot(ui, &self.ui_state, self.pipeline_config.threshold_v);
                    }
                    PlotMode::Display => match &self.latest_cycle {
                        Some(cycle) => ui::show_display_points(ui, cycle),
                        None => {
                            ui.label("Waiting for the first cycle");
                        }
                    },
                    PlotMode::Spectrum => match &self.spectra {
                        Some((raw, filtered)) => {
                            ui::show_spectrum(ui, "block_spectrum", raw, filtered, self.ui_state.spectrum_max_hz);
                        }
                        None => {
                            ui.label("Waiting for the next cycle");
                        }
                    },
                }
            });
        }

        if self.ui_state.show_settings {
            let mut open = true;
            let mut apply = false;
            egui::Window::new("Settings")
                .open(&mut open)
                .resizable(true)
                .default_size([400.0, 300.0])
                .show(ctx, |ui| {
                    ui::show_settings(ui, &mut self.ui_state.pipeline_draft);
                    ui.separator();
                    ui.label("Applying restarts the channel: filter history, last peak and heart rate start over.");
                    ui.horizontal(|ui| {
                        if ui.button("Apply and Restart Channel").clicked() {
                            apply = true;
                        }
                        if ui.button("Reset to Defaults").clicked() {
                            self.ui_state.pipeline_draft = monitor_pipeline_config();
                        }
                    });
                });
            if apply {
                self.update_pipeline_config(self.ui_state.pipeline_draft.clone());
            }
            self.ui_state.show_settings = open;
        }

        let mut close_analysis = false;
        if let Some(offline) = &self.offline {
            let mut open = true;
            egui::Window::new("Recording Analysis")
                .open(&mut open)
                .resizable(true)
                .default_size([700.0, 650.0])
                .show(ctx, |ui| {
                    ui::show_analysis(
                        ui,
                        &offline.name,
                        &offline.analysis,
                        self.pipeline_config.sample_rate_hz,
                        self.ui_state.spectrum_max_hz,
                    );
                });
            close_analysis = !open;
        }
        if close_analysis {
            self.offline = None;
        }
    }
}

impl Drop for MonitorApp {
    fn drop(&mut self) {
        self.stop_recording();
    }
}

/// Application statistics
#[derive(Debug, Clone)]
pub struct AppStats {
    pub is_running: bool,
    pub initialized: bool,
    pub cycles_received: u64,
    pub plotted_samples: usize,
    pub frame_count: u64,
    pub fps: f32,
}

/// Plot modes for signal visualization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotMode {
    Raw,
    Filtered,
    Display,
    Spectrum,
}
