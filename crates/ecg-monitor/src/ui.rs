//! UI components and state management

use crate::app::{MonitorApp, PlotMode};
use crate::processing_service::ProcessedCycle;
use crate::render::{PanelRenderer, OVERLAY_POSITION, PANEL_HEIGHT, PANEL_WIDTH};
use ecg_core::PeakEvent;
use ecg_processing::{CycleReport, PipelineConfig, RecordingAnalysis, Spectrum};
use ecg_simulation::WaveformPattern;
use egui_plot::{Corner, HLine, Legend, Line, MarkerShape, Plot, PlotPoints, Points};
use std::collections::VecDeque;

/// UI state management
#[derive(Debug)]
pub struct UIState {
    // Panel visibility
    pub show_controls: bool,
    pub show_stats: bool,
    pub show_plot: bool,
    pub show_panel: bool,
    pub show_settings: bool,

    pub selected_pattern: WaveformPattern,
    pub plot_mode: PlotMode,
    /// Edited in the settings window, applied on request
    pub pipeline_draft: PipelineConfig,

    // Plot settings
    pub plot_window_duration: f32,
    pub plot_auto_scale: bool,
    pub plot_y_range: [f32; 2],
    pub spectrum_max_hz: f32,
}

impl UIState {
    pub fn new(pipeline: &PipelineConfig, pattern: WaveformPattern) -> Self {
        Self {
            show_controls: true,
            show_stats: true,
            show_plot: true,
            show_panel: true,
            show_settings: false,

            selected_pattern: pattern,
            plot_mode: PlotMode::Filtered,
            pipeline_draft: pipeline.clone(),

            plot_window_duration: 5.0,
            plot_auto_scale: true,
            plot_y_range: [-1.0, 2.0],
            spectrum_max_hz: 100.0,
        }
    }
}

/// Rolling time series of raw and filtered samples
pub struct PlotData {
    raw: VecDeque<[f64; 2]>,
    filtered: VecDeque<[f64; 2]>,
    peaks: VecDeque<[f64; 2]>,
    max_points: usize,
    current_time: f64,
}

impl PlotData {
    pub fn new() -> Self {
        Self {
            raw: VecDeque::new(),
            filtered: VecDeque::new(),
            peaks: VecDeque::new(),
            max_points: 10_000, // 10 seconds at 1kHz
            current_time: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    /// Append one processed block, times in seconds
    pub fn add_cycle(&mut self, cycle: &ProcessedCycle) {
        for (i, (&raw, &filtered)) in cycle.raw.iter().zip(&cycle.filtered).enumerate() {
            let t = cycle.timestamp_ms(i) / 1000.0;
            self.raw.push_back([t, raw as f64]);
            self.filtered.push_back([t, filtered as f64]);
        }
        for peak in &cycle.report.peaks {
            self.peaks.push_back([peak.timestamp_ms / 1000.0, peak.voltage as f64]);
        }

        while self.raw.len() > self.max_points {
            self.raw.pop_front();
            self.filtered.pop_front();
        }
        if let Some(&[oldest, _]) = self.raw.front() {
            while self.peaks.front().map_or(false, |p| p[0] < oldest) {
                self.peaks.pop_front();
            }
        }

        self.current_time = (cycle.start_time_ms + cycle.duration_ms()) / 1000.0;
    }

    /// Clear all plot data
    pub fn clear(&mut self) {
        self.raw.clear();
        self.filtered.clear();
        self.peaks.clear();
        self.current_time = 0.0;
    }

    fn recent(&self, series: &VecDeque<[f64; 2]>, window_start: f64) -> Vec<[f64; 2]> {
        series.iter().filter(|p| p[0] >= window_start).copied().collect()
    }

    /// Show raw or filtered samples with detected peaks
    pub fn show_plot(&self, ui: &mut egui::Ui, ui_state: &UIState, threshold_v: f32) {
        let plot = Plot::new("ecg_plot")
            .legend(Legend::default().position(Corner::LeftTop))
            .height(400.0)
            .allow_zoom(true)
            .allow_drag(true);

        let plot = if ui_state.plot_auto_scale {
            plot
        } else {
            plot.include_y(ui_state.plot_y_range[0])
                .include_y(ui_state.plot_y_range[1])
        };

        let window_start = self.current_time - ui_state.plot_window_duration as f64;
        let show_raw = ui_state.plot_mode == PlotMode::Raw;

        plot.show(ui, |plot_ui| {
            if show_raw {
                let points = self.recent(&self.raw, window_start);
                plot_ui.line(
                    Line::new(PlotPoints::from(points))
                        .color(egui::Color32::from_rgb(255, 100, 100))
                        .name("Raw (V)"),
                );
                return;
            }

            let points = self.recent(&self.filtered, window_start);
            plot_ui.line(
                Line::new(PlotPoints::from(points))
                    .color(egui::Color32::from_rgb(100, 150, 255))
                    .name("Filtered (V)"),
            );
            plot_ui.hline(
                HLine::new(threshold_v as f64)
                    .color(egui::Color32::from_rgb(255, 255, 100))
                    .name("Threshold"),
            );

            let peaks = self.recent(&self.peaks, window_start);
            if !peaks.is_empty() {
                plot_ui.points(
                    Points::new(PlotPoints::from(peaks))
                        .shape(MarkerShape::Circle)
                        .radius(4.0)
                        .color(egui::Color32::from_rgb(100, 255, 100))
                        .name("R peaks"),
                );
            }
        });

        if !self.is_empty() {
            ui.separator();
            ui.horizontal(|ui| {
                ui.label(format!("Data points: {}", self.len()));
                ui.separator();
                ui.label(format!("Time: {:.1}s", self.current_time));
            });
        }
    }
}

/// Display column a peak falls into
fn peak_column(peak: &PeakEvent, cycle: &ProcessedCycle) -> f64 {
    let columns = cycle.report.display_points.len().max(1);
    let window = (cycle.raw.len() / columns).max(1) as f64;
    (peak.timestamp_ms - cycle.start_time_ms) / cycle.sample_period_ms / window
}

/// Downsampled display points of the latest cycle, one per column
pub fn show_display_points(ui: &mut egui::Ui, cycle: &ProcessedCycle) {
    let report: &CycleReport = &cycle.report;
    ui.label(format!(
        "Block #{} - {} columns, {} peaks",
        report.sequence,
        report.display_points.len(),
        report.peaks.len()
    ));

    Plot::new("display_plot")
        .legend(Legend::default().position(Corner::LeftTop))
        .height(400.0)
        .show(ui, |plot_ui| {
            let points: PlotPoints = report
                .display_points
                .iter()
                .enumerate()
                .map(|(i, &v)| [i as f64, v as f64])
                .collect();
            plot_ui.line(Line::new(points).name("Display points"));

            let peaks: PlotPoints = report
                .peaks
                .iter()
                .map(|p| [peak_column(p, cycle), p.voltage as f64])
                .collect();
            plot_ui.points(
                Points::new(peaks)
                    .shape(MarkerShape::Diamond)
                    .radius(5.0)
                    .color(egui::Color32::from_rgb(100, 255, 100))
                    .name("R peaks"),
            );
        });
}

/// Raw and filtered magnitude spectra
pub fn show_spectrum(ui: &mut egui::Ui, id: &str, raw: &Spectrum, filtered: &Spectrum, max_hz: f32) {
    let below = |spectrum: &Spectrum| -> PlotPoints {
        spectrum.points().filter(|p| p[0] <= max_hz as f64).collect()
    };

    Plot::new(id)
        .legend(Legend::default().position(Corner::RightTop))
        .height(300.0)
        .show(ui, |plot_ui| {
            plot_ui.line(
                Line::new(below(raw))
                    .color(egui::Color32::from_rgb(255, 100, 100))
                    .name("Raw (dB)"),
            );
            plot_ui.line(
                Line::new(below(filtered))
                    .color(egui::Color32::from_rgb(100, 150, 255))
                    .name("Filtered (dB)"),
            );
        });

    ui.horizontal(|ui| {
        if let Some(f) = raw.dominant_frequency() {
            ui.label(format!("Raw dominant: {:.2}Hz", f));
        }
        ui.separator();
        if let Some(f) = filtered.dominant_frequency() {
            ui.label(format!("Filtered dominant: {:.2}Hz", f));
        }
        ui.separator();
        ui.label(format!("Resolution: {:.3}Hz", filtered.bin_width_hz()));
    });
}

/// Frame buffer of the panel as an image
pub fn panel_image(panel: &PanelRenderer) -> egui::ColorImage {
    let rgb: Vec<u8> = panel.pixels().iter().flat_map(|p| p.rgb()).collect();
    egui::ColorImage::from_rgb([PANEL_WIDTH, PANEL_HEIGHT], &rgb)
}

/// Draw the panel texture scaled up, with the heart-rate overlay on top
pub fn show_panel(ui: &mut egui::Ui, texture: &egui::TextureHandle, overlay: &str, scale: f32) {
    let size = egui::vec2(PANEL_WIDTH as f32 * scale, PANEL_HEIGHT as f32 * scale);
    let response = ui.image((texture.id(), size));

    let (x, y) = OVERLAY_POSITION;
    ui.painter().text(
        response.rect.min + egui::vec2(x as f32 * scale, y as f32 * scale),
        egui::Align2::LEFT_TOP,
        overlay,
        egui::FontId::monospace(16.0 * scale),
        egui::Color32::GREEN,
    );
}

/// Summary of an offline recording analysis
pub fn show_analysis(ui: &mut egui::Ui, name: &str, analysis: &RecordingAnalysis, sample_rate_hz: f32, max_hz: f32) {
    ui.heading(name);
    ui.label(format!("Samples: {}", analysis.filtered.len()));
    ui.label(format!("Peaks: {}", analysis.peaks.len()));
    match analysis.mean_bpm {
        Some(bpm) => ui.label(format!("Mean heart rate: {:.1} BPM", bpm)),
        None => ui.label("Mean heart rate: not enough peaks"),
    };

    let rr = analysis.rr_intervals_ms();
    if !rr.is_empty() {
        let min = rr.iter().copied().fold(f64::INFINITY, f64::min);
        let max = rr.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        ui.label(format!("RR intervals: {:.0} - {:.0}ms", min, max));
    }

    ui.label(format!(
        "Raw: mean {:.3}V, p-p {:.3}V | Filtered: rms {:.3}V, p-p {:.3}V",
        analysis.raw_stats.mean,
        analysis.raw_stats.peak_to_peak,
        analysis.filtered_stats.rms,
        analysis.filtered_stats.peak_to_peak
    ));

    ui.separator();
    Plot::new("analysis_waveform")
        .legend(Legend::default().position(Corner::LeftTop))
        .height(250.0)
        .show(ui, |plot_ui| {
            let period_s = 1.0 / sample_rate_hz as f64;
            let points: PlotPoints = analysis
                .filtered
                .iter()
                .enumerate()
                .map(|(i, &v)| [i as f64 * period_s, v as f64])
                .collect();
            plot_ui.line(Line::new(points).name("Filtered (V)"));

            let peaks: PlotPoints = analysis
                .peaks
                .iter()
                .map(|p| [p.timestamp_ms / 1000.0, p.voltage as f64])
                .collect();
            plot_ui.points(Points::new(peaks).radius(4.0).name("R peaks"));
        });

    show_spectrum(ui, "analysis_spectrum", &analysis.raw_spectrum, &analysis.filtered_spectrum, max_hz);
}

/// Control panel UI
pub struct ControlPanel;

impl ControlPanel {
    pub fn show(ui: &mut egui::Ui, app: &mut MonitorApp) {
        ui.heading("ECG Monitor Controls");
        ui.separator();

        // Playback controls
        ui.group(|ui| {
            ui.label("Acquisition");

            ui.horizontal(|ui| {
                if ui.button("▶ Start").clicked() {
                    app.start_stream();
                }
                if ui.button("⏸ Pause").clicked() {
                    app.pause_stream();
                }
                if ui.button("⏹ Stop").clicked() {
                    app.stop_stream();
                }
                if ui.button("▶ Resume").clicked() {
                    app.resume_stream();
                }
            });

            ui.label(format!("Source: {}", app.source_name()));
            if ui.button("Replay recording...").clicked() {
                app.open_recording();
            }
        });

        ui.separator();

        // Waveform selection, simulator only
        ui.group(|ui| {
            ui.label("Simulated Waveform");

            ui.add_enabled_ui(app.is_simulated(), |ui| {
                let current_description = app.ui_state.selected_pattern.description();
                egui::ComboBox::from_id_source("waveform_pattern_combo")
                    .selected_text(current_description)
                    .show_ui(ui, |ui| {
                        for (name, pattern) in WaveformPattern::presets() {
                            if ui
                                .selectable_label(app.ui_state.selected_pattern == pattern, name)
                                .clicked()
                            {
                                app.set_pattern(pattern);
                            }
                        }
                    });
            });

            if let Some(bpm) = app.ui_state.selected_pattern.heart_rate_bpm() {
                ui.label(format!("Expected: {:.0} BPM", bpm));
            }
        });

        ui.separator();

        // Recording
        ui.group(|ui| {
            ui.label("Capture Log");
            match app.recording_status() {
                Some((path, samples)) => {
                    ui.label(format!("Writing {}", path));
                    ui.label(format!("{} samples", samples));
                    if ui.button("⏹ Stop Recording").clicked() {
                        app.stop_recording();
                    }
                }
                None => {
                    if ui.button("⏺ Record to CSV...").clicked() {
                        app.start_recording();
                    }
                }
            }
            if ui.button("Analyze recording...").clicked() {
                app.analyze_recording_file();
            }
        });

        ui.separator();

        // Plot controls
        ui.group(|ui| {
            ui.label("Plot Settings");

            ui.horizontal(|ui| {
                ui.label("Window:");
                ui.add(egui::Slider::new(&mut app.ui_state.plot_window_duration, 1.0..=10.0).suffix("s"));
            });

            ui.checkbox(&mut app.ui_state.plot_auto_scale, "Auto-scale Y axis");

            if !app.ui_state.plot_auto_scale {
                ui.horizontal(|ui| {
                    ui.label("Y Range:");
                    ui.add(egui::DragValue::new(&mut app.ui_state.plot_y_range[0]).speed(0.1).prefix("Min: "));
                    ui.add(egui::DragValue::new(&mut app.ui_state.plot_y_range[1]).speed(0.1).prefix("Max: "));
                });
            }

            ui.horizontal(|ui| {
                ui.label("Spectrum up to:");
                ui.add(egui::Slider::new(&mut app.ui_state.spectrum_max_hz, 10.0..=500.0).suffix("Hz"));
            });
        });

        ui.separator();
        ui.collapsing("Help", |ui| {
            ui.label("Controls:");
            ui.label("• Start/Stop control acquisition and processing together");
            ui.label("• Pick a waveform to change the simulated heart");
            ui.label("• Replay a capture log recorded from the board");
            ui.label("• Detection settings live in Processing > Settings");
        });
    }
}

/// Detection settings editor
pub fn show_settings(ui: &mut egui::Ui, draft: &mut PipelineConfig) {
    ui.heading("Detection");

    ui.horizontal(|ui| {
        ui.label("R-peak threshold:");
        ui.add(egui::Slider::new(&mut draft.threshold_v, 0.1..=3.0).suffix("V"));
    });
    ui.horizontal(|ui| {
        ui.label("Refractory period:");
        ui.add(egui::Slider::new(&mut draft.refractory_ms, 100.0..=600.0).suffix("ms"));
    });
    ui.horizontal(|ui| {
        ui.label("Smoothing weight:");
        ui.add(egui::Slider::new(&mut draft.ema_retain_weight, 0.0..=0.95));
    });

    ui.separator();
    ui.heading("Filtering");

    let mut notch = draft.notch.is_some();
    if ui.checkbox(&mut notch, "Powerline notch").changed() {
        draft.notch = notch.then(Default::default);
    }
    if let Some(notch) = draft.notch.as_mut() {
        ui.horizontal(|ui| {
            ui.radio_value(&mut notch.frequency_hz, 50.0, "50Hz");
            ui.radio_value(&mut notch.frequency_hz, 60.0, "60Hz");
        });
        ui.horizontal(|ui| {
            ui.label("Q:");
            ui.add(egui::Slider::new(&mut notch.q, 5.0..=60.0));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecg_core::HeartRateState;
    use ecg_processing::CycleMetrics;

    fn cycle(sequence: u64, peaks: Vec<PeakEvent>) -> ProcessedCycle {
        ProcessedCycle {
            report: CycleReport {
                sequence,
                display_points: vec![0.0; 240],
                bpm: 60.0,
                peaks,
                heart_rate: HeartRateState::default(),
                metrics: CycleMetrics::default(),
            },
            raw: vec![1.65; 2400],
            filtered: vec![0.0; 2400],
            start_time_ms: sequence as f64 * 2400.0,
            sample_period_ms: 1.0,
        }
    }

    #[test]
    fn test_plot_data_keeps_last_ten_seconds() {
        let mut data = PlotData::new();
        for sequence in 0..6 {
            let peak = PeakEvent::new(sequence as f64 * 2400.0 + 500.0, 1.2);
            data.add_cycle(&cycle(sequence, vec![peak]));
        }

        assert_eq!(data.len(), 10_000);
        assert!((data.current_time - 14.4).abs() < 1e-9);
        // Peaks older than the oldest sample are dropped
        assert_eq!(data.peaks.len(), 4);
        assert!(data.peaks.iter().all(|p| p[0] >= data.raw[0][0]));

        data.clear();
        assert!(data.is_empty());
    }

    #[test]
    fn test_peak_column() {
        let cycle = cycle(1, vec![]);
        let peak = PeakEvent::new(2400.0 + 505.0, 1.0);
        assert!((peak_column(&peak, &cycle) - 50.5).abs() < 1e-9);
    }
}
