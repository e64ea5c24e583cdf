//! Offline analysis of a complete recording
//!
//! Runs the same filters and detector as the real-time pipeline over a whole
//! capture at once and summarizes it: detected beats, mean heart rate and
//! the spectra before and after filtering.

use crate::config::PipelineConfig;
use crate::detection::PeakDetector;
use crate::filters::{BandpassFilter, NotchFilter};
use crate::processor::SampleFilter;
use crate::spectrum::{Spectrum, SpectrumAnalyzer};
use ecg_core::{EcgResult, PeakEvent, Voltage, VoltageStats};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Summary of one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingAnalysis {
    pub filtered: Vec<Voltage>,
    pub peaks: Vec<PeakEvent>,
    /// `60 / mean(RR)`, if at least two peaks were found
    pub mean_bpm: Option<f32>,
    pub raw_spectrum: Spectrum,
    pub filtered_spectrum: Spectrum,
    pub raw_stats: VoltageStats,
    pub filtered_stats: VoltageStats,
}

impl RecordingAnalysis {
    /// RR intervals between consecutive peaks in milliseconds
    pub fn rr_intervals_ms(&self) -> Vec<f64> {
        self.peaks.windows(2).map(|p| p[0].interval_to(&p[1])).collect()
    }
}

/// Analyze `voltages`, sampled at `config.sample_rate_hz` starting at time zero
pub fn analyze_recording(voltages: &[Voltage], config: &PipelineConfig) -> EcgResult<RecordingAnalysis> {
    config.validate()?;

    let mut notch = config
        .notch
        .map(|n| NotchFilter::new(n.frequency_hz, n.q, config.sample_rate_hz));
    let mut bandpass = BandpassFilter::new();
    let mut detector = PeakDetector::from_config(config);
    let period_ms = config.sample_period_ms();

    let mut filtered = voltages.to_vec();
    if let Some(notch) = notch.as_mut() {
        notch.process_in_place(&mut filtered);
    }
    bandpass.process_in_place(&mut filtered);

    let peaks: Vec<PeakEvent> = filtered
        .iter()
        .enumerate()
        .filter_map(|(i, &v)| detector.observe(v, i as f64 * period_ms))
        .collect();

    let mean_bpm = mean_heart_rate(&peaks);

    let mut analyzer = SpectrumAnalyzer::new();
    let raw_spectrum = analyzer.magnitude_spectrum_db(voltages, config.sample_rate_hz)?;
    let filtered_spectrum = analyzer.magnitude_spectrum_db(&filtered, config.sample_rate_hz)?;

    info!(
        samples = voltages.len(),
        peaks = peaks.len(),
        mean_bpm = mean_bpm.unwrap_or(0.0),
        "recording analyzed"
    );

    Ok(RecordingAnalysis {
        raw_stats: VoltageStats::calculate(voltages),
        filtered_stats: VoltageStats::calculate(&filtered),
        filtered,
        peaks,
        mean_bpm,
        raw_spectrum,
        filtered_spectrum,
    })
}

/// Mean heart rate over all RR intervals
pub fn mean_heart_rate(peaks: &[PeakEvent]) -> Option<f32> {
    if peaks.len() < 2 {
        return None;
    }
    let first = peaks.first()?.timestamp_ms;
    let last = peaks.last()?.timestamp_ms;
    let mean_rr_ms = (last - first) / (peaks.len() - 1) as f64;
    if mean_rr_ms <= 0.0 {
        return None;
    }
    Some((60_000.0 / mean_rr_ms) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn spiky_recording(seconds: usize, beat_ms: usize) -> Vec<f32> {
        (0..seconds * 1000)
            .map(|i| {
                let spike = if i % beat_ms >= 300 && i % beat_ms < 320 { 1.5 } else { 0.0 };
                1.65 + 0.2 * (2.0 * PI * i as f32 / 1000.0).sin() + spike
            })
            .collect()
    }

    #[test]
    fn test_mean_heart_rate() {
        let peaks: Vec<PeakEvent> = [0.0, 800.0, 1600.0, 2400.0]
            .iter()
            .map(|&t| PeakEvent::new(t, 2.0))
            .collect();
        assert_eq!(mean_heart_rate(&peaks), Some(75.0));
        assert_eq!(mean_heart_rate(&peaks[..1]), None);
        assert_eq!(mean_heart_rate(&[]), None);
    }

    #[test]
    fn test_analyze_recording() {
        let config = PipelineConfig {
            threshold_v: 1.0,
            ..PipelineConfig::default()
        };
        let recording = spiky_recording(20, 800);
        let analysis = analyze_recording(&recording, &config).unwrap();

        assert_eq!(analysis.filtered.len(), recording.len());
        // Skip the start-up transient of the bandpass
        let settled: Vec<f64> = analysis
            .rr_intervals_ms()
            .into_iter()
            .skip(5)
            .collect();
        assert!(!settled.is_empty());
        assert!(settled.iter().all(|&rr| (rr - 800.0).abs() <= 5.0));

        assert!(analysis.mean_bpm.is_some());
        assert!(analysis.raw_stats.mean > 1.5);
        assert!(analysis.filtered_stats.mean.abs() < analysis.raw_stats.mean / 5.0);
        assert_eq!(analysis.raw_spectrum.len(), 10_000);
    }

    #[test]
    fn test_notch_removes_hum_from_spectrum() {
        let config = PipelineConfig::with_powerline_notch();
        let recording: Vec<f32> = (0..4000)
            .map(|i| 1.65 + 0.5 * (2.0 * PI * 50.0 * i as f32 / 1000.0).sin())
            .collect();
        let analysis = analyze_recording(&recording, &config).unwrap();

        let raw = analysis.raw_spectrum.magnitude_at(50.0).unwrap();
        let filtered = analysis.filtered_spectrum.magnitude_at(50.0).unwrap();
        assert!(raw - filtered > 25.0, "raw {} dB, filtered {} dB", raw, filtered);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = PipelineConfig {
            refractory_ms: -1.0,
            ..PipelineConfig::default()
        };
        assert!(analyze_recording(&[0.0; 10], &config).is_err());
    }
}
