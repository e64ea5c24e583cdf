//! ECG-Processing: Real-time ECG processing pipeline
//!
//! Bandpass filtering, extremum-preserving downsampling for display, R-peak
//! detection and smoothed heart-rate estimation, plus offline analysis of
//! whole recordings.

pub mod pipeline;
pub mod filters;
pub mod downsample;
pub mod detection;
pub mod heart_rate;
pub mod processor;
pub mod config;
pub mod spectrum;
pub mod analysis;
pub mod run_loop;

pub use pipeline::*;
pub use processor::{SampleFilter, CycleMetrics};
pub use filters::{
    Biquad, BiquadCoefficients, BandpassFilter, NotchFilter, FilterState,
    BANDPASS_0_5_35HZ_AT_1KHZ
};
pub use downsample::{downsample, Downsampler};
pub use detection::{PeakDetector, DetectorState};
pub use heart_rate::HeartRateEstimator;
pub use spectrum::{magnitude_spectrum_db, Spectrum, SpectrumAnalyzer};
pub use analysis::{analyze_recording, RecordingAnalysis};
pub use config::{PipelineConfig, NotchConfig};
pub use run_loop::MonitorLoop;
