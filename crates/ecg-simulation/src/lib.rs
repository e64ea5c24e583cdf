//! ECG-Simulation: Acquisition sources for the ECG monitor
//!
//! Synthetic ECG generation, replay and recording of capture logs, and a
//! real-time block stream for driving live processing.

pub mod real_time_stream;
pub mod signal_patterns;
pub mod ecg_simulator;
pub mod recording;

pub use ecg_simulator::*;
pub use real_time_stream::*;
pub use signal_patterns::*;
pub use recording::{parse_recording, RecordingSource, RecordingWriter, RECORDING_HEADER};
