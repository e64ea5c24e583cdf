//! Error handling for the ECG monitor
//!
//! One error type shared by every library crate. Configuration problems are
//! meant to be caught once at initialization; acquisition failures are
//! surfaced to whoever drives the capture loop.

use thiserror::Error;

/// Result type alias for ECG monitor operations
pub type EcgResult<T> = Result<T, EcgError>;

/// Error type for all ECG monitor operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EcgError {
    /// Invalid configuration value
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error
        reason: String,
    },

    /// Capture depth cannot be split evenly into display columns
    #[error("capture depth {capture_depth} is not a multiple of display width {display_width}")]
    IncompatibleGeometry {
        capture_depth: usize,
        display_width: usize,
    },

    /// Block handed to the pipeline is not fully populated
    #[error("incomplete sample block: expected {expected} samples, got {actual}")]
    IncompleteBlock { expected: usize, actual: usize },

    /// Raw reading does not fit the ADC resolution
    #[error("raw sample {value} exceeds the {bits}-bit ADC range")]
    SampleOutOfRange { value: u16, bits: u8 },

    /// Acquisition collaborator could not deliver a full block
    #[error("acquisition failed: {reason}")]
    AcquisitionFailed { reason: String },

    /// Malformed line in a capture recording
    #[error("recording format error at line {line}: {reason}")]
    RecordingFormat { line: usize, reason: String },

    /// Renderer could not present a frame
    #[error("render failed: {reason}")]
    Render { reason: String },

    /// Underlying I/O failure
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl EcgError {
    /// Whether the error is a configuration problem that must stop startup
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            EcgError::InvalidConfig { .. } | EcgError::IncompatibleGeometry { .. }
        )
    }
}

/// Convenience macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)+) => {
        $crate::error::EcgError::InvalidConfig {
            reason: format!($($arg)+),
        }
    };
}

/// Convenience macro for creating acquisition errors
#[macro_export]
macro_rules! acquisition_error {
    ($($arg:tt)+) => {
        $crate::error::EcgError::AcquisitionFailed {
            reason: format!($($arg)+),
        }
    };
}
