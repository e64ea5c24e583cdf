//! ECG-Core: Foundation types for the ECG monitor
//!
//! Raw ADC samples, capture blocks, beat events and the interfaces of the
//! collaborators that feed and display the processing pipeline.

pub mod error;
pub mod sample;
pub mod events;
pub mod stats;
pub mod acquisition;
pub mod display;

pub use error::{EcgError, EcgResult};
pub use sample::*;
pub use events::*;
pub use stats::VoltageStats;
pub use acquisition::Acquisition;
pub use display::Renderer;
