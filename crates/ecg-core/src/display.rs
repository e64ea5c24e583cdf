//! Rendering interface

use crate::error::EcgResult;
use crate::sample::Voltage;

/// Consumer of one processed cycle
///
/// Receives normalized display points (one per column) and the heart-rate
/// overlay. Vertical scaling and everything pixel related belong to the
/// implementation.
pub trait Renderer {
    fn render(&mut self, display_points: &[Voltage], bpm: f32) -> EcgResult<()>;
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn render(&mut self, display_points: &[Voltage], bpm: f32) -> EcgResult<()> {
        (**self).render(display_points, bpm)
    }
}
