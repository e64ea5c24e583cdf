//! Software model of the 240x135 bedside panel

use ecg_core::{EcgError, EcgResult, Renderer, Voltage};
use tracing::trace;

pub const PANEL_WIDTH: usize = 240;
pub const PANEL_HEIGHT: usize = 135;

/// Row of the 0V trace
pub const TRACE_OFFSET_ROW: i32 = 90;
/// Rows per volt
pub const TRACE_AMPLITUDE: f32 = 50.0;
pub const GRID_SPACING: usize = 20;

/// Top-left corner of the heart-rate overlay
pub const OVERLAY_POSITION: (usize, usize) = (5, 5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelColor {
    Background,
    Grid,
    Trace,
}

impl PanelColor {
    pub fn rgb(self) -> [u8; 3] {
        match self {
            PanelColor::Background => [0, 0, 0],
            PanelColor::Grid => [128, 128, 128],
            PanelColor::Trace => [0, 0, 255],
        }
    }
}

/// Map a display voltage to a panel row, clamped to the panel
pub fn trace_row(voltage: Voltage) -> usize {
    let row = TRACE_OFFSET_ROW - (voltage * TRACE_AMPLITUDE) as i32;
    row.clamp(0, PANEL_HEIGHT as i32 - 1) as usize
}

/// Frame buffer renderer with the panel's grid, trace and overlay layout
pub struct PanelRenderer {
    pixels: Vec<PanelColor>,
    overlay: String,
    frames: u64,
}

impl PanelRenderer {
    pub fn new() -> Self {
        Self {
            pixels: vec![PanelColor::Background; PANEL_WIDTH * PANEL_HEIGHT],
            overlay: String::new(),
            frames: 0,
        }
    }

    pub fn pixel(&self, x: usize, y: usize) -> PanelColor {
        self.pixels[y * PANEL_WIDTH + x]
    }

    /// Row-major pixels, `PANEL_WIDTH` per row
    pub fn pixels(&self) -> &[PanelColor] {
        &self.pixels
    }

    /// Heart-rate text drawn at [`OVERLAY_POSITION`]
    pub fn overlay(&self) -> &str {
        &self.overlay
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn set(&mut self, x: usize, y: usize, color: PanelColor) {
        if x < PANEL_WIDTH && y < PANEL_HEIGHT {
            self.pixels[y * PANEL_WIDTH + x] = color;
        }
    }

    fn draw_grid(&mut self) {
        // Dotted: every other pixel
        for x in (0..PANEL_WIDTH).step_by(GRID_SPACING) {
            for y in (0..PANEL_HEIGHT).step_by(2) {
                self.set(x, y, PanelColor::Grid);
            }
        }
        for y in (0..PANEL_HEIGHT).step_by(GRID_SPACING) {
            for x in (0..PANEL_WIDTH).step_by(2) {
                self.set(x, y, PanelColor::Grid);
            }
        }
    }

    /// Bresenham segment
    fn draw_line(&mut self, (x0, y0): (i32, i32), (x1, y1): (i32, i32), color: PanelColor) {
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);

        loop {
            self.set(x as usize, y as usize, color);
            if x == x1 && y == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

impl Default for PanelRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for PanelRenderer {
    fn render(&mut self, display_points: &[Voltage], bpm: f32) -> EcgResult<()> {
        if display_points.len() != PANEL_WIDTH {
            return Err(EcgError::Render {
                reason: format!(
                    "panel is {} columns wide, got {} points",
                    PANEL_WIDTH,
                    display_points.len()
                ),
            });
        }

        self.pixels.fill(PanelColor::Background);
        self.draw_grid();

        for (i, pair) in display_points.windows(2).enumerate() {
            let from = (i as i32, trace_row(pair[0]) as i32);
            let to = (i as i32 + 1, trace_row(pair[1]) as i32);
            self.draw_line(from, to, PanelColor::Trace);
        }

        self.overlay = format!("HR: {:.0} BPM", bpm);
        self.frames += 1;
        trace!(frame = self.frames, "panel rendered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_row_mapping() {
        assert_eq!(trace_row(0.0), 90);
        assert_eq!(trace_row(1.0), 40);
        assert_eq!(trace_row(-0.5), 115);
        // Truncation toward zero before the offset
        assert_eq!(trace_row(0.019), 90);
        assert_eq!(trace_row(3.0), 0);
        assert_eq!(trace_row(-2.0), PANEL_HEIGHT - 1);
    }

    #[test]
    fn test_flat_trace_and_overlay() {
        let mut panel = PanelRenderer::new();
        panel.render(&[0.0; PANEL_WIDTH], 72.4).unwrap();

        for x in 0..PANEL_WIDTH {
            assert_eq!(panel.pixel(x, 90), PanelColor::Trace);
        }
        assert_eq!(panel.overlay(), "HR: 72 BPM");
        assert_eq!(panel.frames(), 1);
    }

    #[test]
    fn test_grid_is_dotted() {
        let mut panel = PanelRenderer::new();
        panel.render(&[-2.0; PANEL_WIDTH], 0.0).unwrap();

        assert_eq!(panel.pixel(20, 10), PanelColor::Grid);
        assert_eq!(panel.pixel(20, 11), PanelColor::Background);
        assert_eq!(panel.pixel(30, 40), PanelColor::Grid);
        assert_eq!(panel.pixel(31, 40), PanelColor::Background);
        assert_eq!(panel.pixel(25, 50), PanelColor::Background);
    }

    #[test]
    fn test_spike_draws_connected_segment() {
        let mut points = [0.0; PANEL_WIDTH];
        points[100] = 1.0;
        let mut panel = PanelRenderer::new();
        panel.render(&points, 60.0).unwrap();

        // Rising edge covers every row between baseline and the peak
        for y in 40..=90 {
            let lit = panel.pixel(99, y) == PanelColor::Trace || panel.pixel(100, y) == PanelColor::Trace;
            assert!(lit, "gap at row {}", y);
        }
        assert_eq!(panel.pixel(100, 40), PanelColor::Trace);
    }

    #[test]
    fn test_frame_is_cleared_between_renders() {
        let mut points = [0.0; PANEL_WIDTH];
        points[100] = 1.0;
        let mut panel = PanelRenderer::new();
        panel.render(&points, 60.0).unwrap();
        panel.render(&[0.0; PANEL_WIDTH], 60.0).unwrap();

        assert_eq!(panel.pixel(100, 41), PanelColor::Background);
    }

    #[test]
    fn test_wrong_width_is_rejected() {
        let mut panel = PanelRenderer::new();
        let error = panel.render(&[0.0; 10], 60.0).unwrap_err();
        assert!(matches!(error, EcgError::Render { .. }));
        assert_eq!(panel.frames(), 0);
    }
}
