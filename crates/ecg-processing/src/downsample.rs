//! Extremum-preserving downsampling for display
//!
//! Each display column shows one sample from a fixed window of the filtered
//! block: whichever of the window's minimum or maximum lies strictly further
//! from the midpoint `(min + max) / 2`, with ties going to the maximum.
//! Averaging or plain decimation would flatten QRS complexes at display
//! resolution; picking an extremum keeps them.
//!
//! Both extremes are the same distance from the midpoint, so apart from
//! rounding every column shows its window's maximum.

use ecg_core::{EcgError, EcgResult, Voltage};

/// Reduces a fixed-length block to a fixed number of columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downsampler {
    input_len: usize,
    out_width: usize,
}

impl Downsampler {
    /// Create a downsampler for blocks of `input_len` samples
    ///
    /// `input_len` must be a non-zero multiple of `out_width`.
    pub fn new(input_len: usize, out_width: usize) -> EcgResult<Self> {
        if input_len == 0 || out_width == 0 {
            return Err(EcgError::InvalidConfig {
                reason: format!(
                    "downsampler needs non-empty input and output, got {} -> {}",
                    input_len, out_width
                ),
            });
        }
        if input_len % out_width != 0 {
            return Err(EcgError::IncompatibleGeometry {
                capture_depth: input_len,
                display_width: out_width,
            });
        }

        Ok(Self {
            input_len,
            out_width,
        })
    }

    pub fn out_width(&self) -> usize {
        self.out_width
    }

    pub fn window_size(&self) -> usize {
        self.input_len / self.out_width
    }

    /// Downsample `filtered` into `out`, one value per column
    pub fn downsample_into(&self, filtered: &[Voltage], out: &mut [Voltage]) -> EcgResult<()> {
        if filtered.len() != self.input_len {
            return Err(EcgError::IncompleteBlock {
                expected: self.input_len,
                actual: filtered.len(),
            });
        }
        if out.len() != self.out_width {
            return Err(EcgError::InvalidConfig {
                reason: format!(
                    "display buffer holds {} points, expected {}",
                    out.len(),
                    self.out_width
                ),
            });
        }

        for (slot, window) in out.iter_mut().zip(filtered.chunks_exact(self.window_size())) {
            *slot = representative(window);
        }

        Ok(())
    }
}

/// Downsample a filtered block to `out_width` display points
pub fn downsample(filtered: &[Voltage], out_width: usize) -> EcgResult<Vec<Voltage>> {
    let downsampler = Downsampler::new(filtered.len(), out_width)?;
    let mut out = vec![0.0; out_width];
    downsampler.downsample_into(filtered, &mut out)?;
    Ok(out)
}

/// Pick the window extremum furthest from the midpoint; ties go to the max
fn representative(window: &[Voltage]) -> Voltage {
    let (min, max) = window
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    let mean = (min + max) / 2.0;
    if (min - mean).abs() > (max - mean).abs() {
        min
    } else {
        max
    }
}
