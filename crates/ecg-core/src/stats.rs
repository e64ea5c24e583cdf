//! Summary statistics over a run of voltages

use serde::{Deserialize, Serialize};

/// Basic statistics for a block of voltages
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VoltageStats {
    pub mean: f32,
    pub rms: f32,
    pub std_dev: f32,
    pub min: f32,
    pub max: f32,
    pub peak_to_peak: f32,
}

impl VoltageStats {
    pub fn calculate(data: &[f32]) -> Self {
        if data.is_empty() {
            return Self {
                mean: 0.0,
                rms: 0.0,
                std_dev: 0.0,
                min: 0.0,
                max: 0.0,
                peak_to_peak: 0.0,
            };
        }

        let n = data.len() as f32;
        let mean = data.iter().sum::<f32>() / n;
        let rms = (data.iter().map(|x| x * x).sum::<f32>() / n).sqrt();
        let variance = data.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;

        let min = data.iter().fold(f32::INFINITY, |a, &b| a.min(b));
        let max = data.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));

        Self {
            mean,
            rms,
            std_dev: variance.sqrt(),
            min,
            max,
            peak_to_peak: max - min,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_is_zeroed() {
        let stats = VoltageStats::calculate(&[]);
        assert_eq!(stats.peak_to_peak, 0.0);
        assert_eq!(stats.mean, 0.0);
    }

    #[test]
    fn test_square_wave() {
        let data = [1.0, -1.0, 1.0, -1.0];
        let stats = VoltageStats::calculate(&data);
        assert_eq!(stats.mean, 0.0);
        assert!((stats.rms - 1.0).abs() < 1e-6);
        assert!((stats.std_dev - 1.0).abs() < 1e-6);
        assert_eq!(stats.min, -1.0);
        assert_eq!(stats.max, 1.0);
        assert_eq!(stats.peak_to_peak, 2.0);
    }
}
