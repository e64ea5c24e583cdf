//! Raw ADC samples and capture blocks

use crate::error::{EcgError, EcgResult};
use serde::{Deserialize, Serialize};

/// Signal level in volts
pub type Voltage = f32;

/// ADC reference voltage of the capture board
pub const ADC_VREF: f32 = 3.3;

/// ADC resolution of the capture board
pub const ADC_RESOLUTION_BITS: u8 = 12;

/// Linear conversion parameters of the analog-to-digital converter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdcSpec {
    /// Reference voltage (full scale) in volts
    pub reference_voltage: f32,
    /// Converter resolution in bits
    pub resolution_bits: u8,
}

impl AdcSpec {
    pub const fn new(reference_voltage: f32, resolution_bits: u8) -> Self {
        Self {
            reference_voltage,
            resolution_bits,
        }
    }

    /// Volts per count (reference / 2^bits)
    pub fn conversion_factor(&self) -> f32 {
        self.reference_voltage / (1u32 << self.resolution_bits) as f32
    }

    /// Largest reading the converter can produce
    pub fn max_count(&self) -> u16 {
        ((1u32 << self.resolution_bits) - 1) as u16
    }

    /// Convert a raw reading to volts
    pub fn to_voltage(&self, sample: RawSample) -> Voltage {
        sample.value() as f32 * self.conversion_factor()
    }

    /// Quantize a voltage to the nearest representable reading, saturating
    /// at both rails
    pub fn quantize(&self, voltage: Voltage) -> RawSample {
        let counts = (voltage / self.conversion_factor()).round();
        let clamped = counts.clamp(0.0, self.max_count() as f32);
        RawSample(clamped as u16)
    }

    pub fn validate(&self) -> EcgResult<()> {
        if !(self.reference_voltage.is_finite() && self.reference_voltage > 0.0) {
            return Err(EcgError::InvalidConfig {
                reason: format!(
                    "ADC reference voltage must be positive, got {}",
                    self.reference_voltage
                ),
            });
        }
        if self.resolution_bits == 0 || self.resolution_bits > 16 {
            return Err(EcgError::InvalidConfig {
                reason: format!(
                    "ADC resolution must be 1-16 bits, got {}",
                    self.resolution_bits
                ),
            });
        }
        Ok(())
    }
}

impl Default for AdcSpec {
    fn default() -> Self {
        AdcSpec::new(ADC_VREF, ADC_RESOLUTION_BITS)
    }
}

/// One reading from the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RawSample(u16);

impl RawSample {
    /// Create a sample, rejecting values outside the given resolution
    pub fn new(value: u16, resolution_bits: u8) -> EcgResult<Self> {
        if resolution_bits < 16 && value >> resolution_bits != 0 {
            return Err(EcgError::SampleOutOfRange {
                value,
                bits: resolution_bits,
            });
        }
        Ok(RawSample(value))
    }

    /// Create a 12-bit sample
    pub fn from_12bit(value: u16) -> EcgResult<Self> {
        Self::new(value, ADC_RESOLUTION_BITS)
    }

    pub fn value(self) -> u16 {
        self.0
    }
}

/// A fully populated capture of consecutive raw samples
///
/// Produced by an [`Acquisition`](crate::Acquisition) and handed to the
/// pipeline by value; the producer gives up the block once it is sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBlock {
    samples: Vec<RawSample>,
    /// Monotonic time of the first sample in milliseconds
    start_time_ms: f64,
    /// Time between consecutive samples in milliseconds
    sample_period_ms: f64,
    /// Capture counter, increases by one per block from the same source
    sequence: u64,
}

impl SampleBlock {
    /// Create a new block from already validated samples
    pub fn new(
        samples: Vec<RawSample>,
        start_time_ms: f64,
        sample_period_ms: f64,
        sequence: u64,
    ) -> EcgResult<Self> {
        if samples.is_empty() {
            return Err(EcgError::IncompleteBlock {
                expected: 1,
                actual: 0,
            });
        }
        if !(sample_period_ms.is_finite() && sample_period_ms > 0.0) {
            return Err(EcgError::InvalidConfig {
                reason: format!("sample period must be positive, got {}ms", sample_period_ms),
            });
        }

        Ok(SampleBlock {
            samples,
            start_time_ms,
            sample_period_ms,
            sequence,
        })
    }

    /// Create a block from raw converter counts
    pub fn from_counts(
        counts: &[u16],
        adc: &AdcSpec,
        start_time_ms: f64,
        sample_period_ms: f64,
        sequence: u64,
    ) -> EcgResult<Self> {
        let samples = counts
            .iter()
            .map(|&count| RawSample::new(count, adc.resolution_bits))
            .collect::<EcgResult<Vec<_>>>()?;
        Self::new(samples, start_time_ms, sample_period_ms, sequence)
    }

    /// Check that the block holds exactly `capacity` samples
    pub fn ensure_capacity(&self, capacity: usize) -> EcgResult<()> {
        if self.samples.len() != capacity {
            return Err(EcgError::IncompleteBlock {
                expected: capacity,
                actual: self.samples.len(),
            });
        }
        Ok(())
    }

    pub fn samples(&self) -> &[RawSample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn start_time_ms(&self) -> f64 {
        self.start_time_ms
    }

    pub fn sample_period_ms(&self) -> f64 {
        self.sample_period_ms
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Timestamp of the sample at `index`
    pub fn timestamp_ms(&self, index: usize) -> f64 {
        self.start_time_ms + index as f64 * self.sample_period_ms
    }

    /// Time just past the last sample, i.e. the start of the next block
    pub fn end_time_ms(&self) -> f64 {
        self.timestamp_ms(self.samples.len())
    }

    pub fn duration_ms(&self) -> f64 {
        self.samples.len() as f64 * self.sample_period_ms
    }

    /// Iterate over the block as volts
    pub fn voltages<'a>(&'a self, adc: &'a AdcSpec) -> impl Iterator<Item = Voltage> + 'a {
        self.samples.iter().map(move |&s| adc.to_voltage(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_factor() {
        let adc = AdcSpec::default();
        assert!((adc.conversion_factor() - 3.3 / 4096.0).abs() < 1e-9);
        assert_eq!(adc.max_count(), 4095);

        let full_scale = RawSample::from_12bit(4095).unwrap();
        assert!((adc.to_voltage(full_scale) - 3.2991943).abs() < 1e-4);
    }

    #[test]
    fn test_raw_sample_range() {
        assert!(RawSample::from_12bit(0).is_ok());
        assert!(RawSample::from_12bit(4095).is_ok());
        assert!(matches!(
            RawSample::from_12bit(4096),
            Err(EcgError::SampleOutOfRange { value: 4096, bits: 12 })
        ));
    }

    #[test]
    fn test_quantize_saturates() {
        let adc = AdcSpec::default();
        assert_eq!(adc.quantize(-1.0).value(), 0);
        assert_eq!(adc.quantize(10.0).value(), 4095);
        assert_eq!(adc.quantize(1.65).value(), 2048);
    }

    #[test]
    fn test_block_timestamps() {
        let adc = AdcSpec::default();
        let block = SampleBlock::from_counts(&[0, 1, 2, 3], &adc, 500.0, 2.0, 7).unwrap();

        assert_eq!(block.len(), 4);
        assert_eq!(block.sequence(), 7);
        assert_eq!(block.timestamp_ms(0), 500.0);
        assert_eq!(block.timestamp_ms(3), 506.0);
        assert_eq!(block.end_time_ms(), 508.0);
        assert_eq!(block.duration_ms(), 8.0);
    }

    #[test]
    fn test_block_capacity_check() {
        let adc = AdcSpec::default();
        let block = SampleBlock::from_counts(&[2048; 10], &adc, 0.0, 1.0, 0).unwrap();

        assert!(block.ensure_capacity(10).is_ok());
        assert!(matches!(
            block.ensure_capacity(2400),
            Err(EcgError::IncompleteBlock { expected: 2400, actual: 10 })
        ));
    }

    #[test]
    fn test_block_rejects_out_of_range_counts() {
        let adc = AdcSpec::default();
        let result = SampleBlock::from_counts(&[1, 5000], &adc, 0.0, 1.0, 0);
        assert!(matches!(result, Err(EcgError::SampleOutOfRange { .. })));
    }
}
