//! Sample acquisition interface

use crate::error::EcgResult;
use crate::sample::SampleBlock;

/// Source of fully populated capture blocks
///
/// `acquire_block` blocks the calling thread until `capacity` samples taken
/// `sample_period_ms` apart are available. There is no partial result: the
/// call either returns a complete block or fails.
pub trait Acquisition: Send {
    fn acquire_block(&mut self, capacity: usize, sample_period_ms: f64) -> EcgResult<SampleBlock>;

    /// Human readable source name for logs
    fn name(&self) -> &str {
        "acquisition"
    }
}

impl<A: Acquisition + ?Sized> Acquisition for Box<A> {
    fn acquire_block(&mut self, capacity: usize, sample_period_ms: f64) -> EcgResult<SampleBlock> {
        (**self).acquire_block(capacity, sample_period_ms)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
