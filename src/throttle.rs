//! Delay schedule calculation.
//!
//! The throttle reproduces a target total transfer duration by spreading
//! it evenly across the chunks of the resource. The per-chunk pause is a
//! property of the resource, not of the request: a range covering half
//! the file walks half the chunks and therefore takes roughly half the
//! configured time, which is the partial timing a resume-testing client
//! needs to observe.

use std::time::Duration;

use crate::range::ResolvedRange;

/// Bytes emitted per streaming step.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Immutable per-request streaming parameters, computed once before the
/// first byte is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPlan {
    /// Offset of the first byte to serve.
    pub start: u64,
    /// Total bytes to serve.
    pub bytes: u64,
    pub chunk_size: usize,
    /// Pause inserted after each emitted chunk.
    pub delay_per_chunk: Duration,
}

impl DeliveryPlan {
    /// Plan delivery of `range` out of a resource of `total_len` bytes
    /// whose complete transfer should take `target`.
    pub fn new(range: ResolvedRange, total_len: u64, target: Duration) -> Self {
        Self::with_chunk_size(range, total_len, target, CHUNK_SIZE)
    }

    /// Like [`DeliveryPlan::new`] with an explicit chunk size. Exposed so
    /// tests can drive multi-chunk behavior with small payloads.
    pub fn with_chunk_size(
        range: ResolvedRange,
        total_len: u64,
        target: Duration,
        chunk_size: usize,
    ) -> Self {
        DeliveryPlan {
            start: range.start,
            bytes: range.len(),
            chunk_size,
            delay_per_chunk: delay_per_chunk(total_len, chunk_size, target),
        }
    }

    /// Chunks this plan will emit.
    pub fn chunk_count(&self) -> u64 {
        self.bytes.div_ceil(self.chunk_size as u64)
    }
}

/// `target / ceil(bytes / chunk_size)`, or zero when there is nothing to
/// pace. Pure arithmetic; the zero-chunk guard is the only branch.
///
/// Streaming `bytes` bytes with this pause after each chunk takes ≈
/// `target`; streaming a subset takes the proportional share.
fn delay_per_chunk(bytes: u64, chunk_size: usize, target: Duration) -> Duration {
    let chunks = bytes.div_ceil(chunk_size as u64);
    if chunks == 0 || target.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(target.as_secs_f64() / chunks as f64)
}
