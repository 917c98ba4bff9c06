//! Sequenced Ring Buffer
//!
//! Provides a fixed-capacity ring buffer for rolling metric windows. Every
//! insertion is stamped with a monotonically increasing sequence number so the
//! oldest entry is always the one evicted.

mod buffer;

pub use buffer::{RingBuffer, Sequenced};

use thiserror::Error;

/// Ring buffer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RingBufferError {
    #[error("Ring buffer capacity must be greater than zero")]
    ZeroCapacity,
}
