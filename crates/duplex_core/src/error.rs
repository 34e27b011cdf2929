//! # Buffer Error Types
//!
//! Recoverable failures of the arena and swap controller.
//!
//! Invariant violations (resetting or dropping a side that still has live
//! producers, swapping while a consumer view is open) are not represented
//! here. They abort at the point of detection with `assert!`.

use thiserror::Error;

/// Errors that can occur when allocating from or configuring a frame buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The producer side cannot satisfy the request this frame.
    #[error(
        "out of capacity: requested {requested} bytes (align {align}), \
         {remaining} of {capacity} bytes remaining"
    )]
    OutOfCapacity {
        /// Bytes requested.
        requested: usize,
        /// Alignment requested.
        align: usize,
        /// Bytes left in the arena before the request.
        remaining: usize,
        /// Total arena capacity.
        capacity: usize,
    },

    /// Alignment was zero or not a power of two.
    #[error("invalid alignment {0}: must be a non-zero power of two")]
    InvalidAlignment(usize),

    /// Construction parameters were rejected.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;
