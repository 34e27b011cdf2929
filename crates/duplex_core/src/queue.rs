//! # Frame Queue
//!
//! A typed, double-buffered queue of `Copy` values on top of
//! [`SwapController`]. Producers [`push`](FrameQueue::push) from any thread;
//! the owner [`swap`](FrameQueue::swap)s once per frame and
//! [`drain`](FrameQueue::drain)s the frozen side in insertion order.

#![allow(unsafe_code)]

use std::marker::PhantomData;

use crate::config::BufferConfig;
use crate::error::BufferResult;
use crate::sync::{SwapController, SwapReport};

/// Per-frame queue of plain values.
///
/// Each value is moved into the producer arena; nothing is heap allocated
/// per push. Values are dropped without running destructors, hence `Copy`.
///
/// ## Usage
///
/// ```rust
/// use duplex_core::{BufferConfig, FrameQueue};
///
/// let queue: FrameQueue<(u32, f32)> = FrameQueue::new(&BufferConfig::with_capacity(1024)).unwrap();
/// queue.push((1, 0.5)).unwrap();
/// queue.push((2, 1.5)).unwrap();
///
/// let report = queue.swap();
/// assert_eq!(report.entries, 2);
/// let mut seen = Vec::new();
/// queue.drain(|value| seen.push(*value));
/// assert_eq!(seen, vec![(1, 0.5), (2, 1.5)]);
/// ```
pub struct FrameQueue<T> {
    /// Private: every entry is written as a `T`, nothing else may allocate here.
    buffers: SwapController,
    _marker: PhantomData<T>,
}

impl<T: Copy + Send + 'static> FrameQueue<T> {
    /// Creates a queue with two arenas sized by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: &BufferConfig) -> BufferResult<Self> {
        Ok(Self {
            buffers: SwapController::new(config)?,
            _marker: PhantomData,
        })
    }

    /// Copies `value` into the producer side.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfCapacity`](crate::BufferError::OutOfCapacity)
    /// if the producer side is full for this frame. The value is not queued.
    pub fn push(&self, value: T) -> BufferResult<()> {
        let mut guard = self
            .buffers
            .allocate_aligned(std::mem::size_of::<T>(), std::mem::align_of::<T>())?;
        // SAFETY: the region is sized and aligned for `T`, and this controller
        // never exposes raw bytes: every entry is only ever read back as `T`.
        unsafe { guard.write_value(value) };
        Ok(())
    }

    /// Values pushed to the producer side this frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffers.pending_entries()
    }

    /// Live producers on the producer side.
    #[must_use]
    pub fn pending_producers(&self) -> usize {
        self.buffers.pending_producers()
    }

    /// Per-side capacity in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.buffers.capacity()
    }

    /// Number of completed swaps.
    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.buffers.swap_count()
    }

    /// Flips the sides and waits for in-flight pushes to finish.
    ///
    /// # Panics
    ///
    /// Panics if a drain is running.
    pub fn swap(&self) -> SwapReport {
        self.buffers.swap()
    }

    /// Values waiting on the consumer side.
    ///
    /// # Panics
    ///
    /// Panics if called during a drain or swap.
    #[must_use]
    pub fn consumer_len(&self) -> usize {
        self.buffers.consumer().len()
    }

    /// Visits every consumer-side value in insertion order, then clears the
    /// side. Returns how many values were visited.
    ///
    /// `visit` may push new values; they land on the producer side.
    ///
    /// # Panics
    ///
    /// Panics if called during another drain or a swap.
    pub fn drain<F>(&self, mut visit: F) -> usize
    where
        F: FnMut(&mut T),
    {
        let mut view = self.buffers.consumer();
        let count = view.len();
        for index in 0..count {
            let region = view.entries()[index];
            // SAFETY: every entry of this controller was written by `push`.
            let value = unsafe { view.value_mut::<T>(region) };
            visit(value);
        }
        view.clear();
        count
    }
}

impl<T> std::fmt::Debug for FrameQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("type", &std::any::type_name::<T>())
            .field("buffers", &self.buffers)
            .finish()
    }
}
