//! # Swap Controller
//!
//! Two arenas, one producer side, reference-counted drain on swap.
//!
//! ## Safety Note
//!
//! The two sides live in `UnsafeCell`s. Access is split by role:
//! - the producer side is only touched with the bookkeeping lock held;
//! - the consumer side is only touched by the holder of the owner claim
//!   (`swap` or a [`ConsumerView`]), and only once its live counter is zero.
//!
//! ## Architecture
//!
//! ```text
//!   producers (any thread)                 owner (one thread)
//!   ──────────────────────                 ──────────────────
//!   allocate() ──lock──> side[p]           swap():
//!     └─ guard (live[p] += 1)                lock: p ^= 1, reset side[p]
//!   write payload (no lock)                  unlock
//!   drop guard (live[p] -= 1) ──notify──>    wait live[old p] == 0
//!                                          consumer(): read side[p ^ 1]
//! ```

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytemuck::Pod;
use parking_lot::Mutex;

use crate::config::BufferConfig;
use crate::error::BufferResult;
use crate::memory::{Arena, Region};
use crate::sync::guard::{ProducerCounter, ProducerGuard};

/// One half of the double buffer.
struct Side {
    arena: Arena,
    /// Allocations in insertion order.
    entries: Vec<Region>,
}

impl Side {
    fn new(config: &BufferConfig) -> BufferResult<Self> {
        Ok(Self {
            arena: Arena::with_alignment(config.capacity, config.alignment)?,
            entries: Vec::with_capacity(config.entry_hint),
        })
    }

    fn reset(&mut self) {
        self.arena.reset();
        self.entries.clear();
    }
}

/// What a [`SwapController::swap`] call did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapReport {
    /// Side that stopped accepting allocations and is now readable.
    pub outgoing_side: usize,
    /// Live producers on the outgoing side at the moment of the flip.
    pub pending_at_flip: usize,
    /// Entries the outgoing side holds.
    pub entries: usize,
    /// Time spent waiting for the outgoing side to drain.
    pub drain_wait: Duration,
    /// Swap count after this swap.
    pub generation: u64,
}

/// Runtime claim on the consumer role.
///
/// `swap` and [`ConsumerView`] both take it, so they can never overlap.
struct OwnerClaim<'a> {
    flag: &'a AtomicBool,
}

impl<'a> OwnerClaim<'a> {
    fn acquire(flag: &'a AtomicBool, action: &str) -> Self {
        let was_busy = flag.swap(true, Ordering::AcqRel);
        assert!(!was_busy, "Cannot {action} while the consumer side is in use!");
        Self { flag }
    }
}

impl Drop for OwnerClaim<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Double-buffered arena pair with reference-counted safe swap.
///
/// Any number of threads may [`allocate`](Self::allocate) into the producer
/// side. Once per frame the owning thread calls [`swap`](Self::swap), which
/// flips the sides and then waits until every guard issued on the outgoing
/// side has been dropped. The owner then reads that side through
/// [`consumer`](Self::consumer).
///
/// ## Usage
///
/// ```rust
/// use duplex_core::{BufferConfig, SwapController};
///
/// let buffers = SwapController::new(&BufferConfig::with_capacity(4096)).unwrap();
///
/// // Producer: allocate, write, drop the guard.
/// let mut guard = buffers.allocate(4).unwrap();
/// guard.as_bytes_mut().copy_from_slice(&[1, 2, 3, 4]);
/// drop(guard);
///
/// // Owner: flip and read the frozen side.
/// buffers.swap();
/// let view = buffers.consumer();
/// assert_eq!(view.len(), 1);
/// assert_eq!(view.bytes(view.entries()[0]), &[1, 2, 3, 4]);
/// view.clear();
/// ```
pub struct SwapController {
    /// The two sides. See the module docs for who may touch which.
    sides: [UnsafeCell<Side>; 2],
    /// Live-producer counters, one per side.
    counters: [ProducerCounter; 2],
    /// Index of the producer side. The bookkeeping lock.
    producer: Mutex<usize>,
    /// Set while `swap` runs or a consumer view is open.
    owner_busy: AtomicBool,
    /// Completed swaps.
    swaps: AtomicU64,
    /// Drain wait warning interval.
    stall_warning: Option<Duration>,
    /// Per-side capacity, fixed at construction.
    capacity: usize,
    /// Per-side base alignment, fixed at construction.
    alignment: usize,
}

impl SwapController {
    /// Creates a controller with two arenas sized by `config`.
    ///
    /// Side 0 starts as the producer side.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` does not validate.
    pub fn new(config: &BufferConfig) -> BufferResult<Self> {
        config.validate()?;
        Ok(Self {
            sides: [UnsafeCell::new(Side::new(config)?), UnsafeCell::new(Side::new(config)?)],
            counters: [ProducerCounter::new(), ProducerCounter::new()],
            producer: Mutex::new(0),
            owner_busy: AtomicBool::new(false),
            swaps: AtomicU64::new(0),
            stall_warning: config.stall_warning_interval(),
            capacity: config.capacity,
            alignment: config.alignment,
        })
    }

    /// Creates a controller with `capacity` bytes per side and defaults for
    /// everything else.
    ///
    /// # Errors
    ///
    /// Returns an error if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> BufferResult<Self> {
        Self::new(&BufferConfig::with_capacity(capacity))
    }

    /// Capacity of each side in bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Base alignment of each side, used by [`allocate`](Self::allocate).
    #[must_use]
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Allocates `size` bytes at the arena's base alignment.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::OutOfCapacity`](crate::BufferError::OutOfCapacity)
    /// if the producer side is exhausted for this frame.
    pub fn allocate(&self, size: usize) -> BufferResult<ProducerGuard<'_>> {
        self.allocate_aligned(size, self.alignment())
    }

    /// Allocates `size` bytes aligned to `align` on the producer side.
    ///
    /// The region is appended to the side's entry list and a guard is bound
    /// to the side's live counter, all under the bookkeeping lock. The payload
    /// write happens later, through the guard, without the lock.
    ///
    /// # Errors
    ///
    /// - [`BufferError::OutOfCapacity`](crate::BufferError::OutOfCapacity)
    ///   if the producer side is exhausted. Nothing is retried or grown.
    /// - [`BufferError::InvalidAlignment`](crate::BufferError::InvalidAlignment)
    ///   if `align` is not a power of two.
    pub fn allocate_aligned(&self, size: usize, align: usize) -> BufferResult<ProducerGuard<'_>> {
        let producer = self.producer.lock();
        let index = *producer;

        // SAFETY: the producer side is only touched with the lock held.
        let side = unsafe { &mut *self.sides[index].get() };
        let region = side.arena.allocate(size, align)?;
        side.entries.push(region);
        let ptr = side.arena.region_ptr(region);

        // The counter is incremented before `producer` unlocks.
        Ok(ProducerGuard::attach(&self.counters[index], index, ptr, region))
    }

    /// Flips the producer side and waits for the outgoing side to drain.
    ///
    /// 1. Under the lock: flip the selector and reset the incoming side's
    ///    arena and entry list (its counter must already be zero).
    /// 2. Outside the lock: block until every guard issued on the outgoing
    ///    side has been dropped. No timeout.
    ///
    /// The full protocol runs even when nothing is live.
    ///
    /// # Panics
    ///
    /// - If a [`ConsumerView`] is open or another swap is running.
    /// - If the incoming side still has live producers (use after release).
    pub fn swap(&self) -> SwapReport {
        let _claim = OwnerClaim::acquire(&self.owner_busy, "swap buffers");

        let (outgoing, pending_at_flip, entries) = {
            let mut producer = self.producer.lock();
            let outgoing = *producer;
            let incoming = outgoing ^ 1;

            let live = self.counters[incoming].live();
            assert!(
                live == 0,
                "use after release: side {incoming} has {live} live producers and cannot be reset"
            );
            // SAFETY: `incoming` is the consumer side; the owner claim excludes
            // any consumer view and producers cannot reach it.
            unsafe { (*self.sides[incoming].get()).reset() };
            *producer = incoming;

            // SAFETY: lock still held; no producer can push to `outgoing` now
            // that the selector moved, and the owner claim excludes readers.
            let entries = unsafe { (*self.sides[outgoing].get()).entries.len() };
            (outgoing, self.counters[outgoing].live(), entries)
        };

        let drain_wait = self.counters[outgoing].wait_drained(outgoing, self.stall_warning);
        let generation = self.swaps.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::trace!(
            generation,
            outgoing,
            entries,
            pending_at_flip,
            drain_wait_us = u64::try_from(drain_wait.as_micros()).unwrap_or(u64::MAX),
            "swapped frame buffers"
        );

        SwapReport {
            outgoing_side: outgoing,
            pending_at_flip,
            entries,
            drain_wait,
            generation,
        }
    }

    /// Opens the consumer side for reading.
    ///
    /// Valid until dropped. Only one view may exist, and `swap` cannot run
    /// while it does.
    ///
    /// # Panics
    ///
    /// Panics if a view is already open or a swap is running.
    #[must_use]
    pub fn consumer(&self) -> ConsumerView<'_> {
        let claim = OwnerClaim::acquire(&self.owner_busy, "open a consumer view");
        let side = *self.producer.lock() ^ 1;
        ConsumerView {
            controller: self,
            side,
            _claim: claim,
        }
    }

    /// Index of the side currently accepting allocations.
    #[must_use]
    pub fn producer_side(&self) -> usize {
        *self.producer.lock()
    }

    /// Index of the side the consumer reads.
    #[must_use]
    pub fn consumer_side(&self) -> usize {
        self.producer_side() ^ 1
    }

    /// Live guards on `side`.
    ///
    /// # Panics
    ///
    /// Panics if `side` is not 0 or 1.
    #[must_use]
    pub fn live_producers(&self, side: usize) -> usize {
        self.counters[side].live()
    }

    /// Live guards on the producer side.
    ///
    /// Surfaces a stalled frame: if this stays nonzero across a frame
    /// boundary, some producer is holding its guard too long.
    #[must_use]
    pub fn pending_producers(&self) -> usize {
        let producer = self.producer.lock();
        self.counters[*producer].live()
    }

    /// Entries appended to the producer side since it was last reset.
    #[must_use]
    pub fn pending_entries(&self) -> usize {
        let producer = self.producer.lock();
        // SAFETY: producer side, lock held.
        unsafe { (*self.sides[*producer].get()).entries.len() }
    }

    /// Bytes used on the producer side, padding included.
    #[must_use]
    pub fn pending_bytes(&self) -> usize {
        let producer = self.producer.lock();
        // SAFETY: producer side, lock held.
        unsafe { (*self.sides[*producer].get()).arena.used() }
    }

    /// Number of completed swaps.
    #[must_use]
    pub fn swap_count(&self) -> u64 {
        self.swaps.load(Ordering::Acquire)
    }
}

impl Drop for SwapController {
    fn drop(&mut self) {
        // Producers must be shut down before their buffers go away.
        if !std::thread::panicking() {
            let live = [self.counters[0].live(), self.counters[1].live()];
            assert!(
                live == [0, 0],
                "use after release: swap controller dropped with live producers {live:?}"
            );
        }
    }
}

impl std::fmt::Debug for SwapController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwapController")
            .field("capacity", &self.capacity())
            .field("producer_side", &self.producer_side())
            .field("live", &[self.counters[0].live(), self.counters[1].live()])
            .field("swaps", &self.swap_count())
            .finish_non_exhaustive()
    }
}

// SAFETY: every access to the `UnsafeCell` sides follows the role split in
// the module docs (lock for the producer side, owner claim plus drained
// counter for the consumer side).
unsafe impl Sync for SwapController {}

/// Read access to the frozen consumer side.
///
/// Obtained from [`SwapController::consumer`]. Every entry was fully written
/// before the preceding `swap` returned.
pub struct ConsumerView<'a> {
    controller: &'a SwapController,
    side: usize,
    _claim: OwnerClaim<'a>,
}

impl ConsumerView<'_> {
    fn side_ref(&self) -> &Side {
        // SAFETY: consumer side, owner claim held, counter drained by the
        // preceding swap.
        unsafe { &*self.controller.sides[self.side].get() }
    }

    fn side_mut(&mut self) -> &mut Side {
        // SAFETY: as in `side_ref`; `&mut self` makes the borrow unique.
        unsafe { &mut *self.controller.sides[self.side].get() }
    }

    /// Index of the side being read.
    #[inline]
    #[must_use]
    pub fn side(&self) -> usize {
        self.side
    }

    /// Regions in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[Region] {
        &self.side_ref().entries
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.side_ref().entries.len()
    }

    /// Returns true if the side holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.side_ref().entries.is_empty()
    }

    /// Bytes used on this side, padding included.
    #[must_use]
    pub fn used(&self) -> usize {
        self.side_ref().arena.used()
    }

    /// Bytes of one region.
    ///
    /// # Panics
    ///
    /// Panics if `region` is outside the arena.
    #[must_use]
    pub fn bytes(&self, region: Region) -> &[u8] {
        self.side_ref().arena.bytes(region)
    }

    /// Mutable bytes of one region.
    ///
    /// # Panics
    ///
    /// Panics if `region` is outside the arena.
    #[must_use]
    pub fn bytes_mut(&mut self, region: Region) -> &mut [u8] {
        self.side_mut().arena.bytes_mut(region)
    }

    /// Reads a plain-old-data value from the start of `region`.
    ///
    /// Returns `None` if the region is too small or misaligned for `T`.
    #[must_use]
    pub fn read_pod<T: Pod>(&self, region: Region) -> Option<&T> {
        let bytes = self.bytes(region).get(..std::mem::size_of::<T>())?;
        bytemuck::try_from_bytes(bytes).ok()
    }

    /// Iterates over entry bytes in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let side = self.side_ref();
        side.entries.iter().map(move |&region| side.arena.bytes(region))
    }

    /// Mutable typed access to an entry written with `write_value`.
    ///
    /// # Safety
    ///
    /// `region` must come from this side's entry list and must have been
    /// filled by [`ProducerGuard::write_value`] with a `T`.
    pub(crate) unsafe fn value_mut<T: Copy>(&mut self, region: Region) -> &mut T {
        let ptr = self.side_ref().arena.region_ptr(region);
        // SAFETY: guaranteed by the caller; uniqueness by `&mut self`.
        unsafe { &mut *ptr.cast::<T>().as_ptr() }
    }

    /// Resets the side's arena and entry list, ending the view.
    ///
    /// # Panics
    ///
    /// Panics if the side has live producers (use after release).
    pub fn clear(mut self) {
        let live = self.controller.counters[self.side].live();
        assert!(
            live == 0,
            "use after release: side {} has {live} live producers and cannot be reset",
            self.side
        );
        self.side_mut().reset();
    }
}

impl std::fmt::Debug for ConsumerView<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerView")
            .field("side", &self.side)
            .field("entries", &self.len())
            .field("used", &self.used())
            .finish()
    }
}
