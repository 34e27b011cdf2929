//! # Producer Guards
//!
//! A guard marks one in-flight write into a side's arena. The side's live
//! counter equals the number of guards bound to it, and `swap` waits for that
//! counter to reach zero before the consumer may read the side.

#![allow(unsafe_code)]

use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use bytemuck::Pod;
use parking_lot::{Condvar, Mutex};

use crate::memory::Region;

/// Live-producer counter for one side, plus the condition `swap` drains on.
pub(crate) struct ProducerCounter {
    live: AtomicUsize,
    lock: Mutex<()>,
    drained: Condvar,
}

impl ProducerCounter {
    pub(crate) fn new() -> Self {
        Self {
            live: AtomicUsize::new(0),
            lock: Mutex::new(()),
            drained: Condvar::new(),
        }
    }

    /// Number of guards currently bound to this side.
    #[inline]
    pub(crate) fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    #[inline]
    fn acquire(&self) {
        self.live.fetch_add(1, Ordering::AcqRel);
    }

    fn release(&self) {
        let previous = self.live.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous > 0, "producer counter underflow");
        if previous == 1 {
            // Notify under the lock so a drain that has just checked the
            // counter cannot miss the wakeup.
            let _lock = self.lock.lock();
            self.drained.notify_all();
        }
    }

    /// Blocks until no guard is bound to this side. Returns the time spent.
    ///
    /// There is no timeout. With `stall_warning` set, a warning is logged each
    /// time the interval passes with producers still live.
    pub(crate) fn wait_drained(&self, side: usize, stall_warning: Option<Duration>) -> Duration {
        let start = Instant::now();
        let mut lock = self.lock.lock();
        while self.live() != 0 {
            match stall_warning {
                Some(interval) => {
                    let timed_out = self.drained.wait_for(&mut lock, interval).timed_out();
                    let pending = self.live();
                    if timed_out && pending != 0 {
                        tracing::warn!(
                            side,
                            pending,
                            waited_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                            "swap is still waiting for producers to release their guards"
                        );
                    }
                }
                None => self.drained.wait(&mut lock),
            }
        }
        start.elapsed()
    }
}

/// Scoped handle for one allocation's write.
///
/// Returned by [`SwapController::allocate`](crate::SwapController::allocate).
/// The allocated bytes are only reachable through the guard, so the write
/// cannot outlive it. Dropping the guard, on any path, decrements the side's
/// live counter exactly once; there is no separate release call.
///
/// Guards are move-only. Moving one transfers the binding without touching
/// the counter; a [`detached`](ProducerGuard::detached) guard is bound to
/// nothing and does nothing on drop.
///
/// Holding a guard across a frame boundary stalls the owner's `swap` until
/// the guard is dropped. Never call `swap` on the thread that holds one.
#[must_use = "dropping the guard ends the write immediately"]
pub struct ProducerGuard<'a> {
    counter: Option<&'a ProducerCounter>,
    ptr: NonNull<u8>,
    region: Region,
    side: usize,
    _bytes: PhantomData<&'a mut [u8]>,
}

impl<'a> ProducerGuard<'a> {
    /// Binds a new guard, incrementing `counter`.
    ///
    /// Called with the bookkeeping lock held so the increment is ordered
    /// before any flip.
    pub(crate) fn attach(
        counter: &'a ProducerCounter,
        side: usize,
        ptr: NonNull<u8>,
        region: Region,
    ) -> Self {
        counter.acquire();
        Self {
            counter: Some(counter),
            ptr,
            region,
            side,
            _bytes: PhantomData,
        }
    }

    /// A guard bound to no counter and no bytes.
    pub fn detached() -> Self {
        Self {
            counter: None,
            ptr: NonNull::dangling(),
            region: Region::EMPTY,
            side: 0,
            _bytes: PhantomData,
        }
    }

    /// Returns true if this guard holds a counter reference.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.counter.is_some()
    }

    /// Side the allocation was made on, if attached.
    #[inline]
    #[must_use]
    pub fn side(&self) -> Option<usize> {
        self.counter.map(|_| self.side)
    }

    /// The allocated region.
    #[inline]
    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    /// Length of the allocation in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.region.len()
    }

    /// Returns true for a zero-sized allocation.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Reads the allocated bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        // SAFETY: the region belongs to this guard alone until it drops, the
        // side cannot be reset while the guard keeps its counter above zero,
        // and arena memory is zero-filled at creation. A detached guard has a
        // dangling pointer with length zero, which is a valid empty slice.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.region.len()) }
    }

    /// Writes into the allocated bytes.
    #[must_use]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `as_bytes`; `&mut self` makes the borrow unique.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.region.len()) }
    }

    /// Copies a plain-old-data value into the start of the allocation.
    ///
    /// # Panics
    ///
    /// Panics if the allocation is smaller than `T`.
    pub fn write_pod<T: Pod>(&mut self, value: &T) {
        let src = bytemuck::bytes_of(value);
        assert!(
            src.len() <= self.len(),
            "{} byte value does not fit a {} byte allocation",
            src.len(),
            self.len()
        );
        self.as_bytes_mut()[..src.len()].copy_from_slice(src);
    }

    /// Moves `value` into the allocation.
    ///
    /// # Safety
    ///
    /// The region's bytes must never be viewed as `u8` afterwards (padding
    /// inside `T` is uninitialized), and any later read must be as `T`.
    ///
    /// # Panics
    ///
    /// Panics if the allocation is too small or misaligned for `T`.
    pub(crate) unsafe fn write_value<T: Copy>(&mut self, value: T) {
        assert!(self.len() >= std::mem::size_of::<T>(), "allocation too small for value");
        assert_eq!(
            self.ptr.as_ptr() as usize % std::mem::align_of::<T>(),
            0,
            "allocation misaligned for value"
        );
        // SAFETY: size and alignment checked above; the bytes are exclusively ours.
        unsafe { self.ptr.cast::<T>().as_ptr().write(value) }
    }
}

impl Default for ProducerGuard<'_> {
    fn default() -> Self {
        Self::detached()
    }
}

impl Drop for ProducerGuard<'_> {
    fn drop(&mut self) {
        if let Some(counter) = self.counter.take() {
            counter.release();
        }
    }
}

impl std::fmt::Debug for ProducerGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerGuard")
            .field("side", &self.side())
            .field("region", &self.region)
            .finish()
    }
}

// SAFETY: the guard is the only handle to its bytes, and the counter it
// references is atomic and condvar-protected.
unsafe impl Send for ProducerGuard<'_> {}
// SAFETY: shared access only reads the bytes.
unsafe impl Sync for ProducerGuard<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_guard_is_inert() {
        let guard = ProducerGuard::detached();
        assert!(!guard.is_attached());
        assert_eq!(guard.side(), None);
        assert!(guard.as_bytes().is_empty());
        drop(guard);
    }

    #[test]
    fn test_counter_tracks_guards() {
        let counter = ProducerCounter::new();
        let region = Region::EMPTY;

        let first = ProducerGuard::attach(&counter, 0, NonNull::dangling(), region);
        let second = ProducerGuard::attach(&counter, 0, NonNull::dangling(), region);
        assert_eq!(counter.live(), 2);

        drop(first);
        assert_eq!(counter.live(), 1);
        drop(second);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_move_does_not_increment() {
        let counter = ProducerCounter::new();
        let guard = ProducerGuard::attach(&counter, 1, NonNull::dangling(), Region::EMPTY);

        let moved = guard;
        assert_eq!(counter.live(), 1);
        assert_eq!(moved.side(), Some(1));

        let boxed = Box::new(moved);
        assert_eq!(counter.live(), 1);
        drop(boxed);
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_early_return_releases() {
        fn fails(counter: &ProducerCounter) -> Result<(), &'static str> {
            let _guard = ProducerGuard::attach(counter, 0, NonNull::dangling(), Region::EMPTY);
            Err("payload rejected")
        }

        let counter = ProducerCounter::new();
        assert!(fails(&counter).is_err());
        assert_eq!(counter.live(), 0);
    }

    #[test]
    fn test_wait_drained_returns_immediately_when_idle() {
        let counter = ProducerCounter::new();
        let waited = counter.wait_drained(0, None);
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn test_wait_drained_with_stall_warning() {
        let counter = ProducerCounter::new();
        std::thread::scope(|scope| {
            let guard = ProducerGuard::attach(&counter, 0, NonNull::dangling(), Region::EMPTY);
            scope.spawn(move || {
                std::thread::sleep(Duration::from_millis(30));
                drop(guard);
            });
            let _ = counter.wait_drained(0, Some(Duration::from_millis(5)));
            assert_eq!(counter.live(), 0);
        });
    }
}
