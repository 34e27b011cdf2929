//! # Arena Allocator
//!
//! A fixed-capacity bump allocator over one pre-reserved, zero-filled block.
//!
//! ## Safety Note
//!
//! The arena owns raw memory, so this module opts out of the crate-wide
//! `unsafe_code` denial. Every unsafe block carries a `SAFETY:` comment.

#![allow(unsafe_code)]

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::config::DEFAULT_ALIGNMENT;
use crate::error::{BufferError, BufferResult};

/// A byte range handed out by an [`Arena`].
///
/// Regions are plain offsets into one arena. They carry no lifetime and
/// become meaningless after that arena is reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Region {
    offset: usize,
    len: usize,
}

impl Region {
    /// The empty region at offset zero.
    pub const EMPTY: Region = Region { offset: 0, len: 0 };

    /// Offset of the first byte from the arena base.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.offset
    }

    /// Length in bytes.
    #[inline]
    #[must_use]
    pub const fn len(self) -> usize {
        self.len
    }

    /// Returns true for a zero-sized region.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len == 0
    }

    /// One past the last byte.
    #[inline]
    #[must_use]
    pub const fn end(self) -> usize {
        self.offset + self.len
    }

    /// Returns true if the two regions share at least one byte.
    #[inline]
    #[must_use]
    pub const fn overlaps(self, other: Region) -> bool {
        self.offset < other.end() && other.offset < self.end()
    }
}

/// A bump-pointer arena allocator.
///
/// Allocations only advance an offset. Memory is reclaimed all at once by
/// [`Arena::reset`]; individual regions are never freed and the arena never
/// grows.
///
/// # Thread Safety
///
/// The arena has no concurrency of its own. Shared use goes through
/// [`SwapController`](crate::SwapController), which serializes allocation.
///
/// # Example
///
/// ```rust
/// use duplex_core::Arena;
///
/// let mut arena = Arena::new(1024).unwrap();
/// let region = arena.allocate(64, 8).unwrap();
/// arena.bytes_mut(region).fill(0xAB);
/// assert_eq!(arena.used(), 64);
///
/// arena.reset();
/// assert_eq!(arena.used(), 0);
/// ```
pub struct Arena {
    /// Base of the backing block.
    base: NonNull<u8>,
    /// Layout the block was allocated with (capacity + base alignment).
    layout: Layout,
    /// Current bump offset.
    offset: usize,
}

impl Arena {
    /// Creates a zero-filled arena with the default base alignment.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidConfig`] if `capacity` is zero.
    pub fn new(capacity: usize) -> BufferResult<Self> {
        Self::with_alignment(capacity, DEFAULT_ALIGNMENT)
    }

    /// Creates a zero-filled arena whose base is aligned to `alignment`.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidAlignment`] for a non power-of-two
    /// alignment and [`BufferError::InvalidConfig`] for a zero or oversized
    /// capacity.
    pub fn with_alignment(capacity: usize, alignment: usize) -> BufferResult<Self> {
        if !alignment.is_power_of_two() {
            return Err(BufferError::InvalidAlignment(alignment));
        }
        if capacity == 0 {
            return Err(BufferError::InvalidConfig(
                "arena capacity must be greater than zero".to_string(),
            ));
        }
        let layout = Layout::from_size_align(capacity, alignment)
            .map_err(|e| BufferError::InvalidConfig(e.to_string()))?;

        // SAFETY: `layout` has a non-zero size (checked above).
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let Some(base) = NonNull::new(ptr) else {
            alloc::handle_alloc_error(layout)
        };

        Ok(Self {
            base,
            layout,
            offset: 0,
        })
    }

    /// Returns the total capacity in bytes.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.layout.size()
    }

    /// Returns the base alignment.
    #[inline]
    #[must_use]
    pub const fn alignment(&self) -> usize {
        self.layout.align()
    }

    /// Returns the current used space in bytes, padding included.
    #[inline]
    #[must_use]
    pub const fn used(&self) -> usize {
        self.offset
    }

    /// Returns the remaining free space in bytes.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.capacity() - self.offset
    }

    /// Allocates `size` bytes aligned to `align`.
    ///
    /// The current position is padded up to `align` first. Alignment is
    /// computed on the absolute address, so `align` may exceed the base
    /// alignment. On failure the offset is left untouched.
    ///
    /// # Errors
    ///
    /// - [`BufferError::InvalidAlignment`] if `align` is not a power of two.
    /// - [`BufferError::OutOfCapacity`] if the padded request does not fit.
    pub fn allocate(&mut self, size: usize, align: usize) -> BufferResult<Region> {
        if !align.is_power_of_two() {
            return Err(BufferError::InvalidAlignment(align));
        }

        let out_of_capacity = BufferError::OutOfCapacity {
            requested: size,
            align,
            remaining: self.remaining(),
            capacity: self.capacity(),
        };

        let base = self.base.as_ptr() as usize;
        let Some(start) = base
            .checked_add(self.offset)
            .and_then(|addr| addr.checked_add(align - 1))
            .map(|addr| (addr & !(align - 1)) - base)
        else {
            return Err(out_of_capacity);
        };
        let Some(end) = start.checked_add(size).filter(|&end| end <= self.capacity()) else {
            return Err(out_of_capacity);
        };

        self.offset = end;
        Ok(Region { offset: start, len: size })
    }

    /// Resets the arena, invalidating all previous regions.
    ///
    /// No memory is freed or cleared; old bytes stay until overwritten.
    #[inline]
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Returns true if `region` lies within the arena's bounds.
    #[inline]
    #[must_use]
    pub fn contains(&self, region: Region) -> bool {
        region
            .offset
            .checked_add(region.len)
            .is_some_and(|end| end <= self.capacity())
    }

    /// Borrows the bytes of `region`.
    ///
    /// # Panics
    ///
    /// Panics if `region` does not lie within this arena.
    #[must_use]
    pub fn bytes(&self, region: Region) -> &[u8] {
        let ptr = self.region_ptr(region);
        // SAFETY: the region is in bounds and the whole block was zero-filled
        // at creation, so every byte is initialized. `&self` rules out
        // concurrent mutation through this arena's safe API.
        unsafe { std::slice::from_raw_parts(ptr.as_ptr(), region.len) }
    }

    /// Mutably borrows the bytes of `region`.
    ///
    /// # Panics
    ///
    /// Panics if `region` does not lie within this arena.
    #[must_use]
    pub fn bytes_mut(&mut self, region: Region) -> &mut [u8] {
        let ptr = self.region_ptr(region);
        // SAFETY: as in `bytes`, plus `&mut self` makes the borrow unique.
        unsafe { std::slice::from_raw_parts_mut(ptr.as_ptr(), region.len) }
    }

    /// Pointer to the first byte of `region`.
    ///
    /// # Panics
    ///
    /// Panics if `region` does not lie within this arena.
    pub(crate) fn region_ptr(&self, region: Region) -> NonNull<u8> {
        assert!(
            self.contains(region),
            "region {region:?} is outside an arena of {} bytes",
            self.capacity()
        );
        // SAFETY: `region.offset <= capacity`, so the pointer stays within (or
        // one past the end of) the allocation and cannot be null.
        unsafe { NonNull::new_unchecked(self.base.as_ptr().add(region.offset)) }
    }
}

impl Drop for Arena {
    fn drop(&mut self) {
        // SAFETY: `base` was returned by `alloc_zeroed` with this exact layout.
        unsafe { alloc::dealloc(self.base.as_ptr(), self.layout) }
    }
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena")
            .field("capacity", &self.capacity())
            .field("alignment", &self.alignment())
            .field("used", &self.offset)
            .finish()
    }
}

// SAFETY: the arena exclusively owns its block; moving it between threads
// moves that ownership.
unsafe impl Send for Arena {}
// SAFETY: shared access only reads bytes; all mutation needs `&mut self`.
unsafe impl Sync for Arena {}
