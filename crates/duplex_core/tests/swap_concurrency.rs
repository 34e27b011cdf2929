//! # Swap Concurrency Tests
//!
//! Multi-threaded producer/owner scenarios against the swap controller and
//! the frame queue, plus the arena disjointness property.
//!
//! Run with: cargo test -p duplex_core --test swap_concurrency

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Barrier;
use std::thread;
use std::time::Duration;

use duplex_core::{Arena, BufferConfig, BufferError, FrameQueue, Region, SwapController};
use proptest::prelude::*;

// ============================================================================
// DRAIN ON SWAP
// ============================================================================

#[test]
fn swap_waits_for_three_live_producers() {
    let buffers = SwapController::with_capacity(4096).unwrap();
    let allocated = Barrier::new(4);
    let finished = AtomicUsize::new(0);

    thread::scope(|scope| {
        for id in 0..3_u8 {
            let buffers = &buffers;
            let allocated = &allocated;
            let finished = &finished;
            scope.spawn(move || {
                let mut guard = buffers.allocate(64).unwrap();
                allocated.wait();

                thread::sleep(Duration::from_millis(40));
                guard.as_bytes_mut().fill(id + 1);
                finished.fetch_add(1, Ordering::SeqCst);
                drop(guard);
            });
        }

        allocated.wait();
        assert_eq!(buffers.pending_producers(), 3);

        let report = buffers.swap();
        assert_eq!(finished.load(Ordering::SeqCst), 3, "swap returned before every guard dropped");
        assert_eq!(report.entries, 3);
        assert_eq!(report.pending_at_flip, 3);
        assert_eq!(buffers.live_producers(report.outgoing_side), 0);
    });

    let view = buffers.consumer();
    assert_eq!(view.len(), 3);

    // Every payload is fully written by the time it is visible.
    let mut markers: Vec<u8> = view
        .iter()
        .map(|bytes| {
            assert_eq!(bytes.len(), 64);
            assert!(bytes.iter().all(|b| *b == bytes[0]));
            bytes[0]
        })
        .collect();
    markers.sort_unstable();
    assert_eq!(markers, vec![1, 2, 3]);
}

#[test]
fn released_guards_never_block_swap() {
    let buffers = SwapController::with_capacity(4096).unwrap();
    for _ in 0..100 {
        let guard = buffers.allocate(8).unwrap();
        drop(guard);
    }
    assert_eq!(buffers.pending_producers(), 0);

    let report = buffers.swap();
    assert_eq!(report.pending_at_flip, 0);
    assert_eq!(report.entries, 100);
}

#[test]
fn stall_warning_keeps_waiting() {
    let config = BufferConfig::with_capacity(1024).stall_warning(Duration::from_millis(5));
    let buffers = SwapController::new(&config).unwrap();
    let allocated = Barrier::new(2);
    let released = AtomicUsize::new(0);

    thread::scope(|scope| {
        scope.spawn(|| {
            let guard = buffers.allocate(16).unwrap();
            allocated.wait();
            thread::sleep(Duration::from_millis(30));
            released.store(1, Ordering::SeqCst);
            drop(guard);
        });

        allocated.wait();
        let report = buffers.swap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert!(report.drain_wait >= Duration::from_millis(5));
    });
}

// ============================================================================
// CAPACITY
// ============================================================================

#[test]
fn oversized_allocation_leaves_side_usable() {
    let buffers = SwapController::with_capacity(256).unwrap();

    let err = buffers.allocate(257).unwrap_err();
    assert!(matches!(
        err,
        BufferError::OutOfCapacity {
            requested: 257,
            remaining: 256,
            capacity: 256,
            ..
        }
    ));
    assert_eq!(buffers.pending_bytes(), 0);
    assert_eq!(buffers.pending_entries(), 0);

    let guard = buffers.allocate(128).unwrap();
    assert_eq!(guard.region().offset(), 0);
    drop(guard);
    assert_eq!(buffers.pending_entries(), 1);
}

// ============================================================================
// STRESS
// ============================================================================

#[test]
fn queue_delivers_every_value_in_per_thread_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 2_000;

    let config = BufferConfig::with_capacity(256 * 1024).entry_hint(8 * 1024);
    let queue: FrameQueue<u64> = FrameQueue::new(&config).unwrap();
    let done = AtomicUsize::new(0);
    let mut received = Vec::new();

    thread::scope(|scope| {
        for producer in 0..PRODUCERS {
            let queue = &queue;
            let done = &done;
            scope.spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.push((producer << 32) | seq).unwrap();
                    if seq % 256 == 0 {
                        thread::yield_now();
                    }
                }
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        loop {
            let finished = done.load(Ordering::SeqCst) == 4;
            let _ = queue.swap();
            queue.drain(|value| received.push(*value));
            if finished {
                break;
            }
        }
    });

    // Anything pushed after the last swap of the loop.
    let _ = queue.swap();
    queue.drain(|value| received.push(*value));

    assert_eq!(received.len() as u64, PRODUCERS * PER_PRODUCER);
    let mut next = [0_u64; 4];
    for value in received {
        let producer = usize::try_from(value >> 32).unwrap();
        let seq = value & 0xFFFF_FFFF;
        assert_eq!(seq, next[producer], "producer {producer} delivered out of order");
        next[producer] += 1;
    }
}

// ============================================================================
// ARENA PROPERTIES
// ============================================================================

fn request() -> impl Strategy<Value = (usize, usize)> {
    (0_usize..300, 0_u32..8).prop_map(|(size, shift)| (size, 1_usize << shift))
}

proptest! {
    #[test]
    fn arena_regions_are_disjoint_aligned_and_in_bounds(
        requests in proptest::collection::vec(request(), 1..64)
    ) {
        let mut arena = Arena::new(4096).unwrap();
        let mut regions: Vec<Region> = Vec::new();

        for (size, align) in requests {
            let before = arena.used();
            match arena.allocate(size, align) {
                Ok(region) => {
                    prop_assert!(region.end() <= arena.capacity());
                    prop_assert_eq!(region.len(), size);
                    prop_assert_eq!(arena.bytes(region).as_ptr() as usize % align, 0);
                    for other in &regions {
                        prop_assert!(!region.overlaps(*other));
                    }
                    regions.push(region);
                }
                Err(BufferError::OutOfCapacity { .. }) => {
                    prop_assert_eq!(arena.used(), before);
                }
                Err(other) => prop_assert!(false, "unexpected error {other}"),
            }
        }

        arena.reset();
        prop_assert_eq!(arena.used(), 0);
    }
}
