//! # Synchronization Primitives for Cross-Thread Frame Handoff
//!
//! ## The Problem
//!
//! ```text
//! Threads 1..N (producers): WRITE messages / commands for this frame
//! Owner thread (consumer):  READ last frame's messages / commands
//!
//! Without synchronization: a reader sees half-written payloads
//! With a lock per message: producers serialize on every write
//! ```
//!
//! ## The Solution: Double Buffering with Counted Producers
//!
//! ```text
//! Frame N:
//!   Producers allocate into Side A (lock held only for the bump)
//!   Owner reads Side B (last frame)
//!
//! End of frame:
//!   SWAP (flip under the lock, then wait for Side A's live count to hit 0)
//!   Producers allocate into Side B
//!   Owner reads Side A
//! ```
//!
//! New writers can never land on the draining side, so the wait is bounded
//! by the writers that were already in flight.

mod guard;
mod swap;

pub use guard::ProducerGuard;
pub use swap::{ConsumerView, SwapController, SwapReport};
