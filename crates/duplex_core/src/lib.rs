//! # DUPLEX Core
//!
//! Double-buffered frame arenas for handing data from many producer threads
//! to one owner thread, once per frame:
//! - Fixed-capacity bump arenas, pre-allocated at startup
//! - Allocation under a short lock, payload writes outside it
//! - Swap waits for every in-flight write on the outgoing side to finish
//!
//! ## Architecture Rules
//!
//! 1. **No heap allocations per write** - both arenas are sized up front
//! 2. **Scoped producers** - every allocation comes with a [`ProducerGuard`];
//!    dropping it is the release
//! 3. **One owner** - `swap` and [`ConsumerView`] are mutually exclusive
//!
//! ## Example
//!
//! ```rust
//! use duplex_core::SwapController;
//!
//! let buffers = SwapController::with_capacity(4096).unwrap();
//! {
//!     let mut guard = buffers.allocate(4).unwrap();
//!     guard.write_pod(&42_u32);
//! }
//!
//! let report = buffers.swap();
//! assert_eq!(report.entries, 1);
//!
//! let view = buffers.consumer();
//! let region = view.entries()[0];
//! assert_eq!(view.read_pod::<u32>(region), Some(&42));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod memory;
pub mod queue;
pub mod sync;

pub use config::BufferConfig;
pub use error::{BufferError, BufferResult};
pub use memory::{Arena, Region};
pub use queue::FrameQueue;
pub use sync::{ConsumerView, ProducerGuard, SwapController, SwapReport};
