//! # Memory Management
//!
//! Fixed-capacity arenas for per-frame, zero-garbage storage.
//!
//! ## Design Philosophy
//!
//! All memory is reserved once at startup. During a frame:
//! - No heap allocations per message
//! - No individual frees
//! - One reset per side per frame

mod arena;

pub use arena::{Arena, Region};
