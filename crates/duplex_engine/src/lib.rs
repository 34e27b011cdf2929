//! # DUPLEX Engine
//!
//! Message bus, system stack and frame driver on top of the double-buffered
//! arenas of [`duplex_core`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                              APPLICATION                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  producers ──post──> ┌──────────────┐  dispatch  ┌───────────────────┐  │
//! │  (any thread)        │  MessageBus  │───────────>│   SystemStack     │  │
//! │                      │  (2 arenas)  │            │  • Application    │  │
//! │                      └──────────────┘            │  • Input          │  │
//! │                             ^                    │  • user systems   │  │
//! │                             └──── bindings ──────└─────────┬─────────┘  │
//! │                                                            │ render     │
//! │                      ┌──────────────┐   drain    ┌─────────v─────────┐  │
//! │                      │ RenderThread │<───────────│   RenderQueue     │  │
//! │                      │  (backend)   │            │   (2 arenas)      │  │
//! │                      └──────────────┘            └───────────────────┘  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `message`: the closed set of messages
//! - `bus`: double-buffered message queue and handler chains
//! - `system`: application layers and their stack
//! - `input`: input bindings
//! - `render`: render command handoff to the render thread
//! - `application`: frame orchestration and timing
//! - `config`, `error`: startup configuration and error types

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod application;
pub mod bus;
pub mod config;
pub mod error;
pub mod input;
pub mod message;
pub mod render;
pub mod system;

// Re-export the core
pub use duplex_core as core;

// Re-export commonly used types
pub use application::{
    Application, EndFrameReport, FrameStats, FrameStatsAccumulator, QuitHandle,
    APPLICATION_SYSTEM_ID,
};
pub use bus::{handler_fn, DispatchStats, FnHandler, HandlerChain, MessageBus, MessageHandler, MessagePoster};
pub use config::{EngineConfig, FrameConfig};
pub use error::{EngineError, EngineResult};
pub use input::{InputSystem, INPUT_SYSTEM_ID};
pub use message::{KeyCode, Message, MessageCategory, MessageFlag, MessageId, MessageKind, MouseButton};
pub use render::{
    HeadlessBackend, HeadlessLog, RenderBackend, RenderCommand, RenderQueue, RenderRecorder,
    RenderThread,
};
pub use system::{System, SystemId, SystemStack};
