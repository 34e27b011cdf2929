//! # Engine Error Types

use std::path::PathBuf;

use duplex_core::BufferError;
use thiserror::Error;

use crate::system::SystemId;

/// Errors raised by the engine layer.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A frame buffer operation failed.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The configuration text is not valid TOML for [`EngineConfig`](crate::EngineConfig).
    #[error("invalid engine config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A frame setting is out of range.
    #[error("invalid frame config: {0}")]
    InvalidFrameConfig(String),

    /// A system with the same id is already on the stack.
    #[error("system {0} is already on the stack")]
    DuplicateSystem(SystemId),

    /// The render thread could not be started.
    #[error("failed to spawn render thread: {0}")]
    RenderThreadSpawn(#[source] std::io::Error),

    /// The render thread exited while the owner was still handing it frames.
    #[error("render thread disconnected")]
    RenderThreadDisconnected,
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
