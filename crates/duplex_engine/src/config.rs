//! # Engine Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! [messages]
//! capacity = 65536
//!
//! [render]
//! capacity = 262144
//! stall_warning_ms = 100
//!
//! [frame]
//! target_fps = 60
//! max_frames = 600
//! ```
//!
//! Every section and key is optional; unknown keys are rejected.

use std::path::Path;
use std::time::Duration;

use duplex_core::BufferConfig;
use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

/// Default frame rate the run loop paces to.
pub const DEFAULT_TARGET_FPS: u32 = 60;

/// Frame pacing and run length.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FrameConfig {
    /// Frames per second `run` paces to. Zero disables pacing.
    pub target_fps: u32,
    /// Stop `run` after this many frames, even without a quit request.
    pub max_frames: Option<u64>,
}

impl FrameConfig {
    /// Time budget of one frame, or `None` when pacing is disabled.
    #[must_use]
    pub fn frame_budget(&self) -> Option<Duration> {
        (self.target_fps > 0).then(|| Duration::from_secs(1) / self.target_fps)
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            target_fps: DEFAULT_TARGET_FPS,
            max_frames: None,
        }
    }
}

/// Configuration for an [`Application`](crate::Application).
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Message bus arenas.
    pub messages: BufferConfig,
    /// Render command arenas.
    pub render: BufferConfig,
    /// Frame loop settings.
    pub frame: FrameConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigParse`] for malformed TOML or unknown keys,
    /// or the validation error of the offending section.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::ConfigIo`] if the file cannot be read, otherwise
    /// as [`from_toml_str`](Self::from_toml_str).
    pub fn from_file(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Sets `frame.max_frames`.
    #[must_use]
    pub fn max_frames(mut self, frames: u64) -> Self {
        self.frame.max_frames = Some(frames);
        self
    }

    /// Sets `frame.target_fps`.
    #[must_use]
    pub fn target_fps(mut self, fps: u32) -> Self {
        self.frame.target_fps = fps;
        self
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// Returns the first invalid buffer section, or
    /// [`EngineError::InvalidFrameConfig`] for `max_frames = 0`.
    pub fn validate(&self) -> EngineResult<()> {
        self.messages.validate()?;
        self.render.validate()?;
        if self.frame.max_frames == Some(0) {
            return Err(EngineError::InvalidFrameConfig(
                "max_frames must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_core::BufferError;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.frame.target_fps, DEFAULT_TARGET_FPS);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [messages]
            capacity = 4096
            stall_warning_ms = 50

            [frame]
            target_fps = 0
            max_frames = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.messages.capacity, 4096);
        assert_eq!(config.messages.stall_warning_ms, Some(50));
        assert_eq!(config.render, BufferConfig::default());
        assert_eq!(config.frame.max_frames, Some(10));
        assert_eq!(config.frame.frame_budget(), None);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = EngineConfig::from_toml_str("[messages]\nsize = 10\n").unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = EngineConfig::from_toml_str("[render]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, EngineError::Buffer(BufferError::InvalidConfig(_))));
    }

    #[test]
    fn test_bad_alignment_rejected() {
        let err = EngineConfig::from_toml_str("[messages]\nalignment = 12\n").unwrap_err();
        assert!(matches!(err, EngineError::Buffer(BufferError::InvalidAlignment(12))));
    }

    #[test]
    fn test_zero_max_frames_rejected() {
        let err = EngineConfig::default().max_frames(0).validate().unwrap_err();
        assert!(matches!(err, EngineError::InvalidFrameConfig(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = EngineConfig::from_file("/nonexistent/duplex.toml").unwrap_err();
        assert!(matches!(err, EngineError::ConfigIo { .. }));
    }

    #[test]
    fn test_frame_budget() {
        let frame = FrameConfig {
            target_fps: 50,
            max_frames: None,
        };
        assert_eq!(frame.frame_budget(), Some(Duration::from_millis(20)));
    }
}
