//! # Buffer Configuration
//!
//! Arena sizing is a construction-time concern. Nothing here can be changed
//! once a [`SwapController`](crate::SwapController) exists.

use std::time::Duration;

use serde::Deserialize;

use crate::error::{BufferError, BufferResult};

/// Default per-side arena capacity (1 MiB).
pub const DEFAULT_CAPACITY: usize = 1024 * 1024;

/// Default base alignment of each arena.
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Default number of entry slots reserved per side.
pub const DEFAULT_ENTRY_HINT: usize = 1024;

/// Sizing parameters for one double-buffered arena pair.
///
/// Loaded once at startup, usually as a section of the engine config:
///
/// ```toml
/// [messages]
/// capacity = 65536
/// alignment = 16
/// entry_hint = 512
/// stall_warning_ms = 250
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferConfig {
    /// Capacity of each side's arena in bytes.
    pub capacity: usize,
    /// Base alignment of each arena. Must be a power of two.
    pub alignment: usize,
    /// Entry list slots reserved per side up front.
    pub entry_hint: usize,
    /// If set, `swap` logs a warning every time this many milliseconds pass
    /// while producers of the outgoing side are still live. It keeps waiting.
    pub stall_warning_ms: Option<u64>,
}

impl BufferConfig {
    /// Creates a config with the given capacity and defaults for the rest.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Sets the base alignment.
    #[must_use]
    pub fn alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Sets the entry list reservation.
    #[must_use]
    pub fn entry_hint(mut self, entry_hint: usize) -> Self {
        self.entry_hint = entry_hint;
        self
    }

    /// Enables the stall warning.
    #[must_use]
    pub fn stall_warning(mut self, interval: Duration) -> Self {
        self.stall_warning_ms = Some(u64::try_from(interval.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Stall warning interval, if enabled.
    #[must_use]
    pub fn stall_warning_interval(&self) -> Option<Duration> {
        self.stall_warning_ms.map(Duration::from_millis)
    }

    /// Checks the parameters.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::InvalidConfig`] for a zero capacity or a zero
    /// stall interval, and [`BufferError::InvalidAlignment`] for a bad alignment.
    pub fn validate(&self) -> BufferResult<()> {
        if self.capacity == 0 {
            return Err(BufferError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if !self.alignment.is_power_of_two() {
            return Err(BufferError::InvalidAlignment(self.alignment));
        }
        if self.stall_warning_ms == Some(0) {
            return Err(BufferError::InvalidConfig(
                "stall_warning_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            alignment: DEFAULT_ALIGNMENT,
            entry_hint: DEFAULT_ENTRY_HINT,
            stall_warning_ms: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BufferConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let config = BufferConfig::with_capacity(0);
        assert!(matches!(config.validate(), Err(BufferError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_bad_alignment() {
        let config = BufferConfig::with_capacity(64).alignment(24);
        assert_eq!(config.validate(), Err(BufferError::InvalidAlignment(24)));

        let config = BufferConfig::with_capacity(64).alignment(0);
        assert_eq!(config.validate(), Err(BufferError::InvalidAlignment(0)));
    }

    #[test]
    fn test_stall_warning_roundtrip() {
        let config = BufferConfig::with_capacity(64).stall_warning(Duration::from_millis(250));
        assert_eq!(config.stall_warning_ms, Some(250));
        assert_eq!(config.stall_warning_interval(), Some(Duration::from_millis(250)));
    }
}
