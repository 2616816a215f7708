//! Configuration for the commander and its fan-out hub.
//!
//! All knobs have working defaults; construct with [`Default`], tweak
//! fields directly, or load overrides from the environment:
//!
//! ```rust
//! use commandeer::config::CommanderConfig;
//!
//! let config = CommanderConfig {
//!     sync_timeout: std::time::Duration::from_secs(10),
//!     ..CommanderConfig::default()
//! };
//! config.validate().expect("invalid config");
//! ```
//!
//! Broker client and index connection parameters are owned by the
//! respective adapters; this struct covers only the core's own knobs.

use std::time::Duration;

use crate::constants::{
    DEFAULT_COMMANDS_TOPIC, DEFAULT_DEMUX_BUFFER, DEFAULT_EVENTS_TOPIC, DEFAULT_STREAM_CAPACITY,
    DEFAULT_SYNC_TIMEOUT_MS, ENV_COMMANDS_TOPIC, ENV_EVENTS_TOPIC, ENV_SYNC_TIMEOUT_MS,
};
use crate::error::{Error, Result};

/// Core configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommanderConfig {
    /// Broker topic carrying command records.
    pub commands_topic: String,

    /// Broker topic carrying event records.
    pub events_topic: String,

    /// Deadline for a synchronous create's completion wait.
    ///
    /// A zero duration is legal: the wait still observes an event that
    /// is already buffered at registration time, otherwise it times out
    /// deterministically.
    pub sync_timeout: Duration,

    /// Sliding-buffer capacity for stream subscribers created without an
    /// explicit capacity.
    pub stream_capacity: usize,

    /// Capacity of the consumer-to-demux delivery channel.
    pub demux_buffer: usize,
}

impl Default for CommanderConfig {
    fn default() -> Self {
        Self {
            commands_topic: DEFAULT_COMMANDS_TOPIC.to_string(),
            events_topic: DEFAULT_EVENTS_TOPIC.to_string(),
            sync_timeout: Duration::from_millis(DEFAULT_SYNC_TIMEOUT_MS),
            stream_capacity: DEFAULT_STREAM_CAPACITY,
            demux_buffer: DEFAULT_DEMUX_BUFFER,
        }
    }
}

impl CommanderConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    ///
    /// - `COMMANDEER_COMMANDS_TOPIC`
    /// - `COMMANDEER_EVENTS_TOPIC`
    /// - `COMMANDEER_SYNC_TIMEOUT_MS`
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(topic) = std::env::var(ENV_COMMANDS_TOPIC) {
            config.commands_topic = topic;
        }
        if let Ok(topic) = std::env::var(ENV_EVENTS_TOPIC) {
            config.events_topic = topic;
        }
        if let Some(ms) = std::env::var(ENV_SYNC_TIMEOUT_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.sync_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Check internal consistency.
    ///
    /// The demux task classifies records by topic name, so the two
    /// topics must be non-empty and distinct; channel capacities must be
    /// non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.commands_topic.is_empty() {
            return Err(Error::Config("commands topic must not be empty".to_string()));
        }
        if self.events_topic.is_empty() {
            return Err(Error::Config("events topic must not be empty".to_string()));
        }
        if self.commands_topic == self.events_topic {
            return Err(Error::Config(format!(
                "commands and events topics must differ, both are '{}'",
                self.commands_topic
            )));
        }
        if self.stream_capacity == 0 {
            return Err(Error::Config("stream capacity must be at least 1".to_string()));
        }
        if self.demux_buffer == 0 {
            return Err(Error::Config("demux buffer must be at least 1".to_string()));
        }
        Ok(())
    }
}
