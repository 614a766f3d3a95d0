//! Server configuration.
//!
//! Values are resolved in order: built-in defaults, then an optional TOML
//! file, then explicit overrides from the environment or command line
//! (applied by the binary).
//!
//! ```toml
//! listen_addr = "0.0.0.0:8081"
//! max_frame_size = 1048576
//! max_sessions = 1024
//! outbound_queue_capacity = 256
//! slow_consumer_policy = "disconnect"
//! write_timeout_ms = 10000
//! clear_ranking_on_startup = true
//! ranking_url = "redis://127.0.0.1:6379/"
//! ranking_key = "chatroom:activity"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use chat_protocol::DEFAULT_MAX_FRAME_SIZE;

use crate::ranking::DEFAULT_RANKING_KEY;

/// Default listen address
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8081";

/// Environment variable overriding the listen address
pub const LISTEN_ADDR_ENV: &str = "CHATD_ADDR";

/// What the dispatcher does when a recipient's outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlowConsumerPolicy {
    /// Evict the recipient: cancel its session and unregister it.
    #[default]
    Disconnect,

    /// Discard the message for that recipient only.
    Drop,
}

/// Runtime configuration for the chat server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the acceptor binds to.
    pub listen_addr: String,

    /// Largest frame payload accepted or produced, in bytes.
    pub max_frame_size: usize,

    /// Most sessions the registry holds at once.
    pub max_sessions: usize,

    /// Capacity of each session's outbound queue, in frames.
    pub outbound_queue_capacity: usize,

    /// Policy for recipients whose queue is full.
    pub slow_consumer_policy: SlowConsumerPolicy,

    /// Deadline for writing one frame to a client, in milliseconds.
    pub write_timeout_ms: u64,

    /// Wipe all activity scores when the server starts.
    pub clear_ranking_on_startup: bool,

    /// Redis URL for the ranking store; scores stay in memory when unset.
    pub ranking_url: Option<String>,

    /// Sorted set key holding the scores in Redis.
    pub ranking_key: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_sessions: 1024,
            outbound_queue_capacity: 256,
            slow_consumer_policy: SlowConsumerPolicy::Disconnect,
            write_timeout_ms: 10_000,
            clear_ranking_on_startup: true,
            ranking_url: None,
            ranking_key: DEFAULT_RANKING_KEY.to_string(),
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Rejects values that would make the server unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_size == 0 || self.max_frame_size > u32::MAX as usize {
            return Err(ConfigError::Invalid {
                field: "max_frame_size",
                reason: format!("must be between 1 and {}", u32::MAX),
            });
        }
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "outbound_queue_capacity",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "max_sessions",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.ranking_key.is_empty() {
            return Err(ConfigError::Invalid {
                field: "ranking_key",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Per-frame write deadline.
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {error}", .path.display())]
    Read { path: PathBuf, error: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
