//! Why settings could not be loaded.

use thiserror::Error;

/// A settings file that could not be read, or a value set the relay cannot run with.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid JSON for [`RelaySettings`](crate::RelaySettings).
    #[error("malformed settings file: {0}")]
    Json(#[from] serde_json::Error),
    /// A size, count or duration that must be positive is zero.
    #[error("{key} must be greater than zero")]
    Zero {
        /// camelCase path of the offending key.
        key: &'static str,
    },
    /// The keepalive timeout does not leave room for a single ping.
    #[error(
        "connection.heartbeatTimeoutMs ({timeout_ms}) must exceed connection.heartbeatIntervalMs ({interval_ms})"
    )]
    KeepaliveOrder {
        /// Configured ping interval.
        interval_ms: u64,
        /// Configured idle timeout.
        timeout_ms: u64,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
