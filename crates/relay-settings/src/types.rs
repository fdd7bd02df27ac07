//! Settings structures.
//!
//! Every struct uses `#[serde(default)]` so a settings file only needs the
//! keys it wants to change.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelaySettings {
    /// HTTP / WebSocket listener.
    pub server: ServerSettings,
    /// Room registry.
    pub hub: HubSettings,
    /// Per-connection limits and keepalive.
    pub connection: ConnectionSettings,
    /// Message storage.
    pub storage: StorageSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl RelaySettings {
    /// Reject combinations the relay cannot run with.
    pub fn validate(&self) -> Result<()> {
        let conn = &self.connection;
        let positive = [
            ("server.maxConnections", self.server.max_connections as u64),
            ("hub.commandBuffer", self.hub.command_buffer as u64),
            ("connection.outboundQueueCapacity", conn.outbound_queue_capacity as u64),
            ("connection.maxMessageSize", conn.max_message_size as u64),
            ("connection.writeTimeoutMs", conn.write_timeout_ms),
            ("connection.heartbeatIntervalMs", conn.heartbeat_interval_ms),
            ("storage.poolSize", u64::from(self.storage.pool_size)),
        ];
        if let Some((key, _)) = positive.into_iter().find(|&(_, value)| value == 0) {
            return Err(SettingsError::Zero { key });
        }
        if conn.heartbeat_timeout_ms <= conn.heartbeat_interval_ms {
            return Err(SettingsError::KeepaliveOrder {
                interval_ms: conn.heartbeat_interval_ms,
                timeout_ms: conn.heartbeat_timeout_ms,
            });
        }
        Ok(())
    }
}

/// Listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Bind port (`0` picks a free port).
    pub port: u16,
    /// Upgrades beyond this many live connections are refused.
    pub max_connections: usize,
    /// Header the upstream gateway uses to pass the authenticated sender id.
    pub identity_header: String,
    /// Seconds to wait for connections to drain on shutdown.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            max_connections: 10_000,
            identity_header: "x-relay-sender".to_string(),
            shutdown_timeout_secs: 10,
        }
    }
}

/// Room registry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HubSettings {
    /// Capacity of the registry's command queue.
    pub command_buffer: usize,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            command_buffer: 1024,
        }
    }
}

/// Per-connection settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Bounded outbound queue length; a full queue gets the connection evicted.
    pub outbound_queue_capacity: usize,
    /// Largest accepted inbound frame, in bytes.
    pub max_message_size: usize,
    /// Deadline for a single transport write, in milliseconds.
    pub write_timeout_ms: u64,
    /// Ping interval, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Close after this long without inbound activity, in milliseconds.
    pub heartbeat_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            max_message_size: 4096,
            write_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 60_000,
        }
    }
}

/// Storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// `SQLite` database path (relative paths resolve against the relay home).
    pub db_path: String,
    /// Connection pool size.
    pub pool_size: u32,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "relay.db".to_string(),
            pool_size: 8,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        let settings = RelaySettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.server.port, 8090);
        assert_eq!(settings.server.identity_header, "x-relay-sender");
        assert_eq!(settings.connection.outbound_queue_capacity, 256);
        assert_eq!(settings.connection.heartbeat_interval_ms, 30_000);
        assert_eq!(settings.connection.heartbeat_timeout_ms, 60_000);
    }

    #[test]
    fn timeout_must_exceed_interval() {
        let mut settings = RelaySettings::default();
        settings.connection.heartbeat_timeout_ms = settings.connection.heartbeat_interval_ms;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::KeepaliveOrder { interval_ms: 30_000, timeout_ms: 30_000 })
        );
    }

    #[test]
    fn zero_queue_capacity_rejected() {
        let mut settings = RelaySettings::default();
        settings.connection.outbound_queue_capacity = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Zero { key: "connection.outboundQueueCapacity" })
        );
    }

    #[test]
    fn zero_message_size_rejected() {
        let mut settings = RelaySettings::default();
        settings.connection.max_message_size = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Zero { key: "connection.maxMessageSize" })
        );
    }

    #[test]
    fn zero_heartbeat_interval_rejected() {
        let mut settings = RelaySettings::default();
        settings.connection.heartbeat_interval_ms = 0;
        settings.connection.heartbeat_timeout_ms = 1;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Zero { key: "connection.heartbeatIntervalMs" })
        );
    }

    #[test]
    fn zero_write_timeout_rejected() {
        let mut settings = RelaySettings::default();
        settings.connection.write_timeout_ms = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Zero { key: "connection.writeTimeoutMs" })
        );
    }

    #[test]
    fn zero_pool_size_rejected() {
        let mut settings = RelaySettings::default();
        settings.storage.pool_size = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Zero { key: "storage.poolSize" })
        );
    }

    #[test]
    fn zero_max_connections_rejected() {
        let mut settings = RelaySettings::default();
        settings.server.max_connections = 0;
        assert_matches!(
            settings.validate(),
            Err(SettingsError::Zero { key: "server.maxConnections" })
        );
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(RelaySettings::default()).unwrap();
        assert!(value["connection"]["outboundQueueCapacity"].is_number());
        assert!(value["server"]["identityHeader"].is_string());
        assert!(value["storage"]["dbPath"].is_string());
    }
}
