//! Server configuration.

use std::time::Duration;

use relay_settings::RelaySettings;

/// Per-connection limits shared by every session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// Capacity of each connection's bounded outbound queue.
    pub outbound_queue_capacity: usize,
    /// Largest accepted inbound text frame, in bytes.
    pub max_message_size: usize,
    /// Deadline for a single transport write.
    pub write_timeout: Duration,
    /// Ping cadence and watchdog tick (P).
    pub heartbeat_interval: Duration,
    /// Idle time after which a connection is considered dead (T).
    pub heartbeat_timeout: Duration,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            max_message_size: 4096,
            write_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
        }
    }
}

/// Configuration for the relay server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Header carrying the gateway-authenticated sender id.
    pub identity_header: String,
    /// How long shutdown waits for sessions to drain.
    pub shutdown_timeout: Duration,
    /// Depth of the room registry's command queue.
    pub hub_command_buffer: usize,
    /// Per-connection limits.
    pub connection: ConnectionLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 1_000,
            identity_header: "x-relay-sender".into(),
            shutdown_timeout: Duration::from_secs(10),
            hub_command_buffer: 1024,
            connection: ConnectionLimits::default(),
        }
    }
}

impl From<&RelaySettings> for ServerConfig {
    fn from(settings: &RelaySettings) -> Self {
        let conn = &settings.connection;
        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_connections: settings.server.max_connections,
            identity_header: settings.server.identity_header.clone(),
            shutdown_timeout: Duration::from_secs(settings.server.shutdown_timeout_secs),
            hub_command_buffer: settings.hub.command_buffer,
            connection: ConnectionLimits {
                outbound_queue_capacity: conn.outbound_queue_capacity,
                max_message_size: conn.max_message_size,
                write_timeout: Duration::from_millis(conn.write_timeout_ms),
                heartbeat_interval: Duration::from_millis(conn.heartbeat_interval_ms),
                heartbeat_timeout: Duration::from_millis(conn.heartbeat_timeout_ms),
            },
        }
    }
}
