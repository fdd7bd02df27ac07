//! Per-connection machinery: shared state, keepalive and the session runner.

pub mod connection;
pub mod heartbeat;
pub mod session;
