//! # relay-server
//!
//! Real-time half of the order chat relay.
//!
//! - **Room registry**: [`hub::Hub`], one task owning all membership
//! - **Sessions**: per-connection reader, writer and keepalive watchdog
//! - **Router**: validate → persist → broadcast
//! - **Transport**: frame source/sink traits and the axum adapter
//! - **HTTP**: WebSocket upgrade, `/health`, `/metrics`, message history

#![deny(unsafe_code)]

pub mod auth;
pub mod config;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod router;
pub mod server;
pub mod shutdown;
pub mod transport;
pub mod websocket;

pub use config::{ConnectionLimits, ServerConfig};
pub use hub::{DeliveryReport, Hub, HubError, HubStats};
pub use router::{MessageRouter, RouteError};
pub use server::RelayServer;
pub use websocket::connection::{ClientConnection, CloseReason, ConnectionState};
