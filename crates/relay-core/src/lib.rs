//! # relay-core
//!
//! Shared vocabulary for the order chat relay.
//!
//! - **Branded IDs**: `ConnectionId`, `RoomId`, `SenderId`, `MessageId` as newtypes
//! - **Messages**: [`ChatMessage`] (server-stamped, immutable) and [`InboundFrame`]
//!   (what a client is allowed to say)
//! - **Storage boundary**: the [`MessageStore`] trait the router persists through
//! - **Logging**: subscriber setup and an in-memory capture helper for tests

#![deny(unsafe_code)]

pub mod ids;
pub mod logging;
pub mod message;
pub mod store;

pub use ids::{ConnectionId, MessageId, RoomId, SenderId};
pub use message::{ChatMessage, InboundFrame, StoredMessage};
pub use store::{MessageStore, StoreError};
