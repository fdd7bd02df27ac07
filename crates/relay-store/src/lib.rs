//! # relay-store
//!
//! Append-only `SQLite` storage for relayed chat messages.
//!
//! - **Pool**: `r2d2` + `r2d2_sqlite`, WAL mode on every connection
//! - **Migrations**: version-tracked SQL embedded at compile time
//! - **Repository**: append and page messages by room
//! - **Store**: [`SqliteMessageStore`], the async [`relay_core::MessageStore`]
//!   implementation the router persists through

#![deny(unsafe_code)]

pub mod errors;
pub mod sqlite;
pub mod store;

pub use errors::{MessageStoreError, Result};
pub use sqlite::connection::{ConnectionConfig, ConnectionPool};
pub use sqlite::message_repo::MessageRepo;
pub use store::SqliteMessageStore;
