//! Persistence boundary used by the message router.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ids::{MessageId, RoomId, SenderId};
use crate::message::StoredMessage;

/// Errors a message store may report.
///
/// The router never propagates these; they are logged and counted.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected the operation.
    #[error("database error: {0}")]
    Database(String),
    /// No connection could be obtained in time.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// The blocking worker running the query panicked or was cancelled.
    #[error("store task failed: {0}")]
    Task(String),
}

/// Append-only message storage keyed by room.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message and return the id the store assigned to it.
    async fn save(
        &self,
        room_id: &RoomId,
        sender_id: &SenderId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<MessageId, StoreError>;

    /// The most recent `limit` messages of a room, oldest first.
    ///
    /// `before_seq` restricts the page to messages older than that position.
    async fn history(
        &self,
        room_id: &RoomId,
        limit: u32,
        before_seq: Option<i64>,
    ) -> Result<Vec<StoredMessage>, StoreError>;
}
