//! Async facade over the `SQLite` repository.
//!
//! `rusqlite` is blocking, so every call hops onto tokio's blocking pool.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use relay_core::{MessageId, MessageStore, RoomId, SenderId, StoreError, StoredMessage};

use crate::errors::{MessageStoreError, Result};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool};
use crate::sqlite::message_repo::MessageRepo;
use crate::sqlite::migrations::run_migrations;

/// Message store backed by an r2d2 `SQLite` pool.
#[derive(Clone)]
pub struct SqliteMessageStore {
    pool: ConnectionPool,
}

impl SqliteMessageStore {
    /// Wrap an existing pool and bring its schema up to date.
    pub fn new(pool: ConnectionPool) -> Result<Self> {
        let conn = pool.get()?;
        let applied = run_migrations(&conn)?;
        debug!(applied, "message store ready");
        Ok(Self { pool })
    }

    /// Open (or create) a database file.
    pub fn open(path: &str, config: &ConnectionConfig) -> Result<Self> {
        Self::new(connection::new_file(path, config)?)
    }

    /// A throwaway in-memory store.
    pub fn in_memory() -> Result<Self> {
        Self::new(connection::new_in_memory()?)
    }

    /// Number of stored messages for a room.
    pub async fn count(&self, room_id: &RoomId) -> Result<u64> {
        let pool = self.pool.clone();
        let room_id = room_id.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            MessageRepo::count_by_room(&conn, &room_id)
        })
        .await?
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn save(
        &self,
        room_id: &RoomId,
        sender_id: &SenderId,
        content: &str,
        at: DateTime<Utc>,
    ) -> std::result::Result<MessageId, StoreError> {
        let pool = self.pool.clone();
        let room_id = room_id.clone();
        let sender_id = sender_id.clone();
        let content = content.to_owned();
        let saved = tokio::task::spawn_blocking(move || -> Result<MessageId> {
            let conn = pool.get()?;
            MessageRepo::insert(&conn, &room_id, &sender_id, &content, at)
        })
        .await;
        match saved {
            Ok(result) => result.map_err(StoreError::from),
            Err(join) => Err(MessageStoreError::from(join).into()),
        }
    }

    async fn history(
        &self,
        room_id: &RoomId,
        limit: u32,
        before_seq: Option<i64>,
    ) -> std::result::Result<Vec<StoredMessage>, StoreError> {
        let pool = self.pool.clone();
        let room_id = room_id.clone();
        let page = tokio::task::spawn_blocking(move || -> Result<Vec<StoredMessage>> {
            let conn = pool.get()?;
            MessageRepo::list_by_room(&conn, &room_id, limit, before_seq)
        })
        .await;
        match page {
            Ok(result) => result.map_err(StoreError::from),
            Err(join) => Err(MessageStoreError::from(join).into()),
        }
    }
}
