//! Error types for the message store.

use relay_core::StoreError;
use thiserror::Error;

/// Errors raised by the `SQLite` layer.
#[derive(Debug, Error)]
pub enum MessageStoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Which migration failed and why.
        message: String,
    },

    /// A stored timestamp could not be parsed back.
    #[error("corrupt row {id}: {message}")]
    CorruptRow {
        /// Message id of the offending row.
        id: String,
        /// What was wrong with it.
        message: String,
    },

    /// The blocking worker did not complete.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, MessageStoreError>;

impl From<MessageStoreError> for StoreError {
    fn from(err: MessageStoreError) -> Self {
        match err {
            MessageStoreError::Pool(e) => Self::Unavailable(e.to_string()),
            MessageStoreError::Join(e) => Self::Task(e.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn sqlite_error_display() {
        let err = MessageStoreError::Sqlite(rusqlite::Error::QueryReturnedNoRows);
        assert!(err.to_string().contains("sqlite error"));
    }

    #[test]
    fn maps_to_boundary_error() {
        let err: StoreError = MessageStoreError::Migration {
            message: "v1 failed".into(),
        }
        .into();
        assert_matches!(err, StoreError::Database(m) if m.contains("v1 failed"));
    }
}
