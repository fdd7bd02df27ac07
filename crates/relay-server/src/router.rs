//! Message router: validate, persist, broadcast.

use std::sync::Arc;

use chrono::Utc;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, warn};

use relay_core::{ChatMessage, ConnectionId, MessageId, MessageStore, RoomId, SenderId};

use crate::hub::{DeliveryReport, Hub, HubError};
use crate::metrics::{MESSAGES_ROUTED_TOTAL, PERSIST_FAILURES_TOTAL};

/// Why a message was not routed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    /// Nothing but whitespace.
    #[error("message is empty")]
    Empty,
    /// Content above the configured limit.
    #[error("message is {size} bytes, limit is {max}")]
    TooLarge {
        /// Content size in bytes.
        size: usize,
        /// Configured limit.
        max: usize,
    },
    /// The room registry is gone.
    #[error(transparent)]
    Hub(#[from] HubError),
}

/// Turns accepted text into a [`ChatMessage`] and fans it out.
pub struct MessageRouter {
    hub: Hub,
    store: Arc<dyn MessageStore>,
    max_message_size: usize,
}

impl MessageRouter {
    /// Create a router over a registry handle and a store.
    pub fn new(hub: Hub, store: Arc<dyn MessageStore>, max_message_size: usize) -> Self {
        Self {
            hub,
            store,
            max_message_size,
        }
    }

    /// Route one message from `sender_id` in `room_id`.
    ///
    /// A failed save is logged and counted but never returned: the message
    /// is broadcast under a locally minted id.
    pub async fn route(
        &self,
        connection_id: &ConnectionId,
        room_id: &RoomId,
        sender_id: &SenderId,
        text: &str,
    ) -> Result<DeliveryReport, RouteError> {
        if text.trim().is_empty() {
            return Err(RouteError::Empty);
        }
        if text.len() > self.max_message_size {
            return Err(RouteError::TooLarge {
                size: text.len(),
                max: self.max_message_size,
            });
        }

        let sent_at = Utc::now();
        let id = match self.store.save(room_id, sender_id, text, sent_at).await {
            Ok(id) => id,
            Err(e) => {
                counter!(PERSIST_FAILURES_TOTAL).increment(1);
                warn!(
                    conn_id = %connection_id,
                    room_id = %room_id,
                    sender_id = %sender_id,
                    error = %e,
                    "failed to persist message, broadcasting anyway"
                );
                MessageId::new()
            }
        };

        let message = ChatMessage {
            id,
            room_id: room_id.clone(),
            sender_id: sender_id.clone(),
            content: text.to_owned(),
            sent_at,
        };
        let report = self.hub.broadcast(room_id, message).await?;
        counter!(MESSAGES_ROUTED_TOTAL).increment(1);
        debug!(
            conn_id = %connection_id,
            room_id = %room_id,
            recipients = report.recipients,
            delivered = report.delivered,
            "message routed"
        );
        Ok(report)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use parking_lot::Mutex;

    use relay_core::{MessageId, MessageStore, RoomId, SenderId, StoreError, StoredMessage};

    /// Store that either records saves or fails every one of them.
    #[derive(Default)]
    pub(crate) struct RecordingStore {
        pub(crate) fail: bool,
        pub(crate) saved: Mutex<Vec<(RoomId, SenderId, String)>>,
    }

    impl RecordingStore {
        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl MessageStore for RecordingStore {
        async fn save(
            &self,
            room_id: &RoomId,
            sender_id: &SenderId,
            content: &str,
            _at: DateTime<Utc>,
        ) -> Result<MessageId, StoreError> {
            if self.fail {
                return Err(StoreError::Unavailable("database is locked".into()));
            }
            self.saved
                .lock()
                .push((room_id.clone(), sender_id.clone(), content.to_owned()));
            Ok(MessageId::from(format!("msg_saved_{}", self.saved.lock().len())))
        }

        async fn history(
            &self,
            _room_id: &RoomId,
            _limit: u32,
            _before_seq: Option<i64>,
        ) -> Result<Vec<StoredMessage>, StoreError> {
            if self.fail {
                return Err(StoreError::Unavailable("database is locked".into()));
            }
            Ok(Vec::new())
        }
    }
}
