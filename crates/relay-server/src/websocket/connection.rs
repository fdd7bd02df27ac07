//! Per-connection state shared by the session tasks and the room registry.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

use relay_core::{ConnectionId, RoomId, SenderId};

/// Lifecycle of a connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Handshake accepted, not yet joined to its room.
    Connecting,
    /// Joined and relaying.
    Active,
    /// A close was requested; loops are winding down.
    Closing,
    /// Loops exited and membership removed.
    Closed,
}

/// Why a connection was closed. Recorded once, by whoever closed it first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CloseReason {
    /// Close frame or end of stream from the client.
    ClientClosed,
    /// The transport failed while reading.
    ReadError,
    /// The transport failed while writing.
    WriteError,
    /// A write did not finish within the write deadline.
    WriteTimeout,
    /// An inbound frame exceeded the size limit.
    Oversized,
    /// No inbound activity within the keepalive timeout.
    KeepaliveTimeout,
    /// The outbound queue was full during a broadcast.
    SlowConsumer,
    /// The room registry is gone.
    HubUnavailable,
    /// Server shutdown.
    Shutdown,
}

impl CloseReason {
    /// Stable snake-case label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientClosed => "client_closed",
            Self::ReadError => "read_error",
            Self::WriteError => "write_error",
            Self::WriteTimeout => "write_timeout",
            Self::Oversized => "oversized",
            Self::KeepaliveTimeout => "keepalive_timeout",
            Self::SlowConsumer => "slow_consumer",
            Self::HubUnavailable => "hub_unavailable",
            Self::Shutdown => "shutdown",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The payload is in the outbound queue.
    Queued,
    /// The queue is at capacity.
    Full,
    /// The writer has gone away.
    Closed,
}

struct Lifecycle {
    state: ConnectionState,
    reason: Option<CloseReason>,
}

/// A client connection bound to one room and one sender.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: ConnectionId,
    /// Room this connection was admitted to.
    pub room_id: RoomId,
    /// Authenticated sender identity.
    pub sender_id: SenderId,
    /// Producer side of the bounded outbound queue.
    tx: mpsc::Sender<Arc<str>>,
    lifecycle: Mutex<Lifecycle>,
    cancel: CancellationToken,
    /// When this connection was established.
    pub connected_at: Instant,
    last_activity: Mutex<tokio::time::Instant>,
}

impl ClientConnection {
    /// Create a connection in the `Connecting` state.
    ///
    /// `cancel` is the token every session task watches; pass a child of the
    /// server's shutdown token so shutdown reaches the connection.
    pub fn new(
        id: ConnectionId,
        room_id: RoomId,
        sender_id: SenderId,
        tx: mpsc::Sender<Arc<str>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            room_id,
            sender_id,
            tx,
            lifecycle: Mutex::new(Lifecycle {
                state: ConnectionState::Connecting,
                reason: None,
            }),
            cancel,
            connected_at: Instant::now(),
            last_activity: Mutex::new(tokio::time::Instant::now()),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.lifecycle.lock().state
    }

    /// Reason recorded by the first `close` call.
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lifecycle.lock().reason
    }

    /// `Connecting → Active`. Returns `false` if a close already happened.
    pub fn activate(&self) -> bool {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.state == ConnectionState::Connecting {
            lifecycle.state = ConnectionState::Active;
            true
        } else {
            false
        }
    }

    /// Request a close. First caller wins: only it records `reason` and gets
    /// `true` back. Every session task is cancelled.
    pub fn close(&self, reason: CloseReason) -> bool {
        let first = {
            let mut lifecycle = self.lifecycle.lock();
            match lifecycle.state {
                ConnectionState::Connecting | ConnectionState::Active => {
                    lifecycle.state = ConnectionState::Closing;
                    lifecycle.reason = Some(reason);
                    true
                }
                ConnectionState::Closing | ConnectionState::Closed => false,
            }
        };
        self.cancel.cancel();
        first
    }

    /// `Closing → Closed`, once membership is gone and the loops have exited.
    pub fn mark_closed(&self) {
        self.lifecycle.lock().state = ConnectionState::Closed;
    }

    /// Enqueue a payload without waiting.
    pub fn try_deliver(&self, payload: Arc<str>) -> Delivery {
        match self.tx.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Record inbound activity (any frame, including pongs).
    pub fn mark_activity(&self) {
        *self.last_activity.lock() = tokio::time::Instant::now();
    }

    /// Time since the last inbound activity (or since creation).
    pub fn idle_for(&self) -> Duration {
        self.last_activity.lock().elapsed()
    }

    /// Resolves once the connection is closing or the server shuts down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    /// Whether the session tasks have been told to stop.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .field("sender_id", &self.sender_id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::connection;
    use super::*;

    #[test]
    fn starts_connecting() {
        let (conn, _rx) = connection("order-42", "a", 4);
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.close_reason().is_none());
        assert!(conn.id.as_str().starts_with("conn_"));
    }

    #[test]
    fn activate_then_close() {
        let (conn, _rx) = connection("order-42", "a", 4);
        assert!(conn.activate());
        assert_eq!(conn.state(), ConnectionState::Active);
        assert!(conn.close(CloseReason::ClientClosed));
        assert_eq!(conn.state(), ConnectionState::Closing);
        assert!(conn.is_cancelled());
        conn.mark_closed();
        assert_eq!(conn.state(), ConnectionState::Closed);
    }

    #[test]
    fn first_close_reason_wins() {
        let (conn, _rx) = connection("order-42", "a", 4);
        let _ = conn.activate();
        assert!(conn.close(CloseReason::SlowConsumer));
        assert!(!conn.close(CloseReason::ReadError));
        assert!(!conn.close(CloseReason::Shutdown));
        assert_eq!(conn.close_reason(), Some(CloseReason::SlowConsumer));
    }

    #[test]
    fn activate_after_close_is_refused() {
        let (conn, _rx) = connection("order-42", "a", 4);
        let _ = conn.close(CloseReason::HubUnavailable);
        assert!(!conn.activate());
        assert_eq!(conn.state(), ConnectionState::Closing);
    }

    #[tokio::test]
    async fn delivery_outcomes() {
        let (conn, mut rx) = connection("r", "a", 1);
        assert_eq!(conn.try_deliver(Arc::from("one")), Delivery::Queued);
        assert_eq!(conn.try_deliver(Arc::from("two")), Delivery::Full);
        assert_eq!(&*rx.recv().await.unwrap(), "one");
        rx.close();
        assert_eq!(conn.try_deliver(Arc::from("three")), Delivery::Closed);
    }

    #[test]
    fn double_queue_close_is_harmless() {
        let (conn, mut rx) = connection("r", "a", 1);
        rx.close();
        rx.close();
        assert_eq!(conn.try_deliver(Arc::from("x")), Delivery::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_idle_clock() {
        let (conn, _rx) = connection("r", "a", 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(conn.idle_for() >= Duration::from_secs(5));
        conn.mark_activity();
        assert!(conn.idle_for() < Duration::from_secs(1));
    }

    #[test]
    fn close_reason_labels() {
        assert_eq!(CloseReason::SlowConsumer.as_str(), "slow_consumer");
        assert_eq!(CloseReason::KeepaliveTimeout.to_string(), "keepalive_timeout");
    }
}
