//! Room registry.
//!
//! One task owns every room's membership. `join`, `leave`, `broadcast` and
//! the snapshot queries are commands on a bounded channel, answered over
//! `oneshot`s, so the membership map never needs a lock and broadcasts to a
//! room are delivered in the order the registry processed them.
//!
//! Fan-out never waits on a member: each delivery is a `try_send` into the
//! member's bounded outbound queue, and a member whose queue is full is
//! evicted and closed as a slow consumer.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use relay_core::{ChatMessage, ConnectionId, RoomId};

use crate::metrics::{BROADCAST_DROPS_TOTAL, ROOMS_ACTIVE};
use crate::websocket::connection::{ClientConnection, CloseReason, Delivery};

/// The registry task has stopped.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HubError {
    /// Commands can no longer be delivered or answered.
    #[error("room registry is not running")]
    Unavailable,
}

/// Outcome of one broadcast.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Members present when the broadcast was processed.
    pub recipients: usize,
    /// Members whose queue accepted the message.
    pub delivered: usize,
    /// Members evicted because their queue was full or closed.
    pub evicted: Vec<ConnectionId>,
}

/// Point-in-time registry snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Rooms with at least one member.
    pub rooms: usize,
    /// Joined connections across all rooms.
    pub connections: usize,
}

enum HubCommand {
    Join {
        connection: Arc<ClientConnection>,
        reply: oneshot::Sender<()>,
    },
    Leave {
        connection_id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
    Broadcast {
        room_id: RoomId,
        message: ChatMessage,
        reply: oneshot::Sender<DeliveryReport>,
    },
    RoomSize {
        room_id: RoomId,
        reply: oneshot::Sender<usize>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Handle to the registry task. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Hub {
    tx: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Start the registry task with a command queue of `command_buffer`.
    ///
    /// The task runs until every `Hub` handle has been dropped.
    pub fn spawn(command_buffer: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(command_buffer.max(1));
        let handle = tokio::spawn(Registry::default().run(rx));
        (Self { tx }, handle)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> HubCommand,
    ) -> Result<T, HubError> {
        let (reply, response) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| HubError::Unavailable)?;
        response.await.map_err(|_| HubError::Unavailable)
    }

    /// Admit a connection to its room, creating the room if needed.
    ///
    /// Joining the room it is already in is a no-op; a connection registered
    /// in another room is moved.
    pub async fn join(&self, connection: Arc<ClientConnection>) -> Result<(), HubError> {
        self.request(|reply| HubCommand::Join { connection, reply })
            .await
    }

    /// Remove a connection. Returns whether it was a member.
    pub async fn leave(&self, connection_id: &ConnectionId) -> Result<bool, HubError> {
        let connection_id = connection_id.clone();
        self.request(|reply| HubCommand::Leave {
            connection_id,
            reply,
        })
        .await
    }

    /// Deliver `message` to every current member of `room_id`.
    pub async fn broadcast(
        &self,
        room_id: &RoomId,
        message: ChatMessage,
    ) -> Result<DeliveryReport, HubError> {
        let room_id = room_id.clone();
        self.request(|reply| HubCommand::Broadcast {
            room_id,
            message,
            reply,
        })
        .await
    }

    /// Number of members in a room (0 if it does not exist).
    pub async fn room_size(&self, room_id: &RoomId) -> Result<usize, HubError> {
        let room_id = room_id.clone();
        self.request(|reply| HubCommand::RoomSize { room_id, reply })
            .await
    }

    /// Registry-wide counts.
    pub async fn stats(&self) -> Result<HubStats, HubError> {
        self.request(|reply| HubCommand::Stats { reply }).await
    }
}

impl std::fmt::Debug for HubCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Join { .. } => "Join",
            Self::Leave { .. } => "Leave",
            Self::Broadcast { .. } => "Broadcast",
            Self::RoomSize { .. } => "RoomSize",
            Self::Stats { .. } => "Stats",
        };
        f.write_str(name)
    }
}

type Members = HashMap<ConnectionId, Arc<ClientConnection>>;

/// State owned by the registry task.
#[derive(Default)]
struct Registry {
    rooms: HashMap<RoomId, Members>,
    room_of: HashMap<ConnectionId, RoomId>,
}

impl Registry {
    async fn run(mut self, mut rx: mpsc::Receiver<HubCommand>) {
        debug!("room registry started");
        while let Some(command) = rx.recv().await {
            // A dropped reply receiver only means the caller gave up waiting.
            match command {
                HubCommand::Join { connection, reply } => {
                    self.join(connection);
                    let _ = reply.send(());
                }
                HubCommand::Leave {
                    connection_id,
                    reply,
                } => {
                    let _ = reply.send(self.leave(&connection_id));
                }
                HubCommand::Broadcast {
                    room_id,
                    message,
                    reply,
                } => {
                    let _ = reply.send(self.broadcast(&room_id, &message));
                }
                HubCommand::RoomSize { room_id, reply } => {
                    let _ = reply.send(self.rooms.get(&room_id).map_or(0, HashMap::len));
                }
                HubCommand::Stats { reply } => {
                    let _ = reply.send(HubStats {
                        rooms: self.rooms.len(),
                        connections: self.room_of.len(),
                    });
                }
            }
        }
        debug!(rooms = self.rooms.len(), "room registry stopped");
    }

    fn join(&mut self, connection: Arc<ClientConnection>) {
        let id = connection.id.clone();
        let room_id = connection.room_id.clone();
        match self.room_of.get(&id) {
            Some(current) if *current == room_id => {
                debug!(conn_id = %id, room_id = %room_id, "already a member");
                return;
            }
            Some(_) => {
                let _ = self.leave(&id);
                info!(conn_id = %id, room_id = %room_id, "connection moved to another room");
            }
            None => {}
        }

        let members = self.rooms.entry(room_id.clone()).or_default();
        let _ = members.insert(id.clone(), connection);
        let size = members.len();
        let _ = self.room_of.insert(id.clone(), room_id.clone());
        self.publish_room_count();
        debug!(conn_id = %id, room_id = %room_id, members = size, "joined room");
    }

    fn leave(&mut self, connection_id: &ConnectionId) -> bool {
        let Some(room_id) = self.room_of.remove(connection_id) else {
            return false;
        };
        if let Some(members) = self.rooms.get_mut(&room_id) {
            let _ = members.remove(connection_id);
            if members.is_empty() {
                let _ = self.rooms.remove(&room_id);
                debug!(room_id = %room_id, "room emptied");
            }
        }
        self.publish_room_count();
        debug!(conn_id = %connection_id, room_id = %room_id, "left room");
        true
    }

    fn broadcast(&mut self, room_id: &RoomId, message: &ChatMessage) -> DeliveryReport {
        let Some(members) = self.rooms.get(room_id) else {
            return DeliveryReport::default();
        };

        // Serialized once; every queue shares the same allocation.
        let payload: Arc<str> = match serde_json::to_string(message) {
            Ok(json) => json.into(),
            Err(e) => {
                warn!(room_id = %room_id, error = %e, "failed to serialize message");
                return DeliveryReport::default();
            }
        };

        let mut report = DeliveryReport {
            recipients: members.len(),
            ..DeliveryReport::default()
        };
        let mut stale = Vec::new();
        for (id, connection) in members {
            match connection.try_deliver(Arc::clone(&payload)) {
                Delivery::Queued => report.delivered += 1,
                Delivery::Full => stale.push((id.clone(), true)),
                Delivery::Closed => stale.push((id.clone(), false)),
            }
        }

        for (id, full) in stale {
            if let Some(connection) = self.rooms.get(room_id).and_then(|m| m.get(&id)).cloned() {
                if full {
                    warn!(
                        conn_id = %id,
                        room_id = %room_id,
                        sender_id = %connection.sender_id,
                        "outbound queue full, evicting slow consumer"
                    );
                    let _ = connection.close(CloseReason::SlowConsumer);
                }
            }
            let _ = self.leave(&id);
            counter!(BROADCAST_DROPS_TOTAL).increment(1);
            report.evicted.push(id);
        }
        report
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_room_count(&self) {
        gauge!(ROOMS_ACTIVE).set(self.rooms.len() as f64);
    }
}
