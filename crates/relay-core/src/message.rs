//! Chat message types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, RoomId, SenderId};

/// A message accepted by the relay.
///
/// Room, sender and timestamp are always stamped by the server; nothing in
/// here comes from fields the client declared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id (from the store, or minted locally if the save failed).
    pub id: MessageId,
    /// Room the message was sent to.
    pub room_id: RoomId,
    /// Identity of the connection that sent it.
    pub sender_id: SenderId,
    /// Text content.
    pub content: String,
    /// When the relay accepted the message.
    pub sent_at: DateTime<Utc>,
}

/// A message read back from storage, with its position in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMessage {
    /// Insertion order across the whole log; use it to page backwards.
    pub seq: i64,
    /// The message itself.
    #[serde(flatten)]
    pub message: ChatMessage,
}

/// The shape of a client text frame.
///
/// Only `content` is read. Unknown fields (a client-declared `senderId` or
/// `roomId`, for example) are accepted and discarded.
#[derive(Clone, Debug, Deserialize)]
pub struct InboundFrame {
    /// Text the client wants to send.
    pub content: String,
}

impl InboundFrame {
    /// Parse a raw text frame.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_message_wire_shape() {
        let msg = ChatMessage {
            id: MessageId::from("msg_1"),
            room_id: RoomId::from("order-42"),
            sender_id: SenderId::from("a"),
            content: "hi".into(),
            sent_at: "2026-01-01T00:00:00Z".parse().unwrap(),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["id"], "msg_1");
        assert_eq!(value["roomId"], "order-42");
        assert_eq!(value["senderId"], "a");
        assert_eq!(value["content"], "hi");
        assert!(value["sentAt"].as_str().unwrap().starts_with("2026-01-01T00:00:00"));
    }

    #[test]
    fn inbound_frame_ignores_declared_identity() {
        let frame =
            InboundFrame::parse(r#"{"content":"hi","senderId":"mallory","roomId":"x"}"#).unwrap();
        assert_eq!(frame.content, "hi");
    }

    #[test]
    fn inbound_frame_requires_content() {
        assert!(InboundFrame::parse(r#"{"text":"hi"}"#).is_err());
        assert!(InboundFrame::parse("hi").is_err());
        assert!(InboundFrame::parse(r#"{"content":42}"#).is_err());
    }
}
