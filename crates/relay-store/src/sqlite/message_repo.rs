//! Message repository: append and page through the `messages` table.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use relay_core::{ChatMessage, MessageId, RoomId, SenderId, StoredMessage};

use crate::errors::{MessageStoreError, Result};

/// Message repository. Stateless; every method takes `&Connection`.
pub struct MessageRepo;

impl MessageRepo {
    /// Append one message under a fresh id and return the id.
    pub fn insert(
        conn: &Connection,
        room_id: &RoomId,
        sender_id: &SenderId,
        content: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<MessageId> {
        let id = MessageId::new();
        let _ = conn.execute(
            "INSERT INTO messages (id, room_id, sender_id, content, sent_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.as_str(),
                room_id.as_str(),
                sender_id.as_str(),
                content,
                sent_at.to_rfc3339()
            ],
        )?;
        Ok(id)
    }

    /// The most recent `limit` messages of a room, oldest first.
    ///
    /// With `before_seq`, only messages older than that position are
    /// considered, which lets a client page backwards.
    pub fn list_by_room(
        conn: &Connection,
        room_id: &RoomId,
        limit: u32,
        before_seq: Option<i64>,
    ) -> Result<Vec<StoredMessage>> {
        let mut stmt = conn.prepare(
            "SELECT seq, id, room_id, sender_id, content, sent_at
             FROM messages
             WHERE room_id = ?1 AND seq < ?2
             ORDER BY seq DESC
             LIMIT ?3",
        )?;
        let rows = stmt
            .query_map(
                params![room_id.as_str(), before_seq.unwrap_or(i64::MAX), limit],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut messages = rows
            .into_iter()
            .map(|(seq, id, room_id, sender_id, content, sent_at)| {
                let sent_at = DateTime::parse_from_rfc3339(&sent_at)
                    .map_err(|e| MessageStoreError::CorruptRow {
                        id: id.clone(),
                        message: e.to_string(),
                    })?
                    .with_timezone(&Utc);
                Ok(StoredMessage {
                    seq,
                    message: ChatMessage {
                        id: id.into(),
                        room_id: room_id.into(),
                        sender_id: sender_id.into(),
                        content,
                        sent_at,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    /// Number of messages stored for a room.
    pub fn count_by_room(conn: &Connection, room_id: &RoomId) -> Result<u64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM messages WHERE room_id = ?1",
            params![room_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        let _ = run_migrations(&conn).unwrap();
        conn
    }

    fn insert(conn: &Connection, room: &str, sender: &str, content: &str) -> MessageId {
        MessageRepo::insert(
            conn,
            &RoomId::from(room),
            &SenderId::from(sender),
            content,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn insert_then_list_oldest_first() {
        let conn = setup();
        let first = insert(&conn, "order-42", "a", "hi");
        let second = insert(&conn, "order-42", "b", "hello");

        let messages = MessageRepo::list_by_room(&conn, &RoomId::from("order-42"), 50, None).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message.id, first);
        assert_eq!(messages[0].message.content, "hi");
        assert_eq!(messages[1].message.id, second);
        assert_eq!(messages[1].message.sender_id.as_str(), "b");
    }

    #[test]
    fn list_is_scoped_to_room() {
        let conn = setup();
        let _ = insert(&conn, "order-1", "a", "one");
        let _ = insert(&conn, "order-2", "a", "two");

        let messages = MessageRepo::list_by_room(&conn, &RoomId::from("order-2"), 50, None).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message.content, "two");
        assert_eq!(MessageRepo::count_by_room(&conn, &RoomId::from("order-1")).unwrap(), 1);
    }

    #[test]
    fn limit_keeps_newest_and_before_pages_back() {
        let conn = setup();
        for i in 0..5 {
            let _ = insert(&conn, "r", "a", &format!("m{i}"));
        }
        let room = RoomId::from("r");

        let latest = MessageRepo::list_by_room(&conn, &room, 2, None).unwrap();
        let contents: Vec<_> = latest.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, ["m3", "m4"]);

        let older = MessageRepo::list_by_room(&conn, &room, 2, Some(latest[0].seq)).unwrap();
        let contents: Vec<_> = older.iter().map(|m| m.message.content.as_str()).collect();
        assert_eq!(contents, ["m1", "m2"]);
    }

    #[test]
    fn unknown_room_is_empty() {
        let conn = setup();
        let messages = MessageRepo::list_by_room(&conn, &RoomId::from("nope"), 10, None).unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn timestamps_round_trip_to_the_second() {
        let conn = setup();
        let at: DateTime<Utc> = "2026-03-01T12:30:45Z".parse().unwrap();
        let _ = MessageRepo::insert(&conn, &RoomId::from("r"), &SenderId::from("a"), "x", at).unwrap();
        let messages = MessageRepo::list_by_room(&conn, &RoomId::from("r"), 1, None).unwrap();
        assert_eq!(messages[0].message.sent_at, at);
    }
}
