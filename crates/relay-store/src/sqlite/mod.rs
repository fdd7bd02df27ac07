//! `SQLite` backend: pool, migrations and the message repository.

pub mod connection;
pub mod message_repo;
pub mod migrations;
