//! Handshake authentication.
//!
//! The relay never takes a sender identity from message payloads. It is
//! resolved once, from the upgrade request, before the connection joins its
//! room.

use axum::http::{HeaderMap, HeaderName};
use thiserror::Error;

use relay_core::{RoomId, SenderId};

const MAX_ID_LEN: usize = 128;

/// What an authenticator gets to look at.
#[derive(Debug)]
pub struct Handshake<'a> {
    /// Room id taken from the request path.
    pub room_id: &'a str,
    /// Request headers.
    pub headers: &'a HeaderMap,
}

/// A resolved connection identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    /// Who is sending.
    pub sender_id: SenderId,
    /// Which room they are admitted to.
    pub room_id: RoomId,
}

/// Why a handshake was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// The identity header is absent or empty.
    #[error("missing sender identity header '{0}'")]
    MissingIdentity(String),
    /// The identity header is not a usable id.
    #[error("invalid sender identity")]
    InvalidIdentity,
    /// The room id is empty or malformed.
    #[error("invalid room id")]
    InvalidRoom,
}

/// Resolves a handshake into an [`Identity`].
pub trait Authenticator: Send + Sync {
    /// Authenticate one upgrade request.
    fn authenticate(&self, handshake: &Handshake<'_>) -> Result<Identity, AuthError>;
}

fn valid_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value.chars().all(|c| c.is_ascii_graphic())
}

/// Trusts a header set by the upstream gateway after it authenticated the user.
#[derive(Clone, Debug)]
pub struct TrustedHeaderAuthenticator {
    header: HeaderName,
}

impl TrustedHeaderAuthenticator {
    /// Read the sender id from `header`.
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    /// Build from a header name string, falling back to `x-relay-sender` if it is invalid.
    pub fn from_name(name: &str) -> Self {
        let header = HeaderName::try_from(name)
            .unwrap_or_else(|_| HeaderName::from_static("x-relay-sender"));
        Self::new(header)
    }

    /// The header this authenticator reads.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Authenticator for TrustedHeaderAuthenticator {
    fn authenticate(&self, handshake: &Handshake<'_>) -> Result<Identity, AuthError> {
        if !valid_id(handshake.room_id) {
            return Err(AuthError::InvalidRoom);
        }
        let value = handshake
            .headers
            .get(&self.header)
            .ok_or_else(|| AuthError::MissingIdentity(self.header.to_string()))?;
        let sender = value
            .to_str()
            .map_err(|_| AuthError::InvalidIdentity)?
            .trim();
        if sender.is_empty() {
            return Err(AuthError::MissingIdentity(self.header.to_string()));
        }
        if !valid_id(sender) {
            return Err(AuthError::InvalidIdentity);
        }
        Ok(Identity {
            sender_id: SenderId::from(sender),
            room_id: RoomId::from(handshake.room_id),
        })
    }
}
