//! Core session types
//!
//! Snapshot types use camelCase JSON serialization like the rest of the
//! A3S crates.

use crate::error::{Result, SessionError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the remote device a session is bound to
///
/// Clients that report equal keys share one session. Keys are validated
/// on construction so an empty identifier can never reach the registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    /// Create a key, rejecting empty or whitespace-only identifiers
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(SessionError::InvalidClient(
                "Session key cannot be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    /// Borrow the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionKey {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl TryFrom<&str> for SessionKey {
    type Error = SessionError;

    fn try_from(value: &str) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0
    }
}

/// Login lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LoginState {
    /// No token and no login running
    #[default]
    Idle,
    /// A login is running; new acquirers join it
    InFlight,
    /// A token is held and handed to every acquirer
    Ready,
    /// The most recent login failed; its error is retained
    Failed,
}

impl fmt::Display for LoginState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::InFlight => "in-flight",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Unique session identifier (ses-<uuid>)
    pub id: String,

    /// Device key the session is bound to
    pub key: SessionKey,

    /// Current login state
    pub state: LoginState,

    /// Number of attached clients
    pub clients: usize,

    /// Whether a token is currently held
    pub has_token: bool,

    /// Unix timestamp in milliseconds when the session was created
    pub created_at: u64,
}

/// Registry status information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryInfo {
    /// Number of registered sessions
    pub sessions: usize,
    /// Total attached clients across all sessions
    pub clients: usize,
    /// Sessions currently holding a token
    pub ready: usize,
}

pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
