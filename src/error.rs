//! Error types for a3s-session

use crate::types::SessionKey;
use std::sync::Arc;
use thiserror::Error;

/// Error raised by a client's own login/logout implementation
pub type ClientError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur while sharing a session
///
/// `Clone` so a single login outcome can be handed to every waiter;
/// cloned `Login` errors share the same underlying source instance.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Client has no usable device key
    #[error("Invalid client: {0}")]
    InvalidClient(String),

    /// Login collaborator failed
    #[error("Login to '{key}' failed: {source}")]
    Login {
        key: SessionKey,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// Logout collaborator failed (reported, never returned from disconnect)
    #[error("Logout from '{key}' failed: {source}")]
    Logout {
        key: SessionKey,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },
}

impl SessionError {
    pub(crate) fn login(key: &SessionKey, source: ClientError) -> Self {
        Self::Login {
            key: key.clone(),
            source: Arc::from(source),
        }
    }

    pub(crate) fn logout(key: &SessionKey, source: ClientError) -> Self {
        Self::Logout {
            key: key.clone(),
            source: Arc::from(source),
        }
    }

    /// True if this error came from a failed login
    pub fn is_login(&self) -> bool {
        matches!(self, Self::Login { .. })
    }
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_error_display_and_source() {
        let key = SessionKey::new("dev1").unwrap();
        let err = SessionError::login(&key, "handshake refused".into());
        assert_eq!(err.to_string(), "Login to 'dev1' failed: handshake refused");
        assert!(err.is_login());
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_cloned_login_error_shares_source() {
        let key = SessionKey::new("dev1").unwrap();
        let err = SessionError::login(&key, "boom".into());
        let copy = err.clone();
        match (&err, &copy) {
            (SessionError::Login { source: a, .. }, SessionError::Login { source: b, .. }) => {
                assert!(Arc::ptr_eq(a, b));
            }
            _ => panic!("expected login errors"),
        }
    }

    #[test]
    fn test_invalid_client_display() {
        let err = SessionError::InvalidClient("missing key".to_string());
        assert_eq!(err.to_string(), "Invalid client: missing key");
        assert!(!err.is_login());
    }
}
