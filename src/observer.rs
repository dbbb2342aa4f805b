//! Session lifecycle observer
//!
//! Provides a `SessionObserver` hook for reporting what the registry does
//! with sessions, most importantly the logout failures it swallows.
//! Installing an observer changes visibility only, never behavior.

use crate::error::SessionError;
use crate::types::{now_millis, SessionKey};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Why a session left the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    /// Last client disconnected
    Unreferenced,
    /// Dropped through `remove`
    Removed,
    /// Drained by `shutdown`
    Shutdown,
}

/// Something that happened to a session
#[derive(Debug, Clone)]
pub enum SessionEvent {
    LoggedIn { key: SessionKey, session_id: String },
    LoginFailed { key: SessionKey, session_id: String, error: SessionError },
    LoggedOut { key: SessionKey, session_id: String },
    LogoutFailed { key: SessionKey, session_id: String, error: SessionError },
    Evicted { key: SessionKey, session_id: String, reason: EvictionReason },
}

impl SessionEvent {
    /// Key of the session the event belongs to
    pub fn key(&self) -> &SessionKey {
        match self {
            Self::LoggedIn { key, .. }
            | Self::LoginFailed { key, .. }
            | Self::LoggedOut { key, .. }
            | Self::LogoutFailed { key, .. }
            | Self::Evicted { key, .. } => key,
        }
    }
}

/// Receives session lifecycle events
#[async_trait]
pub trait SessionObserver: Send + Sync {
    /// Handle one event
    ///
    /// Must not fail; observers that forward events elsewhere should
    /// absorb their own errors.
    async fn notify(&self, event: SessionEvent);
}

/// Observer helper shared by sessions and the registry
pub(crate) type SharedObserver = Option<Arc<dyn SessionObserver>>;

pub(crate) async fn emit(observer: &SharedObserver, event: SessionEvent) {
    if let Some(observer) = observer {
        observer.notify(event).await;
    }
}

/// A recorded event with the time it was observed
#[derive(Debug, Clone)]
pub struct ObservedEvent {
    pub event: SessionEvent,

    /// Unix timestamp in milliseconds
    pub observed_at: u64,
}

/// In-memory observer for development and testing
///
/// Keeps the most recent events up to a configurable capacity.
pub struct MemoryObserver {
    events: RwLock<VecDeque<ObservedEvent>>,
    max_events: usize,
}

impl MemoryObserver {
    /// Create an observer keeping at most `max_events` (0 = unbounded)
    pub fn new(max_events: usize) -> Self {
        Self {
            events: RwLock::new(VecDeque::new()),
            max_events,
        }
    }

    /// Number of events currently held
    pub async fn count(&self) -> usize {
        self.events.read().await.len()
    }

    /// Most recent events first
    pub async fn list(&self, limit: usize) -> Vec<ObservedEvent> {
        let events = self.events.read().await;
        events.iter().rev().take(limit).cloned().collect()
    }

    /// Logout errors that were swallowed, oldest first
    pub async fn logout_failures(&self) -> Vec<SessionError> {
        let events = self.events.read().await;
        events
            .iter()
            .filter_map(|observed| match &observed.event {
                SessionEvent::LogoutFailed { error, .. } => Some(error.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Default for MemoryObserver {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl SessionObserver for MemoryObserver {
    async fn notify(&self, event: SessionEvent) {
        let mut events = self.events.write().await;
        events.push_back(ObservedEvent {
            event,
            observed_at: now_millis(),
        });

        if self.max_events > 0 {
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SessionKey {
        SessionKey::new("dev1").unwrap()
    }

    fn logged_out(id: &str) -> SessionEvent {
        SessionEvent::LoggedOut {
            key: key(),
            session_id: id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_observer_records_newest_first() {
        let observer = MemoryObserver::default();
        for i in 0..3 {
            observer.notify(logged_out(&format!("ses-{}", i))).await;
        }

        assert_eq!(observer.count().await, 3);
        let list = observer.list(2).await;
        assert_eq!(list.len(), 2);
        assert!(matches!(
            &list[0].event,
            SessionEvent::LoggedOut { session_id, .. } if session_id == "ses-2"
        ));
        assert!(list[0].observed_at > 0);
    }

    #[tokio::test]
    async fn test_memory_observer_capacity() {
        let observer = MemoryObserver::new(2);
        for i in 0..5 {
            observer.notify(logged_out(&format!("ses-{}", i))).await;
        }

        assert_eq!(observer.count().await, 2);
        let list = observer.list(10).await;
        assert!(matches!(
            &list[1].event,
            SessionEvent::LoggedOut { session_id, .. } if session_id == "ses-3"
        ));
    }

    #[tokio::test]
    async fn test_logout_failures_filter() {
        let observer = MemoryObserver::default();
        observer.notify(logged_out("ses-1")).await;
        observer
            .notify(SessionEvent::LogoutFailed {
                key: key(),
                session_id: "ses-1".to_string(),
                error: SessionError::logout(&key(), "socket closed".into()),
            })
            .await;

        let failures = observer.logout_failures().await;
        assert_eq!(failures.len(), 1);
        assert!(observer.list(10).await.iter().all(|o| o.event.key() == &key()));
        assert!(failures[0].to_string().contains("socket closed"));
    }

    #[tokio::test]
    async fn test_emit_without_observer_is_noop() {
        emit(&None, logged_out("ses-1")).await;
    }
}
