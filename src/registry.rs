//! Keyed registry of shared sessions
//!
//! `SessionRegistry` maps each device key to its `Session`, creating the
//! session on first connect and evicting it once the last client has
//! disconnected.

use crate::client::SessionClient;
use crate::config::RegistryConfig;
use crate::error::{Result, SessionError};
use crate::observer::{emit, EvictionReason, SessionEvent, SessionObserver, SharedObserver};
use crate::session::Session;
use crate::types::{RegistryInfo, SessionKey};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry of one shared session per device key
///
/// Construct one per service and share it (e.g. behind an `Arc`) with every
/// protocol client that should reuse connections. Thread-safe via internal
/// locks; the registry lock is always taken before a session's own lock.
pub struct SessionRegistry<C: SessionClient + ?Sized> {
    config: RegistryConfig,
    observer: SharedObserver,

    /// Active sessions (device key → session)
    sessions: RwLock<HashMap<SessionKey, Arc<Session<C>>>>,
}

impl<C: SessionClient + ?Sized + 'static> SessionRegistry<C> {
    /// Create an empty registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create an empty registry with the given configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            config,
            observer: None,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Report session lifecycle events to `observer`
    ///
    /// Applies to sessions created after the call.
    pub fn set_observer(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observer = Some(observer);
    }

    /// Registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Connect `client` to the shared session for its key and return the token
    ///
    /// The first client for a key creates the session and logs in; clients
    /// arriving during that login wait for it; later clients receive the
    /// held token without a login.
    pub async fn connect(&self, client: &Arc<C>) -> Result<C::Token> {
        let key = client.key().ok_or_else(|| {
            SessionError::InvalidClient("Client must have a device key".to_string())
        })?;

        let session = {
            let mut sessions = self.sessions.write().await;
            let session = match sessions.entry(key) {
                Entry::Occupied(entry) => Arc::clone(entry.get()),
                Entry::Vacant(entry) => {
                    let session = Arc::new(Session::configured(
                        entry.key().clone(),
                        &self.config,
                        self.observer.clone(),
                    ));
                    tracing::info!(
                        key = %entry.key(),
                        session_id = %session.id(),
                        "Session created"
                    );
                    Arc::clone(entry.insert(session))
                }
            };

            // Attached under the registry lock so a concurrent disconnect
            // cannot evict the session before this client is counted.
            if let Some(token) = session.attach(client).await {
                tracing::debug!(
                    key = %session.key(),
                    session_id = %session.id(),
                    "Reusing established session"
                );
                return Ok(token);
            }
            session
        };

        let result = session.acquire(client).await;

        // Every client may have disconnected while the login was running;
        // the session stays registered until that login has settled.
        self.evict_if_idle(&session).await;
        result
    }

    /// Disconnect `client` from its session
    ///
    /// The last client out logs the device out and the session is evicted,
    /// so the next connect starts over. A session whose login is still
    /// running stays registered until that login settles, so a reconnect
    /// joins it instead of starting a second login. Never fails; unknown
    /// clients are ignored.
    pub async fn disconnect(&self, client: &Arc<C>) {
        let Some(key) = client.key() else {
            return;
        };

        let session = self.sessions.read().await.get(&key).cloned();
        let Some(session) = session else {
            return;
        };

        session.release(client).await;
        self.evict_if_idle(&session).await;
    }

    /// Evict `session` if it is still registered, has no clients and no login in flight
    async fn evict_if_idle(&self, session: &Arc<Session<C>>) {
        let key = session.key();
        let evicted = {
            let mut sessions = self.sessions.write().await;
            let current = matches!(sessions.get(key), Some(s) if Arc::ptr_eq(s, session));
            if current && session.is_evictable().await {
                sessions.remove(key)
            } else {
                None
            }
        };

        if let Some(session) = evicted {
            tracing::info!(
                key = %key,
                session_id = %session.id(),
                "Session evicted"
            );
            self.emit_evicted(&session, EvictionReason::Unreferenced).await;
        }
    }

    /// Drop the session for `key` without logging out
    ///
    /// For sessions known to be dead (stale token, device reboot). The next
    /// connect for the key starts a fresh session and login. Returns the
    /// discarded session.
    pub async fn remove(&self, key: &SessionKey) -> Option<Arc<Session<C>>> {
        let session = self.sessions.write().await.remove(key)?;

        let clients = session.client_count().await;
        if clients > 0 {
            tracing::warn!(
                key = %key,
                session_id = %session.id(),
                clients,
                "Removed session that still had clients"
            );
        } else {
            tracing::info!(key = %key, session_id = %session.id(), "Session removed");
        }

        self.emit_evicted(&session, EvictionReason::Removed).await;
        Some(session)
    }

    /// Drain every session, logging out those that hold a token
    ///
    /// Logout failures are absorbed like in `disconnect`. Returns the number
    /// of sessions drained.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<Session<C>>> = {
            let mut sessions = self.sessions.write().await;
            sessions.drain().map(|(_, session)| session).collect()
        };

        for session in &drained {
            session.close(self.config.logout_on_shutdown).await;
            self.emit_evicted(session, EvictionReason::Shutdown).await;
        }

        tracing::info!(sessions = drained.len(), "Session registry shut down");
        drained.len()
    }

    async fn emit_evicted(&self, session: &Session<C>, reason: EvictionReason) {
        emit(
            &self.observer,
            SessionEvent::Evicted {
                key: session.key().clone(),
                session_id: session.id().to_string(),
                reason,
            },
        )
        .await;
    }

    /// Get the session for `key`
    pub async fn get(&self, key: &SessionKey) -> Option<Arc<Session<C>>> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Whether a session exists for `key`
    pub async fn contains(&self, key: &SessionKey) -> bool {
        self.sessions.read().await.contains_key(key)
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Registered keys, sorted
    pub async fn keys(&self) -> Vec<SessionKey> {
        let mut keys: Vec<SessionKey> = self.sessions.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Get registry info (sessions, clients, ready sessions)
    pub async fn info(&self) -> RegistryInfo {
        let sessions: Vec<Arc<Session<C>>> =
            self.sessions.read().await.values().cloned().collect();

        let mut info = RegistryInfo {
            sessions: sessions.len(),
            ..Default::default()
        };
        for session in &sessions {
            let snapshot = session.info().await;
            info.clients += snapshot.clients;
            if snapshot.has_token {
                info.ready += 1;
            }
        }
        info
    }
}

impl<C: SessionClient + ?Sized + 'static> Default for SessionRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClientError;
    use crate::observer::MemoryObserver;
    use crate::types::LoginState;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counters {
        logins: AtomicUsize,
        logouts: AtomicUsize,
    }

    struct KeyedClient {
        key: Option<&'static str>,
        counters: Arc<Counters>,
    }

    #[async_trait]
    impl SessionClient for KeyedClient {
        type Token = String;

        fn key(&self) -> Option<SessionKey> {
            self.key.and_then(|k| SessionKey::new(k).ok())
        }

        async fn login(&self) -> std::result::Result<String, ClientError> {
            let n = self.counters.logins.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("{}-T{}", self.key.unwrap_or("none"), n))
        }

        async fn logout(&self) -> std::result::Result<(), ClientError> {
            self.counters.logouts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn client(key: Option<&'static str>, counters: &Arc<Counters>) -> Arc<KeyedClient> {
        Arc::new(KeyedClient {
            key,
            counters: Arc::clone(counters),
        })
    }

    fn key(k: &str) -> SessionKey {
        SessionKey::new(k).unwrap()
    }

    #[tokio::test]
    async fn test_connect_without_key_registers_nothing() {
        let registry = SessionRegistry::new();
        let counters = Arc::new(Counters::default());
        let keyless = client(None, &counters);

        let err = registry.connect(&keyless).await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidClient(_)));
        assert!(registry.is_empty().await);
        assert_eq!(counters.logins.load(Ordering::SeqCst), 0);

        // Disconnecting a keyless client is a no-op
        registry.disconnect(&keyless).await;
    }

    #[tokio::test]
    async fn test_sessions_are_per_key() {
        let registry = SessionRegistry::new();
        let counters = Arc::new(Counters::default());

        let a = registry.connect(&client(Some("dev1"), &counters)).await.unwrap();
        let b = registry.connect(&client(Some("dev2"), &counters)).await.unwrap();

        assert_eq!(a, "dev1-T1");
        assert_eq!(b, "dev2-T2");
        assert_eq!(registry.keys().await, vec![key("dev1"), key("dev2")]);
        assert_eq!(
            registry.info().await,
            RegistryInfo {
                sessions: 2,
                clients: 2,
                ready: 2,
            }
        );
    }

    #[tokio::test]
    async fn test_remove_drops_session_without_logout() {
        let registry = SessionRegistry::new();
        let counters = Arc::new(Counters::default());
        let a = client(Some("dev1"), &counters);
        registry.connect(&a).await.unwrap();

        let removed = registry.remove(&key("dev1")).await.unwrap();
        assert_eq!(removed.client_count().await, 1);
        assert!(!registry.contains(&key("dev1")).await);
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 0);
        assert!(registry.remove(&key("dev1")).await.is_none());

        // Next connect starts over with a fresh login
        assert_eq!(registry.connect(&a).await.unwrap(), "dev1-T2");
    }

    #[tokio::test]
    async fn test_disconnect_after_remove_leaves_new_session_alone() {
        let registry = SessionRegistry::new();
        let counters = Arc::new(Counters::default());
        let stale = client(Some("dev1"), &counters);
        let fresh = client(Some("dev1"), &counters);

        registry.connect(&stale).await.unwrap();
        registry.remove(&key("dev1")).await;
        registry.connect(&fresh).await.unwrap();

        registry.disconnect(&stale).await;
        let session = registry.get(&key("dev1")).await.unwrap();
        assert_eq!(session.state().await, LoginState::Ready);
        assert!(session.has_client(&fresh).await);
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_and_logs_out() {
        let counters = Arc::new(Counters::default());
        let observer = Arc::new(MemoryObserver::default());
        let mut registry = SessionRegistry::new();
        registry.set_observer(observer.clone());

        registry.connect(&client(Some("dev1"), &counters)).await.unwrap();
        registry.connect(&client(Some("dev2"), &counters)).await.unwrap();

        assert_eq!(registry.shutdown().await, 2);
        assert!(registry.is_empty().await);
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 2);

        let evictions = observer
            .list(100)
            .await
            .into_iter()
            .filter(|o| {
                matches!(
                    o.event,
                    SessionEvent::Evicted {
                        reason: EvictionReason::Shutdown,
                        ..
                    }
                )
            })
            .count();
        assert_eq!(evictions, 2);
    }

    #[tokio::test]
    async fn test_shutdown_without_logout() {
        let counters = Arc::new(Counters::default());
        let registry =
            SessionRegistry::with_config(RegistryConfig::default().with_logout_on_shutdown(false));
        registry.connect(&client(Some("dev1"), &counters)).await.unwrap();

        assert!(!registry.config().logout_on_shutdown);
        assert_eq!(registry.shutdown().await, 1);
        assert_eq!(counters.logouts.load(Ordering::SeqCst), 0);
    }
}
