//! Shared session for one device
//!
//! A `Session` owns the login state of one authenticated connection and the
//! set of clients using it. Concurrent acquirers collapse into a single
//! login flight; the last client to release logs the device out.

use crate::client::{client_id, ClientId, SessionClient};
use crate::config::RegistryConfig;
use crate::error::{Result, SessionError};
use crate::observer::{emit, SessionEvent, SharedObserver};
use crate::types::{now_millis, LoginState, SessionInfo, SessionKey};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

type LoginFuture<T> = Shared<BoxFuture<'static, Result<T>>>;

/// The one login currently running for a session
struct Flight<C: SessionClient + ?Sized> {
    generation: u64,
    initiator: Arc<C>,
    future: LoginFuture<C::Token>,
}

struct Inner<C: SessionClient + ?Sized> {
    clients: HashMap<ClientId, Arc<C>>,
    token: Option<C::Token>,
    state: LoginState,
    pending: Option<Flight<C>>,
    last_error: Option<SessionError>,
    generation: u64,
}

/// Shared authenticated connection to one device
///
/// Thread-safe; the internal lock is held only across state transitions,
/// never while a login or logout is outstanding.
pub struct Session<C: SessionClient + ?Sized> {
    id: String,
    key: SessionKey,
    created_at: u64,
    retry_failed_login: bool,
    observer: SharedObserver,
    inner: Mutex<Inner<C>>,
}

impl<C: SessionClient + ?Sized + 'static> Session<C> {
    /// Create an idle session for `key` with default settings
    pub fn new(key: SessionKey) -> Self {
        Self::configured(key, &RegistryConfig::default(), None)
    }

    pub(crate) fn configured(
        key: SessionKey,
        config: &RegistryConfig,
        observer: SharedObserver,
    ) -> Self {
        Self {
            id: format!("ses-{}", uuid::Uuid::new_v4()),
            key,
            created_at: now_millis(),
            retry_failed_login: config.retry_failed_login,
            observer,
            inner: Mutex::new(Inner {
                clients: HashMap::new(),
                token: None,
                state: LoginState::Idle,
                pending: None,
                last_error: None,
                generation: 0,
            }),
        }
    }

    /// Unique session identifier (ses-<uuid>)
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Device key this session is bound to
    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Attach `client` and return the shared token, logging in if needed
    ///
    /// Exactly one login runs at a time; callers that arrive while it is
    /// running wait for it and receive the same token or the same error.
    /// The client stays attached even if the login fails and must still be
    /// released.
    pub async fn acquire(&self, client: &Arc<C>) -> Result<C::Token> {
        let (generation, future) = {
            let mut inner = self.inner.lock().await;
            inner.clients.insert(client_id(client), Arc::clone(client));

            if let Some(token) = &inner.token {
                return Ok(token.clone());
            }

            match inner.pending.as_ref().map(|f| (f.generation, f.future.clone())) {
                Some(joined) => {
                    tracing::debug!(
                        key = %self.key,
                        session_id = %self.id,
                        clients = inner.clients.len(),
                        "Joining in-flight login"
                    );
                    joined
                }
                None => {
                    if inner.state == LoginState::Failed && !self.retry_failed_login {
                        if let Some(error) = inner.last_error.clone() {
                            return Err(error);
                        }
                    }
                    self.start_login(&mut inner, client)
                }
            }
        };

        let result = future.await;
        self.settle(generation, &result).await;
        result
    }

    fn start_login(&self, inner: &mut Inner<C>, client: &Arc<C>) -> (u64, LoginFuture<C::Token>) {
        inner.generation += 1;
        inner.state = LoginState::InFlight;
        inner.last_error = None;

        let key = self.key.clone();
        let initiator = Arc::clone(client);
        let login = Arc::clone(client);
        let future = async move {
            login
                .login()
                .await
                .map_err(|e| SessionError::login(&key, e))
        }
        .boxed()
        .shared();

        tracing::debug!(
            key = %self.key,
            session_id = %self.id,
            generation = inner.generation,
            "Starting login"
        );

        inner.pending = Some(Flight {
            generation: inner.generation,
            initiator,
            future: future.clone(),
        });
        (inner.generation, future)
    }

    /// Record the outcome of flight `generation`; later waiters find it already settled
    async fn settle(&self, generation: u64, result: &Result<C::Token>) {
        let mut inner = self.inner.lock().await;
        let flight = match inner.pending.take() {
            Some(flight) if flight.generation == generation => flight,
            other => {
                inner.pending = other;
                return;
            }
        };

        match result {
            Ok(_) if inner.clients.is_empty() => {
                // Every client left while the login was running.
                inner.state = LoginState::Idle;
                drop(inner);
                tracing::info!(
                    key = %self.key,
                    session_id = %self.id,
                    "Login finished after all clients released; logging out"
                );
                self.logout_with(&flight.initiator).await;
            }
            Ok(token) => {
                inner.token = Some(token.clone());
                inner.state = LoginState::Ready;
                let clients = inner.clients.len();
                drop(inner);
                tracing::info!(
                    key = %self.key,
                    session_id = %self.id,
                    clients,
                    "Login succeeded"
                );
                emit(
                    &self.observer,
                    SessionEvent::LoggedIn {
                        key: self.key.clone(),
                        session_id: self.id.clone(),
                    },
                )
                .await;
            }
            Err(error) => {
                inner.last_error = Some(error.clone());
                inner.state = LoginState::Failed;
                drop(inner);
                tracing::warn!(
                    key = %self.key,
                    session_id = %self.id,
                    error = %error,
                    "Login failed"
                );
                emit(
                    &self.observer,
                    SessionEvent::LoginFailed {
                        key: self.key.clone(),
                        session_id: self.id.clone(),
                        error: error.clone(),
                    },
                )
                .await;
            }
        }
    }

    /// Detach `client`; the last one out logs the device out
    ///
    /// Never fails: logout errors are logged and reported to the observer,
    /// and the token is cleared either way. Releasing a client that is not
    /// attached is a no-op unless the session is already empty; unlike a
    /// plain "at most one member before removal" rule, a stranger's release
    /// never logs out clients that are still attached.
    pub async fn release(&self, client: &Arc<C>) {
        let token = {
            let mut inner = self.inner.lock().await;
            inner.clients.remove(&client_id(client));

            if !inner.clients.is_empty() {
                tracing::debug!(
                    key = %self.key,
                    session_id = %self.id,
                    clients = inner.clients.len(),
                    "Client released"
                );
                return;
            }

            if inner.pending.is_none() {
                inner.state = LoginState::Idle;
            }
            inner.last_error = None;
            inner.token.take()
        };

        if token.is_some() {
            self.logout_with(client).await;
        }
    }

    /// Detach every client and log out if a token is held
    pub(crate) async fn close(&self, logout: bool) {
        let (token, client) = {
            let mut inner = self.inner.lock().await;
            let client = inner.clients.drain().map(|(_, c)| c).next();
            if inner.pending.is_none() {
                inner.state = LoginState::Idle;
            }
            inner.last_error = None;
            (inner.token.take(), client)
        };

        if !logout || token.is_none() {
            return;
        }
        if let Some(client) = client {
            self.logout_with(&client).await;
        }
    }

    async fn logout_with(&self, client: &Arc<C>) {
        match client.logout().await {
            Ok(()) => {
                tracing::info!(key = %self.key, session_id = %self.id, "Session logged out");
                emit(
                    &self.observer,
                    SessionEvent::LoggedOut {
                        key: self.key.clone(),
                        session_id: self.id.clone(),
                    },
                )
                .await;
            }
            Err(e) => {
                let error = SessionError::logout(&self.key, e);
                tracing::warn!(
                    key = %self.key,
                    session_id = %self.id,
                    error = %error,
                    "Logout failed; session torn down anyway"
                );
                emit(
                    &self.observer,
                    SessionEvent::LogoutFailed {
                        key: self.key.clone(),
                        session_id: self.id.clone(),
                        error,
                    },
                )
                .await;
            }
        }
    }

    /// Attach `client` and return the token only if one is already held
    pub(crate) async fn attach(&self, client: &Arc<C>) -> Option<C::Token> {
        let mut inner = self.inner.lock().await;
        inner.clients.insert(client_id(client), Arc::clone(client));
        inner.token.clone()
    }

    /// Current login state
    pub async fn state(&self) -> LoginState {
        self.inner.lock().await.state
    }

    /// Current token, if logged in
    pub async fn token(&self) -> Option<C::Token> {
        self.inner.lock().await.token.clone()
    }

    /// Error from the most recent failed login
    pub async fn last_error(&self) -> Option<SessionError> {
        self.inner.lock().await.last_error.clone()
    }

    /// Number of attached clients
    pub async fn client_count(&self) -> usize {
        self.inner.lock().await.clients.len()
    }

    /// Whether `client` is attached
    pub async fn has_client(&self, client: &Arc<C>) -> bool {
        self.inner.lock().await.clients.contains_key(&client_id(client))
    }

    /// True once no client is attached
    pub async fn is_unreferenced(&self) -> bool {
        self.inner.lock().await.clients.is_empty()
    }

    /// True when no client is attached and no login is running
    pub async fn is_evictable(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.clients.is_empty() && inner.pending.is_none()
    }

    /// Snapshot of this session
    pub async fn info(&self) -> SessionInfo {
        let inner = self.inner.lock().await;
        SessionInfo {
            id: self.id.clone(),
            key: self.key.clone(),
            state: inner.state,
            clients: inner.clients.len(),
            has_token: inner.token.is_some(),
            created_at: self.created_at,
        }
    }
}
