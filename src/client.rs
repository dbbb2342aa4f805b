//! Client capability trait
//!
//! Every protocol client that wants to share an authenticated connection
//! implements `SessionClient`. The registry only ever asks a client for its
//! device key and calls its `login`/`logout`.

use crate::error::ClientError;
use crate::types::SessionKey;
use async_trait::async_trait;
use std::sync::Arc;

/// A client that logs into a remote device
///
/// Clients with equal keys share one session and one login. The token is
/// opaque to the registry: anything the client needs to prove the
/// connection is alive (a cookie, a handle, a struct).
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Credential produced by a successful login
    type Token: Clone + Send + Sync + 'static;

    /// Device key used to find the shared session
    ///
    /// `None` means the client is not bound to a device and cannot connect.
    fn key(&self) -> Option<SessionKey>;

    /// Perform the login handshake and return a token
    ///
    /// Called once per flight, on the client that started it.
    async fn login(&self) -> Result<Self::Token, ClientError>;

    /// Tear down the connection
    ///
    /// Called on the client whose release leaves the session empty.
    /// Failures are logged and otherwise ignored.
    async fn logout(&self) -> Result<(), ClientError>;
}

/// Identity of an attached client: the address of its `Arc` allocation
pub(crate) type ClientId = usize;

pub(crate) fn client_id<C: ?Sized>(client: &Arc<C>) -> ClientId {
    Arc::as_ptr(client).cast::<()>() as usize
}
