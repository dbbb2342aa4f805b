//! # a3s-session
//!
//! Shared authenticated device sessions for the A3S ecosystem.
//!
//! ## Overview
//!
//! Many protocol clients often talk to the same device. `a3s-session` lets
//! them share one authenticated connection: clients with the same device key
//! trigger exactly one login, receive the same token, and the connection is
//! logged out only when the last of them disconnects.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_session::{ClientError, SessionClient, SessionKey, SessionRegistry};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct ApicClient {
//!     host: String,
//! }
//!
//! #[async_trait]
//! impl SessionClient for ApicClient {
//!     type Token = String;
//!
//!     fn key(&self) -> Option<SessionKey> {
//!         SessionKey::new(self.host.clone()).ok()
//!     }
//!
//!     async fn login(&self) -> Result<String, ClientError> {
//!         Ok(format!("cookie-for-{}", self.host))
//!     }
//!
//!     async fn logout(&self) -> Result<(), ClientError> {
//!         Ok(())
//!     }
//! }
//!
//! # async fn example() -> a3s_session::Result<()> {
//! let registry = SessionRegistry::new();
//! let client = Arc::new(ApicClient { host: "10.0.0.1".to_string() });
//!
//! let token = registry.connect(&client).await?;
//! println!("Logged in: {}", token);
//!
//! registry.disconnect(&client).await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **SessionClient** trait — the key/login/logout capability a client provides
//! - **Session** — single-flight login and reference counting for one device
//! - **SessionRegistry** — one session per key, created on first connect,
//!   evicted after the last disconnect
//! - **SessionObserver** trait — optional lifecycle hook (logout failures etc.)

pub mod client;
pub mod config;
pub mod error;
pub mod observer;
pub mod registry;
pub mod session;
pub mod types;

// Re-export core types
pub use client::SessionClient;
pub use config::RegistryConfig;
pub use error::{ClientError, Result, SessionError};
pub use observer::{EvictionReason, MemoryObserver, ObservedEvent, SessionEvent, SessionObserver};
pub use registry::SessionRegistry;
pub use session::Session;
pub use types::{LoginState, RegistryInfo, SessionInfo, SessionKey};
