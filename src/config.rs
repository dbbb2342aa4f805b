//! Registry configuration

use serde::{Deserialize, Serialize};

/// Configuration for a `SessionRegistry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegistryConfig {
    /// Start a fresh login when a failed session is acquired again
    ///
    /// When false, later acquirers receive the retained login error
    /// until the session is evicted or removed.
    pub retry_failed_login: bool,

    /// Log out sessions that still hold a token during `shutdown`
    pub logout_on_shutdown: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            retry_failed_login: true,
            logout_on_shutdown: true,
        }
    }
}

impl RegistryConfig {
    pub fn with_retry_failed_login(mut self, retry: bool) -> Self {
        self.retry_failed_login = retry;
        self
    }

    pub fn with_logout_on_shutdown(mut self, logout: bool) -> Self {
        self.logout_on_shutdown = logout;
        self
    }
}
