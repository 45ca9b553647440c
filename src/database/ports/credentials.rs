//! Credential lookup port.

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type for credential lookups.
pub type CredentialResult<T> = Result<T, CredentialError>;

/// Raw login material as stored in a secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Login name bytes.
    pub username: Vec<u8>,
    /// Password bytes.
    pub password: Vec<u8>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Credentials")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Secret store holding SQL logins.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Fetches the credentials stored under `namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] when the secret does not exist.
    async fn fetch(&self, namespace: &str, name: &str) -> CredentialResult<Credentials>;
}

/// Errors returned by credential sources.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    /// The secret does not exist.
    #[error("credentials {namespace}/{name} not found")]
    NotFound {
        /// Secret namespace.
        namespace: String,
        /// Secret name.
        name: String,
    },

    /// Secret backend failure.
    #[error("credential backend error: {0}")]
    Backend(Arc<dyn std::error::Error + Send + Sync>),
}

impl CredentialError {
    /// Wraps a backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Arc::new(err))
    }
}
