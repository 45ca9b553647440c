//! Static credential source backed by a map.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::database::ports::{CredentialError, CredentialResult, CredentialSource, Credentials};

/// Thread-safe in-memory secret store.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialSource {
    secrets: Arc<RwLock<HashMap<(String, String), Credentials>>>,
}

impl StaticCredentialSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a secret under `namespace/name`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Backend`] if the lock is poisoned.
    pub fn insert(
        &self,
        namespace: &str,
        name: &str,
        username: impl Into<Vec<u8>>,
        password: impl Into<Vec<u8>>,
    ) -> CredentialResult<()> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|err| CredentialError::backend(std::io::Error::other(err.to_string())))?;
        secrets.insert(
            (namespace.to_owned(), name.to_owned()),
            Credentials {
                username: username.into(),
                password: password.into(),
            },
        );
        Ok(())
    }

    /// Deletes the secret under `namespace/name`; returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Backend`] if the lock is poisoned.
    pub fn remove(&self, namespace: &str, name: &str) -> CredentialResult<bool> {
        let mut secrets = self
            .secrets
            .write()
            .map_err(|err| CredentialError::backend(std::io::Error::other(err.to_string())))?;
        Ok(secrets
            .remove(&(namespace.to_owned(), name.to_owned()))
            .is_some())
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self, namespace: &str, name: &str) -> CredentialResult<Credentials> {
        let secrets = self
            .secrets
            .read()
            .map_err(|err| CredentialError::backend(std::io::Error::other(err.to_string())))?;
        secrets
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            })
    }
}
