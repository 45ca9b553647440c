//! In-memory managed-instance directory.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::database::ports::{InstanceDirectory, InstanceError, InstanceResult, ManagedInstance};

/// Thread-safe in-memory instance directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInstanceDirectory {
    instances: Arc<RwLock<HashMap<(String, String), ManagedInstance>>>,
}

impl InMemoryInstanceDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or replaces the instance `namespace/name`.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Backend`] if the lock is poisoned.
    pub fn insert(
        &self,
        namespace: &str,
        name: &str,
        instance: ManagedInstance,
    ) -> InstanceResult<()> {
        let mut instances = self
            .instances
            .write()
            .map_err(|err| InstanceError::backend(std::io::Error::other(err.to_string())))?;
        instances.insert((namespace.to_owned(), name.to_owned()), instance);
        Ok(())
    }

    /// Changes the reported state of a registered instance; returns whether
    /// it exists.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceError::Backend`] if the lock is poisoned.
    pub fn set_state(&self, namespace: &str, name: &str, state: &str) -> InstanceResult<bool> {
        let mut instances = self
            .instances
            .write()
            .map_err(|err| InstanceError::backend(std::io::Error::other(err.to_string())))?;
        let Some(instance) = instances.get_mut(&(namespace.to_owned(), name.to_owned())) else {
            return Ok(false);
        };
        state.clone_into(&mut instance.state);
        Ok(true)
    }
}

#[async_trait]
impl InstanceDirectory for InMemoryInstanceDirectory {
    async fn lookup(&self, namespace: &str, name: &str) -> InstanceResult<ManagedInstance> {
        let instances = self
            .instances
            .read()
            .map_err(|err| InstanceError::backend(std::io::Error::other(err.to_string())))?;
        instances
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| InstanceError::NotFound {
                namespace: namespace.to_owned(),
                name: name.to_owned(),
            })
    }
}
