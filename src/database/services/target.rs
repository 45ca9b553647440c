//! Resolves the managed instance, endpoint and login for a resource.

use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::database::{
    domain::DatabaseResource,
    ports::{
        CredentialError, CredentialSource, InstanceDirectory, InstanceError, ManagedInstance,
        ServerTarget, SqlCredentials,
    },
};

/// Errors returned while resolving a server target.
#[derive(Debug, Clone, Error)]
pub enum TargetError {
    /// The instance lookup failed.
    #[error(transparent)]
    Instance(#[from] InstanceError),

    /// The credential lookup failed.
    #[error(transparent)]
    Credentials(#[from] CredentialError),

    /// The stored login is not valid UTF-8.
    #[error("credentials {namespace}/{name} are not valid UTF-8")]
    InvalidCredentials {
        /// Secret namespace.
        namespace: String,
        /// Secret name.
        name: String,
    },
}

/// Looks up instances and credentials for database resources.
pub struct TargetResolver<K, I>
where
    K: CredentialSource,
    I: InstanceDirectory,
{
    credentials: Arc<K>,
    instances: Arc<I>,
    default_port: u16,
}

impl<K, I> TargetResolver<K, I>
where
    K: CredentialSource,
    I: InstanceDirectory,
{
    /// Creates a resolver using `default_port` when a resource sets none.
    #[must_use]
    pub const fn new(credentials: Arc<K>, instances: Arc<I>, default_port: u16) -> Self {
        Self {
            credentials,
            instances,
            default_port,
        }
    }

    /// Looks up the instance hosting `resource`, in the resource namespace.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Instance`] when the lookup fails.
    pub async fn instance(&self, resource: &DatabaseResource) -> Result<ManagedInstance, TargetError> {
        let namespace = resource.key().namespace();
        let instance = self
            .instances
            .lookup(namespace, &resource.spec().instance)
            .await?;
        debug!(instance = %resource.spec().instance, state = %instance.state, "resolved managed instance");
        Ok(instance)
    }

    /// Builds the server target for `resource` on `instance`.
    ///
    /// The host is the resource's server override, else the instance's
    /// primary endpoint, else the `<instance>-p-svc` service. The login comes
    /// from the resource's credential reference, else the instance login.
    ///
    /// # Errors
    ///
    /// Returns [`TargetError::Credentials`] when the lookup fails and
    /// [`TargetError::InvalidCredentials`] when the login is not UTF-8.
    pub async fn target(
        &self,
        resource: &DatabaseResource,
        instance: &ManagedInstance,
    ) -> Result<ServerTarget, TargetError> {
        let spec = resource.spec();
        let (namespace, name) = spec.credentials.as_ref().map_or_else(
            || {
                (
                    instance.login_ref.namespace.clone(),
                    instance.login_ref.name.clone(),
                )
            },
            |reference| {
                (
                    reference
                        .namespace
                        .clone()
                        .unwrap_or_else(|| resource.key().namespace().to_owned()),
                    reference.name.clone(),
                )
            },
        );
        let secret = self.credentials.fetch(&namespace, &name).await?;
        let (Ok(username), Ok(password)) = (
            String::from_utf8(secret.username),
            String::from_utf8(secret.password),
        ) else {
            return Err(TargetError::InvalidCredentials { namespace, name });
        };

        let host = spec
            .server
            .clone()
            .or_else(|| instance.primary_endpoint.clone())
            .unwrap_or_else(|| format!("{}-p-svc", spec.instance));
        let port = spec.port.unwrap_or(self.default_port);
        Ok(ServerTarget::new(
            host,
            port,
            SqlCredentials::new(username, password),
        ))
    }
}
