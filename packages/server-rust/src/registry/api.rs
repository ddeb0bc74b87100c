//! The registry contract shared by the in-process registry and its HTTP client.

use async_trait::async_trait;
use switchyard_core::{ErrorCode, RegisterPayload, ServiceDetails};

/// Errors from talking to a service registry, local or remote.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The registry has no registration under this name.
    #[error("service not registered: {service_name}")]
    NotFound { service_name: String },
    #[error("registry unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("registry answered with unexpected status {status}")]
    UnexpectedStatus { status: u16 },
    /// A 2xx body that is not the expected JSON shape.
    #[error("malformed registry response: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid registry url {url}")]
    InvalidUrl { url: String },
}

impl RegistryError {
    /// `REGISTRY_NOT_FOUND` for a missing registration, `REMOTE_UNAVAILABLE`
    /// for everything that means the registry could not be asked.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::RegistryNotFound,
            _ => ErrorCode::RemoteUnavailable,
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Operations a heartbeat client or discovery client needs from a registry.
///
/// Implemented by [`super::ServiceRegistry`] for in-process use and by
/// [`crate::discovery::HttpRegistryClient`] for a registry in another process.
#[async_trait]
pub trait RegistryApi: Send + Sync {
    /// Upserts a registration.
    async fn register(&self, payload: RegisterPayload) -> Result<(), RegistryError>;

    /// Refreshes a registration. `RegistryError::NotFound` means the caller
    /// must register again.
    async fn heartbeat(&self, service_name: &str) -> Result<(), RegistryError>;

    /// Removes a registration. `RegistryError::NotFound` if it was unknown.
    async fn deregister(&self, service_name: &str) -> Result<(), RegistryError>;

    /// Looks up the service owning an operation.
    async fn find_by_operation(
        &self,
        operation: &str,
    ) -> Result<Option<ServiceDetails>, RegistryError>;

    /// Looks up a service's connection details by name.
    async fn find_by_service_name(
        &self,
        service_name: &str,
    ) -> Result<Option<ServiceDetails>, RegistryError>;
}
