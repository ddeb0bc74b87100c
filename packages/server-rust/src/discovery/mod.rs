//! Client-side discovery: finding which endpoint serves an operation.

pub mod http;
pub mod remote;

use std::sync::Arc;

use switchyard_core::ServiceDetails;
use tracing::debug;

use crate::registry::{RegistryApi, RegistryError};

pub use http::HttpRegistryClient;
pub use remote::{RemoteConfig, RemoteError, RemoteInvoker, RemoteReply};

/// Where a service lives, as learned from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoint {
    pub service_name: String,
    /// Base URL, e.g. `http://10.0.0.5:9090/`.
    pub endpoint: String,
    pub health_check: Option<String>,
}

impl ResolvedEndpoint {
    #[must_use]
    pub fn from_details(details: ServiceDetails) -> Self {
        Self {
            service_name: details.service_name,
            endpoint: details.endpoint,
            health_check: details.health_check,
        }
    }

    /// `endpoint + operation`, inserting the separator if the registered
    /// endpoint lacks a trailing slash. The remote side serves this on its
    /// operation-addressed route.
    #[must_use]
    pub fn operation_url(&self, operation: &str) -> String {
        join_url(&self.endpoint, operation)
    }

    /// Health probe URL, defaulting the path to `/health`.
    #[must_use]
    pub fn health_url(&self) -> String {
        join_url(&self.endpoint, self.health_check.as_deref().unwrap_or("/health"))
    }
}

/// Joins a base URL and a path with exactly one `/` between them.
#[must_use]
pub fn join_url(base: &str, path: &str) -> String {
    let path = path.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Resolves operations and service names against a registry.
#[derive(Clone)]
pub struct DiscoveryClient {
    registry: Arc<dyn RegistryApi>,
}

impl DiscoveryClient {
    #[must_use]
    pub fn new(registry: Arc<dyn RegistryApi>) -> Self {
        Self { registry }
    }

    /// Finds the owner of `operation`, then fetches its current details by
    /// name. `Ok(None)` if either lookup comes back empty.
    ///
    /// # Errors
    ///
    /// Returns the registry error if the registry could not be queried.
    pub async fn resolve_operation(
        &self,
        operation: &str,
    ) -> Result<Option<ResolvedEndpoint>, RegistryError> {
        let Some(owner) = self.registry.find_by_operation(operation).await? else {
            debug!(operation, "no registered owner");
            return Ok(None);
        };
        self.resolve_service(&owner.service_name).await
    }

    /// Fetches a service's details by name.
    ///
    /// # Errors
    ///
    /// Returns the registry error if the registry could not be queried.
    pub async fn resolve_service(
        &self,
        service_name: &str,
    ) -> Result<Option<ResolvedEndpoint>, RegistryError> {
        Ok(self
            .registry
            .find_by_service_name(service_name)
            .await?
            .map(ResolvedEndpoint::from_details))
    }
}

impl std::fmt::Debug for DiscoveryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveryClient").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use switchyard_core::RegisterPayload;

    use super::*;
    use crate::registry::ServiceRegistry;

    #[test]
    fn join_url_inserts_exactly_one_slash() {
        assert_eq!(join_url("http://h:1", "ls"), "http://h:1/ls");
        assert_eq!(join_url("http://h:1/", "ls"), "http://h:1/ls");
        assert_eq!(join_url("http://h:1/", "/health"), "http://h:1/health");
        assert_eq!(join_url("http://h:1/api", "/health"), "http://h:1/api/health");
    }

    #[test]
    fn health_url_defaults_path() {
        let endpoint = ResolvedEndpoint {
            service_name: "files".to_string(),
            endpoint: "http://h:1".to_string(),
            health_check: None,
        };
        assert_eq!(endpoint.health_url(), "http://h:1/health");
        assert_eq!(endpoint.operation_url("mkdir"), "http://h:1/mkdir");

        let custom = ResolvedEndpoint {
            health_check: Some("/status".to_string()),
            ..endpoint
        };
        assert_eq!(custom.health_url(), "http://h:1/status");
    }

    #[tokio::test]
    async fn resolves_operation_through_owner() {
        let registry = Arc::new(ServiceRegistry::new());
        registry.register(RegisterPayload {
            service_name: "files".to_string(),
            operations: vec!["ls".to_string()],
            endpoint: "http://files:9090/".to_string(),
            health_check: Some("/health".to_string()),
            ..RegisterPayload::default()
        });
        let discovery = DiscoveryClient::new(registry);

        let resolved = discovery.resolve_operation("ls").await.unwrap().unwrap();
        assert_eq!(resolved.service_name, "files");
        assert_eq!(resolved.operation_url("ls"), "http://files:9090/ls");

        assert!(discovery.resolve_operation("rm").await.unwrap().is_none());
        assert!(discovery.resolve_service("ghost").await.unwrap().is_none());
    }
}
