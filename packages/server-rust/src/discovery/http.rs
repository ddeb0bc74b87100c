//! `RegistryApi` over HTTP, for processes that talk to a registry elsewhere.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use switchyard_core::{RegisterPayload, ServiceDetails};
use tracing::debug;

use super::remote::RemoteConfig;
use crate::registry::{RegistryApi, RegistryError};

/// HTTP client for the `/registry/*` endpoints.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpRegistryClient {
    /// # Errors
    ///
    /// Returns `RegistryError::InvalidUrl` if `base_url` does not parse as an
    /// absolute URL, or `Transport` if the HTTP client cannot be built.
    pub fn new(base_url: &str, config: &RemoteConfig) -> Result<Self, RegistryError> {
        let base_url = Url::parse(base_url).map_err(|_| RegistryError::InvalidUrl {
            url: base_url.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RegistryError::InvalidUrl {
                url: base_url.to_string(),
            });
        }
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()?;
        Ok(Self { base_url, client })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends percent-encoded segments to the base URL.
    fn url(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| RegistryError::InvalidUrl {
                url: self.base_url.to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post(&self, url: Url, service_name: &str) -> Result<(), RegistryError> {
        let response = self.client.post(url).send().await?;
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RegistryError::NotFound {
                service_name: service_name.to_string(),
            }),
            s => Err(RegistryError::UnexpectedStatus { status: s.as_u16() }),
        }
    }

    async fn get_details(&self, url: Url) -> Result<Option<ServiceDetails>, RegistryError> {
        let response = self.client.get(url).send().await?;
        match response.status() {
            s if s.is_success() => {
                let body = response.bytes().await?;
                Ok(Some(serde_json::from_slice(&body)?))
            }
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(RegistryError::UnexpectedStatus { status: s.as_u16() }),
        }
    }
}

#[async_trait]
impl RegistryApi for HttpRegistryClient {
    async fn register(&self, payload: RegisterPayload) -> Result<(), RegistryError> {
        let url = self.url(&["registry", "register"])?;
        debug!(%url, service = %payload.service_name, "registering");
        let response = self.client.post(url).json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RegistryError::UnexpectedStatus {
                status: status.as_u16(),
            })
        }
    }

    async fn heartbeat(&self, service_name: &str) -> Result<(), RegistryError> {
        let url = self.url(&["registry", "heartbeat", service_name])?;
        self.post(url, service_name).await
    }

    async fn deregister(&self, service_name: &str) -> Result<(), RegistryError> {
        let url = self.url(&["registry", "deregister", service_name])?;
        self.post(url, service_name).await
    }

    async fn find_by_operation(
        &self,
        operation: &str,
    ) -> Result<Option<ServiceDetails>, RegistryError> {
        let url = self.url(&["registry", "services", "by-operation", operation])?;
        self.get_details(url).await
    }

    async fn find_by_service_name(
        &self,
        service_name: &str,
    ) -> Result<Option<ServiceDetails>, RegistryError> {
        let url = self.url(&["registry", "services", service_name, "details"])?;
        self.get_details(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpRegistryClient {
        HttpRegistryClient::new(base, &RemoteConfig::default()).unwrap()
    }

    #[test]
    fn builds_registry_urls_with_or_without_trailing_slash() {
        let url = client("http://registry:8080").url(&["registry", "heartbeat", "files"]).unwrap();
        assert_eq!(url.as_str(), "http://registry:8080/registry/heartbeat/files");

        let url = client("http://registry:8080/mesh/").url(&["registry", "register"]).unwrap();
        assert_eq!(url.as_str(), "http://registry:8080/mesh/registry/register");
    }

    #[test]
    fn encodes_path_segments() {
        let url = client("http://registry:8080/")
            .url(&["registry", "services", "a b/c", "details"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://registry:8080/registry/services/a%20b%2Fc/details"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(matches!(
            HttpRegistryClient::new("not a url", &RemoteConfig::default()),
            Err(RegistryError::InvalidUrl { .. })
        ));
        assert!(matches!(
            HttpRegistryClient::new("mailto:ops@example.com", &RemoteConfig::default()),
            Err(RegistryError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn malformed_details_body_is_a_decode_error() {
        use axum::routing::get;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let router = axum::Router::new().route(
            "/registry/services/by-operation/{operation}",
            get(|| async { "not json" }),
        );
        let server = tokio::spawn(async move { axum::serve(listener, router).await });

        let err = client(&format!("http://127.0.0.1:{port}/"))
            .find_by_operation("ls")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Decode(_)), "{err:?}");
        assert_eq!(err.code(), switchyard_core::ErrorCode::RemoteUnavailable);
        server.abort();
    }

    #[tokio::test]
    async fn unreachable_registry_is_a_transport_error() {
        let err = client("http://127.0.0.1:1/")
            .heartbeat("files")
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Transport(_)));
        assert_eq!(err.code(), switchyard_core::ErrorCode::RemoteUnavailable);
    }
}
