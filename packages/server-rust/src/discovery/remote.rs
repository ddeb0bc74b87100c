//! Forwarding a request envelope to the instance that owns its operation.

use std::time::Duration;

use bytes::Bytes;
use switchyard_core::Request;
use tracing::{debug, warn};

use super::ResolvedEndpoint;

/// Outbound HTTP timeouts.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("failed to build http client: {0}")]
    Client(reqwest::Error),
    #[error("remote call to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Raw remote answer, relayed to the caller without reinterpretation.
#[derive(Debug, Clone)]
pub struct RemoteReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Outbound HTTP for forwarded requests and health probes.
#[derive(Debug, Clone)]
pub struct RemoteInvoker {
    client: reqwest::Client,
}

impl RemoteInvoker {
    /// # Errors
    ///
    /// Returns `RemoteError::Client` if the TLS backend cannot initialize.
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .build()
            .map_err(RemoteError::Client)?;
        Ok(Self { client })
    }

    /// POSTs the envelope as JSON and returns whatever came back, any status.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::Transport` on connect failure, timeout, or a
    /// body that could not be read.
    pub async fn forward(&self, url: &str, request: &Request) -> Result<RemoteReply, RemoteError> {
        let transport = |source| RemoteError::Transport {
            url: url.to_string(),
            source,
        };
        debug!(url, operation = %request.operation, "forwarding request");
        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(ToString::to_string);
        let body = response.bytes().await.map_err(transport)?;
        Ok(RemoteReply {
            status,
            content_type,
            body,
        })
    }

    /// GETs the endpoint's health URL. Any 2xx is healthy; everything else,
    /// transport failures included, is not.
    pub async fn check_health(&self, endpoint: &ResolvedEndpoint) -> bool {
        let url = endpoint.health_url();
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(url, error = %e, service = %endpoint.service_name, "health probe failed");
                false
            }
        }
    }
}
