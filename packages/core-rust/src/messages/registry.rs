//! Payloads for the service registry HTTP surface.

use serde::{Deserialize, Serialize};

use crate::types::{HostedService, ServiceStatus};

/// Body of `POST /registry/register`.
///
/// Only `serviceName` and `endpoint` are needed to route to a service; the
/// rest is advertised metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub service_name: String,
    #[serde(default)]
    pub operations: Vec<String>,
    pub endpoint: String,
    #[serde(default, alias = "healthCheckPath", skip_serializing_if = "Option::is_none")]
    pub health_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framework: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosted_services: Vec<HostedService>,
}

/// Answer to a successful registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAck {
    pub message: String,
    pub service_name: String,
}

/// Generic `{message}` body used by heartbeat, deregister, and error replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Connection details and health of one registered service.
///
/// Returned by the by-operation and details lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetails {
    pub service_name: String,
    pub endpoint: String,
    #[serde(default)]
    pub health_check: Option<String>,
    #[serde(default)]
    pub framework: Option<String>,
    pub status: ServiceStatus,
    #[serde(default)]
    pub operations: Vec<String>,
    #[serde(default)]
    pub last_heartbeat: u64,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthBody {
    pub status: String,
    pub service: String,
    pub timestamp: u64,
}

/// Result of an active health check against a registered service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub service_name: String,
    pub healthy: bool,
}
