use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::messages::{RegisterPayload, ServiceDetails};

/// Milliseconds since the Unix epoch.
///
/// A clock set before 1970 reads as 0 rather than failing.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Health of a registered service as seen by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

/// A sub-service hosted inside a registered process (e.g. one handler of a
/// gateway that hosts several).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostedService {
    pub service_name: String,
    #[serde(default)]
    pub operations: Vec<String>,
}

/// A service's advertised identity, operation set, and health, as held by
/// the registry. Keyed by `service_name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub service_name: String,
    pub operations: BTreeSet<String>,
    pub endpoint: String,
    pub health_check_path: Option<String>,
    pub framework: Option<String>,
    pub version: Option<String>,
    pub port: Option<u16>,
    pub status: ServiceStatus,
    /// Milliseconds since the epoch of the last register or heartbeat.
    pub last_heartbeat: u64,
    pub registered_at: u64,
    pub hosted_services: Vec<HostedService>,
}

impl Registration {
    /// Builds a fresh, healthy registration from a register payload.
    #[must_use]
    pub fn from_payload(payload: RegisterPayload, now_ms: u64) -> Self {
        Self {
            service_name: payload.service_name,
            operations: payload.operations.into_iter().collect(),
            endpoint: payload.endpoint,
            health_check_path: payload.health_check,
            framework: payload.framework,
            version: payload.version,
            port: payload.port,
            status: ServiceStatus::Healthy,
            last_heartbeat: now_ms,
            registered_at: now_ms,
            hosted_services: payload.hosted_services,
        }
    }

    /// Every operation this registration owns: its own plus those of its
    /// hosted sub-services, deduplicated.
    #[must_use]
    pub fn all_operations(&self) -> BTreeSet<String> {
        let mut ops = self.operations.clone();
        for hosted in &self.hosted_services {
            ops.extend(hosted.operations.iter().cloned());
        }
        ops
    }

    /// Returns `true` if the registration hosts a sub-service with this name.
    #[must_use]
    pub fn hosts(&self, service_name: &str) -> bool {
        self.hosted_services
            .iter()
            .any(|h| h.service_name == service_name)
    }

    /// Staleness predicate: more than `threshold_secs` since the last heartbeat.
    #[must_use]
    pub fn is_stale_at(&self, threshold_secs: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat) > threshold_secs.saturating_mul(1000)
    }

    /// Staleness against the wall clock.
    #[must_use]
    pub fn is_stale(&self, threshold_secs: u64) -> bool {
        self.is_stale_at(threshold_secs, now_millis())
    }

    /// Connection details in the shape returned by discovery lookups.
    #[must_use]
    pub fn details(&self) -> ServiceDetails {
        ServiceDetails {
            service_name: self.service_name.clone(),
            endpoint: self.endpoint.clone(),
            health_check: self.health_check_path.clone(),
            framework: self.framework.clone(),
            status: self.status,
            operations: self.all_operations().into_iter().collect(),
            last_heartbeat: self.last_heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RegisterPayload {
        RegisterPayload {
            service_name: "gateway".to_string(),
            operations: vec!["ls".to_string(), "ls".to_string(), "mkdir".to_string()],
            endpoint: "http://host:9090".to_string(),
            hosted_services: vec![HostedService {
                service_name: "notes".to_string(),
                operations: vec!["addNote".to_string(), "ls".to_string()],
            }],
            ..RegisterPayload::default()
        }
    }

    #[test]
    fn from_payload_starts_healthy_and_dedups_operations() {
        let reg = Registration::from_payload(payload(), 1_000);
        assert_eq!(reg.status, ServiceStatus::Healthy);
        assert_eq!(reg.last_heartbeat, 1_000);
        assert_eq!(reg.registered_at, 1_000);
        assert_eq!(reg.operations.len(), 2);
    }

    #[test]
    fn all_operations_merges_hosted_services() {
        let reg = Registration::from_payload(payload(), 0);
        let ops: Vec<_> = reg.all_operations().into_iter().collect();
        assert_eq!(ops, vec!["addNote", "ls", "mkdir"]);
        assert!(reg.hosts("notes"));
        assert!(!reg.hosts("files"));
    }

    #[test]
    fn staleness_is_strictly_greater_than_threshold() {
        let reg = Registration::from_payload(payload(), 10_000);
        assert!(!reg.is_stale_at(5, 15_000));
        assert!(reg.is_stale_at(5, 15_001));
        // A heartbeat from the "future" (clock skew) is never stale.
        assert!(!reg.is_stale_at(0, 9_000));
    }

    #[test]
    fn now_millis_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }
}
