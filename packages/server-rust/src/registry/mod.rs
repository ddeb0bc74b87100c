//! In-memory service registry.
//!
//! Holds `serviceName -> Registration` plus an `operation -> serviceName`
//! index. Both live behind one `parking_lot::RwLock`, so every method is
//! atomic with respect to the pair. The registry never expires anything on
//! its own: staleness is a derived predicate that callers evaluate.

pub mod api;
pub mod monitor;

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use switchyard_core::{
    now_millis, RegisterPayload, Registration, ServiceDetails, ServiceStatus,
};
use tracing::{debug, info};

pub use api::{RegistryApi, RegistryError};
pub use monitor::{HealthMonitor, MonitorConfig};

#[derive(Debug, Default)]
struct RegistryState {
    services: HashMap<String, Registration>,
    /// Operation -> owning service. Last registration wins.
    by_operation: HashMap<String, String>,
}

impl RegistryState {
    /// Releases index entries for `ops` that still point at `service_name`.
    ///
    /// A released operation passes to the most recently registered other
    /// service that still lists it; otherwise the entry is dropped.
    fn unindex<'a>(&mut self, service_name: &str, ops: impl IntoIterator<Item = &'a String>) {
        for op in ops {
            if !self.by_operation.get(op).is_some_and(|owner| owner == service_name) {
                continue;
            }
            let successor = self
                .services
                .values()
                .filter(|r| r.service_name != service_name && r.all_operations().contains(op))
                .max_by(|a, b| {
                    (a.registered_at, &a.service_name).cmp(&(b.registered_at, &b.service_name))
                })
                .map(|r| r.service_name.clone());
            match successor {
                Some(next) => {
                    debug!(operation = %op, from = %service_name, to = %next, "operation ownership moved");
                    self.by_operation.insert(op.clone(), next);
                }
                None => {
                    self.by_operation.remove(op);
                }
            }
        }
    }
}

/// Process-local registry of network-reachable services.
///
/// Construct one at startup and share it via `Arc`.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    state: RwLock<RegistryState>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a registration, stamping it healthy as of now.
    pub fn register(&self, payload: RegisterPayload) -> Registration {
        self.register_at(payload, now_millis())
    }

    /// Upserts a registration with an explicit timestamp.
    ///
    /// The service's index entries are rebuilt, not merged: operations it
    /// previously owned but no longer lists are removed.
    pub fn register_at(&self, payload: RegisterPayload, now_ms: u64) -> Registration {
        let registration = Registration::from_payload(payload, now_ms);
        let name = registration.service_name.clone();
        let operations = registration.all_operations();

        let mut state = self.state.write();
        if let Some(previous) = state.services.get(&name) {
            let dropped: Vec<String> = previous
                .all_operations()
                .into_iter()
                .filter(|op| !operations.contains(op))
                .collect();
            state.unindex(&name, &dropped);
        }
        for op in &operations {
            if let Some(owner) = state.by_operation.insert(op.clone(), name.clone()) {
                if owner != name {
                    debug!(operation = %op, from = %owner, to = %name, "operation ownership moved");
                }
            }
        }
        state.services.insert(name.clone(), registration.clone());
        drop(state);

        info!(
            service = %name,
            endpoint = %registration.endpoint,
            operations = operations.len(),
            "service registered"
        );
        registration
    }

    /// Refreshes `lastHeartbeat` and marks the service healthy.
    ///
    /// Returns the new heartbeat timestamp.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the service is not registered.
    pub fn heartbeat(&self, service_name: &str) -> Result<u64, RegistryError> {
        self.heartbeat_at(service_name, now_millis())
    }

    /// Heartbeat with an explicit timestamp. The stored timestamp never
    /// moves backwards.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::NotFound` if the service is not registered.
    pub fn heartbeat_at(&self, service_name: &str, now_ms: u64) -> Result<u64, RegistryError> {
        let mut state = self.state.write();
        let registration =
            state
                .services
                .get_mut(service_name)
                .ok_or_else(|| RegistryError::NotFound {
                    service_name: service_name.to_string(),
                })?;
        registration.last_heartbeat = registration.last_heartbeat.max(now_ms);
        registration.status = ServiceStatus::Healthy;
        Ok(registration.last_heartbeat)
    }

    /// Looks up a registration by name, falling back to a registration that
    /// hosts a sub-service of that name.
    #[must_use]
    pub fn find_by_service_name(&self, service_name: &str) -> Option<Registration> {
        let state = self.state.read();
        if let Some(registration) = state.services.get(service_name) {
            return Some(registration.clone());
        }
        let mut hosts: Vec<&Registration> = state
            .services
            .values()
            .filter(|r| r.hosts(service_name))
            .collect();
        hosts.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        hosts.first().map(|r| (*r).clone())
    }

    /// Looks up the registration owning an operation.
    #[must_use]
    pub fn find_by_operation(&self, operation: &str) -> Option<Registration> {
        let state = self.state.read();
        state
            .by_operation
            .get(operation)
            .and_then(|owner| state.services.get(owner))
            .cloned()
    }

    /// Snapshot of every registration, sorted by service name.
    #[must_use]
    pub fn all_services(&self) -> Vec<Registration> {
        let mut services: Vec<Registration> = self.state.read().services.values().cloned().collect();
        services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        services
    }

    /// Removes a registration and the index entries it still owns.
    ///
    /// Returns the removed registration; unknown names are a no-op.
    pub fn deregister(&self, service_name: &str) -> Option<Registration> {
        let mut state = self.state.write();
        let removed = state.services.remove(service_name)?;
        state.unindex(service_name, &removed.all_operations());
        drop(state);
        info!(service = %service_name, "service deregistered");
        Some(removed)
    }

    /// Explicit unhealthy signal. Returns `false` if the service is unknown.
    pub fn mark_unhealthy(&self, service_name: &str) -> bool {
        let mut state = self.state.write();
        match state.services.get_mut(service_name) {
            Some(registration) => {
                registration.status = ServiceStatus::Unhealthy;
                true
            }
            None => false,
        }
    }

    /// Marks every HEALTHY registration that is stale at `now_ms` as
    /// UNHEALTHY, checking and flipping under one write lock so a concurrent
    /// heartbeat is never overwritten.
    ///
    /// Returns the registrations that changed, sorted by service name.
    pub fn mark_stale_unhealthy_at(&self, threshold_secs: u64, now_ms: u64) -> Vec<Registration> {
        let mut state = self.state.write();
        let mut marked: Vec<Registration> = state
            .services
            .values_mut()
            .filter(|r| r.status == ServiceStatus::Healthy && r.is_stale_at(threshold_secs, now_ms))
            .map(|r| {
                r.status = ServiceStatus::Unhealthy;
                r.clone()
            })
            .collect();
        drop(state);
        marked.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        marked
    }

    /// Staleness predicate for a registration.
    #[must_use]
    pub fn is_stale(registration: &Registration, threshold_secs: u64) -> bool {
        registration.is_stale(threshold_secs)
    }

    /// Registrations whose last heartbeat is older than the threshold.
    #[must_use]
    pub fn stale_services_at(&self, threshold_secs: u64, now_ms: u64) -> Vec<Registration> {
        let mut stale: Vec<Registration> = self
            .state
            .read()
            .services
            .values()
            .filter(|r| r.is_stale_at(threshold_secs, now_ms))
            .cloned()
            .collect();
        stale.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        stale
    }

    #[must_use]
    pub fn stale_services(&self, threshold_secs: u64) -> Vec<Registration> {
        self.stale_services_at(threshold_secs, now_millis())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.read().services.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.read().services.is_empty()
    }
}

#[async_trait]
impl RegistryApi for ServiceRegistry {
    async fn register(&self, payload: RegisterPayload) -> Result<(), RegistryError> {
        ServiceRegistry::register(self, payload);
        Ok(())
    }

    async fn heartbeat(&self, service_name: &str) -> Result<(), RegistryError> {
        ServiceRegistry::heartbeat(self, service_name).map(|_| ())
    }

    async fn deregister(&self, service_name: &str) -> Result<(), RegistryError> {
        ServiceRegistry::deregister(self, service_name)
            .map(|_| ())
            .ok_or_else(|| RegistryError::NotFound {
                service_name: service_name.to_string(),
            })
    }

    async fn find_by_operation(
        &self,
        operation: &str,
    ) -> Result<Option<ServiceDetails>, RegistryError> {
        Ok(ServiceRegistry::find_by_operation(self, operation).map(|r| r.details()))
    }

    async fn find_by_service_name(
        &self,
        service_name: &str,
    ) -> Result<Option<ServiceDetails>, RegistryError> {
        Ok(ServiceRegistry::find_by_service_name(self, service_name).map(|r| r.details()))
    }
}
