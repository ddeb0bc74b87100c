//! Periodic sweep that marks silent services unhealthy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use switchyard_core::now_millis;
use tracing::warn;

use super::ServiceRegistry;
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

/// Sweep period and staleness threshold.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub interval: Duration,
    pub stale_threshold_secs: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stale_threshold_secs: 90,
        }
    }
}

/// Marks stale registrations `UNHEALTHY`. Never evicts; a later heartbeat
/// brings the service back.
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    stale_threshold_secs: u64,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(registry: Arc<ServiceRegistry>, stale_threshold_secs: u64) -> Self {
        Self {
            registry,
            stale_threshold_secs,
        }
    }

    /// Spawns the monitor on a background worker.
    pub fn spawn(registry: Arc<ServiceRegistry>, config: &MonitorConfig) -> BackgroundWorker<Self> {
        BackgroundWorker::start(
            Self::new(registry, config.stale_threshold_secs),
            config.interval,
        )
    }

    /// One sweep at `now_ms`. Returns the names newly marked unhealthy.
    pub fn sweep_at(&self, now_ms: u64) -> Vec<String> {
        self.registry
            .mark_stale_unhealthy_at(self.stale_threshold_secs, now_ms)
            .into_iter()
            .map(|registration| {
                warn!(
                    service = %registration.service_name,
                    last_heartbeat = registration.last_heartbeat,
                    threshold_secs = self.stale_threshold_secs,
                    "service missed heartbeats, marked unhealthy"
                );
                registration.service_name
            })
            .collect()
    }
}

#[async_trait]
impl BackgroundRunnable for HealthMonitor {
    type Task = ();

    fn name(&self) -> &'static str {
        "health-monitor"
    }

    async fn run(&mut self, _task: ()) {
        self.sweep_at(now_millis());
    }

    async fn on_tick(&mut self) {
        self.sweep_at(now_millis());
    }
}

#[cfg(test)]
mod tests {
    use switchyard_core::{RegisterPayload, ServiceStatus};

    use super::*;

    fn register(registry: &ServiceRegistry, name: &str, at: u64) {
        registry.register_at(
            RegisterPayload {
                service_name: name.to_string(),
                operations: vec![format!("{name}Op")],
                endpoint: "http://localhost:1/".to_string(),
                ..RegisterPayload::default()
            },
            at,
        );
    }

    #[test]
    fn sweep_marks_only_stale_services() {
        let registry = Arc::new(ServiceRegistry::new());
        register(&registry, "quiet", 0);
        register(&registry, "chatty", 100_000);

        let monitor = HealthMonitor::new(Arc::clone(&registry), 90);
        assert_eq!(monitor.sweep_at(120_000), vec!["quiet".to_string()]);

        let quiet = registry.find_by_service_name("quiet").unwrap();
        assert_eq!(quiet.status, ServiceStatus::Unhealthy);
        assert_eq!(
            registry.find_by_service_name("chatty").unwrap().status,
            ServiceStatus::Healthy
        );
        // Not evicted.
        assert!(registry.find_by_operation("quietOp").is_some());

        // Already unhealthy: not reported twice.
        assert!(monitor.sweep_at(130_000).is_empty());
    }

    #[test]
    fn heartbeat_recovers_a_marked_service() {
        let registry = Arc::new(ServiceRegistry::new());
        register(&registry, "quiet", 0);
        HealthMonitor::new(Arc::clone(&registry), 10).sweep_at(60_000);

        registry.heartbeat_at("quiet", 61_000).unwrap();
        assert_eq!(
            registry.find_by_service_name("quiet").unwrap().status,
            ServiceStatus::Healthy
        );
    }

    #[tokio::test]
    async fn spawned_monitor_stops_cleanly() {
        let registry = Arc::new(ServiceRegistry::new());
        let mut worker = HealthMonitor::spawn(registry, &MonitorConfig::default());
        worker.submit(()).await.unwrap();
        worker.stop().await;
    }
}
