//! HTTP handlers and the shared state they extract.

pub mod health;
pub mod registry;
pub mod submit;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use registry::{
    all_services_handler, by_operation_handler, deregister_handler, details_handler,
    heartbeat_handler, mark_unhealthy_handler, register_handler, service_health_handler,
    stale_services_handler,
};
pub use submit::{operation_handler, submit_handler};

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use switchyard_core::{ErrorCode, ErrorEntry};

use super::ShutdownController;
use crate::registry::ServiceRegistry;
use crate::service::middleware::MetricsService;
use crate::service::Gateway;

/// Shared application state passed to all axum handlers via `State`.
///
/// Everything is `Arc` or cheaply clonable.
#[derive(Clone)]
pub struct AppState {
    /// Gateway wrapped in the dispatch metrics layer; `/submitRequest` goes here.
    pub dispatcher: MetricsService<Gateway>,
    pub gateway: Gateway,
    pub registry: Arc<ServiceRegistry>,
    pub shutdown: Arc<ShutdownController>,
    /// Name this instance reports on `/health`.
    pub service_name: Arc<str>,
    /// Default for `GET /registry/stale` without a threshold.
    pub stale_threshold_secs: u64,
}

/// `status` plus a single [`ErrorEntry`] body.
pub(crate) fn error_reply(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorEntry::new(code, message))).into_response()
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::discovery::{DiscoveryClient, RemoteConfig, RemoteInvoker};
    use crate::service::middleware::MetricsLayer;
    use crate::service::{domain, Broker};
    use tower::Layer;

    /// State with the built-in handlers, a local registry, and Ready health.
    pub(crate) fn app_state() -> AppState {
        let registry = Arc::new(ServiceRegistry::new());
        let broker = Arc::new(Broker::new([
            domain::echo_service().unwrap(),
            domain::mesh_service(Arc::clone(&registry)).unwrap(),
        ]));
        let gateway = Gateway::new(broker, RemoteInvoker::new(&RemoteConfig::default()).unwrap())
            .with_discovery(DiscoveryClient::new(registry.clone()))
            .with_self_service("gateway");
        let shutdown = Arc::new(ShutdownController::new());
        shutdown.set_ready();
        AppState {
            dispatcher: MetricsLayer.layer(gateway.clone()),
            gateway,
            registry,
            shutdown,
            service_name: Arc::from("gateway"),
            stale_threshold_secs: 90,
        }
    }
}
