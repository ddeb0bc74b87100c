//! HTTP server lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the listener (so the
//! real port is known before registration), `serve()` runs until the
//! shutdown future resolves and then drains.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower::Layer;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    all_services_handler, by_operation_handler, deregister_handler, details_handler,
    health_handler, heartbeat_handler, liveness_handler, mark_unhealthy_handler,
    operation_handler, readiness_handler, register_handler, service_health_handler,
    stale_services_handler, submit_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::registry::ServiceRegistry;
use crate::service::middleware::MetricsLayer;
use crate::service::Gateway;

pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    gateway: Gateway,
    registry: Arc<ServiceRegistry>,
    shutdown: Arc<ShutdownController>,
    service_name: Arc<str>,
    stale_threshold_secs: u64,
}

impl NetworkModule {
    #[must_use]
    pub fn new(
        config: NetworkConfig,
        gateway: Gateway,
        registry: Arc<ServiceRegistry>,
        service_name: &str,
    ) -> Self {
        Self {
            config,
            listener: None,
            gateway,
            registry,
            shutdown: Arc::new(ShutdownController::new()),
            service_name: Arc::from(service_name),
            stale_threshold_secs: 90,
        }
    }

    /// Default threshold for `GET /registry/stale`.
    #[must_use]
    pub fn with_stale_threshold(mut self, secs: u64) -> Self {
        self.stale_threshold_secs = secs;
        self
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn app_state(&self) -> AppState {
        AppState {
            dispatcher: MetricsLayer.layer(self.gateway.clone()),
            gateway: self.gateway.clone(),
            registry: Arc::clone(&self.registry),
            shutdown: Arc::clone(&self.shutdown),
            service_name: Arc::clone(&self.service_name),
            stale_threshold_secs: self.stale_threshold_secs,
        }
    }

    /// Routes:
    /// - `POST /submitRequest`, `POST /{operation}`
    /// - `POST /registry/register`, `/registry/heartbeat/{name}`,
    ///   `/registry/deregister/{name}`, `/registry/unhealthy/{name}`
    /// - `GET /registry/services`, `/registry/services/by-operation/{op}`,
    ///   `/registry/services/{name}/details`, `/registry/services/{name}/health`,
    ///   `/registry/stale`
    /// - `GET /health`, `/health/live`, `/health/ready`
    ///
    /// Static routes win over `/{operation}`: operations named
    /// `submitRequest` or `health` are not reachable on the forwarding route.
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/submitRequest", post(submit_handler))
            .route("/registry/register", post(register_handler))
            .route("/registry/heartbeat/{service_name}", post(heartbeat_handler))
            .route("/registry/deregister/{service_name}", post(deregister_handler))
            .route("/registry/unhealthy/{service_name}", post(mark_unhealthy_handler))
            .route("/registry/services", get(all_services_handler))
            .route(
                "/registry/services/by-operation/{operation}",
                get(by_operation_handler),
            )
            .route(
                "/registry/services/{service_name}/details",
                get(details_handler),
            )
            .route(
                "/registry/services/{service_name}/health",
                get(service_health_handler),
            )
            .route("/registry/stale", get(stale_services_handler))
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/{operation}", post(operation_handler))
            .layer(build_http_layers(&self.config))
            .with_state(self.app_state())
    }

    /// Binds the listener and returns the bound port (OS-assigned when the
    /// configured port is 0).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();
        info!(host = %self.config.host, port, "listener bound");
        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves until `shutdown` resolves, then drains in-flight submissions.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called or the server hits a
    /// fatal I/O error.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;
        let router = self.build_router();
        let controller = Arc::clone(&self.shutdown);
        let drain_timeout = self.config.drain_timeout;

        controller.set_ready();
        info!(service = %self.service_name, "serving");

        let signal = Arc::clone(&controller);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                signal.begin_drain();
            })
            .await?;

        drain(&controller, drain_timeout).await;
        Ok(())
    }
}

async fn drain(controller: &ShutdownController, timeout: Duration) {
    controller.begin_drain();
    if controller.wait_for_drain(timeout).await {
        info!("in-flight submissions drained");
    } else {
        warn!(
            remaining = controller.in_flight_count(),
            "drain timeout expired with submissions in flight"
        );
    }
}
