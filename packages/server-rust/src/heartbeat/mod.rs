//! Per-service keepalive against a service registry.
//!
//! State machine: `Unregistered -> Registered -> (heartbeat) -> Registered`.
//! Any failed heartbeat, whether "not found" or a transport error, drops back
//! to `Unregistered` so the next tick registers again. Startup never blocks
//! on the registry.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use switchyard_core::RegisterPayload;
use tracing::{debug, info, warn};

use crate::registry::RegistryApi;
use crate::service::worker::{BackgroundRunnable, BackgroundWorker};

#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    /// Send a deregister call when the client stops. Off by default: a
    /// silent instance goes stale on the registry side instead.
    pub deregister_on_shutdown: bool,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            deregister_on_shutdown: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatState {
    Unregistered,
    Registered,
}

/// Commands accepted by a running heartbeat worker.
#[derive(Debug)]
pub enum HeartbeatCommand {
    /// Register now instead of waiting for the next tick.
    Register,
}

pub struct HeartbeatClient {
    registry: Arc<dyn RegistryApi>,
    payload: RegisterPayload,
    state: Arc<ArcSwap<HeartbeatState>>,
    interval: Duration,
    deregister_on_shutdown: bool,
}

impl HeartbeatClient {
    #[must_use]
    pub fn new(registry: Arc<dyn RegistryApi>, payload: RegisterPayload, config: &HeartbeatConfig) -> Self {
        Self {
            registry,
            payload,
            state: Arc::new(ArcSwap::from_pointee(HeartbeatState::Unregistered)),
            interval: config.interval,
            deregister_on_shutdown: config.deregister_on_shutdown,
        }
    }

    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.payload.service_name
    }

    #[must_use]
    pub fn state(&self) -> HeartbeatState {
        **self.state.load()
    }

    /// Shared view of the state for observers outside the worker.
    #[must_use]
    pub fn state_handle(&self) -> Arc<ArcSwap<HeartbeatState>> {
        Arc::clone(&self.state)
    }

    fn set_state(&self, state: HeartbeatState) {
        self.state.store(Arc::new(state));
    }

    /// Attempts registration. Failure is logged and leaves the client
    /// `Unregistered`.
    pub async fn register(&self) -> HeartbeatState {
        match self.registry.register(self.payload.clone()).await {
            Ok(()) => {
                info!(
                    service = %self.payload.service_name,
                    endpoint = %self.payload.endpoint,
                    "registered with service registry"
                );
                self.set_state(HeartbeatState::Registered);
            }
            Err(e) => {
                warn!(service = %self.payload.service_name, error = %e, "registration failed, will retry");
                self.set_state(HeartbeatState::Unregistered);
            }
        }
        self.state()
    }

    /// One timer tick: register if unregistered, otherwise heartbeat.
    pub async fn tick(&self) -> HeartbeatState {
        if self.state() == HeartbeatState::Unregistered {
            return self.register().await;
        }
        match self.registry.heartbeat(&self.payload.service_name).await {
            Ok(()) => {
                debug!(service = %self.payload.service_name, "heartbeat sent");
            }
            Err(e) if e.is_not_found() => {
                warn!(service = %self.payload.service_name, "registry lost this service, re-registering next tick");
                self.set_state(HeartbeatState::Unregistered);
            }
            Err(e) => {
                warn!(service = %self.payload.service_name, error = %e, "heartbeat failed");
                self.set_state(HeartbeatState::Unregistered);
            }
        }
        self.state()
    }

    /// Starts the worker and queues an immediate registration attempt.
    pub fn spawn(self) -> HeartbeatHandle {
        let state = self.state_handle();
        let interval = self.interval;
        let worker = BackgroundWorker::start(self, interval);
        if let Err(e) = worker.try_submit(HeartbeatCommand::Register) {
            warn!(error = %e, "could not queue initial registration; first tick will register");
        }
        HeartbeatHandle { worker, state }
    }
}

#[async_trait]
impl BackgroundRunnable for HeartbeatClient {
    type Task = HeartbeatCommand;

    fn name(&self) -> &'static str {
        "heartbeat"
    }

    async fn run(&mut self, task: HeartbeatCommand) {
        match task {
            HeartbeatCommand::Register => {
                self.register().await;
            }
        }
    }

    async fn on_tick(&mut self) {
        self.tick().await;
    }

    async fn shutdown(&mut self) {
        if !self.deregister_on_shutdown || self.state() != HeartbeatState::Registered {
            return;
        }
        match self.registry.deregister(&self.payload.service_name).await {
            Ok(()) => info!(service = %self.payload.service_name, "deregistered on shutdown"),
            Err(e) => warn!(service = %self.payload.service_name, error = %e, "deregister on shutdown failed"),
        }
        self.set_state(HeartbeatState::Unregistered);
    }
}

/// Running heartbeat worker.
pub struct HeartbeatHandle {
    worker: BackgroundWorker<HeartbeatClient>,
    state: Arc<ArcSwap<HeartbeatState>>,
}

impl HeartbeatHandle {
    #[must_use]
    pub fn state(&self) -> HeartbeatState {
        **self.state.load()
    }

    pub async fn stop(mut self) {
        self.worker.stop().await;
    }
}
