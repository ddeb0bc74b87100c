//! Switchyard instance: hosts the built-in handlers, the service registry
//! endpoints, and optionally keeps itself registered with a registry.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use switchyard_server::config::{init_tracing, SwitchyardArgs};
use switchyard_server::discovery::{DiscoveryClient, HttpRegistryClient, RemoteInvoker};
use switchyard_server::heartbeat::HeartbeatClient;
use switchyard_server::registry::{HealthMonitor, RegistryApi, ServiceRegistry};
use switchyard_server::service::{domain, Broker, Gateway};
use switchyard_server::NetworkModule;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = SwitchyardArgs::parse();
    init_tracing(args.log_format);

    let registry = Arc::new(ServiceRegistry::new());
    let broker = Arc::new(Broker::new([
        domain::echo_service()?,
        domain::mesh_service(Arc::clone(&registry))?,
    ]));
    info!(handlers = ?broker.handler_names(), "handlers loaded");

    let remote_config = args.remote_config();
    let registry_api: Arc<dyn RegistryApi> = match &args.registry_url {
        Some(url) => {
            info!(registry = %url, "using remote service registry");
            Arc::new(
                HttpRegistryClient::new(url, &remote_config)
                    .with_context(|| format!("invalid registry url {url}"))?,
            )
        }
        None => registry.clone(),
    };

    let gateway = Gateway::new(
        Arc::clone(&broker),
        RemoteInvoker::new(&remote_config).context("building http client")?,
    )
    .with_discovery(DiscoveryClient::new(Arc::clone(&registry_api)))
    .with_self_service(args.service_name.clone());

    let mut network = NetworkModule::new(
        args.network_config(),
        gateway,
        Arc::clone(&registry),
        &args.service_name,
    )
    .with_stale_threshold(args.stale_threshold_secs);
    let port = network.start().await?;

    let mut monitor = HealthMonitor::spawn(Arc::clone(&registry), &args.monitor_config());

    let heartbeat = if args.registration_enabled {
        let payload = args.registration(&broker, port);
        Some(HeartbeatClient::new(registry_api, payload, &args.heartbeat_config()).spawn())
    } else {
        None
    };

    network
        .serve(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "ctrl-c handler failed, shutting down");
            }
            info!("shutdown signal received");
        })
        .await?;

    if let Some(heartbeat) = heartbeat {
        heartbeat.stop().await;
    }
    monitor.stop().await;
    info!("stopped");
    Ok(())
}
