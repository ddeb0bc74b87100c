//! Process configuration from flags and `SWITCHYARD_*` environment variables.

use std::time::Duration;

use clap::{Parser, ValueEnum};
use switchyard_core::RegisterPayload;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::discovery::RemoteConfig;
use crate::heartbeat::HeartbeatConfig;
use crate::network::NetworkConfig;
use crate::registry::MonitorConfig;
use crate::service::Broker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "switchyard", version, about = "Operation broker and service registry")]
pub struct SwitchyardArgs {
    /// Bind address.
    #[arg(long, env = "SWITCHYARD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Listen port; 0 picks a free one.
    #[arg(long, env = "SWITCHYARD_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Name this instance registers under and reports on `/health`.
    #[arg(long, env = "SWITCHYARD_SERVICE_NAME", default_value = "gateway")]
    pub service_name: String,

    /// Host other instances use to reach this one.
    #[arg(long, env = "SWITCHYARD_ADVERTISED_HOST", default_value = "127.0.0.1")]
    pub advertised_host: String,

    /// Registry base URL. Without it the in-process registry is used.
    #[arg(long, env = "SWITCHYARD_REGISTRY_URL")]
    pub registry_url: Option<String>,

    /// Register with the registry and keep the registration alive.
    #[arg(long, env = "SWITCHYARD_REGISTRATION_ENABLED", default_value_t = false)]
    pub registration_enabled: bool,

    #[arg(long, env = "SWITCHYARD_HEARTBEAT_INTERVAL_SECS", default_value_t = 30)]
    pub heartbeat_interval_secs: u64,

    /// Seconds without a heartbeat before a registration counts as stale.
    #[arg(long, env = "SWITCHYARD_STALE_THRESHOLD_SECS", default_value_t = 90)]
    pub stale_threshold_secs: u64,

    #[arg(long, env = "SWITCHYARD_MONITOR_INTERVAL_SECS", default_value_t = 30)]
    pub monitor_interval_secs: u64,

    /// Deregister on shutdown instead of letting the registration go stale.
    #[arg(long, env = "SWITCHYARD_DEREGISTER_ON_SHUTDOWN", default_value_t = false)]
    pub deregister_on_shutdown: bool,

    #[arg(long, env = "SWITCHYARD_CONNECT_TIMEOUT_SECS", default_value_t = 10)]
    pub connect_timeout_secs: u64,

    #[arg(long, env = "SWITCHYARD_READ_TIMEOUT_SECS", default_value_t = 30)]
    pub read_timeout_secs: u64,

    /// Deadline for one inbound HTTP request.
    #[arg(long, env = "SWITCHYARD_REQUEST_TIMEOUT_SECS", default_value_t = 45)]
    pub request_timeout_secs: u64,

    /// Comma-separated CORS origins.
    #[arg(
        long,
        env = "SWITCHYARD_CORS_ORIGINS",
        default_value = "*",
        value_delimiter = ','
    )]
    pub cors_origins: Vec<String>,

    #[arg(long, env = "SWITCHYARD_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl SwitchyardArgs {
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            host: self.host.clone(),
            port: self.port,
            cors_origins: self.cors_origins.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            ..NetworkConfig::default()
        }
    }

    #[must_use]
    pub fn remote_config(&self) -> RemoteConfig {
        RemoteConfig {
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }

    #[must_use]
    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(self.heartbeat_interval_secs.max(1)),
            deregister_on_shutdown: self.deregister_on_shutdown,
        }
    }

    #[must_use]
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.monitor_interval_secs.max(1)),
            stale_threshold_secs: self.stale_threshold_secs,
        }
    }

    /// What this instance advertises: every locally hosted operation,
    /// reachable at `http://{advertised_host}:{port}/`.
    #[must_use]
    pub fn registration(&self, broker: &Broker, bound_port: u16) -> RegisterPayload {
        RegisterPayload {
            service_name: self.service_name.clone(),
            operations: broker.operation_names().into_iter().collect(),
            endpoint: format!("http://{}:{}/", self.advertised_host, bound_port),
            health_check: Some("/health".to_string()),
            framework: Some("switchyard".to_string()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            port: Some(bound_port),
            hosted_services: broker.hosted_services(),
        }
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
