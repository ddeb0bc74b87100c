//! Async front of the broker with discovery fallback.
//!
//! A request is first dispatched locally. Only when the local broker answers
//! `SERVICE_NOT_FOUND` or `OPERATION_NOT_EXPOSED` does the gateway ask the
//! registry who owns the operation and forward the original request there.

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use switchyard_core::{ErrorCode, ErrorEntry, Request, Response, ServiceHealth};
use tower::Service;
use tracing::{debug, warn};

use super::broker::{Broker, ENVELOPE_VERSION};
use crate::discovery::{DiscoveryClient, RemoteInvoker, RemoteReply};

/// Outcome of a gateway dispatch.
#[derive(Debug, Clone)]
pub enum GatewayReply {
    /// Envelope built in this process.
    Local(Response),
    /// Status and body relayed verbatim from the remote owner.
    Forwarded(RemoteReply),
}

impl GatewayReply {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        match self {
            Self::Local(response) => response.ok,
            Self::Forwarded(reply) => (200..300).contains(&reply.status),
        }
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Local(response) if response.ok => "ok",
            Self::Local(_) => "error",
            Self::Forwarded(_) => "forwarded",
        }
    }

    #[must_use]
    pub fn local(&self) -> Option<&Response> {
        match self {
            Self::Local(response) => Some(response),
            Self::Forwarded(_) => None,
        }
    }
}

/// Local broker plus optional discovery.
///
/// Cheap to clone; every clone shares the same broker.
#[derive(Debug, Clone)]
pub struct Gateway {
    broker: Arc<Broker>,
    discovery: Option<DiscoveryClient>,
    invoker: RemoteInvoker,
    /// Registered name of this process; never a forwarding target.
    self_service: Option<String>,
}

impl Gateway {
    #[must_use]
    pub fn new(broker: Arc<Broker>, invoker: RemoteInvoker) -> Self {
        Self {
            broker,
            discovery: None,
            invoker,
            self_service: None,
        }
    }

    #[must_use]
    pub fn with_discovery(mut self, discovery: DiscoveryClient) -> Self {
        self.discovery = Some(discovery);
        self
    }

    #[must_use]
    pub fn with_self_service(mut self, name: impl Into<String>) -> Self {
        self.self_service = Some(name.into());
        self
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Dispatches locally, forwarding to the operation's registered owner
    /// when this process does not serve it.
    pub async fn dispatch(&self, request: Request) -> GatewayReply {
        let local = self.run_local(request.clone(), Broker::submit).await;
        if !Self::wants_remote(&local, &request) {
            return GatewayReply::Local(local);
        }
        let Some(discovery) = &self.discovery else {
            return GatewayReply::Local(local);
        };

        let endpoint = match discovery.resolve_operation(&request.operation).await {
            Ok(Some(endpoint)) => endpoint,
            Ok(None) => {
                debug!(operation = %request.operation, "no remote owner, answering locally");
                return GatewayReply::Local(local);
            }
            Err(e) => {
                warn!(operation = %request.operation, error = %e, "registry lookup failed");
                return GatewayReply::Local(remote_unavailable(
                    &request,
                    format!("service registry unavailable: {e}"),
                ));
            }
        };
        if self.self_service.as_deref() == Some(endpoint.service_name.as_str()) {
            debug!(operation = %request.operation, "registry points back at this service");
            return GatewayReply::Local(local);
        }

        let url = endpoint.operation_url(&request.operation);
        match self.invoker.forward(&url, &request).await {
            Ok(reply) => {
                debug!(
                    operation = %request.operation,
                    target = %endpoint.service_name,
                    status = reply.status,
                    "forwarded"
                );
                GatewayReply::Forwarded(reply)
            }
            Err(e) => {
                warn!(target = %endpoint.service_name, error = %e, "remote invocation failed");
                GatewayReply::Local(remote_unavailable(&request, e.to_string()))
            }
        }
    }

    /// Dispatches a request that arrived on the operation-addressed route.
    /// Always local.
    pub async fn dispatch_operation(&self, request: Request) -> Response {
        self.run_local(request, Broker::submit_operation).await
    }

    /// Resolves a service through discovery and probes its health URL.
    /// Unknown services and lookup failures are reported unhealthy.
    pub async fn service_health(&self, service_name: &str) -> ServiceHealth {
        let healthy = match &self.discovery {
            Some(discovery) => match discovery.resolve_service(service_name).await {
                Ok(Some(endpoint)) => self.invoker.check_health(&endpoint).await,
                Ok(None) => false,
                Err(e) => {
                    warn!(service = service_name, error = %e, "health lookup failed");
                    false
                }
            },
            None => false,
        };
        ServiceHealth {
            service_name: service_name.to_string(),
            healthy,
        }
    }

    /// Runs the synchronous broker on the blocking pool.
    async fn run_local(&self, request: Request, f: fn(&Broker, &Request) -> Response) -> Response {
        let broker = Arc::clone(&self.broker);
        let request_id = request.request_id.clone();
        let (service, operation) = (request.service.clone(), request.operation.clone());
        match tokio::task::spawn_blocking(move || f(&broker, &request)).await {
            Ok(response) => response,
            Err(e) => Response::error(
                request_id,
                ErrorEntry::new(ErrorCode::InvocationError, format!("dispatch task failed: {e}")),
            )
            .for_call(&service, &operation)
            .with_version(ENVELOPE_VERSION),
        }
    }

    fn wants_remote(local: &Response, request: &Request) -> bool {
        !request.operation.is_empty()
            && matches!(
                local.first_code(),
                Some(ErrorCode::ServiceNotFound | ErrorCode::OperationNotExposed)
            )
    }
}

fn remote_unavailable(request: &Request, message: String) -> Response {
    Response::error(
        request.request_id.clone(),
        ErrorEntry::new(ErrorCode::RemoteUnavailable, message),
    )
    .for_call(&request.service, &request.operation)
    .with_version(ENVELOPE_VERSION)
    .with_encrypt(request.encrypt)
}

impl Service<Request> for Gateway {
    type Response = GatewayReply;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<GatewayReply, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let gateway = self.clone();
        Box::pin(async move { Ok(gateway.dispatch(request).await) })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use switchyard_core::RegisterPayload;
    use tower::ServiceExt;

    use super::*;
    use crate::discovery::RemoteConfig;
    use crate::registry::ServiceRegistry;
    use crate::service::domain;

    fn gateway() -> (Gateway, Arc<ServiceRegistry>) {
        let registry = Arc::new(ServiceRegistry::new());
        let broker = Arc::new(Broker::new([domain::echo_service().unwrap()]));
        let invoker = RemoteInvoker::new(&RemoteConfig::default()).unwrap();
        let gateway = Gateway::new(broker, invoker)
            .with_discovery(DiscoveryClient::new(registry.clone()))
            .with_self_service("gateway");
        (gateway, registry)
    }

    fn local(reply: GatewayReply) -> Response {
        match reply {
            GatewayReply::Local(response) => response,
            GatewayReply::Forwarded(r) => panic!("unexpected forward: {r:?}"),
        }
    }

    #[tokio::test]
    async fn local_operations_never_touch_discovery() {
        let (gateway, _) = gateway();
        let request = Request::new("echoSvc", "echo").param("msg", "hi");
        let response = local(gateway.oneshot(request).await.unwrap());
        assert!(response.ok);
        assert_eq!(response.data, Some(json!("hi")));
    }

    #[tokio::test]
    async fn unknown_operation_without_owner_keeps_local_error() {
        let (gateway, _) = gateway();
        let response = local(gateway.dispatch(Request::new("files", "ls")).await);
        assert_eq!(response.first_code(), Some(ErrorCode::ServiceNotFound));
    }

    #[tokio::test]
    async fn binding_errors_are_not_forwarded() {
        let (gateway, registry) = gateway();
        registry.register(RegisterPayload {
            service_name: "other".to_string(),
            operations: vec!["echo".to_string()],
            endpoint: "http://127.0.0.1:1/".to_string(),
            ..RegisterPayload::default()
        });
        let response = local(gateway.dispatch(Request::new("echoSvc", "echo")).await);
        assert_eq!(response.first_code(), Some(ErrorCode::MissingParameter));
    }

    #[tokio::test]
    async fn never_forwards_to_itself() {
        let (gateway, registry) = gateway();
        registry.register(RegisterPayload {
            service_name: "gateway".to_string(),
            operations: vec!["ls".to_string()],
            endpoint: "http://127.0.0.1:1/".to_string(),
            ..RegisterPayload::default()
        });
        let response = local(gateway.dispatch(Request::new("files", "ls")).await);
        assert_eq!(response.first_code(), Some(ErrorCode::ServiceNotFound));
    }

    #[tokio::test]
    async fn dead_remote_yields_remote_unavailable() {
        let (gateway, registry) = gateway();
        registry.register(RegisterPayload {
            service_name: "files".to_string(),
            operations: vec!["ls".to_string()],
            endpoint: "http://127.0.0.1:1/".to_string(),
            ..RegisterPayload::default()
        });
        let request = Request::new("files", "ls").with_request_id("r-9");
        let response = local(gateway.dispatch(request).await);
        assert!(!response.ok);
        assert_eq!(response.first_code(), Some(ErrorCode::RemoteUnavailable));
        assert_eq!(response.request_id, "r-9");
    }

    #[tokio::test]
    async fn operation_route_uses_unique_local_handler() {
        let (gateway, _) = gateway();
        let request = Request::new("somewhereElse", "sum").param("values", json!([1, 2, 3]));
        let response = gateway.dispatch_operation(request).await;
        assert!(response.ok, "{response:?}");
        assert_eq!(response.data, Some(json!(6.0)));
    }

    #[tokio::test]
    async fn health_of_unknown_service_is_unhealthy() {
        let (gateway, _) = gateway();
        let health = gateway.service_health("ghost").await;
        assert_eq!(health.service_name, "ghost");
        assert!(!health.healthy);
    }
}
