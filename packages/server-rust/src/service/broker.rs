//! Synchronous dispatch engine.
//!
//! `Broker::submit` resolves a handler, looks up the operation, binds and
//! validates parameters, invokes the operation, and wraps the outcome in a
//! uniform [`Response`]. It never panics and never returns an error: every
//! path ends in a well-formed envelope.

use std::any::Any;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use switchyard_core::{HostedService, Request, Response};
use tracing::{debug, warn};

use super::binder::ParameterBinder;
use super::operation::{DispatchError, OperationTable, Reply};

/// Version stamped into every envelope the broker builds.
pub const ENVELOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Routes requests to the operation tables of locally hosted handlers.
///
/// Handler tables are fixed at construction; there is no hot reload.
#[derive(Debug, Default)]
pub struct Broker {
    /// Sorted so the fallback name scan is deterministic.
    handlers: BTreeMap<String, Arc<OperationTable>>,
}

impl Broker {
    /// Creates a broker hosting the given handler tables.
    ///
    /// A later table with the same handler key replaces an earlier one.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = OperationTable>) -> Self {
        let mut handlers = BTreeMap::new();
        for table in tables {
            let key = table.handler().to_string();
            if handlers.insert(key.clone(), Arc::new(table)).is_some() {
                warn!(handler = %key, "handler registered twice; keeping the later table");
            }
        }
        Self { handlers }
    }

    /// Dispatches one request and returns its envelope.
    #[must_use]
    pub fn submit(&self, request: &Request) -> Response {
        match self.dispatch(request) {
            Ok(Reply::Envelope(envelope)) => envelope,
            Ok(Reply::Value(data)) => {
                debug!(
                    service = %request.service,
                    operation = %request.operation,
                    request_id = %request.request_id,
                    "dispatch succeeded"
                );
                Response::success(request.request_id.clone(), data)
                    .for_call(&request.service, &request.operation)
                    .with_version(ENVELOPE_VERSION)
                    .with_encrypt(request.encrypt)
            }
            Err(err) => {
                debug!(
                    service = %request.service,
                    operation = %request.operation,
                    request_id = %request.request_id,
                    code = err.code().as_str(),
                    error = %err,
                    "dispatch failed"
                );
                Response::failure(request.request_id.clone(), err.into_entries())
                    .for_call(&request.service, &request.operation)
                    .with_version(ENVELOPE_VERSION)
                    .with_encrypt(request.encrypt)
            }
        }
    }

    fn dispatch(&self, request: &Request) -> Result<Reply, DispatchError> {
        if request.service.is_empty() {
            return Err(DispatchError::MissingField { field: "service" });
        }
        let table = self
            .resolve_handler(&request.service)
            .ok_or_else(|| DispatchError::ServiceNotFound {
                service: request.service.clone(),
            })?;
        Self::invoke_on(table, request)
    }

    /// Dispatches against an already-resolved handler table.
    fn invoke_on(table: &OperationTable, request: &Request) -> Result<Reply, DispatchError> {
        if request.operation.is_empty() {
            return Err(DispatchError::MissingField { field: "operation" });
        }
        let descriptor =
            table
                .get(&request.operation)
                .ok_or_else(|| DispatchError::OperationNotExposed {
                    service: request.service.clone(),
                    operation: request.operation.clone(),
                })?;

        let args = ParameterBinder::bind(descriptor.params(), &request.params)?;

        match panic::catch_unwind(AssertUnwindSafe(|| descriptor.invoke(&args))) {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(err)) => Err(DispatchError::Invocation {
                message: format!("{err:#}"),
            }),
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(
                    handler = table.handler(),
                    operation = %request.operation,
                    panic = %message,
                    "operation panicked"
                );
                Err(DispatchError::Invocation { message })
            }
        }
    }

    /// Dispatches a request that arrived on an operation-addressed route.
    ///
    /// If the named service is not hosted here but exactly one local handler
    /// exposes the operation, that handler serves the call.
    #[must_use]
    pub fn submit_operation(&self, request: &Request) -> Response {
        if self.resolve_handler(&request.service).is_none() {
            if let Some(table) = self.unique_handler_for(&request.operation) {
                let mut routed = request.clone();
                routed.service = table.handler().to_string();
                return self.submit(&routed);
            }
        }
        self.submit(request)
    }

    /// Two-phase handler lookup: exact key first, then a case-insensitive
    /// match on the full key or on its simple name.
    ///
    /// The simple name is the segment after the last `.` or `::`, so a
    /// request for `notes` finds a handler registered as `app.notes`.
    #[must_use]
    pub fn resolve_handler(&self, name: &str) -> Option<&Arc<OperationTable>> {
        if name.is_empty() {
            return None;
        }
        if let Some(table) = self.handlers.get(name) {
            return Some(table);
        }
        let wanted = simple_name(name);
        self.handlers
            .iter()
            .find(|(key, _)| {
                key.eq_ignore_ascii_case(name) || simple_name(key).eq_ignore_ascii_case(wanted)
            })
            .map(|(_, table)| table)
    }

    fn unique_handler_for(&self, operation: &str) -> Option<&Arc<OperationTable>> {
        let mut owners = self.handlers.values().filter(|t| t.contains(operation));
        match (owners.next(), owners.next()) {
            (Some(table), None) => Some(table),
            _ => None,
        }
    }

    /// Returns `true` if any local handler exposes `operation`.
    #[must_use]
    pub fn hosts_operation(&self, operation: &str) -> bool {
        self.handlers.values().any(|t| t.contains(operation))
    }

    /// Handler keys, sorted.
    #[must_use]
    pub fn handler_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    /// Union of all operations exposed by local handlers.
    #[must_use]
    pub fn operation_names(&self) -> BTreeSet<String> {
        self.handlers
            .values()
            .flat_map(|t| t.operation_names())
            .collect()
    }

    /// Local handlers in the shape advertised to the service registry.
    #[must_use]
    pub fn hosted_services(&self) -> Vec<HostedService> {
        self.handlers
            .values()
            .map(|t| HostedService {
                service_name: t.handler().to_string(),
                operations: t.operation_names(),
            })
            .collect()
    }
}

fn simple_name(name: &str) -> &str {
    name.rsplit(['.', ':']).next().unwrap_or(name)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "operation panicked".to_string()
    }
}
