//! Built-in handlers hosted by every instance.
//!
//! - `echoSvc`: connectivity checks (`echo`, `sum`).
//! - `mesh`: read-only view of the service registry (`listServices`,
//!   `describe`).

use std::sync::Arc;

use serde_json::Value;

use crate::registry::ServiceRegistry;
use crate::service::binder::ParamSpec;
use crate::service::operation::{
    Args, OperationDescriptor, OperationTable, Reply, TableError,
};

pub const ECHO_SERVICE: &str = "echoSvc";
pub const MESH_SERVICE: &str = "mesh";

fn echo(args: &Args) -> anyhow::Result<Reply> {
    Ok(Value::from(args.str("msg")?).into())
}

fn sum(args: &Args) -> anyhow::Result<Reply> {
    let total = args
        .list("values")?
        .iter()
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| anyhow::anyhow!("values must be numbers, got {v}"))
        })
        .sum::<anyhow::Result<f64>>()?;
    Ok(Value::from(total).into())
}

/// `echoSvc` handler table.
///
/// # Errors
///
/// Never in practice; the table is static.
pub fn echo_service() -> Result<OperationTable, TableError> {
    OperationTable::builder(ECHO_SERVICE)
        .operation(
            OperationDescriptor::implicit(echo)
                .param(ParamSpec::string("msg").max_length(4096)),
        )
        .operation(OperationDescriptor::implicit(sum).param(ParamSpec::list("values")))
        .build()
}

/// `mesh` handler table over the process-local registry.
///
/// # Errors
///
/// Never in practice; the table is static.
pub fn mesh_service(registry: Arc<ServiceRegistry>) -> Result<OperationTable, TableError> {
    let list_registry = Arc::clone(&registry);
    OperationTable::builder(MESH_SERVICE)
        .operation(OperationDescriptor::named("listServices", move |_args| {
            let details: Vec<_> = list_registry
                .all_services()
                .iter()
                .map(switchyard_core::Registration::details)
                .collect();
            Reply::value(&details)
        }))
        .operation(
            OperationDescriptor::named("describe", move |args| {
                let name = args.str("serviceName")?;
                let registration = registry
                    .find_by_service_name(name)
                    .ok_or_else(|| anyhow::anyhow!("service not registered: {name}"))?;
                Reply::value(&registration)
            })
            .param(ParamSpec::string("serviceName").not_blank()),
        )
        .build()
}
