//! Operation dispatch.
//!
//! 1. **Binding** (`binder`): request params -> validated `Args`
//! 2. **Tables** (`operation`): per-handler operation descriptors
//! 3. **Broker** (`broker`): synchronous local dispatch into an envelope
//! 4. **Gateway** (`gateway`): async broker front with remote fallback
//! 5. **Middleware** (`middleware`): Tower layers over the gateway
//! 6. **Built-in handlers** (`domain`)
//! 7. **Background workers** (`worker`): heartbeat and health sweeps

pub mod binder;
pub mod broker;
pub mod domain;
pub mod gateway;
pub mod middleware;
pub mod operation;
pub mod worker;

pub use binder::{Constraint, ParamKind, ParamSpec, ParameterBinder};
pub use broker::{Broker, ENVELOPE_VERSION};
pub use gateway::{Gateway, GatewayReply};
pub use operation::{
    Args, DispatchError, OperationDescriptor, OperationTable, Reply, TableError,
};
pub use worker::{BackgroundRunnable, BackgroundWorker};
