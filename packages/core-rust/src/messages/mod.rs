//! Wire messages exchanged over the `Switchyard` HTTP surface.
//!
//! All structs use `#[serde(rename_all = "camelCase")]` so the JSON matches
//! what non-Rust services in the mesh send and expect.

pub mod envelope;
pub mod registry;

pub use envelope::{ErrorCode, ErrorEntry, Request, Response};
pub use registry::{
    HealthBody, MessageBody, RegisterAck, RegisterPayload, ServiceDetails, ServiceHealth,
};
