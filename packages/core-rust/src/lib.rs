//! `Switchyard` Core: request/response envelope, error taxonomy, and registry payloads.
//!
//! Everything here is plain serde data shared by the broker, the registry
//! HTTP surface, and the HTTP clients that talk to it.

pub mod messages;
pub mod types;

pub use messages::{
    ErrorCode, ErrorEntry, HealthBody, MessageBody, RegisterAck, RegisterPayload, Request,
    Response, ServiceDetails, ServiceHealth,
};
pub use types::{now_millis, HostedService, Registration, ServiceStatus};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
