//! Backend responses → tool schema.
//!
//! Pure functions only; no I/O. A response missing optional keys produces
//! `None` fields. A response whose shape cannot be read at all produces a
//! [`NormalizeError`], which the caller attributes to the right server (or
//! the router) as `malformed_response`. Dozzle data is loosely typed and
//! never fails to normalize.

pub mod dozzle;
pub mod mikrotik;
pub mod netdata;

pub use dozzle::{dozzle_hosts, find_container, raw_dozzle_to_container, raw_dozzle_to_logs};
pub use mikrotik::{
    raw_mikrotik_to_interface, raw_mikrotik_to_lease, raw_mikrotik_to_resource,
    raw_mikrotik_to_traffic,
};
pub use netdata::{
    raw_netdata_to_agent_info, raw_netdata_to_container, raw_netdata_to_health,
    raw_netdata_to_network, RawContainer, RawHealth, RawInterface, RawNetwork,
};

use crate::error::{ErrorDescriptor, ErrorKind};

/// The upstream answered, but not in a shape we can read.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct NormalizeError(String);

impl NormalizeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn to_descriptor(&self) -> ErrorDescriptor {
        ErrorDescriptor::new(ErrorKind::MalformedResponse, self.0.clone())
    }
}
