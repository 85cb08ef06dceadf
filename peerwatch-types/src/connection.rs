//! Metadata describing an established connection to a device.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// What the connection layer learned about a peer during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// Human-readable device name announced by the peer.
    pub device_name: String,
    /// Name of the peer's client software.
    pub client_name: String,
    /// Version of the peer's client software.
    pub client_version: String,
    /// Transport kind, e.g. `tcp-client` or `relay-server`.
    pub connection_type: String,
    /// Remote address, when the transport exposes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<SocketAddr>,
}

impl ConnectionInfo {
    /// Create connection info without a remote address.
    pub fn new(
        device_name: impl Into<String>,
        client_name: impl Into<String>,
        client_version: impl Into<String>,
        connection_type: impl Into<String>,
    ) -> Self {
        Self {
            device_name: device_name.into(),
            client_name: client_name.into(),
            client_version: client_version.into(),
            connection_type: connection_type.into(),
            addr: None,
        }
    }

    /// Attach the remote address.
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = Some(addr);
        self
    }
}
