use serde::{Deserialize, Serialize};

/// Server → Client: welcome payload, always the first frame on a connection.
/// Sent as: `EVENT connection.established { client_id: "c7", tenant: "acme", protocol: 1 }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEstablished {
    pub client_id: String,
    pub tenant: String,
    pub protocol: u32,
}

impl ConnectionEstablished {
    pub fn new(client_id: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant: tenant.into(),
            protocol: crate::PROTOCOL_VERSION,
        }
    }
}
