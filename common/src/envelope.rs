use serde::{Deserialize, Serialize};

/// An end-to-end encrypted message in transit. The ciphertext is opaque to
/// the server; only the `from`/`to` routing fields are interpreted here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEnvelope {
    pub id: String,
    pub from: String,
    pub to: String,
    pub ciphertext: String,
    pub timestamp: u64,
    pub r#type: String,
}

impl MessageEnvelope {
    /// Frame type used on the websocket for messages that should be relayed
    /// to the peer session.
    pub const RELAY_TYPE: &'static str = "relay";

    pub fn is_relay(&self) -> bool {
        self.r#type == Self::RELAY_TYPE
    }
}
