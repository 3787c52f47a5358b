use serde::{Deserialize, Serialize};

/// A single one-time key as uploaded by the owning client. The `key_id` is
/// chosen by the client; this server never checks it for uniqueness.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadOneTimeKey {
    pub key_id: u32,
    pub key: String,
}

/// Body of the PUT keys request: the long-lived bundle fields plus a batch
/// of one-time keys to merge into the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreKeysRequest {
    pub identity_key: String,
    pub signed_prekey: String,
    pub pq_prekey: String,
    pub signature: String,
    #[serde(default)]
    pub one_time_keys: Vec<UploadOneTimeKey>,
}

/// Response to a bundle fetch. `one_time_keys` holds at most one entry;
/// an empty list means the pool was exhausted, not that the user is gone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreKeyResponse {
    pub identity_key: String,
    pub signed_prekey: String,
    pub pq_prekey: String,
    pub signature: String,
    pub one_time_keys: Vec<UploadOneTimeKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectRequest {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisconnectRequest {
    pub session_id: String,
}

/// Outcome of a relay attempt. `reason` is only present when the envelope
/// was not delivered; the message-send path uses it to decide whether the
/// envelope must go through the offline queue instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelayResponse {
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RelayResponse {
    pub fn delivered() -> Self {
        Self {
            delivered: true,
            reason: None,
        }
    }

    pub fn recipient_offline() -> Self {
        Self {
            delivered: false,
            reason: Some("recipient_offline".to_owned()),
        }
    }
}

/// Bookkeeping view of one tracked session. Live transport handles are
/// deliberately absent from this shape; it is safe to serialize.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionInfo {
    pub session_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub connected_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionStatusResponse {
    pub active_connections: usize,
    pub sessions: Vec<SessionInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}
