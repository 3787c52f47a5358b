use anyhow::Result;
use async_trait::async_trait;
use common::web_api::UploadOneTimeKey;
use serde::{Deserialize, Serialize};

/// Durable record for one user's published key material: the long-lived
/// bundle fields plus the insertion-ordered pool of unconsumed one-time
/// keys. One record per partition, one partition per user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreKeyRecord {
    pub identity_key: String,
    pub signed_prekey: String,
    pub pq_prekey: String,
    pub signature: String,
    pub one_time_keys: Vec<UploadOneTimeKey>,
}

/// Connection to the per-partition durable store. Durability and crash
/// recovery are the store's responsibility; the core only requires
/// read-after-write consistency within a single partition.
///
/// Each owner must touch only its own partition. Live transport handles are
/// never part of any record written through this trait.
#[async_trait]
pub trait DurableStore: Clone + Send + Sync + 'static {
    /// Load the key record persisted for this user, if one was ever stored.
    async fn get_prekeys(&self, user_id: &str) -> Result<Option<PreKeyRecord>>;

    /// Overwrite the key record for this user. The write must be atomic
    /// with respect to concurrent reads of the same partition.
    async fn put_prekeys(&self, user_id: &str, record: &PreKeyRecord) -> Result<()>;
}
