use crate::database::{DurableStore, PreKeyRecord};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// In-process implementation of the durable store, one map entry per
/// partition. Suitable for tests and single-node deployments; a real
/// deployment points the trait at an external store instead.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    prekeys: Arc<Mutex<HashMap<String, PreKeyRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for InMemoryStore {
    async fn get_prekeys(&self, user_id: &str) -> Result<Option<PreKeyRecord>> {
        Ok(self.prekeys.lock().await.get(user_id).cloned())
    }

    async fn put_prekeys(&self, user_id: &str, record: &PreKeyRecord) -> Result<()> {
        self.prekeys
            .lock()
            .await
            .insert(user_id.to_owned(), record.clone());
        Ok(())
    }
}
