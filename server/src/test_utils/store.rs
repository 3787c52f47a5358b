use crate::database::{DurableStore, PreKeyRecord};
use crate::in_memory_db::InMemoryStore;
use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// In-memory store whose operations can be switched to fail, for exercising
/// the storage-failure paths without an external collaborator.
#[derive(Clone, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_gets: Arc<AtomicBool>,
    fail_puts: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_gets(&self, fail: bool) {
        self.fail_gets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl DurableStore for FaultyStore {
    async fn get_prekeys(&self, user_id: &str) -> Result<Option<PreKeyRecord>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            bail!("injected get failure");
        }
        self.inner.get_prekeys(user_id).await
    }

    async fn put_prekeys(&self, user_id: &str, record: &PreKeyRecord) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("injected put failure");
        }
        self.inner.put_prekeys(user_id, record).await
    }
}
