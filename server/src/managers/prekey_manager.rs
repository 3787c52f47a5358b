use crate::database::{DurableStore, PreKeyRecord};
use crate::error::CoreError;
use common::web_api::{PreKeyResponse, StoreKeysRequest, UploadOneTimeKey};

/// Per-user owner of the published key bundle and the pool of unconsumed
/// one-time keys.
///
/// The owner directory serializes all operations for one user through one
/// instance of this manager, which is what makes the pop operations
/// exactly-once without any locking in here. Every mutation builds the
/// successor record, persists it, and only then commits it to memory, so a
/// failed durable write leaves both views at the prior state.
#[derive(Debug, Default)]
pub struct PreKeyManager {
    hydrated: bool,
    record: Option<PreKeyRecord>,
}

impl PreKeyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// An idle prekey owner can always be dropped from memory: the durable
    /// record survives and the next locate re-hydrates from it.
    pub fn is_evictable(&self) -> bool {
        true
    }

    /// Loads the persisted record before the first operation is served. A
    /// failed load leaves the owner unhydrated so that no operation can
    /// ever run against default state in place of the stored state.
    async fn ensure_hydrated<S: DurableStore>(
        &mut self,
        db: &S,
        user_id: &str,
    ) -> Result<(), CoreError> {
        if self.hydrated {
            return Ok(());
        }
        self.record = db.get_prekeys(user_id).await.map_err(CoreError::Storage)?;
        self.hydrated = true;
        Ok(())
    }

    /// Replaces the long-lived bundle fields and merges the uploaded
    /// one-time keys into the pool. An uploaded key whose id is already
    /// pooled overwrites that entry in place; new ids append in upload
    /// order.
    pub async fn store<S: DurableStore>(
        &mut self,
        db: &S,
        user_id: &str,
        request: StoreKeysRequest,
    ) -> Result<(), CoreError> {
        self.ensure_hydrated(db, user_id).await?;

        let mut next = PreKeyRecord {
            identity_key: request.identity_key,
            signed_prekey: request.signed_prekey,
            pq_prekey: request.pq_prekey,
            signature: request.signature,
            one_time_keys: self
                .record
                .as_ref()
                .map(|record| record.one_time_keys.clone())
                .unwrap_or_default(),
        };
        for otk in request.one_time_keys {
            merge_one_time_key(&mut next.one_time_keys, otk);
        }

        db.put_prekeys(user_id, &next)
            .await
            .map_err(CoreError::Storage)?;
        self.record = Some(next);
        Ok(())
    }

    /// Returns the bundle plus at most one one-time key, popped from the
    /// front of the pool. An exhausted pool yields an empty key list, not
    /// an error; a user with no stored bundle yields `BundleNotFound`.
    pub async fn fetch<S: DurableStore>(
        &mut self,
        db: &S,
        user_id: &str,
    ) -> Result<PreKeyResponse, CoreError> {
        self.ensure_hydrated(db, user_id).await?;

        let record = self.record.as_ref().ok_or(CoreError::BundleNotFound)?;
        let mut next = record.clone();
        let popped = if next.one_time_keys.is_empty() {
            None
        } else {
            Some(next.one_time_keys.remove(0))
        };

        if popped.is_some() {
            db.put_prekeys(user_id, &next)
                .await
                .map_err(CoreError::Storage)?;
            self.record = Some(next.clone());
        }

        Ok(PreKeyResponse {
            identity_key: next.identity_key,
            signed_prekey: next.signed_prekey,
            pq_prekey: next.pq_prekey,
            signature: next.signature,
            one_time_keys: popped.into_iter().collect(),
        })
    }

    /// Pops the oldest unconsumed one-time key without the bundle fields.
    /// `EmptyPool` when nothing is left to hand out.
    pub async fn consume_one_time_key<S: DurableStore>(
        &mut self,
        db: &S,
        user_id: &str,
    ) -> Result<UploadOneTimeKey, CoreError> {
        self.ensure_hydrated(db, user_id).await?;

        let record = match self.record.as_ref() {
            Some(record) if !record.one_time_keys.is_empty() => record,
            _ => return Err(CoreError::EmptyPool),
        };

        let mut next = record.clone();
        let popped = next.one_time_keys.remove(0);
        db.put_prekeys(user_id, &next)
            .await
            .map_err(CoreError::Storage)?;
        self.record = Some(next);
        Ok(popped)
    }
}

fn merge_one_time_key(pool: &mut Vec<UploadOneTimeKey>, otk: UploadOneTimeKey) {
    match pool
        .iter_mut()
        .find(|existing| existing.key_id == otk.key_id)
    {
        Some(existing) => existing.key = otk.key,
        None => pool.push(otk),
    }
}
