use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Canonical session key for an unordered pair of participants: the two ids
/// sorted lexicographically and joined with `:`, so both sides of a
/// conversation resolve to the same owner no matter who initiated.
pub fn canonical_session_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("{a}:{b}")
    } else {
        format!("{b}:{a}")
    }
}

struct OwnerSlot<O> {
    owner: Arc<Mutex<O>>,
    last_used: Instant,
}

/// Maps a logical key to the single in-memory owner of that key's state.
///
/// The outer map lock is held only to look up or insert a slot, never
/// across an owner operation. The per-owner mutex is the serialization
/// point, so its grain is exactly the key grain: operations on one key run
/// strictly one at a time (tokio's mutex queues waiters FIFO), while owners
/// of different keys never block each other.
///
/// Owners are created empty and hydrate lazily from the durable store under
/// their own lock, so the load happens before the first operation applies.
pub struct OwnerDirectory<O> {
    slots: Arc<Mutex<HashMap<String, OwnerSlot<O>>>>,
}

impl<O> Clone for OwnerDirectory<O> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<O: Default> OwnerDirectory<O> {
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the owner handle for `key`, creating the owner on first use.
    /// Two locates with the same key yield the same owner for as long as
    /// the slot lives.
    pub async fn locate(&self, key: &str) -> Arc<Mutex<O>> {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(key.to_owned()).or_insert_with(|| OwnerSlot {
            owner: Arc::new(Mutex::new(O::default())),
            last_used: Instant::now(),
        });
        slot.last_used = Instant::now();
        slot.owner.clone()
    }

    /// Drops owners idle for at least `max_idle` that report themselves
    /// evictable. A slot whose handle is still held elsewhere is never
    /// removed, otherwise a second owner for the same key could be created
    /// while an operation on the first is still in flight.
    pub async fn evict_idle<F>(&self, max_idle: Duration, evictable: F) -> usize
    where
        F: Fn(&O) -> bool,
    {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| {
            if slot.last_used.elapsed() < max_idle {
                return true;
            }
            if Arc::strong_count(&slot.owner) > 1 {
                return true;
            }
            match slot.owner.try_lock() {
                Ok(owner) => !evictable(&owner),
                Err(_) => true,
            }
        });
        before - slots.len()
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }
}

impl<O: Default> Default for OwnerDirectory<O> {
    fn default() -> Self {
        Self::new()
    }
}
