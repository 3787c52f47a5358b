use crate::database::DurableStore;
use crate::dispatch::{canonical_session_key, OwnerDirectory};
use crate::managers::prekey_manager::PreKeyManager;
use crate::managers::session_manager::SessionManager;
use crate::socket::MessageSink;
use common::envelope::MessageEnvelope;
use common::web_api::RelayResponse;

/// Shared state of the coordination core: the durable-store connection and
/// one owner directory per key kind. Prekey owners are keyed by user id,
/// session owners by session key; keeping the directories separate keeps
/// the two key spaces isolated.
pub struct ServerState<S: DurableStore, T: MessageSink> {
    pub db: S,
    pub prekeys: OwnerDirectory<PreKeyManager>,
    pub sessions: OwnerDirectory<SessionManager<T>>,
}

impl<S: DurableStore, T: MessageSink> Clone for ServerState<S, T> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            prekeys: self.prekeys.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<S: DurableStore, T: MessageSink> ServerState<S, T> {
    pub fn new(db: S) -> Self {
        Self {
            db,
            prekeys: OwnerDirectory::new(),
            sessions: OwnerDirectory::new(),
        }
    }

    /// Routes an envelope to the owner of the participants' canonical
    /// session key and reports the relay outcome. Used by the HTTP relay
    /// endpoint and by inbound websocket frames alike.
    pub async fn relay(&self, envelope: &MessageEnvelope) -> RelayResponse {
        let session_key = canonical_session_key(&envelope.from, &envelope.to);
        let owner = self.sessions.locate(&session_key).await;
        let registry = owner.lock().await;
        registry.relay(envelope).await
    }
}
