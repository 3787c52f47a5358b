use crate::dispatch::canonical_session_key;
use crate::socket::MessageSink;
use common::envelope::MessageEnvelope;
use common::web_api::{RelayResponse, SessionInfo, SessionStatusResponse};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;
use tracing::debug;

struct SessionEntry<T: MessageSink> {
    info: SessionInfo,
    // Live transport handle; process-local, never serialized. An entry
    // registered over plain HTTP has no handle yet and counts as offline.
    sink: Option<Arc<Mutex<T>>>,
}

/// Per-session-key owner of the live connection table and the relay
/// decision.
///
/// Nothing in here is ever written to the durable store: liveness is
/// authoritative only in this process's memory, so after a restart every
/// session is simply absent and a relay reports the recipient offline
/// rather than erroring.
pub struct SessionManager<T: MessageSink> {
    connections: HashMap<String, SessionEntry<T>>,
}

impl<T: MessageSink> Default for SessionManager<T> {
    fn default() -> Self {
        Self {
            connections: HashMap::new(),
        }
    }
}

impl<T: MessageSink> SessionManager<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session owner may only leave memory once no connection is tracked;
    /// evicting a live entry would silently drop its transport handle.
    pub fn is_evictable(&self) -> bool {
        self.connections.is_empty()
    }

    /// Registers a session, replacing any prior entry for the same id.
    /// Reconnecting is not an error: the last connect wins.
    pub fn connect(
        &mut self,
        session_id: String,
        user_id: Option<String>,
        sink: Option<Arc<Mutex<T>>>,
    ) {
        let info = SessionInfo {
            session_id: session_id.clone(),
            user_id,
            connected_at: epoch_millis(),
        };
        self.connections.insert(session_id, SessionEntry { info, sink });
    }

    /// Removes a session. Unknown ids are a no-op so that racing close
    /// paths can all call this safely.
    pub fn disconnect(&mut self, session_id: &str) {
        self.connections.remove(session_id);
    }

    /// Attempts synchronous delivery to the live transport of the session
    /// shared by the envelope's two participants. `delivered: false` is the
    /// signal for the send path to fall back to queued delivery; this
    /// manager itself never queues or retries.
    pub async fn relay(&self, envelope: &MessageEnvelope) -> RelayResponse {
        let session_key = canonical_session_key(&envelope.from, &envelope.to);
        let Some(entry) = self.connections.get(&session_key) else {
            debug!(%session_key, "relay: no session tracked");
            return RelayResponse::recipient_offline();
        };
        let Some(sink) = entry.sink.as_ref() else {
            debug!(%session_key, "relay: session has no live transport");
            return RelayResponse::recipient_offline();
        };

        let mut sink = sink.lock().await;
        if !sink.is_open() {
            return RelayResponse::recipient_offline();
        }
        match sink.send_envelope(envelope).await {
            Ok(()) => RelayResponse::delivered(),
            Err(error) => {
                debug!(%session_key, %error, "relay: send failed, reporting offline");
                RelayResponse::recipient_offline()
            }
        }
    }

    /// Diagnostic snapshot; not used for delivery decisions.
    pub fn status(&self) -> SessionStatusResponse {
        SessionStatusResponse {
            active_connections: self.connections.len(),
            sessions: self
                .connections
                .values()
                .map(|entry| entry.info.clone())
                .collect(),
        }
    }
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}

#[cfg(test)]
mod session_manager_tests {
    use super::*;
    use crate::test_utils::sink::MockSink;

    fn envelope(from: &str, to: &str) -> MessageEnvelope {
        MessageEnvelope {
            id: "m1".to_owned(),
            from: from.to_owned(),
            to: to.to_owned(),
            ciphertext: "ct".to_owned(),
            timestamp: 1,
            r#type: "relay".to_owned(),
        }
    }

    #[tokio::test]
    async fn relay_without_connection_reports_recipient_offline() {
        let manager: SessionManager<MockSink> = SessionManager::new();
        let outcome = manager.relay(&envelope("alice", "bob")).await;
        assert_eq!(outcome, RelayResponse::recipient_offline());
    }

    #[tokio::test]
    async fn relay_delivers_regardless_of_who_initiated() {
        let mut manager: SessionManager<MockSink> = SessionManager::new();
        let sink = Arc::new(Mutex::new(MockSink::new()));

        // Bob connected under the key derived from (bob, alice).
        let session_id = canonical_session_key("bob", "alice");
        manager.connect(session_id, Some("bob".to_owned()), Some(sink.clone()));

        let outcome = manager.relay(&envelope("alice", "bob")).await;
        assert_eq!(outcome, RelayResponse::delivered());
        assert_eq!(sink.lock().await.sent.len(), 1);
        assert_eq!(sink.lock().await.sent[0].from, "alice");
    }

    #[tokio::test]
    async fn relay_to_closed_transport_reports_offline() {
        let mut manager: SessionManager<MockSink> = SessionManager::new();
        let sink = Arc::new(Mutex::new(MockSink::new()));
        sink.lock().await.open = false;

        manager.connect(
            canonical_session_key("alice", "bob"),
            None,
            Some(sink.clone()),
        );

        let outcome = manager.relay(&envelope("alice", "bob")).await;
        assert_eq!(outcome, RelayResponse::recipient_offline());
        assert!(sink.lock().await.sent.is_empty());
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let mut manager: SessionManager<MockSink> = SessionManager::new();
        manager.connect("s1".to_owned(), None, None);
        assert_eq!(manager.status().active_connections, 1);

        manager.disconnect("s1");
        manager.disconnect("s1");
        manager.disconnect("never-connected");
        assert_eq!(manager.status().active_connections, 0);
    }

    #[tokio::test]
    async fn reconnect_replaces_the_previous_entry() {
        let mut manager: SessionManager<MockSink> = SessionManager::new();
        manager.connect("s1".to_owned(), Some("alice".to_owned()), None);
        manager.connect("s1".to_owned(), Some("alice-phone".to_owned()), None);

        let status = manager.status();
        assert_eq!(status.active_connections, 1);
        assert_eq!(status.sessions[0].user_id.as_deref(), Some("alice-phone"));
    }

    #[tokio::test]
    async fn owner_is_only_evictable_when_empty() {
        let mut manager: SessionManager<MockSink> = SessionManager::new();
        assert!(manager.is_evictable());
        manager.connect("s1".to_owned(), None, None);
        assert!(!manager.is_evictable());
        manager.disconnect("s1");
        assert!(manager.is_evictable());
    }
}
