use crate::database::DurableStore;
use crate::error::ApiError;
use crate::in_memory_db::InMemoryStore;
use crate::managers::prekey_manager::PreKeyManager;
use crate::managers::session_manager::SessionManager;
use crate::managers::state::ServerState;
use crate::socket::{handle_socket, MessageSink, WebSocketSink};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{any, get, post, put};
use axum::{Json, Router};
use common::envelope::MessageEnvelope;
use common::web_api::{
    ConnectRequest, DisconnectRequest, PreKeyResponse, RelayResponse, SessionStatusResponse,
    StoreKeysRequest, SuccessResponse, UploadOneTimeKey,
};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

/// Idle owners are swept on this cadence; prekey owners re-hydrate from the
/// durable store on next use, session owners only leave once empty.
const EVICTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const OWNER_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

type AppState = ServerState<InMemoryStore, WebSocketSink>;

async fn handle_store_keys<S: DurableStore, T: MessageSink>(
    state: &ServerState<S, T>,
    user_id: &str,
    request: StoreKeysRequest,
) -> Result<SuccessResponse, ApiError> {
    let owner = state.prekeys.locate(user_id).await;
    let mut manager = owner.lock().await;
    manager.store(&state.db, user_id, request).await?;
    Ok(SuccessResponse::ok())
}

async fn handle_fetch_keys<S: DurableStore, T: MessageSink>(
    state: &ServerState<S, T>,
    user_id: &str,
) -> Result<PreKeyResponse, ApiError> {
    let owner = state.prekeys.locate(user_id).await;
    let mut manager = owner.lock().await;
    Ok(manager.fetch(&state.db, user_id).await?)
}

async fn handle_consume_key<S: DurableStore, T: MessageSink>(
    state: &ServerState<S, T>,
    user_id: &str,
) -> Result<UploadOneTimeKey, ApiError> {
    let owner = state.prekeys.locate(user_id).await;
    let mut manager = owner.lock().await;
    Ok(manager.consume_one_time_key(&state.db, user_id).await?)
}

/// Registers a session without a live transport. Such an entry shows up in
/// status but relays to it report offline until a websocket attaches under
/// the same id.
async fn handle_connect<S: DurableStore, T: MessageSink>(
    state: &ServerState<S, T>,
    request: ConnectRequest,
) -> SuccessResponse {
    let owner = state.sessions.locate(&request.session_id).await;
    owner
        .lock()
        .await
        .connect(request.session_id, request.user_id, None);
    SuccessResponse::ok()
}

async fn handle_disconnect<S: DurableStore, T: MessageSink>(
    state: &ServerState<S, T>,
    request: DisconnectRequest,
) -> SuccessResponse {
    let owner = state.sessions.locate(&request.session_id).await;
    owner.lock().await.disconnect(&request.session_id);
    SuccessResponse::ok()
}

async fn handle_session_status<S: DurableStore, T: MessageSink>(
    state: &ServerState<S, T>,
    session_id: &str,
) -> SessionStatusResponse {
    let owner = state.sessions.locate(session_id).await;
    let registry = owner.lock().await;
    registry.status()
}

/// Handler for the PUT /v1/keys/{user_id} endpoint.
async fn put_keys_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<StoreKeysRequest>,
) -> Result<Json<SuccessResponse>, ApiError> {
    Ok(Json(handle_store_keys(&state, &user_id, request).await?))
}

/// Handler for the GET /v1/keys/{user_id} endpoint.
async fn get_keys_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<PreKeyResponse>, ApiError> {
    Ok(Json(handle_fetch_keys(&state, &user_id).await?))
}

/// Handler for the POST /v1/keys/{user_id}/consume endpoint.
async fn consume_key_endpoint(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UploadOneTimeKey>, ApiError> {
    Ok(Json(handle_consume_key(&state, &user_id).await?))
}

/// Handler for the POST /v1/sessions/connect endpoint.
async fn connect_endpoint(
    State(state): State<AppState>,
    Json(request): Json<ConnectRequest>,
) -> Json<SuccessResponse> {
    Json(handle_connect(&state, request).await)
}

/// Handler for the POST /v1/sessions/disconnect endpoint.
async fn disconnect_endpoint(
    State(state): State<AppState>,
    Json(request): Json<DisconnectRequest>,
) -> Json<SuccessResponse> {
    Json(handle_disconnect(&state, request).await)
}

/// Handler for the POST /v1/sessions/relay endpoint.
async fn relay_endpoint(
    State(state): State<AppState>,
    Json(envelope): Json<MessageEnvelope>,
) -> Json<RelayResponse> {
    Json(state.relay(&envelope).await)
}

/// Handler for the GET /v1/sessions/{session_id}/status endpoint.
async fn session_status_endpoint(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<SessionStatusResponse> {
    Json(handle_session_status(&state, &session_id).await)
}

#[derive(Debug, Deserialize)]
struct WebSocketParams {
    session_id: Option<String>,
    user_id: Option<String>,
}

/// Websocket upgrade handler for GET /v1/websocket.
async fn create_websocket_endpoint(
    State(state): State<AppState>,
    Query(params): Query<WebSocketParams>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let session_id = params
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    ws.on_upgrade(move |socket| handle_socket(state, socket, session_id, params.user_id))
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Messenger coordination server" }))
        .route(
            "/v1/keys/:user_id",
            put(put_keys_endpoint).get(get_keys_endpoint),
        )
        .route("/v1/keys/:user_id/consume", post(consume_key_endpoint))
        .route("/v1/sessions/connect", post(connect_endpoint))
        .route("/v1/sessions/disconnect", post(disconnect_endpoint))
        .route("/v1/sessions/relay", post(relay_endpoint))
        .route(
            "/v1/sessions/:session_id/status",
            get(session_status_endpoint),
        )
        .route("/v1/websocket", any(create_websocket_endpoint))
        .with_state(state)
}

fn spawn_eviction_sweep(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(EVICTION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let prekey_owners = state
                .prekeys
                .evict_idle(OWNER_IDLE_TIMEOUT, |owner: &PreKeyManager| {
                    owner.is_evictable()
                })
                .await;
            let session_owners = state
                .sessions
                .evict_idle(OWNER_IDLE_TIMEOUT, |owner: &SessionManager<WebSocketSink>| {
                    owner.is_evictable()
                })
                .await;
            if prekey_owners + session_owners > 0 {
                debug!(prekey_owners, session_owners, "evicted idle owners");
            }
        }
    });
}

pub async fn start_server() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenv::dotenv();
    let address = env::var("SERVER_ADDRESS").unwrap_or_else(|_| "127.0.0.1".to_owned());
    let port = env::var("SERVER_PORT").unwrap_or_else(|_| "8080".to_owned());

    let state = AppState::new(InMemoryStore::new());
    spawn_eviction_sweep(state.clone());

    let listener = tokio::net::TcpListener::bind(format!("{address}:{port}")).await?;
    info!(%address, %port, "listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

#[cfg(test)]
mod server_tests {
    use super::*;
    use crate::test_utils::sink::MockSink;
    use axum::http::StatusCode;

    fn test_state() -> ServerState<InMemoryStore, MockSink> {
        ServerState::new(InMemoryStore::new())
    }

    fn store_request(otks: Vec<u32>) -> StoreKeysRequest {
        StoreKeysRequest {
            identity_key: "ik".to_owned(),
            signed_prekey: "spk".to_owned(),
            pq_prekey: "pqk".to_owned(),
            signature: "sig".to_owned(),
            one_time_keys: otks
                .into_iter()
                .map(|key_id| UploadOneTimeKey {
                    key_id,
                    key: format!("k{key_id}"),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn store_then_fetch_serves_the_bundle() {
        let state = test_state();
        handle_store_keys(&state, "alice", store_request(vec![1]))
            .await
            .unwrap();

        let response = handle_fetch_keys(&state, "alice").await.unwrap();
        assert_eq!(response.signed_prekey, "spk");
        assert_eq!(response.one_time_keys.len(), 1);
    }

    #[tokio::test]
    async fn fetch_for_unknown_user_is_404() {
        let state = test_state();
        let error = handle_fetch_keys(&state, "nobody").await.unwrap_err();
        assert_eq!(error.status_code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn consume_distinguishes_exhaustion_from_missing_user() {
        let state = test_state();
        handle_store_keys(&state, "alice", store_request(vec![]))
            .await
            .unwrap();

        let exhausted = handle_consume_key(&state, "alice").await.unwrap_err();
        let missing = handle_fetch_keys(&state, "nobody").await.unwrap_err();
        assert_eq!(exhausted.status_code, StatusCode::NOT_FOUND);
        assert_eq!(missing.status_code, StatusCode::NOT_FOUND);
        assert_ne!(exhausted.message, missing.message);
    }

    #[tokio::test]
    async fn http_connect_tracks_the_session_without_a_transport() {
        let state = test_state();
        let session_id = crate::dispatch::canonical_session_key("alice", "bob");
        handle_connect(
            &state,
            ConnectRequest {
                session_id: session_id.clone(),
                user_id: Some("alice".to_owned()),
            },
        )
        .await;

        let status = handle_session_status(&state, &session_id).await;
        assert_eq!(status.active_connections, 1);

        // No live transport handle was registered, so a relay through the
        // same session still signals the offline fallback.
        let outcome = state
            .relay(&MessageEnvelope {
                id: "m1".to_owned(),
                from: "bob".to_owned(),
                to: "alice".to_owned(),
                ciphertext: "ct".to_owned(),
                timestamp: 1,
                r#type: "relay".to_owned(),
            })
            .await;
        assert_eq!(outcome, RelayResponse::recipient_offline());

        handle_disconnect(
            &state,
            DisconnectRequest {
                session_id: session_id.clone(),
            },
        )
        .await;
        let status = handle_session_status(&state, &session_id).await;
        assert_eq!(status.active_connections, 0);
    }
}
