//! Tileboard Document Server
//!
//! A reference remote store for board sync and sharing. Documents are JSON
//! objects in two collections, `users` and `shares`.
//!
//! ## Endpoints
//!
//! - `GET /docs/{collection}/{id}` returns the document, 404 when absent
//! - `PUT /docs/{collection}/{id}?merge=true|false` writes it (merge by default)
//!   and returns the stored result
//! - `GET /docs/{collection}/{id}/subscribe` upgrades to a WebSocket that sends
//!   the full document JSON now and after every write

mod error;
mod state;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use error::ApiError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use state::AppState;
use std::{io, net::SocketAddr, sync::Arc};
use tileboard_core::remote::{DocumentKey, Namespace, WriteMode};
use tokio::sync::broadcast;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

/// Environment variable overriding the listen address.
const ADDR_ENV: &str = "TILEBOARD_ADDR";
const DEFAULT_PORT: u16 = 3030;

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tileboard_server=info,tower_http=info".into()),
        )
        .init();

    let addr = parse_addr(std::env::var(ADDR_ENV).ok().as_deref())?;
    let state = Arc::new(AppState::new());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Tileboard document server listening on {}", addr);
    axum::serve(listener, app(state)).await
}

fn parse_addr(value: Option<&str>) -> io::Result<SocketAddr> {
    match value {
        Some(value) => value.parse().map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid {} '{}': {}", ADDR_ENV, value, e),
            )
        }),
        None => Ok(SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT))),
    }
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/docs/{collection}/{id}", get(get_document).put(put_document))
        .route("/docs/{collection}/{id}/subscribe", get(subscribe_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Index page
async fn index() -> &'static str {
    "Tileboard Document Server - documents at /docs/{users|shares}/{id}"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

fn document_key(collection: &str, id: &str) -> Result<DocumentKey, ApiError> {
    Namespace::parse(collection)
        .map(|namespace| DocumentKey::new(namespace, id))
        .ok_or_else(|| ApiError::BadRequest {
            message: format!("unknown collection '{}'", collection),
        })
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let key = document_key(&collection, &id)?;
    state
        .get(&key)
        .map(|document| Json(Value::Object(document)))
        .ok_or(ApiError::NotFound { collection, id })
}

#[derive(Debug, Default, Deserialize)]
struct WriteParams {
    merge: Option<bool>,
}

async fn put_document(
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
    Query(params): Query<WriteParams>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let key = document_key(&collection, &id)?;
    let Value::Object(document) = body else {
        return Err(ApiError::BadRequest {
            message: "document body must be a JSON object".to_string(),
        });
    };
    let mode = if params.merge.unwrap_or(true) {
        WriteMode::Merge
    } else {
        WriteMode::Replace
    };

    let stored = state.put(&key, document, mode);
    info!("Wrote {} ({:?})", key, mode);
    Ok(Json(Value::Object(stored)))
}

/// WebSocket upgrade handler
async fn subscribe_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let key = document_key(&collection, &id)?;
    Ok(ws.on_upgrade(move |socket| handle_subscription(socket, state, key)))
}

/// Stream a document's versions to one subscriber.
async fn handle_subscription(socket: WebSocket, state: Arc<AppState>, key: DocumentKey) {
    let subscriber = Uuid::new_v4().to_string();
    info!("Subscriber {} watching {}", subscriber, key);

    let (mut sender, mut receiver) = socket.split();
    let (current, mut rx) = state.subscribe(&key);

    let initial = current.and_then(|document| serde_json::to_string(&document).ok());
    let mut open = match initial {
        Some(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        None => true,
    };

    while open {
        tokio::select! {
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => open = false,
                    Some(Ok(_)) => {} // Subscribers only listen
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", subscriber, e);
                        open = false;
                    }
                }
            }

            update = rx.recv() => {
                match update {
                    Ok(json) => open = sender.send(Message::Text(json.into())).await.is_ok(),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Subscriber {} missed {} updates", subscriber, skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => open = false,
                }
            }
        }
    }

    drop(rx);
    state.release(&key);
    info!("Subscriber {} closed", subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(collection: &str, id: &str) -> Path<(String, String)> {
        Path((collection.to_string(), id.to_string()))
    }

    #[test]
    fn test_parse_addr() {
        assert_eq!(parse_addr(None).unwrap(), SocketAddr::from(([0, 0, 0, 0], 3030)));
        assert_eq!(parse_addr(Some("127.0.0.1:8080")).unwrap().port(), 8080);
        assert!(parse_addr(Some("not-an-addr")).is_err());
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let state = Arc::new(AppState::new());
        let result = get_document(State(state), path("users", "alice")).await;
        assert!(matches!(result, Err(ApiError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_put_merges_by_default() {
        let state = Arc::new(AppState::new());
        put_document(
            State(state.clone()),
            path("users", "alice"),
            Query(WriteParams::default()),
            Json(json!({ "shares": [{ "shareId": "s1" }] })),
        )
        .await
        .unwrap();
        put_document(
            State(state.clone()),
            path("users", "alice"),
            Query(WriteParams::default()),
            Json(json!({ "lastSyncedAt": 9 })),
        )
        .await
        .unwrap();

        let Json(stored) = get_document(State(state), path("users", "alice")).await.unwrap();
        assert_eq!(stored, json!({ "shares": [{ "shareId": "s1" }], "lastSyncedAt": 9 }));
    }

    #[tokio::test]
    async fn test_put_without_merge_replaces() {
        let state = Arc::new(AppState::new());
        let replace = || Query(WriteParams { merge: Some(false) });
        put_document(State(state.clone()), path("shares", "s1"), replace(), Json(json!({ "a": 1 })))
            .await
            .unwrap();
        let Json(stored) =
            put_document(State(state), path("shares", "s1"), replace(), Json(json!({ "b": 2 })))
                .await
                .unwrap();
        assert_eq!(stored, json!({ "b": 2 }));
    }

    #[tokio::test]
    async fn test_rejects_bad_requests() {
        let state = Arc::new(AppState::new());
        let unknown = get_document(State(state.clone()), path("admin", "x")).await;
        assert!(matches!(unknown, Err(ApiError::BadRequest { .. })));

        let not_object = put_document(
            State(state),
            path("users", "alice"),
            Query(WriteParams::default()),
            Json(json!([1, 2])),
        )
        .await;
        assert!(matches!(not_object, Err(ApiError::BadRequest { .. })));
    }
}
