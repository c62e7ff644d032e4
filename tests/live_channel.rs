//! End-to-end checks against an in-process chat server.
//!
//! The server speaks the same envelopes as the real backend: `{type, data}`
//! inbound, `{type, payload}` outbound, and `{ok, data}` for history.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use time::macros::datetime;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::time::timeout;

use vetri::EventKind;
use vetri::config::ClientConfig;
use vetri::net::api::{self, ApiError};
use vetri::net::connection::{ConnectionClient, ConnectionStatus};
use vetri::net::transport::WsConnector;
use vetri::state::chat::{ChatSession, ChatUpdate, SendOutcome};

const WAIT: Duration = Duration::from_secs(10);

// =============================================================================
// Server
// =============================================================================

async fn spawn_server(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move { axum::serve(listener, app).await.expect("server failed") });
    addr
}

fn config_for(addr: SocketAddr) -> ClientConfig {
    ClientConfig::default()
        .with_api_base(format!("http://{addr}"))
        .with_ws_url(format!("ws://{addr}/ws/chat/"))
}

async fn chat_socket(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(run_chat_socket)
}

async fn run_chat_socket(mut socket: WebSocket) {
    if send_json(&mut socket, &json!({"type": "status", "data": {"message": "connected"}})).await.is_err() {
        return;
    }

    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(envelope) = serde_json::from_str::<Value>(text.as_str()) else { continue };
        let payload = &envelope["payload"];
        let reply = match envelope["type"].as_str() {
            Some("message") => json!({"type": "message", "data": {
                "id": 7,
                "from_user": payload["from"],
                "text": payload["text"],
                "time": payload["time"],
                "created_at": "2024-01-10T09:05:00Z",
                "delivered": false,
                "seen": false,
            }}),
            Some("typing") => json!({"type": "typing", "data": {"from": payload["from"]}}),
            _ => continue,
        };
        if send_json(&mut socket, &reply).await.is_err() {
            break;
        }
    }
}

async fn send_json(socket: &mut WebSocket, value: &Value) -> Result<(), axum::Error> {
    socket.send(Message::Text(value.to_string().into())).await
}

async fn history(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    if params.get("limit").map(String::as_str) != Some("200") {
        return Json(json!({"ok": false, "error": "unexpected limit"}));
    }
    Json(json!({"ok": true, "data": [
        {"id": 1, "from_user": "Alice", "text": "rent is due", "time": "09:00 AM",
         "created_at": "2024-01-10T09:00:00Z", "delivered": false, "seen": true},
        {"id": 2, "from_user": "Bob", "text": "paid", "time": "09:05 AM",
         "created_at": "2024-01-10T09:05:00Z", "delivered": false, "seen": false},
    ]}))
}

fn chat_app() -> Router {
    Router::new()
        .route("/ws/chat/", get(chat_socket))
        .route("/api/chat/messages/", get(history))
}

// =============================================================================
// Helpers
// =============================================================================

async fn wait_for_status(rx: &mut watch::Receiver<ConnectionStatus>, want: ConnectionStatus) {
    timeout(WAIT, rx.wait_for(|s| *s == want))
        .await
        .expect("status wait timed out")
        .expect("status channel open");
}

async fn next(session: &mut ChatSession) -> ChatUpdate {
    timeout(WAIT, session.next_update())
        .await
        .expect("update timed out")
        .expect("session open")
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn history_is_fetched_with_configured_limit() {
    let addr = spawn_server(chat_app()).await;
    let http = reqwest::Client::new();

    let messages = api::fetch_history(&http, &config_for(addr)).await;
    let ids: Vec<_> = messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, ["1", "2"]);
    assert_eq!(messages[0].from_user, "Alice");

    let other_limit = config_for(addr).with_history_limit(5);
    assert!(matches!(api::try_fetch_history(&http, &other_limit).await, Err(ApiError::NotOk)));
}

#[tokio::test]
async fn history_server_error_degrades_to_empty() {
    let app = Router::new().route(
        "/api/chat/messages/",
        get(|| async { StatusCode::INTERNAL_SERVER_ERROR.into_response() }),
    );
    let addr = spawn_server(app).await;
    let http = reqwest::Client::new();

    assert!(matches!(
        api::try_fetch_history(&http, &config_for(addr)).await,
        Err(ApiError::Status(500))
    ));
    assert!(api::fetch_history(&http, &config_for(addr)).await.is_empty());
}

#[tokio::test]
async fn chat_round_trip_over_websocket() {
    let addr = spawn_server(chat_app()).await;
    let (mut client, events) = ConnectionClient::new(&config_for(addr), WsConnector);
    let mut session = ChatSession::new(events);
    let mut status = client.subscribe();

    client.start();
    wait_for_status(&mut status, ConnectionStatus::Online).await;

    // The server greets every connection with a status notice.
    assert_eq!(next(&mut session).await, ChatUpdate::Unchanged(EventKind::Status));

    assert!(session.send_typing(&client, "You"));
    assert_eq!(next(&mut session).await, ChatUpdate::TypingChanged);
    assert_eq!(session.typing_label().as_deref(), Some("You is typing…"));

    let outcome = session.send_message(&client, "You", "paid rent", datetime!(2024-01-10 09:05 UTC));
    assert_eq!(outcome, SendOutcome::Sent);
    match next(&mut session).await {
        ChatUpdate::MessageAdded(msg) => {
            assert_eq!(msg.id, "7");
            assert_eq!(msg.from_user, "You");
            assert_eq!(msg.text, "paid rent");
            assert_eq!(msg.time, "09:05");
        }
        other => panic!("expected a message, got {other:?}"),
    }
    assert_eq!(session.state().messages.len(), 1);

    client.stop();
    assert_eq!(client.status(), ConnectionStatus::Offline);
    assert!(!session.send_typing(&client, "You"));
}

#[tokio::test]
async fn server_close_triggers_reconnect() {
    let connections = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route(
            "/ws/chat/",
            get(|State(count): State<Arc<AtomicUsize>>, ws: WebSocketUpgrade| async move {
                let n = count.fetch_add(1, Ordering::SeqCst);
                ws.on_upgrade(move |mut socket| async move {
                    // First connection is dropped straight away; later ones stay open.
                    if n > 0 {
                        while let Some(Ok(_)) = socket.recv().await {}
                    }
                })
            }),
        )
        .with_state(Arc::clone(&connections));
    let addr = spawn_server(app).await;

    let (mut client, _events) = ConnectionClient::new(&config_for(addr), WsConnector);
    let mut status = client.subscribe();
    client.start();

    wait_for_status(&mut status, ConnectionStatus::Offline).await;
    wait_for_status(&mut status, ConnectionStatus::Online).await;
    assert_eq!(connections.load(Ordering::SeqCst), 2);

    client.stop();
}
