use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{
        Path, Query,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::StreamExt;
use pulse_dashboard::activity::{ActivityStream, StreamSettings};
use pulse_dashboard::credentials::LocalCredentialIssuer;
use pulse_dashboard::transport::{FeedTransport, WebSocketTransport};
use serde_json::json;
use url::Url;

/// Feed server: greets with the session id and key it saw, then plays `script`.
async fn feed(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_feed(socket, session_id, params))
}

async fn serve_feed(mut socket: WebSocket, session_id: String, params: HashMap<String, String>) {
    let hello = json!({
        "event_type": "connected",
        "session_id": session_id,
        "message": params.get("x-api-key").cloned().unwrap_or_default(),
    });
    let mut frames = vec![Message::Text(hello.to_string().into())];

    if session_id == "raw" {
        frames.push(Message::Text("plain text".into()));
        frames.push(Message::Binary(b"binary utf8".to_vec().into()));
        frames.push(Message::Binary(vec![0xff, 0xfe, 0xfd].into()));
        frames.push(Message::Ping(b"p".to_vec().into()));
        frames.push(Message::Close(None));
    } else {
        let thinking = json!({
            "event_type": "thinking_log",
            "thinking": "Breaking down revenue by region",
            "agent_id": "agent-e2e",
            "agent_name": "Revenue Analyst"
        });
        let done = json!({"event_type": "llm_generation", "status": "completed"});
        frames.push(Message::Text(thinking.to_string().into()));
        frames.push(Message::Text(done.to_string().into()));
    }

    for frame in frames {
        if socket.send(frame).await.is_err() {
            return;
        }
    }
    // Hold the socket until the client goes away.
    while let Some(Ok(_)) = socket.recv().await {}
}

async fn spawn_feed_server() -> SocketAddr {
    let app = Router::new().route("/session/{session_id}", get(feed));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_transport_yields_text_frames() {
    let addr = spawn_feed_server().await;
    let url = Url::parse(&format!("ws://{addr}/session/raw?x-api-key=k-1")).unwrap();

    let frames: Vec<String> = WebSocketTransport
        .connect(&url)
        .await
        .unwrap()
        .filter_map(|frame| async move { frame.ok() })
        .collect()
        .await;

    assert_eq!(frames.len(), 3, "{frames:?}");
    let hello: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(hello["session_id"], "raw");
    assert_eq!(hello["message"], "k-1");
    assert_eq!(frames[1], "plain text");
    assert_eq!(frames[2], "binary utf8");
}

#[tokio::test]
async fn test_transport_connect_failure() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let url = Url::parse(&format!("ws://{addr}/session/s")).unwrap();
    assert!(WebSocketTransport.connect(&url).await.is_err());
}

#[tokio::test]
async fn test_stream_end_to_end() {
    let addr = spawn_feed_server().await;
    let issuer = LocalCredentialIssuer::new("k-e2e", format!("ws://{addr}/session"));
    let stream = ActivityStream::new(
        Arc::new(issuer),
        Arc::new(WebSocketTransport),
        StreamSettings::default(),
    );

    let mut rx = stream.subscribe_to(Some("session_e2e".into()));
    stream.set_processing(true);

    let finished = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|state| !state.is_processing && state.events.len() == 3),
    )
    .await
    .expect("generation never completed")
    .unwrap()
    .clone();

    assert!(!finished.is_connected);
    assert_eq!(finished.events[0].session_id.as_deref(), Some("session_e2e"));
    assert_eq!(finished.events[0].message.as_deref(), Some("k-e2e"));
    assert_eq!(finished.thinking_events.len(), 1);
    assert_eq!(
        finished.last_thinking_message.as_deref(),
        Some("Breaking down revenue by region")
    );
    assert!(finished.active_agent_id.is_none());
}
