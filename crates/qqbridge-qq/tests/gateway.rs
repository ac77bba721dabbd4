// Gateway sessions against a local token/REST endpoint and WebSocket server.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::Json;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use qqbridge_core::QqConfig;
use qqbridge_qq::event::{EventKind, MessageEvent};
use qqbridge_qq::gateway::{BotProfile, EventHandler, INTENT_DIRECT_MESSAGE, INTENT_PUBLIC_MESSAGES};
use qqbridge_qq::{QqClient, QqError};

const TOKEN: &str = "tok-1";
const WAIT: Duration = Duration::from_secs(5);

type Ws = WebSocketStream<TcpStream>;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Seen {
    Ready(BotProfile),
    Message(MessageEvent),
}

struct RecordingHandler(mpsc::UnboundedSender<Seen>);

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_ready(&self, bot: &BotProfile) {
        let _ = self.0.send(Seen::Ready(bot.clone()));
    }

    async fn on_message(&self, event: MessageEvent) {
        let _ = self.0.send(Seen::Message(event));
    }
}

/// Token and `/gateway` endpoints. `/gateway` only answers with the fresh token.
async fn serve_rest(ws_url: String) -> String {
    let app = axum::Router::new()
        .route(
            "/app/getAppAccessToken",
            post(|Json(body): Json<Value>| async move {
                if body["appId"] == "102030" && body["clientSecret"] == "s3cret" {
                    (
                        StatusCode::OK,
                        Json(json!({"access_token": TOKEN, "expires_in": "7200"})),
                    )
                } else {
                    (
                        StatusCode::OK,
                        Json(json!({"code": 100016, "message": "invalid appid or secret"})),
                    )
                }
            }),
        )
        .route(
            "/gateway",
            get(move |headers: HeaderMap| {
                let ws_url = ws_url.clone();
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    if auth == format!("QQBot {TOKEN}") {
                        (StatusCode::OK, Json(json!({"url": ws_url})))
                    } else {
                        (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad token"})))
                    }
                }
            }),
        );
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Accept one WebSocket connection and run `script` on it.
async fn serve_ws<F, Fut, T>(script: F) -> (String, JoinHandle<T>)
where
    F: FnOnce(Ws) -> Fut + Send + 'static,
    Fut: Future<Output = T> + Send,
    T: Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        script(ws).await
    });
    (format!("ws://{addr}"), handle)
}

async fn send(ws: &mut Ws, payload: Value) {
    ws.send(Message::Text(payload.to_string())).await.unwrap();
}

async fn recv(ws: &mut Ws) -> Value {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => continue,
            other => panic!("connection ended while waiting for a frame: {other:?}"),
        }
    }
}

/// Keep the socket open until the client goes away.
async fn drain(ws: &mut Ws) {
    while let Some(Ok(_)) = ws.next().await {}
}

fn hello(interval_ms: u64) -> Value {
    json!({"op": 10, "d": {"heartbeat_interval": interval_ms}})
}

fn ready(seq: u64) -> Value {
    json!({
        "op": 0, "s": seq, "t": "READY",
        "d": {"session_id": "sess", "user": {"id": "42", "username": "helper-bot", "bot": true}}
    })
}

async fn client_for(ws_url: String) -> QqClient {
    let base = serve_rest(ws_url).await;
    let config = QqConfig {
        app_id: "102030".into(),
        secret: "s3cret".into(),
        api_base: base.clone(),
        token_url: format!("{base}/app/getAppAccessToken"),
        ..QqConfig::default()
    };
    QqClient::connect(&config).expect("client")
}

async fn next_seen(rx: &mut mpsc::UnboundedReceiver<Seen>) -> Seen {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("handler called in time")
        .expect("handler alive")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_identifies_dispatches_and_ends_on_reconnect_request() {
    let (ws_url, server) = serve_ws(|mut ws| async move {
        send(&mut ws, hello(45_000)).await;
        let identify = recv(&mut ws).await;
        send(&mut ws, ready(1)).await;
        send(
            &mut ws,
            json!({
                "op": 0, "s": 2, "t": "C2C_MESSAGE_CREATE",
                "d": {
                    "id": "ROBOT1.0_c2c",
                    "author": {"user_openid": "E1F2A3"},
                    "content": " hello ",
                    "attachments": [{"filename": "a.png", "url": "//cdn.example.com/a.png"}]
                }
            }),
        )
        .await;
        send(
            &mut ws,
            json!({
                "op": 0, "s": 3, "t": "DIRECT_MESSAGE_CREATE",
                "d": {"id": "dm-1", "author": {"id": "1234567"}, "content": "hi"}
            }),
        )
        .await;
        send(&mut ws, json!({"op": 7})).await;
        drain(&mut ws).await;
        identify
    })
    .await;

    let client = client_for(ws_url).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let result = tokio::time::timeout(WAIT, client.connection.run(Arc::new(RecordingHandler(tx))))
        .await
        .expect("session ends");

    assert!(
        matches!(&result, Err(QqError::Gateway(msg)) if msg.contains("reconnect")),
        "got {result:?}"
    );

    let identify = server.await.unwrap();
    assert_eq!(identify["op"], 2);
    assert_eq!(identify["d"]["token"], format!("QQBot {TOKEN}"));
    assert_eq!(
        identify["d"]["intents"],
        u64::from(INTENT_PUBLIC_MESSAGES | INTENT_DIRECT_MESSAGE)
    );
    assert_eq!(identify["d"]["shard"], json!([0, 1]));

    match next_seen(&mut rx).await {
        Seen::Ready(bot) => assert_eq!(bot.username, "helper-bot"),
        other => panic!("expected READY first, got {other:?}"),
    }

    // Message handlers run on their own tasks; order between them is not fixed.
    let mut events = Vec::new();
    for _ in 0..2 {
        match next_seen(&mut rx).await {
            Seen::Message(event) => events.push(event),
            other => panic!("unexpected {other:?}"),
        }
    }
    events.sort_by(|a, b| a.id.cmp(&b.id));

    assert_eq!(events[0].kind, EventKind::C2c);
    assert_eq!(events[0].id, "ROBOT1.0_c2c");
    assert_eq!(events[0].sender_id, "E1F2A3");
    assert_eq!(events[0].content, "hello");
    assert_eq!(
        events[0].attachments[0].url.as_deref(),
        Some("https://cdn.example.com/a.png")
    );
    assert_eq!(events[1].kind, EventKind::Direct);
    assert_eq!(events[1].sender_id, "1234567");
}

#[tokio::test]
async fn invalid_session_ends_with_error() {
    let (ws_url, _server) = serve_ws(|mut ws| async move {
        send(&mut ws, hello(45_000)).await;
        let _identify = recv(&mut ws).await;
        send(&mut ws, json!({"op": 9, "d": false})).await;
        drain(&mut ws).await;
    })
    .await;

    let client = client_for(ws_url).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = tokio::time::timeout(WAIT, client.connection.run(Arc::new(RecordingHandler(tx))))
        .await
        .expect("session ends");

    assert!(
        matches!(&result, Err(QqError::Gateway(msg)) if msg.contains("invalid session")),
        "got {result:?}"
    );
}

#[tokio::test]
async fn first_frame_must_be_hello() {
    let (ws_url, _server) = serve_ws(|mut ws| async move {
        send(&mut ws, ready(1)).await;
        drain(&mut ws).await;
    })
    .await;

    let client = client_for(ws_url).await;
    let (tx, _rx) = mpsc::unbounded_channel();
    let result = tokio::time::timeout(WAIT, client.connection.run(Arc::new(RecordingHandler(tx))))
        .await
        .expect("session ends");

    assert!(matches!(result, Err(QqError::Gateway(_))), "got {result:?}");
}

#[tokio::test]
async fn heartbeats_carry_last_seq_and_close_ends_session_cleanly() {
    let (beat_tx, beat_rx) = tokio::sync::oneshot::channel();
    let (ws_url, _server) = serve_ws(|mut ws| async move {
        send(&mut ws, hello(50)).await;
        let _identify = recv(&mut ws).await;
        send(&mut ws, ready(3)).await;

        // A heartbeat may already be in flight before READY is seen.
        loop {
            let frame = recv(&mut ws).await;
            if frame["op"] == 1 && frame["d"] == 3 {
                let _ = beat_tx.send(frame);
                break;
            }
        }
        send(&mut ws, json!({"op": 11})).await;
        drain(&mut ws).await;
    })
    .await;

    let client = client_for(ws_url).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let connection = Arc::clone(&client.connection);
    let session = tokio::spawn(async move { connection.run(Arc::new(RecordingHandler(tx))).await });

    assert!(matches!(next_seen(&mut rx).await, Seen::Ready(_)));
    let heartbeat = tokio::time::timeout(WAIT, beat_rx)
        .await
        .expect("heartbeat in time")
        .unwrap();
    assert_eq!(heartbeat, json!({"op": 1, "d": 3}));

    client.connection.close().await.unwrap();
    let result = tokio::time::timeout(WAIT, session)
        .await
        .expect("session ends")
        .unwrap();
    assert!(result.is_ok(), "got {result:?}");
}

#[tokio::test]
async fn rejected_credentials_fail_the_session() {
    let base = serve_rest("ws://127.0.0.1:9".into()).await;
    let config = QqConfig {
        app_id: "102030".into(),
        secret: "wrong".into(),
        api_base: base.clone(),
        token_url: format!("{base}/app/getAppAccessToken"),
        ..QqConfig::default()
    };
    let client = QqClient::connect(&config).unwrap();
    let (tx, _rx) = mpsc::unbounded_channel();

    let result = client.connection.run(Arc::new(RecordingHandler(tx))).await;

    assert!(
        matches!(&result, Err(QqError::Api { message, .. }) if message.contains("invalid appid")),
        "got {result:?}"
    );
}
