//! WebSocket event gateway.
//!
//! One call to [`BotConnection::run`] is one gateway session: fetch the
//! gateway URL, connect, identify, heartbeat, and dispatch message events to
//! an [`EventHandler`] until the connection drops or [`BotConnection::close`]
//! is called. Resuming is not attempted; the adapter starts a new session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::HttpApi;
use crate::error::QqError;
use crate::event::MessageEvent;

/// C2C and group @-messages.
pub const INTENT_PUBLIC_MESSAGES: u32 = 1 << 25;
/// Guild direct messages.
pub const INTENT_DIRECT_MESSAGE: u32 = 1 << 12;

const OP_DISPATCH: u8 = 0;
const OP_HEARTBEAT: u8 = 1;
const OP_IDENTIFY: u8 = 2;
const OP_RECONNECT: u8 = 7;
const OP_INVALID_SESSION: u8 = 9;
const OP_HELLO: u8 = 10;
const OP_HEARTBEAT_ACK: u8 = 11;

const EVENT_READY: &str = "READY";

/// The logged-in bot, as reported by `READY`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BotProfile {
    pub id: String,
    pub username: String,
}

/// Callbacks a gateway session delivers events to.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_ready(&self, bot: &BotProfile);
    async fn on_message(&self, event: MessageEvent);
}

/// A restartable connection to the event gateway.
#[async_trait]
pub trait BotConnection: Send + Sync {
    /// Run one session until it ends. `Ok` only after [`BotConnection::close`],
    /// including a close that happened before this call.
    async fn run(&self, handler: Arc<dyn EventHandler>) -> Result<(), QqError>;

    /// End the running session, if any.
    async fn close(&self) -> Result<(), QqError>;
}

#[derive(Debug, Deserialize)]
pub struct GatewayPayload {
    pub op: u8,
    #[serde(default)]
    pub d: Value,
    #[serde(default)]
    pub s: Option<u64>,
    #[serde(default)]
    pub t: Option<String>,
}

pub fn identify_payload(authorization: &str, intents: u32) -> Value {
    json!({
        "op": OP_IDENTIFY,
        "d": {
            "token": authorization,
            "intents": intents,
            "shard": [0, 1],
            "properties": {},
        }
    })
}

pub fn heartbeat_payload(last_seq: Option<u64>) -> Value {
    json!({ "op": OP_HEARTBEAT, "d": last_seq })
}

/// Heartbeat interval announced in the Hello payload.
fn heartbeat_interval(hello: &GatewayPayload) -> Result<Duration, QqError> {
    if hello.op != OP_HELLO {
        return Err(QqError::Gateway(format!("expected hello, got op {}", hello.op)));
    }
    hello
        .d
        .get("heartbeat_interval")
        .and_then(Value::as_u64)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .ok_or_else(|| QqError::Gateway("hello without heartbeat_interval".into()))
}

fn parse_ready(d: &Value) -> BotProfile {
    let user = d.get("user");
    let field = |name: &str| {
        user.and_then(|u| u.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    BotProfile {
        id: field("id"),
        username: field("username"),
    }
}

/// [`BotConnection`] over the platform's WebSocket gateway.
///
/// Closing is permanent: a session started after [`BotConnection::close`]
/// returns `Ok` at once without connecting.
pub struct WsGateway {
    api: Arc<HttpApi>,
    intents: u32,
    shutdown: CancellationToken,
}

impl WsGateway {
    pub fn new(api: Arc<HttpApi>) -> Self {
        Self {
            api,
            intents: INTENT_PUBLIC_MESSAGES | INTENT_DIRECT_MESSAGE,
            shutdown: CancellationToken::new(),
        }
    }

    async fn session(
        &self,
        cancel: &CancellationToken,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), QqError> {
        let url = self.api.gateway_url().await?;
        info!(url = %url, "QQ gateway: connecting");
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let hello = loop {
            match read.next().await {
                Some(Ok(WsMessage::Text(text))) => break serde_json::from_str::<GatewayPayload>(&text)?,
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(QqError::Gateway(format!("closed before hello: {frame:?}")))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => return Err(QqError::Gateway("stream ended before hello".into())),
            }
        };
        let interval = heartbeat_interval(&hello)?;

        let authorization = self.api.tokens().authorization().await?;
        let identify = identify_payload(&authorization, self.intents);
        write.send(WsMessage::Text(identify.to_string())).await?;
        debug!(heartbeat_ms = interval.as_millis() as u64, "QQ gateway: identify sent");

        let mut heartbeat = tokio::time::interval(interval);
        // The first tick completes immediately.
        heartbeat.tick().await;
        let mut last_seq: Option<u64> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    write.send(WsMessage::Text(heartbeat_payload(last_seq).to_string())).await?;
                }
                frame = read.next() => {
                    let text = match frame {
                        Some(Ok(WsMessage::Text(text))) => text,
                        Some(Ok(WsMessage::Ping(data))) => {
                            write.send(WsMessage::Pong(data)).await?;
                            continue;
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            return Err(QqError::Gateway(format!("closed by server: {frame:?}")));
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(QqError::Gateway("stream ended".into())),
                    };

                    let payload: GatewayPayload = match serde_json::from_str(&text) {
                        Ok(p) => p,
                        Err(e) => {
                            warn!(error = %e, "QQ gateway: undecodable payload");
                            continue;
                        }
                    };
                    if payload.s.is_some() {
                        last_seq = payload.s;
                    }

                    match payload.op {
                        OP_DISPATCH => self.dispatch(payload, &handler).await,
                        OP_HEARTBEAT_ACK => debug!("QQ gateway: heartbeat ack"),
                        OP_RECONNECT => {
                            return Err(QqError::Gateway("server requested reconnect".into()));
                        }
                        OP_INVALID_SESSION => {
                            return Err(QqError::Gateway("invalid session".into()));
                        }
                        op => debug!(op, "QQ gateway: ignoring opcode"),
                    }
                }
            }
        }
    }

    async fn dispatch(&self, payload: GatewayPayload, handler: &Arc<dyn EventHandler>) {
        let Some(event_type) = payload.t.as_deref() else {
            return;
        };

        if event_type == EVENT_READY {
            let bot = parse_ready(&payload.d);
            handler.on_ready(&bot).await;
            return;
        }

        match MessageEvent::from_dispatch(event_type, &payload.d) {
            Some(event) => {
                // Handlers download attachments; keep heartbeats flowing meanwhile.
                let handler = Arc::clone(handler);
                tokio::spawn(async move { handler.on_message(event).await });
            }
            None => debug!(event = event_type, "QQ gateway: event not handled"),
        }
    }
}

#[async_trait]
impl BotConnection for WsGateway {
    async fn run(&self, handler: Arc<dyn EventHandler>) -> Result<(), QqError> {
        let cancel = self.shutdown.child_token();
        if cancel.is_cancelled() {
            debug!("QQ gateway: closed, not connecting");
            return Ok(());
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(()),
            result = self.session(&cancel, handler) => result,
        }
    }

    async fn close(&self) -> Result<(), QqError> {
        self.shutdown.cancel();
        Ok(())
    }
}
