//! QQ channel adapter.
//!
//! Owns one gateway connection and a reconnect loop: whenever a session ends
//! with an error the adapter waits a fixed delay and connects again, for as
//! long as it is running. Inbound events are normalized onto the message bus;
//! outbound bus messages are turned into C2C API calls.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use qqbridge_channels::{Channel, ChannelError, ChannelStatus, MessageBus, OutboundMessage};
use qqbridge_core::QqConfig;

use crate::api::{HttpApi, QqApi};
use crate::attach;
use crate::dedup::ProcessedIdBuffer;
use crate::error::QqError;
use crate::event::MessageEvent;
use crate::gateway::{BotConnection, BotProfile, EventHandler, WsGateway};
use crate::handler;
use crate::send;
use crate::seq::ReplySequenceTable;
use crate::token::AccessTokenSource;

pub const CHANNEL_NAME: &str = "qq";

/// The platform capabilities the adapter drives.
#[derive(Clone)]
pub struct QqClient {
    pub api: Arc<dyn QqApi>,
    pub connection: Arc<dyn BotConnection>,
}

impl QqClient {
    /// HTTPS API + WebSocket gateway sharing one access token.
    pub fn connect(config: &QqConfig) -> Result<Self, QqError> {
        if !config.has_credentials() {
            return Err(QqError::NoCredentials);
        }
        let http = reqwest::Client::builder().build()?;
        let tokens = Arc::new(AccessTokenSource::new(
            http.clone(),
            &config.token_url,
            config.app_id.trim(),
            config.secret.trim(),
        ));
        let api = Arc::new(HttpApi::new(http, &config.api_base, tokens));
        let connection = Arc::new(WsGateway::new(Arc::clone(&api)));
        Ok(Self { api, connection })
    }
}

/// State shared between the run loop, the gateway callbacks and `send`.
pub struct QqCore {
    config: QqConfig,
    bus: MessageBus,
    downloads: reqwest::Client,
    media_dir: PathBuf,
    processed: Mutex<ProcessedIdBuffer>,
    reply_seq: Mutex<ReplySequenceTable>,
    status: Mutex<ChannelStatus>,
}

impl QqCore {
    fn new(config: QqConfig, bus: MessageBus) -> Result<Self, QqError> {
        let reply_seq = ReplySequenceTable::new(config.reply_seq_ttl());
        Ok(Self {
            media_dir: PathBuf::from(&config.media_dir),
            downloads: attach::download_client()?,
            processed: Mutex::new(ProcessedIdBuffer::default()),
            reply_seq: Mutex::new(reply_seq),
            status: Mutex::new(ChannelStatus::Disconnected),
            config,
            bus,
        })
    }

    pub fn config(&self) -> &QqConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn download_client(&self) -> &reqwest::Client {
        &self.downloads
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Record `id` as processed. `false` if it was seen before.
    pub fn mark_processed(&self, id: &str) -> bool {
        self.processed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id)
    }

    fn set_status(&self, status: ChannelStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    fn status(&self) -> ChannelStatus {
        self.status
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventHandler for QqCore {
    async fn on_ready(&self, bot: &BotProfile) {
        info!(name = %bot.username, id = %bot.id, "QQ bot ready");
        self.set_status(ChannelStatus::Connected);
    }

    async fn on_message(&self, event: MessageEvent) {
        handler::handle_event(self, event).await;
    }
}

/// QQ channel adapter (C2C private messages and guild DMs).
pub struct QqChannel {
    core: Arc<QqCore>,
    client: RwLock<Option<QqClient>>,
    /// The client was built by `start`; `stop` discards it so a restart reconnects.
    owns_client: AtomicBool,
    running: AtomicBool,
    wake: Notify,
}

impl QqChannel {
    /// Adapter that builds its platform client on `start`.
    pub fn new(config: QqConfig, bus: MessageBus) -> Result<Self, QqError> {
        Ok(Self {
            core: Arc::new(QqCore::new(config, bus)?),
            client: RwLock::new(None),
            owns_client: AtomicBool::new(false),
            running: AtomicBool::new(false),
            wake: Notify::new(),
        })
    }

    /// Adapter driving an already-built client.
    pub fn with_client(config: QqConfig, bus: MessageBus, client: QqClient) -> Result<Self, QqError> {
        let channel = Self::new(config, bus)?;
        *channel.client.write().unwrap_or_else(|e| e.into_inner()) = Some(client);
        Ok(channel)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn client(&self) -> Option<QqClient> {
        self.client
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Handle an inbound event as if the gateway had delivered it.
    pub async fn on_message(&self, event: MessageEvent) {
        self.core.on_message(event).await;
    }

    /// Keep a gateway session alive until stopped.
    async fn run_bot(&self, connection: Arc<dyn BotConnection>) {
        let handler: Arc<dyn EventHandler> = self.core.clone();
        let delay = self.core.config.reconnect_delay();

        while self.is_running() {
            self.core.set_status(ChannelStatus::Connecting);
            match connection.run(Arc::clone(&handler)).await {
                Ok(()) => debug!("QQ gateway session closed"),
                Err(e) => {
                    warn!(error = %e, "QQ bot error");
                    self.core.set_status(ChannelStatus::Error(e.to_string()));
                }
            }

            if !self.is_running() {
                break;
            }
            info!(delay_secs = delay.as_secs(), "Reconnecting QQ bot");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.wake.notified() => {}
            }
        }

        self.core.set_status(ChannelStatus::Disconnected);
    }
}

#[async_trait]
impl Channel for QqChannel {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn start(&self) -> Result<(), ChannelError> {
        // The caller logs the returned error.
        if !self.core.config.has_credentials() {
            return Err(ChannelError::ConfigError(
                "QQ app_id and secret not configured".into(),
            ));
        }

        let client = match self.client() {
            Some(client) => client,
            None => {
                let client = QqClient::connect(&self.core.config)
                    .map_err(|e| ChannelError::ConfigError(e.to_string()))?;
                *self.client.write().unwrap_or_else(|e| e.into_inner()) = Some(client.clone());
                self.owns_client.store(true, Ordering::SeqCst);
                client
            }
        };

        self.running.store(true, Ordering::SeqCst);
        info!("QQ bot started (C2C private message)");
        self.run_bot(client.connection).await;
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_waiters();
        if let Some(client) = self.client() {
            if let Err(e) = client.connection.close().await {
                debug!(error = %e, "QQ: error while closing connection");
            }
        }
        if self.owns_client.swap(false, Ordering::SeqCst) {
            *self.client.write().unwrap_or_else(|e| e.into_inner()) = None;
        }
        info!("QQ bot stopped");
    }

    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        let Some(client) = self.client() else {
            warn!("QQ client not initialized");
            return Ok(());
        };
        send::send_outbound(
            client.api.as_ref(),
            &self.core.config,
            &self.core.reply_seq,
            msg,
        )
        .await;
        Ok(())
    }

    fn status(&self) -> ChannelStatus {
        self.core.status()
    }
}
