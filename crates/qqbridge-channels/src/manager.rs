use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tracing::{error, info, warn};

use crate::{
    channel::Channel,
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage},
};

/// How long `stop_all` waits for a channel's run loop to wind down.
const STOP_GRACE_SECS: u64 = 10;

type ChannelMap = HashMap<String, Arc<dyn Channel>>;

/// Manages a collection of channel adapters.
///
/// Channels are stored by their [`Channel::name`]. Each started channel runs
/// its own connection loop on a dedicated Tokio task; outbound messages are
/// routed to the channel named in the message.
pub struct ChannelManager {
    channels: ChannelMap,
    tasks: Vec<(String, JoinHandle<()>)>,
}

impl ChannelManager {
    /// Create an empty manager with no registered channels.
    pub fn new() -> Self {
        Self {
            channels: HashMap::new(),
            tasks: Vec::new(),
        }
    }

    /// Register a channel adapter.
    ///
    /// If a channel with the same name is already registered it is replaced.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registering channel adapter");
        self.channels.insert(name, channel);
    }

    /// Spawn the run loop of every registered channel.
    pub fn start_all(&mut self) {
        for (name, channel) in &self.channels {
            info!(channel = %name, "starting channel");
            let channel = Arc::clone(channel);
            let task_name = name.clone();
            let handle = tokio::spawn(async move {
                if let Err(e) = channel.start().await {
                    error!(channel = %task_name, error = %e, "channel did not start");
                }
            });
            self.tasks.push((name.clone(), handle));
        }
    }

    /// Stop all registered channels and wait for their run loops to exit.
    ///
    /// Loops that do not exit within the grace period are aborted.
    pub async fn stop_all(&mut self) {
        for (name, channel) in &self.channels {
            info!(channel = %name, "stopping channel");
            channel.stop().await;
        }
        for (name, mut handle) in self.tasks.drain(..) {
            if timeout(Duration::from_secs(STOP_GRACE_SECS), &mut handle)
                .await
                .is_err()
            {
                warn!(channel = %name, "channel loop did not exit in time, aborting");
                handle.abort();
            }
        }
    }

    /// Return the named channel, if it exists.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.channels.get(name).cloned()
    }

    /// Deliver one outbound message to the channel it names.
    pub async fn dispatch(&self, msg: &OutboundMessage) -> Result<(), ChannelError> {
        dispatch_to(&self.channels, msg).await
    }

    /// Spawn a task that drains `rx` and dispatches every message.
    ///
    /// The task ends when all outbound senders are dropped.
    pub fn spawn_outbound_dispatch(&self, rx: mpsc::Receiver<OutboundMessage>) -> JoinHandle<()> {
        let channels = self.channels.clone();
        tokio::spawn(run_outbound_dispatch(channels, rx))
    }

    /// Return the current [`ChannelStatus`] for every registered channel.
    ///
    /// The returned `Vec` is sorted by channel name for deterministic output.
    pub fn statuses(&self) -> Vec<(String, ChannelStatus)> {
        let mut result: Vec<(String, ChannelStatus)> = self
            .channels
            .iter()
            .map(|(name, ch)| (name.clone(), ch.status()))
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn dispatch_to(channels: &ChannelMap, msg: &OutboundMessage) -> Result<(), ChannelError> {
    let channel = channels
        .get(&msg.channel)
        .ok_or_else(|| ChannelError::UnknownChannel(msg.channel.clone()))?;
    channel.send(msg).await
}

async fn run_outbound_dispatch(channels: ChannelMap, mut rx: mpsc::Receiver<OutboundMessage>) {
    info!("outbound dispatch task started");
    while let Some(msg) = rx.recv().await {
        if let Err(e) = dispatch_to(&channels, &msg).await {
            warn!(channel = %msg.channel, chat = %msg.chat_id, error = %e, "outbound dispatch failed");
        }
    }
    info!("outbound dispatch task ended (bus closed)");
}
