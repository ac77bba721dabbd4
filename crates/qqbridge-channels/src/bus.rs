//! In-process message bus connecting channel adapters to their consumer.
//!
//! Two bounded queues: inbound (adapters → consumer) and outbound
//! (consumer → adapters). Each receiver can be taken exactly once.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    error::ChannelError,
    types::{InboundMessage, OutboundMessage},
};

#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    inbound_tx: mpsc::Sender<InboundMessage>,
    inbound_rx: Mutex<Option<mpsc::Receiver<InboundMessage>>>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
}

impl MessageBus {
    pub fn new(capacity: usize) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(capacity.max(1));
        let (outbound_tx, outbound_rx) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(BusInner {
                inbound_tx,
                inbound_rx: Mutex::new(Some(inbound_rx)),
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
            }),
        }
    }

    /// Hand a normalized inbound message to the consumer.
    pub async fn publish_inbound(&self, msg: InboundMessage) -> Result<(), ChannelError> {
        debug!(channel = %msg.channel, sender = %msg.sender_id, "bus: inbound");
        self.inner
            .inbound_tx
            .send(msg)
            .await
            .map_err(|_| ChannelError::BusClosed)
    }

    /// Queue a message for delivery by the channel named in `msg.channel`.
    pub async fn publish_outbound(&self, msg: OutboundMessage) -> Result<(), ChannelError> {
        debug!(channel = %msg.channel, chat = %msg.chat_id, "bus: outbound");
        self.inner
            .outbound_tx
            .send(msg)
            .await
            .map_err(|_| ChannelError::BusClosed)
    }

    /// Take the inbound receiver. Returns `None` after the first call.
    pub fn take_inbound_receiver(&self) -> Option<mpsc::Receiver<InboundMessage>> {
        self.inner
            .inbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    /// Take the outbound receiver. Returns `None` after the first call.
    pub fn take_outbound_receiver(&self) -> Option<mpsc::Receiver<OutboundMessage>> {
        self.inner
            .outbound_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }
}
