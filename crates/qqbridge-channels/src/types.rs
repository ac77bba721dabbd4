use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A message received from an external channel, normalized for the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Logical channel name (e.g. "qq").
    pub channel: String,

    /// Platform-native identifier for the sender.
    pub sender_id: String,

    /// Conversation the reply should go to. For private chats this equals `sender_id`.
    pub chat_id: String,

    /// Plain text content, including attachment placeholders.
    pub content: String,

    /// Local paths of downloaded attachments.
    #[serde(default)]
    pub media: Vec<String>,

    /// Channel-specific extras (e.g. `message_id` for threaded replies).
    #[serde(default)]
    pub metadata: Map<String, Value>,

    /// RFC-3339 timestamp of when the message was received.
    pub timestamp: String,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        sender_id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            sender_id: sender_id.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata: Map::new(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// A message to be delivered to an external channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Logical channel name (e.g. "qq"). Empty means the sender left it to the router.
    #[serde(default)]
    pub channel: String,

    /// Platform-native identifier for the recipient (an openid for QQ C2C).
    pub chat_id: String,

    /// Text to deliver. May be empty when only media is sent.
    #[serde(default)]
    pub content: String,

    /// Local file paths or public URLs to send before the text.
    #[serde(default)]
    pub media: Vec<String>,

    /// Carries `message_id` when the message replies to an inbound one.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl OutboundMessage {
    /// The inbound message id this message replies to, if any non-blank one is set.
    pub fn reply_to(&self) -> Option<&str> {
        self.metadata
            .get("message_id")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Nothing to send: blank text and no media.
    pub fn is_empty(&self) -> bool {
        self.content.trim().is_empty() && self.media.is_empty()
    }
}

/// Runtime connection state of a channel adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelStatus {
    /// Fully connected and ready to send/receive.
    Connected,

    /// Attempting to establish or re-establish the connection.
    Connecting,

    /// Cleanly disconnected (not an error condition).
    Disconnected,

    /// An unrecoverable (or pre-retry) error occurred.
    Error(String),
}
