//! Inbound path: gateway event → bus message.

use std::path::Path;

use serde_json::Value;
use tracing::{debug, error, warn};

use qqbridge_channels::{ChannelError, InboundMessage};

use crate::adapter::{QqCore, CHANNEL_NAME};
use crate::allow;
use crate::attach;
use crate::event::MessageEvent;

pub const DOWNLOAD_FAILED_PLACEHOLDER: &str = "[attachment: download failed]";
pub const EMPTY_MESSAGE_PLACEHOLDER: &str = "[empty message]";

/// Handle one inbound message event.
///
/// Never fails: errors are logged so a single bad event cannot take the
/// adapter down.
pub async fn handle_event(core: &QqCore, event: MessageEvent) {
    let message_id = event.id.clone();
    if let Err(e) = process_event(core, event).await {
        error!(message_id = %message_id, error = %e, "QQ: error handling message");
    }
}

async fn process_event(core: &QqCore, event: MessageEvent) -> Result<(), ChannelError> {
    if !core.mark_processed(&event.id) {
        debug!(message_id = %event.id, "QQ: duplicate event dropped");
        return Ok(());
    }

    if !allow::is_allowed(&core.config().allow_from, &event.sender_id) {
        warn!(sender = %event.sender_id, "QQ: sender not in allow_from, dropping message");
        return Ok(());
    }

    let mut parts: Vec<String> = Vec::new();
    if !event.content.is_empty() {
        parts.push(event.content.clone());
    }

    let mut media: Vec<String> = Vec::new();
    for (index, att) in event.attachments.iter().enumerate() {
        let Some(url) = att.url.as_deref() else {
            continue;
        };
        let downloaded = attach::download_attachment(
            core.download_client(),
            core.media_dir(),
            url,
            att.filename.as_deref(),
            &event.id,
            index,
            core.config().max_attachment_bytes,
        )
        .await;

        match downloaded {
            Some(path) => {
                parts.push(attachment_placeholder(&path));
                media.push(path.to_string_lossy().into_owned());
            }
            None => parts.push(DOWNLOAD_FAILED_PLACEHOLDER.to_string()),
        }
    }

    if parts.is_empty() && media.is_empty() {
        debug!(message_id = %event.id, "QQ: nothing to forward");
        return Ok(());
    }

    let joined = parts.join("\n");
    let content = match joined.trim() {
        "" => EMPTY_MESSAGE_PLACEHOLDER.to_string(),
        text => text.to_string(),
    };

    let mut inbound = InboundMessage::new(CHANNEL_NAME, &event.sender_id, &event.sender_id, content);
    inbound.media = media;
    inbound
        .metadata
        .insert("message_id".into(), Value::String(event.id.clone()));
    inbound
        .metadata
        .insert("attachment_count".into(), Value::from(event.attachments.len()));

    debug!(
        message_id = %event.id,
        sender = %event.sender_id,
        media = inbound.media.len(),
        "QQ: forwarding message to bus"
    );
    core.bus().publish_inbound(inbound).await
}

/// Placeholder line for a downloaded file, as it appears in the forwarded text.
pub fn attachment_placeholder(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("[attachment: {name}]")
}
