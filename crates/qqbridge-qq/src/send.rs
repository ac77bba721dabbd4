//! Outbound path: bus message → platform calls.
//!
//! Media goes out before text. In reply mode every message post takes the
//! next `msg_seq` for the original message, so consecutive sends never reuse
//! a sequence number.

use std::path::Path;
use std::sync::Mutex;

use tracing::{error, warn};

use qqbridge_channels::OutboundMessage;
use qqbridge_core::QqConfig;

use crate::api::{PostMessage, QqApi};
use crate::error::QqError;
use crate::media::{is_url, FileType};
use crate::seq::ReplySequenceTable;
use crate::upload;

pub const UNSUPPORTED_FILE_NOTICE: &str = "(Attachment not sent: QQ only accepts images, \
videos and voice clips as rich media, served from a public URL. Convert the file or share a \
link instead.)";

pub const UPLOAD_UNAVAILABLE_NOTICE: &str = "(Attachment not sent: QQ needs a publicly \
reachable URL for media. Configure channels.qq.media_upload_command to upload local files and \
print their URL.)";

/// Deliver `msg`. Platform errors are logged; the remaining items of the
/// message are skipped after the first failure.
pub async fn send_outbound(
    api: &dyn QqApi,
    config: &QqConfig,
    reply_seq: &Mutex<ReplySequenceTable>,
    msg: &OutboundMessage,
) {
    if msg.is_empty() {
        return;
    }

    let out = Outgoing {
        api,
        config,
        reply_seq,
        openid: &msg.chat_id,
        reply_to: msg.reply_to(),
    };

    if let Err(e) = out.deliver(msg).await {
        error!(chat = %msg.chat_id, error = %e, "QQ: error sending message");
    }
}

struct Outgoing<'a> {
    api: &'a dyn QqApi,
    config: &'a QqConfig,
    reply_seq: &'a Mutex<ReplySequenceTable>,
    openid: &'a str,
    reply_to: Option<&'a str>,
}

impl Outgoing<'_> {
    async fn deliver(&self, msg: &OutboundMessage) -> Result<(), QqError> {
        for path in &msg.media {
            self.send_media(path).await?;
        }
        self.send_text(&msg.content).await
    }

    /// Post one message, attaching `msg_id`/`msg_seq` in reply mode.
    async fn post(&self, body: PostMessage) -> Result<(), QqError> {
        let body = match self.reply_to {
            Some(msg_id) => {
                let seq = self
                    .reply_seq
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .next(msg_id);
                body.in_reply_to(msg_id, seq)
            }
            None => body,
        };
        self.api.post_c2c_message(self.openid, &body).await
    }

    async fn send_text(&self, text: &str) -> Result<(), QqError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        self.post(PostMessage::text(text)).await
    }

    async fn send_media(&self, path: &str) -> Result<(), QqError> {
        let path = path.trim();
        if path.is_empty() {
            return Ok(());
        }

        let (url, file_type) = if is_url(path) {
            (path.to_string(), FileType::guess_for_url(path))
        } else {
            let local = Path::new(path);
            let is_file = tokio::fs::metadata(local)
                .await
                .map(|m| m.is_file())
                .unwrap_or(false);
            if !is_file {
                warn!(path, "QQ: media path is not a file, skipping");
                return Ok(());
            }

            let Some(file_type) = FileType::from_path(local) else {
                return self.send_text(UNSUPPORTED_FILE_NOTICE).await;
            };

            let url = match self.config.upload_command() {
                Some(command) => {
                    upload::upload_to_public_url(command, local, self.config.upload_timeout()).await
                }
                None => None,
            };
            match url {
                Some(url) => (url, file_type),
                None => return self.send_text(UPLOAD_UNAVAILABLE_NOTICE).await,
            }
        };

        let media = self
            .api
            .post_c2c_file(self.openid, file_type, &url, false)
            .await?;
        self.post(PostMessage::media(media)).await
    }
}
