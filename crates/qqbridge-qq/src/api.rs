//! REST surface of the QQ Bot open platform used by the adapter.
//!
//! Only the two C2C endpoints the adapter needs are covered, behind the
//! [`QqApi`] trait so the adapter can be driven without a network.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::QqError;
use crate::media::FileType;
use crate::token::AccessTokenSource;

pub const MSG_TYPE_TEXT: u8 = 0;
pub const MSG_TYPE_MEDIA: u8 = 7;

/// Handle returned by the file endpoint; sent back inside a media message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub file_info: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

/// Body of `POST /v2/users/{openid}/messages`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostMessage {
    pub msg_type: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<MediaInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg_seq: Option<u64>,
}

impl PostMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            msg_type: MSG_TYPE_TEXT,
            content: Some(content.into()),
            media: None,
            msg_id: None,
            msg_seq: None,
        }
    }

    pub fn media(media: MediaInfo) -> Self {
        Self {
            msg_type: MSG_TYPE_MEDIA,
            content: None,
            media: Some(media),
            msg_id: None,
            msg_seq: None,
        }
    }

    /// Turn this into a passive reply to `msg_id`.
    pub fn in_reply_to(mut self, msg_id: &str, msg_seq: u64) -> Self {
        self.msg_id = Some(msg_id.to_string());
        self.msg_seq = Some(msg_seq);
        self
    }
}

/// The platform calls the adapter makes when sending.
#[async_trait]
pub trait QqApi: Send + Sync {
    /// Post a text or media message to a C2C conversation.
    async fn post_c2c_message(&self, openid: &str, body: &PostMessage) -> Result<(), QqError>;

    /// Register a public URL as rich media for `openid`.
    ///
    /// With `srv_send_msg = false` nothing is delivered yet; the returned
    /// [`MediaInfo`] must be sent with [`QqApi::post_c2c_message`].
    async fn post_c2c_file(
        &self,
        openid: &str,
        file_type: FileType,
        url: &str,
        srv_send_msg: bool,
    ) -> Result<MediaInfo, QqError>;
}

/// [`QqApi`] over HTTPS.
pub struct HttpApi {
    http: reqwest::Client,
    base: String,
    tokens: Arc<AccessTokenSource>,
}

impl HttpApi {
    pub fn new(http: reqwest::Client, base: &str, tokens: Arc<AccessTokenSource>) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<AccessTokenSource> {
        &self.tokens
    }

    /// WebSocket URL for the event gateway (`GET /gateway`).
    pub async fn gateway_url(&self) -> Result<String, QqError> {
        let auth = self.tokens.authorization().await?;
        let resp = self
            .http
            .get(format!("{}/gateway", self.base))
            .header("Authorization", auth)
            .send()
            .await?;
        let data = self.check(resp).await?;
        data.get("url")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| QqError::Gateway("gateway response has no url".into()))
    }

    async fn post_json(&self, path: &str, body: &impl Serialize) -> Result<Value, QqError> {
        let auth = self.tokens.authorization().await?;
        debug!(path, "QQ: POST");
        let resp = self
            .http
            .post(format!("{}{}", self.base, path))
            .header("Authorization", auth)
            .json(body)
            .send()
            .await?;
        self.check(resp).await
    }

    /// Map non-2xx responses to [`QqError::Api`]; a 401 also drops the cached token.
    async fn check(&self, resp: reqwest::Response) -> Result<Value, QqError> {
        let status = resp.status();
        let text = resp.text().await?;
        if status.is_success() {
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v.get("message").and_then(Value::as_str).map(String::from))
            .unwrap_or(text);
        Err(QqError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl QqApi for HttpApi {
    async fn post_c2c_message(&self, openid: &str, body: &PostMessage) -> Result<(), QqError> {
        self.post_json(&format!("/v2/users/{openid}/messages"), body)
            .await
            .map(|_| ())
    }

    async fn post_c2c_file(
        &self,
        openid: &str,
        file_type: FileType,
        url: &str,
        srv_send_msg: bool,
    ) -> Result<MediaInfo, QqError> {
        let body = serde_json::json!({
            "file_type": file_type,
            "url": url,
            "srv_send_msg": srv_send_msg,
        });
        let data = self
            .post_json(&format!("/v2/users/{openid}/files"), &body)
            .await?;
        Ok(serde_json::from_value(data)?)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn text_body_omits_reply_fields() {
        let body = serde_json::to_value(PostMessage::text("hi")).unwrap();
        assert_eq!(body, json!({"msg_type": 0, "content": "hi"}));
    }

    #[test]
    fn reply_body_carries_msg_id_and_seq() {
        let body = serde_json::to_value(PostMessage::text("hi").in_reply_to("m1", 3)).unwrap();
        assert_eq!(body, json!({"msg_type": 0, "content": "hi", "msg_id": "m1", "msg_seq": 3}));
    }

    #[test]
    fn media_body_wraps_file_info() {
        let info: MediaInfo =
            serde_json::from_value(json!({"file_uuid": "u", "file_info": "INFO", "ttl": 0})).unwrap();
        let body = serde_json::to_value(PostMessage::media(info)).unwrap();
        assert_eq!(body["msg_type"], 7);
        assert_eq!(body["media"]["file_info"], "INFO");
        assert!(body.get("content").is_none());
    }
}
