//! Inbound gateway events, parsed best-effort.
//!
//! C2C and guild direct messages carry slightly different payloads: the C2C
//! author only has `user_openid`, the direct-message author has `id`. Both
//! map onto the same [`MessageEvent`].

use serde_json::Value;

pub const C2C_MESSAGE_CREATE: &str = "C2C_MESSAGE_CREATE";
pub const DIRECT_MESSAGE_CREATE: &str = "DIRECT_MESSAGE_CREATE";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    C2c,
    Direct,
}

impl EventKind {
    pub fn from_event_type(event_type: &str) -> Option<Self> {
        match event_type {
            C2C_MESSAGE_CREATE => Some(Self::C2c),
            DIRECT_MESSAGE_CREATE => Some(Self::Direct),
            _ => None,
        }
    }
}

/// One attachment reference. Either field may be missing in the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attachment {
    pub url: Option<String>,
    pub filename: Option<String>,
}

/// A normalized inbound message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub kind: EventKind,
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

impl MessageEvent {
    /// Parse the `d` payload of a message dispatch.
    ///
    /// Returns `None` for unrelated event types and for payloads without a
    /// message id, which cannot be deduplicated or replied to.
    pub fn from_dispatch(event_type: &str, data: &Value) -> Option<Self> {
        let kind = EventKind::from_event_type(event_type)?;
        let id = non_blank(data.get("id"))?;

        let author = data.get("author");
        let sender_id = author
            .and_then(|a| non_blank(a.get("id")))
            .or_else(|| author.and_then(|a| non_blank(a.get("user_openid"))))
            .unwrap_or_else(|| "unknown".to_string());

        let content = data
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .trim()
            .to_string();

        let attachments = data
            .get("attachments")
            .and_then(Value::as_array)
            .map(|items| items.iter().map(parse_attachment).collect())
            .unwrap_or_default();

        Some(Self {
            kind,
            id,
            sender_id,
            content,
            attachments,
        })
    }
}

fn parse_attachment(item: &Value) -> Attachment {
    Attachment {
        url: non_blank(item.get("url")).map(|u| normalize_url(&u)),
        filename: non_blank(item.get("filename")),
    }
}

/// Attachment URLs sometimes arrive without a scheme.
fn normalize_url(url: &str) -> String {
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        url.to_string()
    } else if let Some(rest) = url.strip_prefix("//") {
        format!("https://{rest}")
    } else {
        format!("https://{url}")
    }
}

fn non_blank(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_c2c_payload() {
        let data = json!({
            "id": "ROBOT1.0_abc",
            "author": {"user_openid": "E1F2A3"},
            "content": "  hello  ",
            "timestamp": "2026-10-18T10:00:00+08:00",
            "attachments": [{
                "content_type": "image/png",
                "filename": "shot.png",
                "url": "https://multimedia.nt.qq.com.cn/download?id=1"
            }]
        });
        let ev = MessageEvent::from_dispatch(C2C_MESSAGE_CREATE, &data).expect("event");
        assert_eq!(ev.kind, EventKind::C2c);
        assert_eq!(ev.id, "ROBOT1.0_abc");
        assert_eq!(ev.sender_id, "E1F2A3");
        assert_eq!(ev.content, "hello");
        assert_eq!(ev.attachments.len(), 1);
        assert_eq!(ev.attachments[0].filename.as_deref(), Some("shot.png"));
    }

    #[test]
    fn parses_direct_message_payload() {
        let data = json!({
            "id": "08f1",
            "author": {"id": "1234567", "username": "alice"},
            "content": "hi",
            "guild_id": "99",
            "channel_id": "100"
        });
        let ev = MessageEvent::from_dispatch(DIRECT_MESSAGE_CREATE, &data).expect("event");
        assert_eq!(ev.kind, EventKind::Direct);
        assert_eq!(ev.sender_id, "1234567");
        assert!(ev.attachments.is_empty());
    }

    #[test]
    fn author_id_wins_over_openid() {
        let data = json!({"id": "m", "author": {"id": "a", "user_openid": "b"}});
        let ev = MessageEvent::from_dispatch(C2C_MESSAGE_CREATE, &data).unwrap();
        assert_eq!(ev.sender_id, "a");
    }

    #[test]
    fn missing_author_is_unknown() {
        let data = json!({"id": "m", "content": "x"});
        let ev = MessageEvent::from_dispatch(C2C_MESSAGE_CREATE, &data).unwrap();
        assert_eq!(ev.sender_id, "unknown");
    }

    #[test]
    fn missing_id_is_rejected() {
        let data = json!({"author": {"id": "a"}, "content": "x"});
        assert!(MessageEvent::from_dispatch(C2C_MESSAGE_CREATE, &data).is_none());
    }

    #[test]
    fn unrelated_event_type_is_rejected() {
        let data = json!({"id": "m"});
        assert!(MessageEvent::from_dispatch("GUILD_CREATE", &data).is_none());
    }

    #[test]
    fn malformed_fields_are_tolerated() {
        let data = json!({
            "id": "m",
            "content": 42,
            "attachments": [{"url": 7}, {"url": "  "}, "garbage"]
        });
        let ev = MessageEvent::from_dispatch(C2C_MESSAGE_CREATE, &data).unwrap();
        assert_eq!(ev.content, "");
        assert_eq!(ev.attachments.len(), 3);
        assert!(ev.attachments.iter().all(|a| a.url.is_none()));
    }

    #[test]
    fn schemeless_urls_get_https() {
        assert_eq!(normalize_url("//gchat.qpic.cn/x"), "https://gchat.qpic.cn/x");
        assert_eq!(normalize_url("gchat.qpic.cn/x"), "https://gchat.qpic.cn/x");
        assert_eq!(normalize_url("http://a/b"), "http://a/b");
    }
}
