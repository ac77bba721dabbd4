//! App access token for the QQ Bot open platform.
//!
//! Tokens live for about two hours; the cached one is refreshed shortly
//! before it expires or after the API rejects it.

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::QqError;

const REFRESH_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_TTL_SECS: u64 = 7200;

struct CachedToken {
    value: String,
    refresh_after: Instant,
}

pub struct AccessTokenSource {
    http: reqwest::Client,
    app_id: String,
    secret: String,
    token_url: String,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenSource {
    pub fn new(http: reqwest::Client, token_url: &str, app_id: &str, secret: &str) -> Self {
        Self {
            http,
            app_id: app_id.to_string(),
            secret: secret.to_string(),
            token_url: token_url.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Value for the `Authorization` header of REST calls and the gateway identify.
    pub async fn authorization(&self) -> Result<String, QqError> {
        Ok(format!("QQBot {}", self.token().await?))
    }

    /// Return the cached token, fetching a new one if missing or about to expire.
    pub async fn token(&self) -> Result<String, QqError> {
        let mut cached = self.cached.lock().await;
        if let Some(ref token) = *cached {
            if Instant::now() < token.refresh_after {
                return Ok(token.value.clone());
            }
        }

        debug!("QQ: fetching app access token");
        let body = serde_json::json!({
            "appId": self.app_id,
            "clientSecret": self.secret,
        });
        let resp = self.http.post(&self.token_url).json(&body).send().await?;
        let status = resp.status();
        let data: Value = resp.json().await?;

        let (value, ttl_secs) = parse_token_response(&data).ok_or_else(|| QqError::Api {
            status: status.as_u16(),
            message: data
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("missing access_token in response")
                .to_string(),
        })?;

        let ttl = Duration::from_secs(ttl_secs);
        info!(ttl_secs, "QQ: access token refreshed");
        *cached = Some(CachedToken {
            value: value.clone(),
            refresh_after: Instant::now() + ttl.saturating_sub(REFRESH_MARGIN),
        });
        Ok(value)
    }

    /// Forget the cached token so the next call fetches a fresh one.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

/// Extract `(access_token, expires_in)`. `expires_in` arrives as a string.
fn parse_token_response(data: &Value) -> Option<(String, u64)> {
    let token = data
        .get("access_token")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())?
        .to_string();
    let ttl = match data.get("expires_in") {
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(Value::Number(n)) => n.as_u64(),
        _ => None,
    }
    .unwrap_or(DEFAULT_TTL_SECS);
    Some((token, ttl))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_string_ttl() {
        let data = json!({"access_token": "tok", "expires_in": "7200"});
        assert_eq!(parse_token_response(&data), Some(("tok".into(), 7200)));
    }

    #[test]
    fn parses_numeric_ttl() {
        let data = json!({"access_token": "tok", "expires_in": 60});
        assert_eq!(parse_token_response(&data), Some(("tok".into(), 60)));
    }

    #[test]
    fn missing_ttl_uses_default() {
        let data = json!({"access_token": "tok"});
        assert_eq!(parse_token_response(&data), Some(("tok".into(), DEFAULT_TTL_SECS)));
    }

    #[test]
    fn error_body_has_no_token() {
        let data = json!({"code": 100016, "message": "invalid appid or secret"});
        assert_eq!(parse_token_response(&data), None);
    }
}
