use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BUS_CAPACITY: usize = 256;
pub const DEFAULT_QQ_API_BASE: &str = "https://api.sgroup.qq.com";
pub const DEFAULT_QQ_TOKEN_URL: &str = "https://bots.qq.com/app/getAppAccessToken";
pub const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 20 * 1024 * 1024;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
/// Passive replies are only accepted for a while after the original message,
/// so sequence state older than this is useless.
pub const DEFAULT_REPLY_SEQ_TTL_SECS: u64 = 3600;

/// Top-level config (qqbridge.toml + QQBRIDGE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Capacity of each of the inbound and outbound queues.
    #[serde(default = "default_bus_capacity")]
    pub capacity: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_BUS_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub qq: Option<QqConfig>,
}

/// QQ Bot open-platform credentials and adapter tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QqConfig {
    #[serde(default)]
    pub app_id: String,
    #[serde(default)]
    pub secret: String,
    /// Sender openids allowed to reach the bus. Empty or `"*"` allows everyone.
    #[serde(default)]
    pub allow_from: Vec<String>,
    /// Shell command turning a local file into a public URL.
    ///
    /// `{path}` is replaced by the quoted file path; without the placeholder
    /// the path is appended as the last argument. The first http(s) URL the
    /// command prints (stdout, then stderr) is used.
    #[serde(default)]
    pub media_upload_command: Option<String>,
    #[serde(default = "default_upload_timeout")]
    pub media_upload_timeout_s: u64,
    /// Where inbound attachments are downloaded to.
    #[serde(default = "default_media_dir")]
    pub media_dir: String,
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_reply_seq_ttl")]
    pub reply_seq_ttl_secs: u64,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// App access token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Inbound attachments larger than this are not downloaded.
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

impl Default for QqConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            secret: String::new(),
            allow_from: Vec::new(),
            media_upload_command: None,
            media_upload_timeout_s: DEFAULT_UPLOAD_TIMEOUT_SECS,
            media_dir: default_media_dir(),
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
            reply_seq_ttl_secs: DEFAULT_REPLY_SEQ_TTL_SECS,
            api_base: default_api_base(),
            token_url: default_token_url(),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}

impl QqConfig {
    /// Both `app_id` and `secret` are present.
    pub fn has_credentials(&self) -> bool {
        !self.app_id.trim().is_empty() && !self.secret.trim().is_empty()
    }

    /// The configured upload command, or `None` when unset or blank.
    pub fn upload_command(&self) -> Option<&str> {
        self.media_upload_command
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }

    /// Upload timeout, never below one second.
    pub fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.media_upload_timeout_s.max(1))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn reply_seq_ttl(&self) -> Duration {
        Duration::from_secs(self.reply_seq_ttl_secs)
    }
}

fn default_bus_capacity() -> usize {
    DEFAULT_BUS_CAPACITY
}
fn default_upload_timeout() -> u64 {
    DEFAULT_UPLOAD_TIMEOUT_SECS
}
fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}
fn default_reply_seq_ttl() -> u64 {
    DEFAULT_REPLY_SEQ_TTL_SECS
}
fn default_api_base() -> String {
    DEFAULT_QQ_API_BASE.to_string()
}
fn default_token_url() -> String {
    DEFAULT_QQ_TOKEN_URL.to_string()
}
fn default_max_attachment_bytes() -> u64 {
    DEFAULT_MAX_ATTACHMENT_BYTES
}
fn default_media_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.qqbridge/media", home)
}

impl BridgeConfig {
    /// Load config from a TOML file with QQBRIDGE_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `QQBRIDGE_CHANNELS__QQ__APP_ID`. A missing file is not an error;
    /// every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        tracing::debug!(path = %path, "loading config");

        let config: BridgeConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("QQBRIDGE_").split("__"))
            .extract()
            .map_err(|e| crate::error::BridgeError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.qqbridge/qqbridge.toml", home)
}
