/// Errors produced by the QQ adapter and its platform client.
#[derive(Debug, thiserror::Error)]
pub enum QqError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("QQ API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("gateway protocol error: {0}")]
    Gateway(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("app_id and secret not configured")]
    NoCredentials,
}
