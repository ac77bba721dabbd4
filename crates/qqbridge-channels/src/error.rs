use thiserror::Error;

/// Errors that can occur within any channel adapter.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The bus side of a queue has been dropped.
    #[error("Message bus closed")]
    BusClosed,

    /// No channel is registered under this name.
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),
}
