use async_trait::async_trait;

use crate::{
    error::ChannelError,
    types::{ChannelStatus, OutboundMessage},
};

/// Common interface implemented by every channel adapter.
///
/// Implementations must be `Send + Sync` so they can be shared between the
/// task driving [`Channel::start`] and the outbound dispatcher calling
/// [`Channel::send`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier for this channel (e.g. `"qq"`).
    ///
    /// The name is used as the key inside [`ChannelManager`](crate::manager::ChannelManager)
    /// and must match the `channel` field of outbound messages routed to it.
    fn name(&self) -> &str;

    /// Connect and keep the connection alive until [`Channel::stop`] is called.
    ///
    /// Returns early with an error only when the adapter cannot run at all
    /// (e.g. missing credentials). Transport errors are retried internally.
    async fn start(&self) -> Result<(), ChannelError>;

    /// Stop the connection loop and close the transport. Never fails.
    async fn stop(&self);

    /// Deliver a single outbound message to the channel.
    async fn send(&self, msg: &OutboundMessage) -> Result<(), ChannelError>;

    /// Return the current runtime status without blocking.
    fn status(&self) -> ChannelStatus;
}
