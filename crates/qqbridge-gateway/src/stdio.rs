//! JSON-lines bridge between the message bus and the process's stdio.
//!
//! Inbound bus messages are written to stdout, one JSON object per line.
//! Each stdin line is an outbound message; lines without a `channel` go to QQ.

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use qqbridge_channels::{InboundMessage, MessageBus, OutboundMessage};
use qqbridge_core::Result;

/// Longest stdin line accepted; longer lines are dropped.
const MAX_LINE_BYTES: usize = 1024 * 1024;

pub fn encode_inbound(msg: &InboundMessage) -> Result<String> {
    Ok(serde_json::to_string(msg)?)
}

/// Parse one stdin line. Blank lines yield `None`.
pub fn parse_outbound(line: &str) -> Result<Option<OutboundMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let mut msg: OutboundMessage = serde_json::from_str(line)?;
    if msg.channel.trim().is_empty() {
        msg.channel = qqbridge_qq::CHANNEL_NAME.to_string();
    }
    Ok(Some(msg))
}

/// Write every inbound message to `out` until the bus closes.
pub async fn write_inbound<W>(mut rx: mpsc::Receiver<InboundMessage>, mut out: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(msg) = rx.recv().await {
        let mut line = match encode_inbound(&msg) {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "failed to encode inbound message");
                continue;
            }
        };
        line.push('\n');
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
    }
    Ok(())
}

/// Publish every outbound line read from `input` until EOF.
///
/// Malformed lines are logged and skipped.
pub async fn read_outbound<R>(input: R, bus: MessageBus) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::new(input, LinesCodec::new_with_max_length(MAX_LINE_BYTES));

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(LinesCodecError::Io(e)) => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "dropping oversized outbound line");
                continue;
            }
        };
        match parse_outbound(&line) {
            Ok(Some(msg)) => {
                debug!(channel = %msg.channel, chat = %msg.chat_id, "outbound message from stdin");
                if let Err(e) = bus.publish_outbound(msg).await {
                    warn!(error = %e, "outbound bus closed, no longer reading stdin");
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "ignoring malformed outbound line"),
        }
    }
    Ok(())
}
