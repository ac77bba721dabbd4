use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use qqbridge_channels::{ChannelManager, MessageBus};
use qqbridge_core::BridgeConfig;
use qqbridge_qq::QqChannel;

mod stdio;

/// Bridge QQ private chats to a JSON-lines message bus on stdio.
#[derive(Debug, Parser)]
#[command(name = "qqbridge", version)]
struct Cli {
    /// Config file (default: ~/.qqbridge/qqbridge.toml).
    #[arg(long, env = "QQBRIDGE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the bus stream, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "qqbridge=info,qqbridge_qq=info,qqbridge_channels=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = BridgeConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        BridgeConfig::default()
    });

    let bus = MessageBus::new(config.bus.capacity);
    let mut manager = ChannelManager::new();

    match config.channels.qq {
        Some(qq) => {
            let channel = QqChannel::new(qq, bus.clone()).context("building QQ channel")?;
            manager.register(Arc::new(channel));
        }
        None => warn!("no [channels.qq] section configured, nothing will be bridged"),
    }
    manager.start_all();

    let outbound_rx = bus
        .take_outbound_receiver()
        .context("outbound receiver already taken")?;
    let inbound_rx = bus
        .take_inbound_receiver()
        .context("inbound receiver already taken")?;

    let dispatch = manager.spawn_outbound_dispatch(outbound_rx);
    let writer = tokio::spawn(stdio::write_inbound(inbound_rx, tokio::io::stdout()));
    let mut reader = tokio::spawn(stdio::read_outbound(tokio::io::stdin(), bus.clone()));

    info!("qqbridge running, reading outbound messages from stdin");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("waiting for ctrl-c")?;
            info!("interrupt received, shutting down");
        }
        res = &mut reader => {
            match res {
                Ok(Ok(())) => info!("stdin closed, shutting down"),
                Ok(Err(e)) => warn!(error = %e, "stdin reader failed, shutting down"),
                Err(e) => warn!(error = %e, "stdin reader panicked, shutting down"),
            }
        }
    }

    manager.stop_all().await;
    reader.abort();
    dispatch.abort();
    writer.abort();
    Ok(())
}
