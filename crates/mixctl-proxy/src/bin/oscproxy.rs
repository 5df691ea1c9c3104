//! Serial-to-socket bridge for OSC mixer control.
//!
//! Runs the transport bridge standalone: one serial conversation at a
//! time, shared FIFO among any number of UDP peers.

use anyhow::Result;
use clap::Parser;
use mixctl_proxy::{Bridge, BridgeConfig, FrontendConfig};

#[derive(Parser)]
#[command(name = "oscproxy")]
#[command(about = "Serial to socket bridge for OSC", long_about = None)]
struct Cli {
    /// Serial port the mixer is attached to
    #[arg(short, long, default_value = "/dev/tty_mixer_ctl")]
    uart: String,

    /// UDP port to bind
    #[arg(short, long, default_value_t = 10024)]
    port: u16,

    /// Address to bind
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let bridge_config = BridgeConfig {
        device: cli.uart,
        ..Default::default()
    };
    let frontend_config = FrontendConfig {
        bind: cli.bind,
        port: cli.port,
        ..Default::default()
    };

    let bridge = Bridge::start(bridge_config, Some(frontend_config)).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    bridge.shutdown().await;
    Ok(())
}
