//! Mixer API daemon.
//!
//! Connects to the mixer (owning the serial device through the embedded
//! bridge, or over UDP to a running `oscproxy`), runs the multi-rate poll
//! scheduler, and serves the HTTP/WebSocket API until ctrl-c.

use anyhow::{Context, Result};
use clap::Parser;
use mixctl_api::config::Settings;
use mixctl_api::influx::InfluxPusher;
use mixctl_api::scheduler::{Consumer, PollScheduler};
use mixctl_api::web::{self, WebState};
use mixctl_control::{ControlLink, OscController, UdpLink};
use mixctl_proxy::{Bridge, BridgeConfig, BridgeLink, FrontendConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::info;

#[derive(Parser)]
#[command(name = "mixerapid")]
#[command(about = "Mixer polling daemon with HTTP API", long_about = None)]
struct Cli {
    /// Config file (default: ./mixctl.toml, ~/.config/mixctl.toml, /etc/mixctl.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let default_filter = if cli.verbose {
        "debug".to_string()
    } else {
        settings.log_level.clone()
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Reach the mixer. Owning the device means embedding the bridge, so
    // the optional UDP front-end can share the line with external clients.
    let mut bridge = None;
    let device_label;
    let link: Box<dyn ControlLink> = match (&settings.conn.device, &settings.conn.host) {
        (Some(device), _) => {
            let bridge_config = BridgeConfig {
                device: device.clone(),
                baud: settings.conn.baud,
                ..Default::default()
            };
            let frontend = settings.udp.as_ref().map(|udp| FrontendConfig {
                bind: udp.bind.clone(),
                port: udp.port,
                ..Default::default()
            });
            let started = Bridge::start(bridge_config, frontend).await?;
            if let Some(addr) = started.frontend_addr() {
                info!(%addr, "udp front-end attached");
            }
            let link = BridgeLink::new(started.handle());
            bridge = Some(started);
            device_label = device.clone();
            Box::new(link)
        }
        (None, Some(host)) => {
            device_label = format!("{}:{}", host, settings.conn.port);
            Box::new(UdpLink::connect(host, settings.conn.port).await?)
        }
        // Settings::validate rules this out.
        (None, None) => anyhow::bail!("no mixer connection configured"),
    };

    let controller = Arc::new(
        OscController::connect(link)
            .await
            .context("failed to connect to mixer")?,
    );
    info!(
        device = %device_label,
        channels = controller.inputs().len(),
        buses = controller.outputs().len(),
        "connected to mixer"
    );

    // Snapshot consumers, each at its own cadence.
    let web_consumer = Consumer::new("web", settings.levels.interval_web);
    let web_mailbox = Arc::clone(&web_consumer.mailbox);
    let mut consumers = vec![web_consumer];
    let mut influx_task = None;
    if let Some(influx_settings) = &settings.influxdb {
        let consumer = Consumer::new("influx", settings.levels.interval_influxdb);
        let pusher = InfluxPusher::new(
            influx_settings,
            Arc::clone(&consumer.mailbox),
            shutdown_rx.clone(),
        );
        influx_task = Some(tokio::spawn(pusher.run()));
        consumers.push(consumer);
        info!(host = %influx_settings.host, db = %influx_settings.db, "influxdb export enabled");
    }

    let scheduler = PollScheduler::new(
        Arc::clone(&controller),
        consumers,
        shutdown_rx.clone(),
    )?;
    let scheduler_task = tokio::spawn(scheduler.run());

    let (snapshot_tx, _) = broadcast::channel(16);
    let relay_task = tokio::spawn(web::run_snapshot_relay(
        Arc::clone(&web_mailbox),
        snapshot_tx.clone(),
        shutdown_rx,
    ));

    let app = web::router(WebState::new(
        controller,
        device_label,
        snapshot_tx,
        web_mailbox,
    ));
    let listener =
        tokio::net::TcpListener::bind((settings.host.listen.as_str(), settings.host.port))
            .await
            .with_context(|| {
                format!(
                    "failed to bind {}:{}",
                    settings.host.listen, settings.host.port
                )
            })?;
    info!(addr = %listener.local_addr()?, "http api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!("shutting down");
    let _ = shutdown_tx.send(true);
    scheduler_task.await.ok();
    relay_task.await.ok();
    if let Some(task) = influx_task {
        task.await.ok();
    }
    if let Some(bridge) = bridge {
        bridge.shutdown().await;
    }
    Ok(())
}
