//! Command-line mixer control.
//!
//! Talks to the mixer either directly over serial (`--device`) or through a
//! running `oscproxy` (`--host`/`--port`). Channels and buses are accepted
//! by index or by name, case- and whitespace-insensitively.

use anyhow::Result;
use clap::{Parser, Subcommand};
use mixctl_control::{
    resolve_bus, resolve_channel, ControlLink, OscController, SlipLink, UdpLink,
};

mod table;

const DEFAULT_DEVICE: &str = "/dev/tty_mixer_ctl";
const DEFAULT_BAUD: u32 = 1_152_000;

#[derive(Parser)]
#[command(name = "mixctl")]
#[command(about = "Command-line mixer control", long_about = None)]
struct Cli {
    /// Serial port the mixer is attached to
    #[arg(short, long, conflicts_with = "host")]
    device: Option<String>,

    /// Proxy host, to go through oscproxy instead of the serial port
    #[arg(long)]
    host: Option<String>,

    /// Proxy UDP port
    #[arg(short, long, default_value_t = 10024)]
    port: u16,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show connection info
    Info,
    /// Show all gains in human-readable format
    Matrix,
    /// Show input/output audio levels
    Vu,
    /// List channel names
    Channels,
    /// List bus names
    Buses,
    /// List channels and buses
    List,
    /// Get the gain for a channel on a bus
    GetGain { channel: String, bus: String },
    /// Set the gain for a channel on a bus
    SetGain {
        channel: String,
        bus: String,
        level: f32,
    },
    /// Mute a channel on a bus
    Mute { channel: String, bus: String },
    /// Unmute a channel on a bus
    Unmute { channel: String, bus: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let (link, target): (Box<dyn ControlLink>, String) = match &cli.host {
        Some(host) => (
            Box::new(UdpLink::connect(host, cli.port).await?),
            format!("{}:{}", host, cli.port),
        ),
        None => {
            let device = cli.device.as_deref().unwrap_or(DEFAULT_DEVICE);
            (
                Box::new(SlipLink::open(device, DEFAULT_BAUD).await?),
                device.to_string(),
            )
        }
    };
    let osc = OscController::connect(link).await?;

    match cli.command {
        Command::Info => {
            let host = hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string());
            println!("{}", "-".repeat(80));
            println!("Mixer control @{host}");
            println!("Connected to {target}");
            println!("{}", "-".repeat(80));
        }
        Command::Matrix => {
            let matrix = osc.matrix().await?;
            let mut header = vec!["#".to_string()];
            header.extend(osc.outputs().iter().cloned());
            let rows: Vec<Vec<String>> = matrix
                .iter()
                .enumerate()
                .map(|(channel, gains)| {
                    let mut row = vec![osc.inputs()[channel].clone()];
                    row.extend(gains.iter().map(|g| format!("{g:.2}")));
                    row
                })
                .collect();
            println!("{}", table::render(&header, &rows));
        }
        Command::Vu => {
            let header: Vec<String> = ["#", "rms", "peak", "smooth"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            let mut channel_rows = Vec::new();
            for (channel, name) in osc.inputs().to_vec().into_iter().enumerate() {
                let vu = osc.channel_vu(channel).await?;
                channel_rows.push(vec![
                    name,
                    format!("{:.2}", vu.rms),
                    format!("{:.2}", vu.peak),
                    format!("{:.2}", vu.smooth),
                ]);
            }
            let mut bus_rows = Vec::new();
            for (bus, name) in osc.outputs().to_vec().into_iter().enumerate() {
                let vu = osc.bus_vu(bus).await?;
                bus_rows.push(vec![
                    name,
                    format!("{:.2}", vu.rms),
                    format!("{:.2}", vu.peak),
                    format!("{:.2}", vu.smooth),
                ]);
            }
            println!("{}", table::render(&header, &channel_rows));
            println!("{}", table::render(&header, &bus_rows));
        }
        Command::Channels => println!("{}", osc.inputs().join("\t")),
        Command::Buses => println!("{}", osc.outputs().join("\t")),
        Command::List => {
            let width = osc.inputs().len().max(osc.outputs().len());
            let mut header = vec!["#".to_string()];
            header.extend((0..width).map(|i| i.to_string()));
            let mut channel_row = vec!["Channel".to_string()];
            channel_row.extend(osc.inputs().iter().cloned());
            let mut bus_row = vec!["Bus".to_string()];
            bus_row.extend(osc.outputs().iter().cloned());
            println!("Inputs/Outputs:");
            println!("{}", table::render(&header, &[channel_row, bus_row]));
        }
        Command::GetGain { channel, bus } => {
            let channel = resolve_channel(osc.inputs(), &channel)?;
            let bus = resolve_bus(osc.outputs(), &bus)?;
            println!("{}", osc.gain(channel, bus).await?);
        }
        Command::SetGain {
            channel,
            bus,
            level,
        } => {
            let channel = resolve_channel(osc.inputs(), &channel)?;
            let bus = resolve_bus(osc.outputs(), &bus)?;
            osc.set_gain(channel, bus, level).await?;
        }
        Command::Mute { channel, bus } => {
            let channel = resolve_channel(osc.inputs(), &channel)?;
            let bus = resolve_bus(osc.outputs(), &bus)?;
            osc.set_mute(channel, bus, true).await?;
        }
        Command::Unmute { channel, bus } => {
            let channel = resolve_channel(osc.inputs(), &channel)?;
            let bus = resolve_bus(osc.outputs(), &bus)?;
            osc.set_mute(channel, bus, false).await?;
        }
    }

    Ok(())
}
