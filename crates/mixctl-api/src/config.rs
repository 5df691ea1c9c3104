//! Daemon configuration.
//!
//! Settings are loaded from the first readable of `./mixctl.toml`,
//! `~/.config/mixctl.toml`, `/etc/mixctl.toml` (or an explicit path), using
//! the `config` crate for file loading and `serde` for the data structures.
//!
//! ## Schema
//!
//! - **`log_level`**: default tracing verbosity ("error" .. "trace"), used
//!   when `RUST_LOG` is not set.
//! - **`conn`**: how to reach the mixer. Exactly one of:
//!   - `device` (+ optional `baud`): own the serial port directly, and
//!   - `host`/`port`: talk to a running `oscproxy` over UDP.
//! - **`host`**: HTTP listen address (`listen`, `port`).
//! - **`levels`**: poll cadence in milliseconds per consumer
//!   (`interval_web`, `interval_influxdb`).
//! - **`udp`** (optional): attach the UDP front-end to the owned serial
//!   device, so external OSC clients share the line (`bind`, `port`).
//!   Only meaningful together with `conn.device`.
//! - **`influxdb`** (optional): level export target (`host`, `db`).
//!
//! `Settings::load` validates after deserialization; the daemon refuses to
//! start on an invalid file rather than failing at runtime.

use anyhow::{bail, Context, Result};
use config::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default serial baud rate of the mixer control port.
pub const DEFAULT_BAUD: u32 = 1_152_000;

/// Top-level daemon configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Tracing verbosity when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Mixer connection, serial or UDP-via-proxy.
    pub conn: ConnSettings,

    /// HTTP API listen address.
    #[serde(default)]
    pub host: HostSettings,

    /// Poll cadence per consumer.
    #[serde(default)]
    pub levels: LevelSettings,

    /// Optional UDP front-end sharing the serial line.
    pub udp: Option<UdpSettings>,

    /// Optional InfluxDB export target.
    pub influxdb: Option<InfluxSettings>,
}

/// Where the mixer is.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnSettings {
    /// Serial device path, e.g. `/dev/tty_mixer_ctl`.
    pub device: Option<String>,
    /// Serial baud rate.
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Proxy host, for UDP mode.
    pub host: Option<String>,
    /// Proxy port, for UDP mode.
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

/// HTTP listen address.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSettings {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

/// Poll intervals in milliseconds, one per snapshot consumer.
#[derive(Debug, Clone, Deserialize)]
pub struct LevelSettings {
    #[serde(default = "default_interval_web")]
    pub interval_web: u64,
    #[serde(default = "default_interval_influxdb")]
    pub interval_influxdb: u64,
}

/// UDP front-end settings, mirroring the standalone proxy's flags.
#[derive(Debug, Clone, Deserialize)]
pub struct UdpSettings {
    #[serde(default = "default_udp_bind")]
    pub bind: String,
    #[serde(default = "default_proxy_port")]
    pub port: u16,
}

/// InfluxDB write endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxSettings {
    /// Host (and optional port) of the InfluxDB instance.
    pub host: String,
    /// Database name, passed as the `db` query parameter.
    pub db: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_baud() -> u32 {
    DEFAULT_BAUD
}

fn default_proxy_port() -> u16 {
    10024
}

fn default_udp_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8000
}

fn default_interval_web() -> u64 {
    100
}

fn default_interval_influxdb() -> u64 {
    250
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            port: default_http_port(),
        }
    }
}

impl Default for LevelSettings {
    fn default() -> Self {
        Self {
            interval_web: default_interval_web(),
            interval_influxdb: default_interval_influxdb(),
        }
    }
}

impl Settings {
    /// Load from `path` if given, otherwise from the first readable file in
    /// the default search order.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::find_config_file()
                .context("no config file found (looked for ./mixctl.toml, ~/.config/mixctl.toml, /etc/mixctl.toml)")?,
        };
        Self::from_file(&path)
    }

    /// Load and validate a specific config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let loaded = Config::builder()
            .add_source(config::File::from(path))
            .build()
            .with_context(|| format!("failed to load configuration from '{}'", path.display()))?;

        let settings: Settings = loaded
            .try_deserialize()
            .context("failed to deserialize configuration")?;
        settings.validate()?;
        tracing::info!(config = %path.display(), "configuration loaded");
        Ok(settings)
    }

    fn find_config_file() -> Option<PathBuf> {
        let mut candidates = vec![PathBuf::from("./mixctl.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("mixctl.toml"));
        }
        candidates.push(PathBuf::from("/etc/mixctl.toml"));
        candidates.into_iter().find(|p| p.is_file())
    }

    fn validate(&self) -> Result<()> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.log_level.to_lowercase().as_str()) {
            bail!("invalid log level: {}", self.log_level);
        }

        match (&self.conn.device, &self.conn.host) {
            (Some(_), Some(_)) => {
                bail!("conn.device and conn.host are mutually exclusive; pick one")
            }
            (None, None) => bail!("conn needs either a serial device or a proxy host"),
            _ => {}
        }

        if self.udp.is_some() && self.conn.device.is_none() {
            bail!("udp front-end requires owning the serial device (conn.device)");
        }

        if self.levels.interval_web == 0 || self.levels.interval_influxdb == 0 {
            bail!("levels intervals must be non-zero");
        }

        if let Some(influx) = &self.influxdb {
            if influx.host.is_empty() || influx.db.is_empty() {
                bail!("influxdb requires both host and db");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_serial_config_fills_defaults() {
        let file = write_config("[conn]\ndevice = \"/dev/ttyACM0\"\n");
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.conn.device.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(settings.conn.baud, DEFAULT_BAUD);
        assert_eq!(settings.host.port, 8000);
        assert_eq!(settings.levels.interval_web, 100);
        assert_eq!(settings.levels.interval_influxdb, 250);
        assert!(settings.udp.is_none());
        assert!(settings.influxdb.is_none());
    }

    #[test]
    fn udp_mode_config() {
        let file = write_config("[conn]\nhost = \"mixer-box\"\nport = 10024\n");
        let settings = Settings::from_file(file.path()).unwrap();
        assert!(settings.conn.device.is_none());
        assert_eq!(settings.conn.host.as_deref(), Some("mixer-box"));
    }

    #[test]
    fn device_and_host_together_are_rejected() {
        let file = write_config("[conn]\ndevice = \"/dev/ttyACM0\"\nhost = \"mixer-box\"\n");
        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn udp_frontend_without_device_is_rejected() {
        let file = write_config("[conn]\nhost = \"mixer-box\"\n\n[udp]\nport = 10024\n");
        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let file = write_config(
            "[conn]\ndevice = \"/dev/ttyACM0\"\n\n[levels]\ninterval_web = 0\n",
        );
        assert!(Settings::from_file(file.path()).is_err());
    }
}
