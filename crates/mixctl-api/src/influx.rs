//! Level export to InfluxDB.
//!
//! Each snapshot becomes one line-protocol record per channel and per bus,
//! POSTed to `http://{host}/write?db={db}`. A failed post is logged and
//! dropped; the next snapshot carries fresher readings anyway.

use crate::config::InfluxSettings;
use mixctl_core::{Mailbox, MixerSnapshot};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Pushes snapshots from its mailbox to an InfluxDB write endpoint.
pub struct InfluxPusher {
    client: reqwest::Client,
    url: String,
    hostname: String,
    mailbox: Arc<Mailbox<MixerSnapshot>>,
    shutdown: watch::Receiver<bool>,
}

impl InfluxPusher {
    pub fn new(
        settings: &InfluxSettings,
        mailbox: Arc<Mailbox<MixerSnapshot>>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{}/write?db={}", settings.host, settings.db),
            hostname,
            mailbox,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            let snapshot = tokio::select! {
                snapshot = self.mailbox.recv() => snapshot,
                _ = self.shutdown.wait_for(|stop| *stop) => break,
            };

            let body = render_lines(&self.hostname, &snapshot);
            match self.client.post(&self.url).body(body).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(target: "influx", "levels pushed");
                }
                Ok(response) => {
                    warn!(target: "influx", status = %response.status(), "write rejected");
                }
                Err(error) => {
                    warn!(target: "influx", %error, "write failed");
                }
            }
        }
    }
}

/// Render one snapshot as InfluxDB line protocol.
pub fn render_lines(hostname: &str, snapshot: &MixerSnapshot) -> String {
    let mut lines = Vec::with_capacity(snapshot.input_levels.len() + snapshot.output_levels.len());
    for (ch, vu) in snapshot.input_levels.iter().enumerate() {
        lines.push(format!(
            "input_levels,box={hostname},ch={ch} rms={},peak={},smooth={}",
            vu.rms, vu.peak, vu.smooth
        ));
    }
    for (bus, vu) in snapshot.output_levels.iter().enumerate() {
        lines.push(format!(
            "output_levels,box={hostname},bus={bus} rms={},peak={},smooth={}",
            vu.rms, vu.peak, vu.smooth
        ));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixctl_core::VuMeter;

    #[test]
    fn lines_cover_every_channel_and_bus() {
        let mut snapshot = MixerSnapshot::empty(
            vec!["IN1".into(), "IN2".into()],
            vec!["OUT1".into()],
        );
        snapshot.input_levels[1] = VuMeter {
            rms: 0.25,
            peak: 0.5,
            smooth: 0.375,
        };

        let rendered = render_lines("mixerbox", &snapshot);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "input_levels,box=mixerbox,ch=0 rms=0,peak=0,smooth=0");
        assert_eq!(
            lines[1],
            "input_levels,box=mixerbox,ch=1 rms=0.25,peak=0.5,smooth=0.375"
        );
        assert_eq!(
            lines[2],
            "output_levels,box=mixerbox,bus=0 rms=0,peak=0,smooth=0"
        );
    }
}
