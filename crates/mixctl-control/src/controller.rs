//! Typed mixer operations over a [`ControlLink`].
//!
//! Address scheme (one OSC message per operation, value in the first
//! argument of the reply):
//!
//! | Operation          | Address                        | Args          |
//! |--------------------|--------------------------------|---------------|
//! | channel name       | `/ch/{n}/config/name`          | → string      |
//! | bus name           | `/bus/{n}/config/name`         | → string      |
//! | gain get/set       | `/ch/{c}/mix/{b}/level`        | f32           |
//! | mute get/set       | `/ch/{c}/mix/{b}/mute`         | i32 (0/1)     |
//! | input multiplier   | `/ch/{n}/config/multiplier`    | → f32         |
//! | channel VU         | `/ch/{n}/vu`                   | → f32 ×3      |
//! | bus VU             | `/bus/{n}/vu`                  | → f32 ×3      |
//!
//! Setters are fire-and-forget on the wire; `set_gain` verifies the write
//! with a read-back and reports a mismatch as an error instead of silently
//! trusting the device.

use crate::link::ControlLink;
use chrono::Utc;
use mixctl_core::error::{MixerError, Result};
use mixctl_core::snapshot::{MixerSnapshot, VuMeter};
use mixctl_core::{NUM_BUSES, NUM_CHANNELS};
use rosc::{OscMessage, OscType};

/// Tolerance for the `set_gain` read-back check.
const GAIN_READBACK_TOLERANCE: f32 = 0.01;

/// Mixer controller bound to one transport link.
///
/// Channel and bus names are queried once at connect time and cached; they
/// only change when the device is reconfigured, at which point callers
/// reconnect.
pub struct OscController<L> {
    link: L,
    inputs: Vec<String>,
    outputs: Vec<String>,
}

impl<L: ControlLink> OscController<L> {
    /// Connect over `link`, caching channel and bus names.
    pub async fn connect(link: L) -> Result<Self> {
        let mut controller = Self {
            link,
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        for ch in 0..NUM_CHANNELS {
            let name = controller
                .query_string(format!("/ch/{ch}/config/name"))
                .await?;
            controller.inputs.push(name);
        }
        for bus in 0..NUM_BUSES {
            let name = controller
                .query_string(format!("/bus/{bus}/config/name"))
                .await?;
            controller.outputs.push(name);
        }
        tracing::debug!(
            target: "control",
            inputs = ?controller.inputs,
            outputs = ?controller.outputs,
            "connected to mixer"
        );
        Ok(controller)
    }

    /// Cached input channel names.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Cached output bus names.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Gain for one channel/bus crosspoint.
    pub async fn gain(&self, channel: usize, bus: usize) -> Result<f32> {
        let reply = self
            .link
            .exchange(message(format!("/ch/{channel}/mix/{bus}/level"), vec![]))
            .await?;
        first_float(&reply)
    }

    /// Set a crosspoint gain, verifying the write with a read-back.
    pub async fn set_gain(&self, channel: usize, bus: usize, level: f32) -> Result<()> {
        self.link
            .send(message(
                format!("/ch/{channel}/mix/{bus}/level"),
                vec![OscType::Float(level)],
            ))
            .await?;

        let actual = self.gain(channel, bus).await?;
        if (actual - level).abs() > GAIN_READBACK_TOLERANCE {
            return Err(MixerError::GainReadback {
                channel,
                bus,
                requested: level,
                actual,
            });
        }
        Ok(())
    }

    /// Mute state for one crosspoint.
    pub async fn muted(&self, channel: usize, bus: usize) -> Result<bool> {
        let reply = self
            .link
            .exchange(message(format!("/ch/{channel}/mix/{bus}/mute"), vec![]))
            .await?;
        first_bool(&reply)
    }

    /// Mute or unmute one crosspoint.
    pub async fn set_mute(&self, channel: usize, bus: usize, on: bool) -> Result<()> {
        self.link
            .send(message(
                format!("/ch/{channel}/mix/{bus}/mute"),
                vec![OscType::Int(i32::from(on))],
            ))
            .await
    }

    /// Input multiplier for one channel.
    pub async fn multiplier(&self, channel: usize) -> Result<f32> {
        let reply = self
            .link
            .exchange(message(format!("/ch/{channel}/config/multiplier"), vec![]))
            .await?;
        first_float(&reply)
    }

    /// VU meter reading for one input channel.
    pub async fn channel_vu(&self, channel: usize) -> Result<VuMeter> {
        let reply = self
            .link
            .exchange(message(format!("/ch/{channel}/vu"), vec![]))
            .await?;
        vu_from(&reply)
    }

    /// VU meter reading for one output bus.
    pub async fn bus_vu(&self, bus: usize) -> Result<VuMeter> {
        let reply = self
            .link
            .exchange(message(format!("/bus/{bus}/vu"), vec![]))
            .await?;
        vu_from(&reply)
    }

    /// The full gain matrix, `matrix[channel][bus]`.
    pub async fn matrix(&self) -> Result<Vec<Vec<f32>>> {
        let mut rows = Vec::with_capacity(self.inputs.len());
        for ch in 0..self.inputs.len() {
            let mut row = Vec::with_capacity(self.outputs.len());
            for bus in 0..self.outputs.len() {
                row.push(self.gain(ch, bus).await?);
            }
            rows.push(row);
        }
        Ok(rows)
    }

    /// Poll a complete snapshot of device state.
    pub async fn snapshot(&self) -> Result<MixerSnapshot> {
        let taken_at = Utc::now();
        let channels = self.inputs.len();
        let buses = self.outputs.len();

        let mut gains = Vec::with_capacity(channels);
        let mut mutes = Vec::with_capacity(channels);
        for ch in 0..channels {
            let mut gain_row = Vec::with_capacity(buses);
            let mut mute_row = Vec::with_capacity(buses);
            for bus in 0..buses {
                gain_row.push(self.gain(ch, bus).await?);
                mute_row.push(self.muted(ch, bus).await?);
            }
            gains.push(gain_row);
            mutes.push(mute_row);
        }

        let mut multipliers = Vec::with_capacity(channels);
        let mut input_levels = Vec::with_capacity(channels);
        for ch in 0..channels {
            multipliers.push(self.multiplier(ch).await?);
            input_levels.push(self.channel_vu(ch).await?);
        }
        let mut output_levels = Vec::with_capacity(buses);
        for bus in 0..buses {
            output_levels.push(self.bus_vu(bus).await?);
        }

        Ok(MixerSnapshot {
            taken_at,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            gains,
            mutes,
            multipliers,
            input_levels,
            output_levels,
        })
    }

    async fn query_string(&self, addr: String) -> Result<String> {
        let reply = self.link.exchange(message(addr, vec![])).await?;
        first_string(&reply)
    }
}

fn message(addr: String, args: Vec<OscType>) -> OscMessage {
    OscMessage { addr, args }
}

fn first_float(msg: &OscMessage) -> Result<f32> {
    match msg.args.first() {
        Some(OscType::Float(v)) => Ok(*v),
        Some(OscType::Double(v)) => Ok(*v as f32),
        Some(OscType::Int(v)) => Ok(*v as f32),
        other => Err(MixerError::Protocol(format!(
            "expected numeric argument in reply to {}, got {other:?}",
            msg.addr
        ))),
    }
}

fn first_string(msg: &OscMessage) -> Result<String> {
    match msg.args.first() {
        Some(OscType::String(s)) => Ok(s.clone()),
        other => Err(MixerError::Protocol(format!(
            "expected string argument in reply to {}, got {other:?}",
            msg.addr
        ))),
    }
}

fn first_bool(msg: &OscMessage) -> Result<bool> {
    match msg.args.first() {
        Some(OscType::Bool(b)) => Ok(*b),
        Some(OscType::Int(v)) => Ok(*v != 0),
        other => Err(MixerError::Protocol(format!(
            "expected boolean argument in reply to {}, got {other:?}",
            msg.addr
        ))),
    }
}

fn vu_from(msg: &OscMessage) -> Result<VuMeter> {
    let mut values = [0f32; 3];
    if msg.args.len() < 3 {
        return Err(MixerError::Protocol(format!(
            "expected 3 meter values in reply to {}, got {}",
            msg.addr,
            msg.args.len()
        )));
    }
    for (slot, arg) in values.iter_mut().zip(&msg.args) {
        *slot = match arg {
            OscType::Float(v) => *v,
            OscType::Double(v) => *v as f32,
            other => {
                return Err(MixerError::Protocol(format!(
                    "non-numeric meter value in reply to {}: {other:?}",
                    msg.addr
                )))
            }
        };
    }
    Ok(VuMeter {
        rms: values[0],
        peak: values[1],
        smooth: values[2],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Scripted device: maps request address to a canned reply, records
    /// fire-and-forget sends.
    struct MockLink {
        replies: Mutex<HashMap<String, Vec<OscType>>>,
        sent: Mutex<Vec<OscMessage>>,
        // When set, writes are recorded but not applied (a device that
        // silently rejects the value).
        ignore_writes: std::sync::atomic::AtomicBool,
    }

    impl MockLink {
        fn new() -> Self {
            let mut replies = HashMap::new();
            for ch in 0..NUM_CHANNELS {
                replies.insert(
                    format!("/ch/{ch}/config/name"),
                    vec![OscType::String(format!("IN{}", ch + 1))],
                );
            }
            for bus in 0..NUM_BUSES {
                replies.insert(
                    format!("/bus/{bus}/config/name"),
                    vec![OscType::String(format!("OUT{}", bus + 1))],
                );
            }
            Self {
                replies: Mutex::new(replies),
                sent: Mutex::new(Vec::new()),
                ignore_writes: std::sync::atomic::AtomicBool::new(false),
            }
        }

        fn stub(&self, addr: &str, args: Vec<OscType>) {
            self.replies.lock().insert(addr.to_string(), args);
        }
    }

    #[async_trait]
    impl ControlLink for &MockLink {
        async fn exchange(&self, msg: OscMessage) -> Result<OscMessage> {
            let args = self
                .replies
                .lock()
                .get(&msg.addr)
                .cloned()
                .ok_or_else(|| MixerError::Protocol(format!("no stub for {}", msg.addr)))?;
            Ok(OscMessage {
                addr: msg.addr,
                args,
            })
        }

        async fn send(&self, msg: OscMessage) -> Result<()> {
            // Model the device applying the write: the next read of the same
            // address returns the written value.
            if !self.ignore_writes.load(std::sync::atomic::Ordering::Relaxed) {
                self.replies.lock().insert(msg.addr.clone(), msg.args.clone());
            }
            self.sent.lock().push(msg);
            Ok(())
        }
    }

    #[tokio::test]
    async fn connect_caches_channel_and_bus_names() {
        let mock = MockLink::new();
        let controller = OscController::connect(&mock).await.unwrap();
        assert_eq!(controller.inputs().len(), NUM_CHANNELS);
        assert_eq!(controller.inputs()[0], "IN1");
        assert_eq!(controller.outputs()[5], "OUT6");
    }

    #[tokio::test]
    async fn set_gain_verifies_by_readback() {
        let mock = MockLink::new();
        let controller = OscController::connect(&mock).await.unwrap();

        controller.set_gain(2, 3, 0.8).await.unwrap();
        assert_eq!(controller.gain(2, 3).await.unwrap(), 0.8);
        // The set itself went out as fire-and-forget.
        assert_eq!(mock.sent.lock().len(), 1);
    }

    #[tokio::test]
    async fn set_gain_mismatch_is_reported() {
        let mock = MockLink::new();
        let controller = OscController::connect(&mock).await.unwrap();

        // Device that silently rejects the write and keeps reporting 0.0.
        mock.stub("/ch/0/mix/0/level", vec![OscType::Float(0.0)]);
        mock.ignore_writes
            .store(true, std::sync::atomic::Ordering::Relaxed);
        match controller.set_gain(0, 0, 0.5).await {
            Err(MixerError::GainReadback {
                channel, actual, ..
            }) => {
                assert_eq!(channel, 0);
                assert_eq!(actual, 0.0);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn vu_reply_parses_three_floats() {
        let mock = MockLink::new();
        mock.stub(
            "/ch/1/vu",
            vec![
                OscType::Float(-18.0),
                OscType::Float(-6.0),
                OscType::Float(-12.0),
            ],
        );
        let controller = OscController::connect(&mock).await.unwrap();
        let vu = controller.channel_vu(1).await.unwrap();
        assert_eq!(vu.rms, -18.0);
        assert_eq!(vu.peak, -6.0);
        assert_eq!(vu.smooth, -12.0);
    }

    #[tokio::test]
    async fn short_vu_reply_is_protocol_error() {
        let mock = MockLink::new();
        mock.stub("/bus/0/vu", vec![OscType::Float(-18.0)]);
        let controller = OscController::connect(&mock).await.unwrap();
        assert!(matches!(
            controller.bus_vu(0).await,
            Err(MixerError::Protocol(_))
        ));
    }
}
