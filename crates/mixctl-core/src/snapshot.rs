//! Snapshot data model.
//!
//! A [`MixerSnapshot`] is a complete, immutable capture of device state at
//! one poll instant: channel/bus names, the full gain and mute matrices,
//! per-channel input multipliers, and VU meter readings. Each poll produces
//! a fresh snapshot; nothing at this layer merges incrementally.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input channel count on the mixer.
pub const NUM_CHANNELS: usize = 6;
/// Output bus count on the mixer.
pub const NUM_BUSES: usize = 6;

/// One level-meter reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VuMeter {
    pub rms: f32,
    pub peak: f32,
    pub smooth: f32,
}

/// Complete device state at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixerSnapshot {
    /// When the poll that produced this snapshot started.
    pub taken_at: DateTime<Utc>,
    /// Input channel names, indexed by channel number.
    pub inputs: Vec<String>,
    /// Output bus names, indexed by bus number.
    pub outputs: Vec<String>,
    /// Gain matrix, `gains[channel][bus]`.
    pub gains: Vec<Vec<f32>>,
    /// Mute matrix, `mutes[channel][bus]`.
    pub mutes: Vec<Vec<bool>>,
    /// Per-channel input multiplier.
    pub multipliers: Vec<f32>,
    /// Input channel meters, indexed by channel number.
    pub input_levels: Vec<VuMeter>,
    /// Output bus meters, indexed by bus number.
    pub output_levels: Vec<VuMeter>,
}

impl MixerSnapshot {
    /// An all-zero snapshot with the given names, timestamped now.
    pub fn empty(inputs: Vec<String>, outputs: Vec<String>) -> Self {
        let channels = inputs.len();
        let buses = outputs.len();
        Self {
            taken_at: Utc::now(),
            inputs,
            outputs,
            gains: vec![vec![0.0; buses]; channels],
            mutes: vec![vec![false; buses]; channels],
            multipliers: vec![1.0; channels],
            input_levels: vec![VuMeter::default(); channels],
            output_levels: vec![VuMeter::default(); buses],
        }
    }
}
