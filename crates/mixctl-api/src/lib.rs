//! Mixer polling daemon: multi-rate snapshot scheduler, HTTP/WebSocket API,
//! and InfluxDB level export.
//!
//! The daemon owns one [`mixctl_control::OscController`] and polls it on a
//! single collapsed timer ([`scheduler`]); each consumer (web feed, InfluxDB
//! pusher) takes snapshots from its own single-slot mailbox at its own
//! cadence. The HTTP surface ([`web`]) serves direct gain reads/writes plus
//! a WebSocket snapshot stream. When configured with a serial device the
//! binary embeds the transport bridge from `mixctl-proxy`, optionally with
//! its UDP front-end, so external OSC clients keep working alongside it.

pub mod config;
pub mod influx;
pub mod scheduler;
pub mod web;

pub use config::Settings;
pub use scheduler::{Consumer, DeliveryPlan, PollScheduler, SnapshotSource};
