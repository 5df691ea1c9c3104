//! `mixctl-control`
//!
//! Business-level control of the mixer: typed operations (names, gains,
//! mutes, multipliers, VU meters, full snapshots) expressed as OSC messages,
//! issued over an abstract [`ControlLink`].
//!
//! Three link implementations exist in the workspace:
//!
//! - [`link::SlipLink`] — direct SLIP-over-serial, for tools that own the
//!   device exclusively (e.g. the CLI on a box with no daemon running).
//! - [`link::UdpLink`] — datagram client of the `oscproxy` bridge.
//! - `BridgeLink` (in `mixctl-proxy`) — in-process handle onto the bridge's
//!   request queue, used by the poll scheduler.
//!
//! All three serialize exactly one outstanding exchange at a time, matching
//! the half-duplex serial link underneath.

pub mod controller;
pub mod link;
pub mod resolve;

pub use controller::OscController;
pub use link::{ControlLink, SlipLink, UdpLink};
pub use resolve::{resolve_bus, resolve_channel};
