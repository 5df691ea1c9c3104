//! `mixctl-core`
//!
//! Shared building blocks for the mixctl stack: the SLIP framing codec used
//! on the mixer's serial control line, the single-slot [`Mailbox`] hand-off
//! primitive, type-erased async serial ports, and the snapshot data model
//! produced by polling the device.
//!
//! Nothing in this crate touches the network or knows about OSC message
//! contents; payloads are opaque byte sequences. Higher layers
//! (`mixctl-control`, `mixctl-proxy`, `mixctl-api`) compose these pieces
//! into the actual bridge, poller, and control surface.

pub mod error;
pub mod mailbox;
pub mod serial;
pub mod slip;
pub mod snapshot;

pub use error::{MixerError, Result};
pub use mailbox::Mailbox;
pub use snapshot::{MixerSnapshot, VuMeter, NUM_BUSES, NUM_CHANNELS};
