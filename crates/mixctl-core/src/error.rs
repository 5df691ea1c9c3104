//! Error types for the mixctl stack.
//!
//! [`MixerError`] is the single library error enum, consolidating framing,
//! transport, protocol, and configuration failures. The variants map onto
//! distinct recovery strategies:
//!
//! - **`Framing`**: the SLIP byte stream is desynchronized (invalid escape
//!   sequence or a frame truncated mid-escape). The payload is discarded and
//!   the owning component reconnects.
//! - **`Io` / `Disconnected`**: the device is unavailable or vanished
//!   mid-exchange. Handled locally by the serial worker via reconnect and
//!   requeue; never surfaced to network peers.
//! - **`ReadTimeout`**: a bounded read elapsed with no data. For requests
//!   that expect a reply this is a transport failure; for fire-and-forget
//!   commands it is the expected outcome and is not reported as an error.
//! - Specifier and protocol variants are caller errors and propagate to the
//!   API/CLI surface unchanged.

use thiserror::Error;

/// Convenience alias used throughout the workspace.
pub type Result<T, E = MixerError> = std::result::Result<T, E>;

/// Primary error type for mixer communication and control.
#[derive(Error, Debug)]
pub enum MixerError {
    /// SLIP stream desynchronized: invalid escape sequence or truncated frame.
    #[error("framing error: {0}")]
    Framing(String),

    /// Underlying I/O failure (open, write, short count).
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The device read returned zero bytes: closed or unplugged.
    #[error("serial device disconnected")]
    Disconnected,

    /// A bounded read elapsed with no reply.
    #[error("timed out waiting for reply")]
    ReadTimeout,

    /// OSC encode/decode failure from the wire codec.
    #[error("OSC codec error: {0}")]
    Osc(String),

    /// A reply arrived but did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Channel specifier did not match any input by index or name.
    #[error("channel '{0}' does not exist")]
    UnknownChannel(String),

    /// Bus specifier did not match any output by index or name.
    #[error("bus '{0}' does not exist")]
    UnknownBus(String),

    /// A gain write was not reflected by the subsequent read-back.
    #[error("gain read-back mismatch on ch {channel} bus {bus}: wrote {requested}, read {actual}")]
    GainReadback {
        channel: usize,
        bus: usize,
        requested: f32,
        actual: f32,
    },

    /// The bridge or link this call was issued through has shut down.
    #[error("link closed")]
    LinkClosed,

    /// Configuration parsed but failed semantic validation.
    #[error("configuration validation error: {0}")]
    Configuration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let err = MixerError::GainReadback {
            channel: 2,
            bus: 4,
            requested: 0.5,
            actual: 0.1,
        };
        assert!(err.to_string().contains("ch 2 bus 4"));

        let err = MixerError::Framing("invalid escape byte 0x41".into());
        assert!(err.to_string().starts_with("framing error"));
    }
}
