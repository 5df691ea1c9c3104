//! Async serial port abstractions.
//!
//! The serial worker and the direct control link both talk to the mixer
//! through a type-erased [`DynSerial`], so tests can substitute
//! `tokio::io::duplex` streams for real hardware. Real ports are opened with
//! [`open_serial_async`], which applies the mixer's fixed 8N1/no-flow-control
//! settings inside `spawn_blocking`.

use crate::error::Result;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};

/// Anything usable as a serial port: real hardware
/// (`tokio_serial::SerialStream`) or an in-memory duplex stream in tests.
pub trait SerialIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialIo for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialIo>;

/// Open `path` at `baud`, 8N1, no flow control.
///
/// Port initialization can block, so it runs on the blocking pool.
pub async fn open_serial_async(path: &str, baud: u32) -> Result<tokio_serial::SerialStream> {
    use tokio_serial::SerialPortBuilderExt;

    let path = path.to_string();
    let opened = tokio::task::spawn_blocking(move || {
        tokio_serial::new(&path, baud)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
    })
    .await
    .map_err(std::io::Error::other)?;

    Ok(opened.map_err(std::io::Error::other)?)
}

/// Read and discard whatever is immediately available on `port`.
///
/// Used after (re)opening the device to flush stale, possibly half-framed
/// bytes left over from a previous conversation. Returns the number of
/// bytes discarded.
pub async fn drain_input<R: AsyncRead + Unpin>(port: &mut R, window: Duration) -> usize {
    let mut scratch = [0u8; 256];
    let deadline = tokio::time::Instant::now() + window;
    let mut discarded = 0usize;

    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        if remaining.is_zero() {
            break;
        }
        match tokio::time::timeout(remaining, port.read(&mut scratch)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => discarded += n,
            Ok(Err(_)) => break,
            Err(_) => break,
        }
    }

    discarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn drain_discards_stale_bytes() {
        let (mut host, mut device) = tokio::io::duplex(64);
        host.write_all(b"leftover junk").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let discarded = drain_input(&mut device, Duration::from_millis(30)).await;
        assert_eq!(discarded, 13);
    }

    #[tokio::test]
    async fn drain_on_quiet_port_returns_zero() {
        let (_host, mut device) = tokio::io::duplex(64);
        let discarded = drain_input(&mut device, Duration::from_millis(10)).await;
        assert_eq!(discarded, 0);
    }
}
