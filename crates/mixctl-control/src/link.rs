//! Transport links carrying OSC messages to the mixer.
//!
//! A [`ControlLink`] hides where the device actually is: on a local serial
//! port ([`SlipLink`]), behind the UDP bridge ([`UdpLink`]), or reachable
//! through in-process bridge queues (`BridgeLink` in `mixctl-proxy`).
//! `exchange` completes a strict request/reply pair; `send` is for commands
//! the device never acknowledges.

use async_trait::async_trait;
use mixctl_core::error::{MixerError, Result};
use mixctl_core::serial::{drain_input, open_serial_async, DynSerial};
use mixctl_core::slip;
use rosc::{OscMessage, OscPacket};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;

/// Default bound on waiting for a reply, mirroring the device's serial
/// read timeout.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Transport seam between the controller and the device.
#[async_trait]
pub trait ControlLink: Send + Sync {
    /// Send `msg` and wait for the single reply completing the exchange.
    async fn exchange(&self, msg: OscMessage) -> Result<OscMessage>;

    /// Send `msg` expecting no reply.
    async fn send(&self, msg: OscMessage) -> Result<()>;
}

// Lets callers pick a transport at runtime and still use the controller.
#[async_trait]
impl ControlLink for Box<dyn ControlLink> {
    async fn exchange(&self, msg: OscMessage) -> Result<OscMessage> {
        (**self).exchange(msg).await
    }

    async fn send(&self, msg: OscMessage) -> Result<()> {
        (**self).send(msg).await
    }
}

/// Encode a single OSC message to its datagram bytes.
pub fn encode_message(msg: &OscMessage) -> Result<Vec<u8>> {
    rosc::encoder::encode(&OscPacket::Message(msg.clone()))
        .map_err(|e| MixerError::Osc(e.to_string()))
}

/// Decode datagram bytes into a single OSC message.
///
/// Bundles are rejected: the mixer's control surface is message-only.
pub fn decode_message(bytes: &[u8]) -> Result<OscMessage> {
    let (_, packet) =
        rosc::decoder::decode_udp(bytes).map_err(|e| MixerError::Osc(e.to_string()))?;
    match packet {
        OscPacket::Message(msg) => Ok(msg),
        OscPacket::Bundle(_) => Err(MixerError::Protocol(
            "expected an OSC message, got a bundle".into(),
        )),
    }
}

// =============================================================================
// SlipLink — direct serial
// =============================================================================

/// Direct SLIP-over-serial link owning the device handle.
///
/// The port sits behind an async mutex, so concurrent callers serialize to
/// one in-flight exchange, matching the half-duplex line.
pub struct SlipLink {
    port: Mutex<DynSerial>,
    reply_timeout: Duration,
}

impl SlipLink {
    /// Open `path` at `baud` and flush any stale input.
    pub async fn open(path: &str, baud: u32) -> Result<Self> {
        let mut port = open_serial_async(path, baud).await?;
        let stale = drain_input(&mut port, Duration::from_millis(50)).await;
        if stale > 0 {
            tracing::debug!(target: "slip", bytes = stale, "discarded stale input");
        }
        Ok(Self::from_port(Box::new(port), DEFAULT_REPLY_TIMEOUT))
    }

    /// Wrap an already-open port. Used by tests with duplex streams.
    pub fn from_port(port: DynSerial, reply_timeout: Duration) -> Self {
        Self {
            port: Mutex::new(port),
            reply_timeout,
        }
    }

    async fn write_frame(port: &mut DynSerial, msg: &OscMessage) -> Result<()> {
        let frame = slip::encode_frame(&encode_message(msg)?);
        port.write_all(&frame).await?;
        port.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl ControlLink for SlipLink {
    async fn exchange(&self, msg: OscMessage) -> Result<OscMessage> {
        let mut port = self.port.lock().await;
        Self::write_frame(&mut port, &msg).await?;
        let payload = tokio::time::timeout(self.reply_timeout, slip::read_frame(&mut *port))
            .await
            .map_err(|_| MixerError::ReadTimeout)??;
        decode_message(&payload)
    }

    async fn send(&self, msg: OscMessage) -> Result<()> {
        let mut port = self.port.lock().await;
        Self::write_frame(&mut port, &msg).await
    }
}

// =============================================================================
// UdpLink — datagram client of the bridge
// =============================================================================

/// UDP link speaking raw OSC datagrams to an `oscproxy` instance.
pub struct UdpLink {
    socket: UdpSocket,
    // One exchange in flight at a time, so replies cannot cross callers.
    exchange_lock: Mutex<()>,
    reply_timeout: Duration,
}

impl UdpLink {
    /// Bind an ephemeral local port and connect to the proxy at `host:port`.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect((host, port)).await?;
        Ok(Self {
            socket,
            exchange_lock: Mutex::new(()),
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
        })
    }

    /// Override the reply timeout (e.g. for a proxy riding out a serial outage).
    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

#[async_trait]
impl ControlLink for UdpLink {
    async fn exchange(&self, msg: OscMessage) -> Result<OscMessage> {
        let _guard = self.exchange_lock.lock().await;
        self.socket.send(&encode_message(&msg)?).await?;

        let mut buf = [0u8; 4096];
        let n = tokio::time::timeout(self.reply_timeout, self.socket.recv(&mut buf))
            .await
            .map_err(|_| MixerError::ReadTimeout)??;
        decode_message(&buf[..n])
    }

    async fn send(&self, msg: OscMessage) -> Result<()> {
        self.socket.send(&encode_message(&msg)?).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rosc::OscType;

    fn message(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn message_codec_round_trip() {
        let msg = message("/ch/2/mix/3/level", vec![OscType::Float(0.75)]);
        let bytes = encode_message(&msg).unwrap();
        let back = decode_message(&bytes).unwrap();
        assert_eq!(back.addr, "/ch/2/mix/3/level");
        assert_eq!(back.args, vec![OscType::Float(0.75)]);
    }

    #[test]
    fn garbage_bytes_are_codec_errors() {
        assert!(matches!(
            decode_message(&[0x01, 0x02, 0x03]),
            Err(MixerError::Osc(_))
        ));
    }

    #[tokio::test]
    async fn slip_link_exchange_over_duplex() {
        let (mut device, host) = tokio::io::duplex(1024);
        let link = SlipLink::from_port(Box::new(host), Duration::from_millis(200));

        // Simulated device: decode the request, echo the address back with
        // a fixed level argument.
        let device_task = tokio::spawn(async move {
            let request = slip::read_frame(&mut device).await.unwrap();
            let msg = decode_message(&request).unwrap();
            let reply = message(&msg.addr, vec![OscType::Float(0.5)]);
            let frame = slip::encode_frame(&encode_message(&reply).unwrap());
            device.write_all(&frame).await.unwrap();
        });

        let reply = link
            .exchange(message("/ch/0/mix/1/level", vec![]))
            .await
            .unwrap();
        assert_eq!(reply.addr, "/ch/0/mix/1/level");
        assert_eq!(reply.args, vec![OscType::Float(0.5)]);
        device_task.await.unwrap();
    }

    #[tokio::test]
    async fn slip_link_exchange_times_out_on_silence() {
        let (_device, host) = tokio::io::duplex(1024);
        let link = SlipLink::from_port(Box::new(host), Duration::from_millis(30));
        assert!(matches!(
            link.exchange(message("/ch/0/config/name", vec![])).await,
            Err(MixerError::ReadTimeout)
        ));
    }
}
