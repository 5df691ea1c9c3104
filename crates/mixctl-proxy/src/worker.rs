//! Serial transport worker: exclusive owner of the device handle.
//!
//! The worker is the only component permitted to read from or write to the
//! serial port. Its loop: (re)connect through the [`PortFactory`] at a
//! fixed retry interval, flush stale input, then pull requests in FIFO
//! order and run exactly one framed exchange at a time. On a read timeout
//! or I/O error the connection is considered broken: the in-flight request
//! is carried over (requeued at the head, ahead of everything else) and the
//! connect phase starts again, so transient outages delay requests instead
//! of losing them.
//!
//! Fire-and-forget commands (`expects_reply = false`) wait only a short
//! grace period for an unexpected reply; the grace elapsing is the normal
//! outcome and does not trigger reconnect or requeue.
//!
//! Peer-originated requests arrive as opaque datagrams, so the front-end
//! cannot tell a query from a command the device never acknowledges. For
//! those, a read timeout with zero reply bytes completes the exchange with
//! no response (logged and dropped) rather than requeueing; a reply cut
//! off mid-frame still counts as a broken link.

use crate::types::{DeliveredResponse, PendingRequest, RequestSource};
use async_trait::async_trait;
use bytes::Bytes;
use mixctl_core::error::{MixerError, Result};
use mixctl_core::serial::{drain_input, open_serial_async, DynSerial};
use mixctl_core::slip;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadBuf};
use tokio::sync::{mpsc, watch};

/// Timing knobs for the serial worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Bound on waiting for the reply to a request that expects one.
    pub read_timeout: Duration,
    /// How long to listen for a reply to a fire-and-forget command before
    /// declaring the exchange complete.
    pub no_reply_grace: Duration,
    /// Delay between reconnect attempts while the device is unavailable.
    pub retry_interval: Duration,
    /// Window spent flushing stale input after (re)opening the port.
    pub drain_window: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(1),
            no_reply_grace: Duration::from_millis(100),
            retry_interval: Duration::from_secs(1),
            drain_window: Duration::from_millis(50),
        }
    }
}

/// Source of (re)opened device handles.
///
/// The seam exists so tests can hand the worker in-memory duplex streams;
/// production uses [`SerialPortFactory`].
#[async_trait]
pub trait PortFactory: Send {
    async fn connect(&mut self) -> Result<DynSerial>;
}

/// Probes for the device node, then opens it with the mixer's settings.
pub struct SerialPortFactory {
    path: String,
    baud: u32,
}

impl SerialPortFactory {
    pub fn new(path: impl Into<String>, baud: u32) -> Self {
        Self {
            path: path.into(),
            baud,
        }
    }
}

#[async_trait]
impl PortFactory for SerialPortFactory {
    async fn connect(&mut self) -> Result<DynSerial> {
        if !std::path::Path::new(&self.path).exists() {
            return Err(MixerError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} not present", self.path),
            )));
        }
        let port = open_serial_async(&self.path, self.baud).await?;
        Ok(Box::new(port))
    }
}

/// The worker task. Constructed by the bridge, consumed by [`Self::run`].
pub struct SerialWorker<F> {
    factory: F,
    config: WorkerConfig,
    requests: RequestSource,
    responses: mpsc::UnboundedSender<DeliveredResponse>,
    shutdown: watch::Receiver<bool>,
}

impl<F: PortFactory> SerialWorker<F> {
    pub fn new(
        factory: F,
        config: WorkerConfig,
        requests: RequestSource,
        responses: mpsc::UnboundedSender<DeliveredResponse>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            factory,
            config,
            requests,
            responses,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        let cfg = self.config.clone();
        let mut carried: Option<PendingRequest> = None;

        'reconnect: loop {
            let mut port =
                match connect_loop(&mut self.factory, &cfg, &mut self.shutdown).await {
                    Some(port) => port,
                    None => return,
                };

            loop {
                let request = match carried.take() {
                    Some(request) => request,
                    None => tokio::select! {
                        request = self.requests.recv() => match request {
                            Some(request) => request,
                            // All sinks dropped: nothing will ever arrive.
                            None => return,
                        },
                        _ = wait_shutdown(&mut self.shutdown) => return,
                    },
                };

                let outcome = tokio::select! {
                    outcome = exchange(&mut port, &request, &cfg) => outcome,
                    _ = wait_shutdown(&mut self.shutdown) => return,
                };

                match outcome {
                    Ok(Some(payload)) => {
                        tracing::debug!(
                            target: "slip",
                            queued_for = ?request.enqueued_at.elapsed(),
                            bytes = payload.len(),
                            "exchange complete"
                        );
                        let response = DeliveredResponse {
                            destination: request.origin,
                            payload: Bytes::from(payload),
                        };
                        if self.responses.send(response).is_err() {
                            // Fan-out gone; the bridge is tearing down.
                            return;
                        }
                    }
                    Ok(None) => {
                        tracing::trace!(target: "slip", "fire-and-forget command sent");
                    }
                    // A silent device may simply not acknowledge this kind
                    // of command; for a peer we cannot know, so drop the
                    // request instead of requeueing it forever.
                    Err(MixerError::ReadTimeout) if request.origin.is_peer() => {
                        tracing::warn!(
                            target: "slip",
                            origin = ?request.origin,
                            "no reply from device; dropping peer request"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            target: "slip",
                            error = %e,
                            "exchange failed; restarting serial connection, requeueing request"
                        );
                        carried = Some(request);
                        continue 'reconnect;
                    }
                }
            }
        }
    }
}

/// Resolves once shutdown is signalled (or the bridge side is gone).
async fn wait_shutdown(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

async fn connect_loop<F: PortFactory>(
    factory: &mut F,
    cfg: &WorkerConfig,
    shutdown: &mut watch::Receiver<bool>,
) -> Option<DynSerial> {
    loop {
        if *shutdown.borrow() {
            return None;
        }
        match factory.connect().await {
            Ok(mut port) => {
                let stale = drain_input(&mut port, cfg.drain_window).await;
                if stale > 0 {
                    tracing::debug!(target: "slip", bytes = stale, "discarded stale input");
                }
                tracing::info!(target: "slip", "serial link established");
                return Some(port);
            }
            Err(e) => {
                tracing::debug!(target: "slip", error = %e, "device unavailable, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(cfg.retry_interval) => {}
                    _ = wait_shutdown(shutdown) => return None,
                }
            }
        }
    }
}

/// Counts reply bytes as they arrive, so a bare [`MixerError::ReadTimeout`]
/// (nothing received at all) can be told apart from a reply cut off
/// mid-frame, which leaves the stream desynchronized.
struct CountedRead<'a> {
    port: &'a mut DynSerial,
    bytes: usize,
}

impl AsyncRead for CountedRead<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = Pin::new(&mut *this.port).poll_read(cx, buf);
        this.bytes += buf.filled().len() - before;
        poll
    }
}

/// Run one request/reply exchange on the open port.
///
/// `Ok(Some(_))` is a decoded reply payload; `Ok(None)` is a completed
/// fire-and-forget command. `Err(ReadTimeout)` means zero reply bytes
/// within the bound; any other `Err` means the link is broken and the
/// request must be retried after reconnecting.
async fn exchange(
    port: &mut DynSerial,
    request: &PendingRequest,
    cfg: &WorkerConfig,
) -> Result<Option<Vec<u8>>> {
    let frame = slip::encode_frame(&request.payload);
    port.write_all(&frame).await?;
    port.flush().await?;

    if request.expects_reply {
        let mut reader = CountedRead { port, bytes: 0 };
        match tokio::time::timeout(cfg.read_timeout, slip::read_frame(&mut reader)).await {
            Ok(Ok(payload)) => Ok(Some(payload)),
            Ok(Err(e)) => Err(e),
            Err(_) if reader.bytes == 0 => Err(MixerError::ReadTimeout),
            Err(_) => Err(MixerError::Framing("reply cut off mid-frame".into())),
        }
    } else {
        match tokio::time::timeout(cfg.no_reply_grace, slip::read_frame(port)).await {
            // Device replied anyway; deliver it.
            Ok(Ok(payload)) => Ok(Some(payload)),
            Ok(Err(e)) => Err(e),
            // Expected outcome for this request class.
            Err(_) => Ok(None),
        }
    }
}
