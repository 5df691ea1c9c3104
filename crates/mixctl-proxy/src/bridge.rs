//! Bridge assembly: queues, serial worker, front-end, fan-out, and the
//! in-process handle.
//!
//! A [`Bridge`] owns every task sharing the serial line. Construction wires
//! the request/response queues, spawns the worker (and, when configured,
//! the UDP front-end), and hands back a cloneable [`BridgeHandle`] for
//! in-process callers. [`Bridge::shutdown`] flips the shared watch signal
//! and joins all tasks; queued-but-unsent requests are discarded at that
//! point.

use crate::registry::{Frontend, FrontendConfig, Registry};
use crate::types::{self, DeliveredResponse, Origin, PendingRequest, RequestSink};
use crate::worker::{PortFactory, SerialPortFactory, SerialWorker, WorkerConfig};
use async_trait::async_trait;
use bytes::Bytes;
use mixctl_control::link::{decode_message, encode_message, ControlLink};
use mixctl_core::error::{MixerError, Result};
use parking_lot::Mutex;
use rosc::OscMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Serial side of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Device node of the mixer's control port.
    pub device: String,
    /// Line rate; the mixer runs at 1.152 Mbaud.
    pub baud: u32,
    pub worker: WorkerConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            device: "/dev/tty_mixer_ctl".to_string(),
            baud: 1_152_000,
            worker: WorkerConfig::default(),
        }
    }
}

/// Running bridge: worker + fan-out (+ optional UDP front-end).
pub struct Bridge {
    handle: BridgeHandle,
    frontend_addr: Option<SocketAddr>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Bridge {
    /// Start the bridge on a real serial device.
    pub async fn start(
        config: BridgeConfig,
        frontend: Option<FrontendConfig>,
    ) -> Result<Self> {
        let factory = SerialPortFactory::new(config.device.clone(), config.baud);
        Self::start_with_factory(factory, config.worker, frontend).await
    }

    /// Start the bridge over any port source. Tests use this with duplex
    /// streams instead of hardware.
    pub async fn start_with_factory<F: PortFactory + 'static>(
        factory: F,
        worker_config: WorkerConfig,
        frontend: Option<FrontendConfig>,
    ) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (request_sink, request_source) = types::request_queue();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let mut tasks = Vec::new();
        let mut frontend_addr = None;
        let mut responder = None;

        if let Some(frontend_config) = frontend {
            let frontend = Frontend::bind(
                frontend_config,
                request_sink.clone(),
                shutdown_rx.clone(),
            )
            .await?;
            frontend_addr = Some(frontend.local_addr()?);
            responder = Some(frontend.responder());
            tasks.push(tokio::spawn(frontend.run_ingest()));
        }

        let worker = SerialWorker::new(
            factory,
            worker_config,
            request_source,
            response_tx,
            shutdown_rx.clone(),
        );
        tasks.push(tokio::spawn(worker.run()));
        tasks.push(tokio::spawn(run_fanout(
            response_rx,
            responder,
            shutdown_rx,
        )));

        Ok(Self {
            handle: BridgeHandle {
                requests: request_sink,
            },
            frontend_addr,
            shutdown_tx,
            tasks,
        })
    }

    /// Handle for in-process callers. Cheap to clone.
    pub fn handle(&self) -> BridgeHandle {
        self.handle.clone()
    }

    /// Bound UDP address of the front-end, when one is attached.
    pub fn frontend_addr(&self) -> Option<SocketAddr> {
        self.frontend_addr
    }

    /// Signal shutdown and wait for every task to stop.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

/// Fan-out drain: route each completed response back to its origin.
///
/// Peer responses go out the front-end socket unless the peer was evicted
/// in the meantime (dropped silently). Local responses complete their
/// oneshot; a receiver that gave up waiting is likewise a silent drop.
async fn run_fanout(
    mut responses: mpsc::UnboundedReceiver<DeliveredResponse>,
    responder: Option<(Arc<UdpSocket>, Arc<Mutex<Registry>>)>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let response = tokio::select! {
            r = responses.recv() => match r {
                Some(r) => r,
                None => return,
            },
            _ = shutdown.wait_for(|stop| *stop) => return,
        };

        match response.destination {
            Origin::Peer(addr) => match &responder {
                Some((socket, registry)) => {
                    if !registry.lock().contains(&addr) {
                        tracing::debug!(
                            target: "udp",
                            %addr,
                            "dropping reply for evicted client"
                        );
                        continue;
                    }
                    if let Err(e) = socket.send_to(&response.payload, addr).await {
                        tracing::warn!(target: "udp", %addr, error = %e, "send failed");
                    }
                }
                None => {
                    tracing::warn!(
                        target: "udp",
                        %addr,
                        "peer response with no front-end attached"
                    );
                }
            },
            Origin::Local(completion) => {
                // Fails only if the caller stopped waiting.
                let _ = completion.send(response.payload);
            }
        }
    }
}

// =============================================================================
// BridgeHandle / BridgeLink
// =============================================================================

/// In-process entry point onto the bridge's request queue.
#[derive(Clone)]
pub struct BridgeHandle {
    requests: RequestSink,
}

impl BridgeHandle {
    /// Enqueue `payload` and wait for the reply completing its exchange.
    ///
    /// Waits indefinitely: during a serial outage the request stays queued
    /// and is eventually serviced. Callers wanting a bound wrap this in a
    /// timeout ([`BridgeLink`] does).
    pub async fn exchange(&self, payload: Bytes) -> Result<Bytes> {
        let (tx, rx) = oneshot::channel();
        self.requests.send(PendingRequest {
            origin: Origin::Local(tx),
            payload,
            enqueued_at: Instant::now(),
            expects_reply: true,
        })?;
        rx.await.map_err(|_| MixerError::LinkClosed)
    }

    /// Enqueue a fire-and-forget command.
    pub fn send(&self, payload: Bytes) -> Result<()> {
        let (tx, _discarded) = oneshot::channel();
        self.requests.send(PendingRequest {
            origin: Origin::Local(tx),
            payload,
            enqueued_at: Instant::now(),
            expects_reply: false,
        })
    }
}

/// [`ControlLink`] adapter over a [`BridgeHandle`], used by the poll
/// scheduler and the web handlers to share the serial line with UDP peers.
pub struct BridgeLink {
    handle: BridgeHandle,
    reply_timeout: Duration,
}

impl BridgeLink {
    /// Five seconds by default: enough to ride out a reconnect cycle
    /// without wedging a poll tick forever.
    pub fn new(handle: BridgeHandle) -> Self {
        Self {
            handle,
            reply_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = timeout;
        self
    }
}

#[async_trait]
impl ControlLink for BridgeLink {
    async fn exchange(&self, msg: OscMessage) -> Result<OscMessage> {
        let payload = Bytes::from(encode_message(&msg)?);
        let reply = tokio::time::timeout(self.reply_timeout, self.handle.exchange(payload))
            .await
            .map_err(|_| MixerError::ReadTimeout)??;
        decode_message(&reply)
    }

    async fn send(&self, msg: OscMessage) -> Result<()> {
        self.handle.send(Bytes::from(encode_message(&msg)?))
    }
}
