//! Request/response types and the queue glue between bridge tasks.
//!
//! The two hand-off structures are unbounded FIFO mpsc channels: requests
//! flow from the front-end (and local handles) to the serial worker,
//! responses flow from the worker to the fan-out drain. No priority, no
//! deduplication. Growth is unbounded by design; [`RequestSink`] tracks an
//! approximate depth and logs when the backlog doubles, which is the hook
//! external monitoring watches during a sustained serial outage.

use bytes::Bytes;
use mixctl_core::error::{MixerError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

/// Where a request came from, and therefore where its reply must go.
#[derive(Debug)]
pub enum Origin {
    /// A UDP peer of the front-end.
    Peer(SocketAddr),
    /// The local application (poll scheduler, web handlers). The reply
    /// completes the oneshot; a dropped receiver means the caller gave up
    /// waiting and the reply is discarded.
    Local(oneshot::Sender<Bytes>),
}

impl Origin {
    pub fn is_peer(&self) -> bool {
        matches!(self, Origin::Peer(_))
    }
}

/// A request waiting for (or undergoing) its serial exchange.
#[derive(Debug)]
pub struct PendingRequest {
    pub origin: Origin,
    pub payload: Bytes,
    pub enqueued_at: Instant,
    /// `false` for fire-and-forget commands the device never acknowledges;
    /// the worker then treats an elapsed grace read as success.
    pub expects_reply: bool,
}

/// A completed exchange, produced exactly once per replied request.
#[derive(Debug)]
pub struct DeliveredResponse {
    pub destination: Origin,
    pub payload: Bytes,
}

/// Backlog size at which doubling starts being logged.
const BACKLOG_WARN_FLOOR: usize = 64;

/// Sending half of the request queue, shared by the front-end and local
/// bridge handles.
#[derive(Clone)]
pub struct RequestSink {
    tx: mpsc::UnboundedSender<PendingRequest>,
    depth: Arc<AtomicUsize>,
}

impl RequestSink {
    /// Enqueue a request for the serial worker. Fails only after shutdown.
    pub fn send(&self, request: PendingRequest) -> Result<()> {
        let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth >= BACKLOG_WARN_FLOOR && depth.is_power_of_two() {
            tracing::warn!(target: "bridge", depth, "request queue backlog growing");
        }
        self.tx
            .send(request)
            .map_err(|_| MixerError::LinkClosed)
    }
}

/// Receiving half of the request queue, owned by the serial worker.
pub struct RequestSource {
    rx: mpsc::UnboundedReceiver<PendingRequest>,
    depth: Arc<AtomicUsize>,
}

impl RequestSource {
    /// Next request in FIFO order; `None` once all sinks are gone.
    pub async fn recv(&mut self) -> Option<PendingRequest> {
        let request = self.rx.recv().await;
        if request.is_some() {
            self.depth.fetch_sub(1, Ordering::Relaxed);
        }
        request
    }
}

/// Create the depth-tracked request queue.
pub fn request_queue() -> (RequestSink, RequestSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        RequestSink {
            tx,
            depth: depth.clone(),
        },
        RequestSource { rx, depth },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_request(payload: &[u8]) -> (PendingRequest, oneshot::Receiver<Bytes>) {
        let (tx, rx) = oneshot::channel();
        (
            PendingRequest {
                origin: Origin::Local(tx),
                payload: Bytes::copy_from_slice(payload),
                enqueued_at: Instant::now(),
                expects_reply: true,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn queue_preserves_fifo_order() {
        let (sink, mut source) = request_queue();
        for i in 0u8..5 {
            let (req, _rx) = local_request(&[i]);
            sink.send(req).unwrap();
        }
        for i in 0u8..5 {
            let req = source.recv().await.unwrap();
            assert_eq!(req.payload.as_ref(), &[i]);
        }
    }

    #[tokio::test]
    async fn depth_tracks_sends_and_recvs() {
        let (sink, mut source) = request_queue();
        let (req, _rx) = local_request(b"a");
        sink.send(req).unwrap();
        assert_eq!(sink.depth.load(Ordering::Relaxed), 1);
        source.recv().await.unwrap();
        assert_eq!(sink.depth.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn send_after_worker_gone_fails() {
        let (sink, source) = request_queue();
        drop(source);
        let (req, _rx) = local_request(b"a");
        assert!(matches!(sink.send(req), Err(MixerError::LinkClosed)));
    }
}
