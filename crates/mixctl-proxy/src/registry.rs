//! UDP client registry and front-end.
//!
//! The front-end terminates the network-facing side of the bridge: the
//! ingest loop turns inbound datagrams into origin-tagged requests and
//! keeps per-peer bookkeeping, and the fan-out drain (spawned by the
//! bridge) writes completed responses back to the originating address.
//!
//! Peers are registered on their first datagram and evicted after an idle
//! threshold. Eviction affects bookkeeping only: requests already queued
//! keep flowing through the serial worker, but a reply that completes after
//! its origin was evicted is dropped silently rather than sent to an
//! address nobody is listening on anymore.

use crate::types::{Origin, PendingRequest, RequestSink};
use bytes::Bytes;
use mixctl_core::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::time::Instant;

/// Front-end tuning. Defaults mirror the deployed bridge: clients are
/// considered gone after 10 s of silence, checked every 3 s.
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub bind: String,
    pub port: u16,
    pub idle_timeout: Duration,
    pub sweep_interval: Duration,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 10024,
            idle_timeout: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(3),
        }
    }
}

/// Per-peer bookkeeping entry.
#[derive(Debug, Clone, Copy)]
pub struct ClientEndpoint {
    pub last_activity: Instant,
}

/// Pure registry state: which peers exist and when they were last heard
/// from. Mutated only by the front-end's own ingest/eviction logic.
#[derive(Debug, Default)]
pub struct Registry {
    peers: HashMap<SocketAddr, ClientEndpoint>,
}

impl Registry {
    /// Record activity from `addr`. Returns true if the peer is new.
    pub fn touch(&mut self, addr: SocketAddr, now: Instant) -> bool {
        self.peers
            .insert(addr, ClientEndpoint { last_activity: now })
            .is_none()
    }

    /// Remove and return every peer idle longer than `idle_timeout`.
    pub fn evict_idle(&mut self, now: Instant, idle_timeout: Duration) -> Vec<SocketAddr> {
        let evicted: Vec<SocketAddr> = self
            .peers
            .iter()
            .filter(|(_, ep)| now.duration_since(ep.last_activity) > idle_timeout)
            .map(|(addr, _)| *addr)
            .collect();
        for addr in &evicted {
            self.peers.remove(addr);
        }
        evicted
    }

    pub fn contains(&self, addr: &SocketAddr) -> bool {
        self.peers.contains_key(addr)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Bound front-end socket plus registry, ready to ingest.
pub struct Frontend {
    socket: Arc<UdpSocket>,
    registry: Arc<Mutex<Registry>>,
    config: FrontendConfig,
    requests: RequestSink,
    shutdown: watch::Receiver<bool>,
}

impl Frontend {
    /// Bind the configured UDP address.
    pub async fn bind(
        config: FrontendConfig,
        requests: RequestSink,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((config.bind.as_str(), config.port)).await?;
        tracing::info!(
            target: "udp",
            addr = %socket.local_addr()?,
            "proxy listening"
        );
        Ok(Self {
            socket: Arc::new(socket),
            registry: Arc::new(Mutex::new(Registry::default())),
            config,
            requests,
            shutdown,
        })
    }

    /// The bound address (useful when the configured port was 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Shared pieces the fan-out drain needs to route peer responses.
    pub fn responder(&self) -> (Arc<UdpSocket>, Arc<Mutex<Registry>>) {
        (self.socket.clone(), self.registry.clone())
    }

    /// Ingest datagrams until shutdown, sweeping idle peers on a fixed
    /// cadence regardless of traffic.
    pub async fn run_ingest(mut self) {
        let mut buf = [0u8; 4096];
        let mut next_sweep = Instant::now() + self.config.sweep_interval;
        loop {
            let received = tokio::select! {
                r = self.socket.recv_from(&mut buf) => r,
                _ = tokio::time::sleep_until(next_sweep) => {
                    next_sweep += self.config.sweep_interval;
                    let evicted = self
                        .registry
                        .lock()
                        .evict_idle(Instant::now(), self.config.idle_timeout);
                    for addr in evicted {
                        tracing::info!(target: "udp", %addr, "client disconnected");
                    }
                    continue;
                }
                _ = self.shutdown.wait_for(|stop| *stop) => return,
            };

            match received {
                Ok((len, addr)) => {
                    if self.registry.lock().touch(addr, Instant::now()) {
                        tracing::info!(target: "udp", %addr, "new client");
                    }
                    tracing::debug!(target: "udp", %addr, bytes = len, "request received");
                    let request = PendingRequest {
                        origin: Origin::Peer(addr),
                        payload: Bytes::copy_from_slice(&buf[..len]),
                        enqueued_at: Instant::now(),
                        // Datagrams are opaque, so a query cannot be told
                        // from a command here; the worker drops a peer
                        // exchange whose reply never arrives.
                        expects_reply: true,
                    };
                    if self.requests.send(request).is_err() {
                        // Worker gone; nothing left to feed.
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(target: "udp", error = %e, "receive failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn touch_registers_and_refreshes() {
        let mut registry = Registry::default();
        let now = Instant::now();
        assert!(registry.touch(addr(5000), now));
        assert!(!registry.touch(addr(5000), now + Duration::from_secs(1)));
        assert!(registry.touch(addr(5001), now));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn idle_peers_are_evicted_active_ones_kept() {
        let mut registry = Registry::default();
        let now = Instant::now();
        let idle = Duration::from_secs(10);

        registry.touch(addr(5000), now);
        registry.touch(addr(5001), now + Duration::from_secs(8));

        let evicted = registry.evict_idle(now + Duration::from_secs(11), idle);
        assert_eq!(evicted, vec![addr(5000)]);
        assert!(registry.contains(&addr(5001)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn refresh_defers_eviction() {
        let mut registry = Registry::default();
        let now = Instant::now();
        let idle = Duration::from_secs(10);

        registry.touch(addr(5000), now);
        registry.touch(addr(5000), now + Duration::from_secs(9));
        assert!(registry
            .evict_idle(now + Duration::from_secs(15), idle)
            .is_empty());
    }
}
