//! `mixctl-proxy`
//!
//! The transport bridge sharing the mixer's single serial control line
//! among unbounded concurrent callers: UDP peers, the HTTP/WebSocket API,
//! and the poll scheduler.
//!
//! Four independent tasks coordinate only through queues and oneshots,
//! never through shared mutable state:
//!
//! - the [`worker::SerialWorker`], sole owner of the device handle, runs
//!   exactly one framed request/reply exchange at a time and recovers from
//!   link failures by reconnecting and requeueing the in-flight request;
//! - the front-end ingest loop turns inbound datagrams into origin-tagged
//!   [`types::PendingRequest`]s and evicts idle peers;
//! - the fan-out drain routes each [`types::DeliveredResponse`] back to its
//!   origin (a peer's socket address or a local oneshot);
//! - callers in the same process use a cloned [`bridge::BridgeHandle`].
//!
//! A reply is attributed to the request it completes purely by strict FIFO
//! ordering on the single half-duplex link; response contents are never
//! inspected for correlation.

pub mod bridge;
pub mod registry;
pub mod types;
pub mod worker;

pub use bridge::{Bridge, BridgeConfig, BridgeHandle, BridgeLink};
pub use registry::FrontendConfig;
pub use types::{DeliveredResponse, Origin, PendingRequest};
pub use worker::{PortFactory, SerialPortFactory, WorkerConfig};
