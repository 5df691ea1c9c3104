//! HTTP/WebSocket surface of the daemon.
//!
//! ## Endpoints
//!
//! | Path | Description |
//! |------|-------------|
//! | `GET /` | Full gain matrix |
//! | `GET /info` | Hostname and device label |
//! | `GET /channels` | Input channel names |
//! | `GET /buses` | Output bus names |
//! | `GET /{channel}/{bus}` | One gain; channel/bus by index or name |
//! | `PUT\|POST /{channel}/{bus}` | Set a gain; body is the level |
//! | `GET /ws` | Snapshot stream: cached snapshot on connect, then live |
//!
//! Gain reads and writes go straight to the device through the controller;
//! the snapshot stream is fed by the poll scheduler, so `/ws` clients never
//! add device traffic of their own.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use mixctl_core::error::MixerError;
use mixctl_core::{Mailbox, MixerSnapshot};
use mixctl_control::{resolve_bus, resolve_channel, ControlLink, OscController};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::debug;

/// Shared state behind every handler.
pub struct WebState<L> {
    controller: Arc<OscController<L>>,
    device_label: String,
    hostname: String,
    snapshots: broadcast::Sender<MixerSnapshot>,
    last_snapshot: Arc<Mailbox<MixerSnapshot>>,
}

impl<L> Clone for WebState<L> {
    fn clone(&self) -> Self {
        Self {
            controller: Arc::clone(&self.controller),
            device_label: self.device_label.clone(),
            hostname: self.hostname.clone(),
            snapshots: self.snapshots.clone(),
            last_snapshot: Arc::clone(&self.last_snapshot),
        }
    }
}

impl<L> WebState<L> {
    /// `last_snapshot` is the scheduler mailbox whose `peek_last` seeds new
    /// WebSocket clients; `snapshots` carries the live feed.
    pub fn new(
        controller: Arc<OscController<L>>,
        device_label: impl Into<String>,
        snapshots: broadcast::Sender<MixerSnapshot>,
        last_snapshot: Arc<Mailbox<MixerSnapshot>>,
    ) -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            controller,
            device_label: device_label.into(),
            hostname,
            snapshots,
            last_snapshot,
        }
    }
}

/// Build the router over any control link.
pub fn router<L: ControlLink + 'static>(state: WebState<L>) -> Router {
    Router::new()
        .route("/", get(matrix::<L>))
        .route("/info", get(info::<L>))
        .route("/channels", get(channels::<L>))
        .route("/buses", get(buses::<L>))
        .route("/ws", get(snapshot_socket::<L>))
        .route(
            "/:channel/:bus",
            get(get_gain::<L>).put(set_gain::<L>).post(set_gain::<L>),
        )
        .with_state(state)
}

/// Forward scheduler deliveries onto the broadcast feed until shutdown.
pub async fn run_snapshot_relay(
    mailbox: Arc<Mailbox<MixerSnapshot>>,
    snapshots: broadcast::Sender<MixerSnapshot>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            snapshot = mailbox.recv() => {
                // Send fails only when no client is subscribed.
                let _ = snapshots.send(snapshot);
            }
            _ = shutdown.wait_for(|stop| *stop) => break,
        }
    }
}

// ===== Handlers =====

async fn matrix<L: ControlLink>(
    State(state): State<WebState<L>>,
) -> Result<Json<Vec<Vec<f32>>>, ApiError> {
    Ok(Json(state.controller.matrix().await?))
}

async fn info<L: ControlLink>(State(state): State<WebState<L>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "host": state.hostname,
        "device": state.device_label,
    }))
}

async fn channels<L: ControlLink>(State(state): State<WebState<L>>) -> Json<Vec<String>> {
    Json(state.controller.inputs().to_vec())
}

async fn buses<L: ControlLink>(State(state): State<WebState<L>>) -> Json<Vec<String>> {
    Json(state.controller.outputs().to_vec())
}

async fn get_gain<L: ControlLink>(
    State(state): State<WebState<L>>,
    Path((channel, bus)): Path<(String, String)>,
) -> Result<Json<f32>, ApiError> {
    let channel = resolve_channel(state.controller.inputs(), &channel)?;
    let bus = resolve_bus(state.controller.outputs(), &bus)?;
    Ok(Json(state.controller.gain(channel, bus).await?))
}

async fn set_gain<L: ControlLink>(
    State(state): State<WebState<L>>,
    Path((channel, bus)): Path<(String, String)>,
    body: String,
) -> Result<StatusCode, ApiError> {
    let channel = resolve_channel(state.controller.inputs(), &channel)?;
    let bus = resolve_bus(state.controller.outputs(), &bus)?;
    let level: f32 = body
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("not a level: {body:?}")))?;
    state.controller.set_gain(channel, bus, level).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn snapshot_socket<L: ControlLink + 'static>(
    ws: WebSocketUpgrade,
    State(state): State<WebState<L>>,
) -> Response {
    ws.on_upgrade(move |socket| run_snapshot_socket(socket, state))
}

/// One WebSocket client: cached snapshot first, then the live feed.
async fn run_snapshot_socket<L: ControlLink + 'static>(mut socket: WebSocket, state: WebState<L>) {
    if let Some(snapshot) = state.last_snapshot.peek_last() {
        if let Ok(text) = serde_json::to_string(&snapshot) {
            if socket.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }

    let mut feed = state.snapshots.subscribe();
    loop {
        tokio::select! {
            received = feed.recv() => {
                let snapshot = match received {
                    Ok(snapshot) => snapshot,
                    // Fell behind; skip to the freshest snapshot.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Ok(text) = serde_json::to_string(&snapshot) else {
                    continue;
                };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
    debug!(target: "web", "snapshot client disconnected");
}

// ===== Error mapping =====

/// HTTP-facing error wrapper.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }
}

impl From<MixerError> for ApiError {
    fn from(error: MixerError) -> Self {
        let status = match &error {
            MixerError::UnknownChannel(_) | MixerError::UnknownBus(_) => StatusCode::NOT_FOUND,
            MixerError::ReadTimeout | MixerError::Disconnected | MixerError::LinkClosed => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_names_map_to_not_found() {
        let error: ApiError = MixerError::UnknownChannel("nope".into()).into();
        assert_eq!(error.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn device_failures_map_to_bad_gateway() {
        let error: ApiError = MixerError::ReadTimeout.into();
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
        let error: ApiError = MixerError::Disconnected.into();
        assert_eq!(error.status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn protocol_failures_are_internal_errors() {
        let error: ApiError = MixerError::Protocol("garbled".into()).into();
        assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
