//! WebSocket Streaming Endpoints
//!
//! Each connection owns one [`ChannelSink`] backed by a bounded queue. The
//! sink is registered with the subscription registry under every key the
//! connection asks for; the registry pushes updates into the queue and the
//! connection task writes them to the socket.
//!
//! # Protocol
//!
//! Single-key endpoints subscribe on upgrade and push updates until the
//! client leaves. The multiplexed endpoint accepts commands:
//!
//! ```json
//! {"action": "subscribe", "channel": "ticker", "key": "AAPL"}
//! {"action": "unsubscribe", "channel": "pnl", "key": "DU123456"}
//! ```
//!
//! and acknowledges each with `{"type": "subscribed" | "unsubscribed",
//! "channel": ..., "key": ...}`. Failures are sent as `{"error", "code"}`
//! frames.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade, close_code};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::AppState;
use crate::application::services::RegistryError;
use crate::domain::streaming::{ErrorFrame, StreamMessage};
use crate::domain::subscription::{ResourceKey, Sink, SinkError, SinkId, StreamChannel};

// =============================================================================
// Sink
// =============================================================================

/// Sink writing into a bounded per-connection queue.
///
/// A full queue evicts the sink: the registry drops it, and the connection
/// observes [`ChannelSink::evicted`] and closes.
pub struct ChannelSink {
    id: SinkId,
    tx: mpsc::Sender<Arc<StreamMessage>>,
    evicted: CancellationToken,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its queue.
    #[must_use]
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Receiver<Arc<StreamMessage>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sink = Arc::new(Self {
            id: SinkId::generate(),
            tx,
            evicted: CancellationToken::new(),
        });
        (sink, rx)
    }

    /// Resolves once the sink has been dropped for falling behind.
    pub async fn evicted(&self) {
        self.evicted.cancelled().await;
    }

    /// Whether the sink has been dropped for falling behind.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.evicted.is_cancelled()
    }
}

impl Sink for ChannelSink {
    fn id(&self) -> SinkId {
        self.id
    }

    fn deliver(&self, message: Arc<StreamMessage>) -> Result<(), SinkError> {
        match self.tx.try_send(message) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.evicted.cancel();
                Err(SinkError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::Closed),
        }
    }
}

// =============================================================================
// Frames
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Subscribe,
    Unsubscribe,
}

#[derive(Debug, Deserialize)]
struct Command {
    action: Action,
    channel: StreamChannel,
    key: String,
}

#[derive(Debug, Serialize)]
struct Ack<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    channel: StreamChannel,
    key: &'a str,
}

fn registry_error_frame(err: &RegistryError) -> ErrorFrame {
    ErrorFrame::new(err.code(), err.to_string())
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, frame: &T) -> Result<(), axum::Error> {
    match serde_json::to_string(frame) {
        Ok(text) => socket.send(Message::Text(text.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to serialize stream frame");
            Ok(())
        }
    }
}

async fn close_with(socket: &mut WebSocket, frame: &ErrorFrame) {
    if send_json(socket, frame).await.is_ok() {
        let close = CloseFrame {
            code: close_code::POLICY,
            reason: frame.code.clone().into(),
        };
        let _ = socket.send(Message::Close(Some(close))).await;
    }
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn ticker_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| single_key(socket, state, StreamChannel::Ticker, symbol))
}

pub async fn pnl_stream(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(account): Path<String>,
) -> Response {
    ws.on_upgrade(move |socket| single_key(socket, state, StreamChannel::Pnl, account))
}

pub async fn multiplexed_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| multiplexed(socket, state))
}

// =============================================================================
// Connection Tasks
// =============================================================================

async fn single_key(mut socket: WebSocket, state: AppState, channel: StreamChannel, raw: String) {
    let key = match ResourceKey::parse(channel, &raw) {
        Ok(key) => key,
        Err(e) => {
            let err = RegistryError::from(e);
            tracing::debug!(channel = channel.as_str(), key = %raw, error = %err, "Rejected stream key");
            close_with(&mut socket, &registry_error_frame(&err)).await;
            return;
        }
    };

    let (sink, rx) = ChannelSink::new(state.sink_capacity);
    if let Err(err) = state.registry.subscribe(&key, sink.clone()).await {
        close_with(&mut socket, &registry_error_frame(&err)).await;
        return;
    }
    tracing::info!(key = %key, sink = %sink.id(), "Stream client connected");

    let mut held = HashSet::from([key]);
    pump(socket, &state, &sink, rx, &mut held, false).await;
    teardown(&state, &sink, held).await;
}

async fn multiplexed(socket: WebSocket, state: AppState) {
    let (sink, rx) = ChannelSink::new(state.sink_capacity);
    tracing::info!(sink = %sink.id(), "Multiplexed stream client connected");

    let mut held = HashSet::new();
    pump(socket, &state, &sink, rx, &mut held, true).await;
    teardown(&state, &sink, held).await;
}

/// Forward queued updates to the socket until either side goes away.
///
/// With `accept_commands`, text frames are read as subscribe/unsubscribe
/// commands; otherwise they are ignored.
async fn pump(
    mut socket: WebSocket,
    state: &AppState,
    sink: &Arc<ChannelSink>,
    mut rx: mpsc::Receiver<Arc<StreamMessage>>,
    held: &mut HashSet<ResourceKey>,
    accept_commands: bool,
) {
    loop {
        tokio::select! {
            () = state.shutdown.cancelled() => {
                let close = CloseFrame {
                    code: close_code::AWAY,
                    reason: "server shutting down".into(),
                };
                let _ = socket.send(Message::Close(Some(close))).await;
                break;
            }
            () = sink.evicted() => {
                tracing::warn!(sink = %sink.id(), "Slow stream client dropped");
                let frame = ErrorFrame::new("SLOW_CONSUMER", "client fell behind the stream");
                close_with(&mut socket, &frame).await;
                break;
            }
            Some(message) = rx.recv() => {
                if send_json(&mut socket, message.as_ref()).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) if accept_commands => {
                    if handle_command(&mut socket, state, sink, held, text.as_str()).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(sink = %sink.id(), error = %e, "Stream socket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
        }
    }
}

async fn handle_command(
    socket: &mut WebSocket,
    state: &AppState,
    sink: &Arc<ChannelSink>,
    held: &mut HashSet<ResourceKey>,
    text: &str,
) -> Result<(), axum::Error> {
    let command: Command = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            let frame = ErrorFrame::new("INVALID_REQUEST", format!("malformed command: {e}"));
            return send_json(socket, &frame).await;
        }
    };

    let key = match ResourceKey::parse(command.channel, &command.key) {
        Ok(key) => key,
        Err(e) => return send_json(socket, &registry_error_frame(&RegistryError::from(e))).await,
    };

    let kind = match command.action {
        Action::Subscribe => {
            if let Err(err) = state.registry.subscribe(&key, sink.clone()).await {
                return send_json(socket, &registry_error_frame(&err)).await;
            }
            held.insert(key.clone());
            "subscribed"
        }
        Action::Unsubscribe => {
            if held.remove(&key) {
                state.registry.unsubscribe(&key, sink.id()).await;
            }
            "unsubscribed"
        }
    };

    let ack = Ack {
        kind,
        channel: command.channel,
        key: key.id(),
    };
    send_json(socket, &ack).await
}

async fn teardown(state: &AppState, sink: &ChannelSink, held: HashSet<ResourceKey>) {
    join_all(held.iter().map(|key| state.registry.unsubscribe(key, sink.id()))).await;
    tracing::info!(sink = %sink.id(), keys = held.len(), "Stream client disconnected");
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::domain::streaming::TickerUpdate;

    fn message() -> Arc<StreamMessage> {
        Arc::new(StreamMessage::Ticker(TickerUpdate::empty("AAPL", Utc::now())))
    }

    #[test]
    fn full_queue_evicts_sink() {
        let (sink, _rx) = ChannelSink::new(1);
        assert_eq!(sink.deliver(message()), Ok(()));
        assert_eq!(sink.deliver(message()), Err(SinkError::Full));
        assert!(sink.is_evicted());
    }

    #[test]
    fn closed_queue_reports_closed() {
        let (sink, rx) = ChannelSink::new(4);
        drop(rx);
        assert_eq!(sink.deliver(message()), Err(SinkError::Closed));
        assert!(!sink.is_evicted());
    }

    #[test]
    fn sinks_have_distinct_ids() {
        let (a, _) = ChannelSink::new(1);
        let (b, _) = ChannelSink::new(1);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn parses_commands() {
        let command: Command =
            serde_json::from_str(r#"{"action":"subscribe","channel":"pnl","key":"DU123456"}"#)
                .unwrap();
        assert_eq!(command.action, Action::Subscribe);
        assert_eq!(command.channel, StreamChannel::Pnl);
        assert!(serde_json::from_str::<Command>(r#"{"action":"watch","channel":"pnl","key":"x"}"#).is_err());
    }

    #[test]
    fn ack_shape() {
        let ack = Ack {
            kind: "subscribed",
            channel: StreamChannel::Ticker,
            key: "AAPL",
        };
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            serde_json::json!({"type": "subscribed", "channel": "ticker", "key": "AAPL"})
        );
    }
}
