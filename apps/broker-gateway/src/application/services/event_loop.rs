//! Broker Event Loop
//!
//! Drains [`BrokerEvent`]s from the Broker Session. Connection events update
//! the session state in arrival order. Streaming updates are handed to a
//! per-key dispatch lane, so a key blocked on an upstream call never delays
//! delivery for other keys. Within a key, updates keep their order.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::registry::SubscriptionRegistry;
use super::session::{ConnectionState, SessionState};
use crate::application::ports::{BrokerEvent, RequestId};
use crate::domain::streaming::StreamMessage;
use crate::domain::subscription::ResourceKey;
use crate::infrastructure::metrics;

/// Updates queued per key before new ones are discarded.
const LANE_CAPACITY: usize = 1024;

/// How often lanes of forgotten keys are closed.
const LANE_PRUNE_INTERVAL: Duration = Duration::from_secs(5);

type LaneItem = (RequestId, StreamMessage);

/// Run until the channel closes or `shutdown` is cancelled.
///
/// When the channel closes, queued updates are dispatched before returning.
/// On cancellation, lanes finish their queues in the background.
pub async fn run_event_loop(
    mut events: mpsc::Receiver<BrokerEvent>,
    registry: Arc<SubscriptionRegistry>,
    session: Arc<SessionState>,
    shutdown: CancellationToken,
) {
    tracing::info!("Broker event loop started");

    let mut lanes = Lanes::new(registry);
    let mut prune = tokio::time::interval(LANE_PRUNE_INTERVAL);
    prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let event = tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                tracing::info!("Broker event loop cancelled");
                return;
            }
            _ = prune.tick() => {
                lanes.prune();
                continue;
            }
            event = events.recv() => event,
        };

        let Some(event) = event else {
            tracing::info!("Broker event channel closed");
            break;
        };

        handle_event(event, &mut lanes, &session);
    }

    lanes.drain().await;
}

fn handle_event(event: BrokerEvent, lanes: &mut Lanes, session: &SessionState) {
    match event {
        BrokerEvent::Connected => {
            metrics::record_broker_event("connected");
            tracing::info!("Broker session connected");
            session.set_state(ConnectionState::Connected);
        }
        BrokerEvent::Disconnected { reason } => {
            metrics::record_broker_event("disconnected");
            tracing::warn!(%reason, "Broker session disconnected");
            session.set_state(ConnectionState::Disconnected);
        }
        BrokerEvent::Update {
            key,
            request_id,
            message,
        } => {
            metrics::record_broker_event("update");
            session.increment_messages();
            lanes.route(key, request_id, message);
        }
        BrokerEvent::Error { code, message } => {
            metrics::record_broker_event("error");
            tracing::warn!(code, %message, "Broker error");
            session.set_error(format!("Error {code}: {message}"));
        }
    }
}

// =============================================================================
// Dispatch Lanes
// =============================================================================

struct Lane {
    sender: mpsc::Sender<LaneItem>,
    task: JoinHandle<()>,
}

/// One dispatch task per key the registry tracks.
struct Lanes {
    registry: Arc<SubscriptionRegistry>,
    lanes: HashMap<ResourceKey, Lane>,
}

impl Lanes {
    fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            registry,
            lanes: HashMap::new(),
        }
    }

    fn route(&mut self, key: ResourceKey, request_id: RequestId, message: StreamMessage) {
        if !self.lanes.contains_key(&key) && !self.registry.contains(&key) {
            tracing::trace!(key = %key, "Update for untracked key");
            return;
        }

        let lane = self
            .lanes
            .entry(key.clone())
            .or_insert_with(|| spawn_lane(Arc::clone(&self.registry), key.clone()));

        match lane.sender.try_send((request_id, message)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                metrics::record_lane_overflow(key.channel());
                tracing::debug!(key = %key, "Dispatch lane full, update discarded");
            }
            Err(TrySendError::Closed(item)) => {
                tracing::warn!(key = %key, "Dispatch lane stopped, restarting");
                let fresh = spawn_lane(Arc::clone(&self.registry), key.clone());
                if fresh.sender.try_send(item).is_err() {
                    metrics::record_lane_overflow(key.channel());
                }
                self.lanes.insert(key, fresh);
            }
        }
    }

    /// Close lanes whose key the registry no longer tracks. A closed lane
    /// finishes its queued updates and exits.
    fn prune(&mut self) {
        let registry = &self.registry;
        self.lanes.retain(|key, _| registry.contains(key));
    }

    /// Close every lane and wait for queued updates to be dispatched.
    async fn drain(self) {
        for (key, lane) in self.lanes {
            drop(lane.sender);
            if let Err(e) = lane.task.await {
                tracing::warn!(key = %key, error = %e, "Dispatch lane failed");
            }
        }
    }
}

fn spawn_lane(registry: Arc<SubscriptionRegistry>, key: ResourceKey) -> Lane {
    let (sender, mut receiver) = mpsc::channel::<LaneItem>(LANE_CAPACITY);
    let task = tokio::spawn(async move {
        while let Some((request_id, message)) = receiver.recv().await {
            let outcome = registry.dispatch(&key, request_id, Arc::new(message)).await;
            tracing::trace!(
                key = %key,
                delivered = outcome.delivered,
                dropped = outcome.dropped,
                "Update dispatched"
            );
        }
        tracing::debug!(key = %key, "Dispatch lane closed");
    });
    Lane { sender, task }
}
