//! Subscription Registry
//!
//! Maps each resource key to its set of live sinks and owns the single
//! upstream subscription held for that key.
//!
//! # Invariant
//!
//! A key has an upstream subscription if and only if its sink set is
//! non-empty. The 0→1 transition issues exactly one `subscribe_stream`; the
//! 1→0 transition issues exactly one `cancel_stream`.
//!
//! # Locking
//!
//! Every key lives in a slot guarded by an async mutex, held across the
//! upstream call. The key → slot map sits behind a short synchronous lock
//! that is never held across an await. Lock order is slot, then map.
//!
//! A slot is removed from the map while its lock is still held. A task that
//! was queued on a retired slot sees that the slot is no longer current and
//! retries on a fresh one, so a `subscribe` racing an in-flight cancel waits
//! for the cancel and then re-subscribes once.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{Mutex, MutexGuard};

use crate::application::ports::{BrokerError, RequestId, StreamingPort, UpstreamHandle};
use crate::domain::streaming::StreamMessage;
use crate::domain::subscription::{
    DispatchOutcome, KeyError, KeyPhase, ResourceKey, SharedSink, SinkId, SubscriptionStats,
};
use crate::infrastructure::metrics;

// =============================================================================
// Errors
// =============================================================================

/// Subscription registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// The resource identifier is malformed.
    #[error("invalid resource key: {0}")]
    InvalidKey(#[from] KeyError),

    /// The Broker Session refused the upstream subscription.
    #[error("upstream subscription for {key} unavailable: {source}")]
    UpstreamUnavailable {
        /// Key that could not be subscribed.
        key: ResourceKey,
        /// Broker error.
        source: BrokerError,
    },
}

impl RegistryError {
    /// Machine-readable code used in stream error frames.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidKey(_) => "INVALID_KEY",
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
        }
    }
}

// =============================================================================
// Slots
// =============================================================================

#[derive(Default)]
struct SlotState {
    phase: KeyPhase,
    handle: Option<UpstreamHandle>,
    sinks: HashMap<SinkId, SharedSink>,
}

#[derive(Default)]
struct KeySlot {
    state: Mutex<SlotState>,
}

// =============================================================================
// Registry
// =============================================================================

/// Per-key sink sets with exactly-once upstream subscribe and cancel.
pub struct SubscriptionRegistry {
    upstream: Arc<dyn StreamingPort>,
    slots: parking_lot::Mutex<HashMap<ResourceKey, Arc<KeySlot>>>,
    active_keys: AtomicUsize,
    sinks: AtomicUsize,
}

impl SubscriptionRegistry {
    /// Create a registry backed by `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn StreamingPort>) -> Self {
        Self {
            upstream,
            slots: parking_lot::Mutex::new(HashMap::new()),
            active_keys: AtomicUsize::new(0),
            sinks: AtomicUsize::new(0),
        }
    }

    /// Register `sink` under `key`.
    ///
    /// The first sink for a key opens the upstream subscription; later sinks
    /// reuse its handle. Registering a sink that is already present is a
    /// no-op that returns the current handle.
    ///
    /// Dropping the returned future while the upstream call is in flight
    /// forgets the key, and the next subscriber opens a new subscription. A
    /// stream the broker opened for the abandoned call is never cancelled,
    /// since its handle was not returned.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UpstreamUnavailable`] if the broker rejects
    /// the subscription. The sink is not registered and no state is kept
    /// for the key.
    pub async fn subscribe(
        &self,
        key: &ResourceKey,
        sink: SharedSink,
    ) -> Result<UpstreamHandle, RegistryError> {
        loop {
            let slot = self.slot_for(key);
            let mut state = slot.state.lock().await;
            if !self.is_current(key, &slot) {
                continue;
            }

            if let Some(handle) = state.handle.clone() {
                self.add_sink(key, &mut state, &sink);
                return Ok(handle);
            }

            // Fresh slot: this caller opens the upstream subscription.
            state.phase = KeyPhase::Subscribing;
            tracing::debug!(key = %key, "Opening upstream subscription");

            let mut pending = PendingOpen {
                registry: self,
                key,
                slot: &slot,
                state,
                armed: true,
            };
            let result = self.upstream.subscribe_stream(key).await;
            pending.armed = false;
            let state = &mut pending.state;

            match result {
                Ok(handle) => {
                    state.phase = KeyPhase::Active;
                    state.handle = Some(handle.clone());
                    self.active_keys.fetch_add(1, Ordering::Relaxed);
                    metrics::record_upstream_subscribe(key.channel());
                    tracing::info!(
                        key = %key,
                        request_id = %handle.request_id,
                        "Upstream subscription opened"
                    );
                    self.add_sink(key, state, &sink);
                    self.publish_gauges();
                    return Ok(handle);
                }
                Err(source) => {
                    state.phase = KeyPhase::Unsubscribed;
                    self.remove_slot(key, &slot);
                    metrics::record_upstream_subscribe_failure(key.channel());
                    tracing::warn!(key = %key, error = %source, "Upstream subscription rejected");
                    return Err(RegistryError::UpstreamUnavailable {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }
    }

    /// Remove `sink_id` from `key`.
    ///
    /// Removing the last sink cancels the upstream subscription and forgets
    /// the key. Unknown keys and sinks are ignored.
    pub async fn unsubscribe(&self, key: &ResourceKey, sink_id: SinkId) {
        let Some(slot) = self.existing_slot(key) else {
            return;
        };
        let mut state = slot.state.lock().await;
        if !self.is_current(key, &slot) {
            return;
        }

        if state.sinks.remove(&sink_id).is_none() {
            return;
        }
        self.sinks.fetch_sub(1, Ordering::Relaxed);
        tracing::debug!(key = %key, sink = %sink_id, remaining = state.sinks.len(), "Sink removed");

        if state.sinks.is_empty() {
            self.retire(key, &slot, &mut state).await;
        }
        self.publish_gauges();
    }

    /// Push `message` to every sink currently registered under `key`.
    ///
    /// Only messages tagged with the request id of the key's live upstream
    /// subscription are delivered; updates from a cancelled subscription
    /// that arrive after a re-subscribe are discarded.
    ///
    /// Sinks that fail to accept the message are removed. If that empties
    /// the key, its upstream subscription is cancelled.
    pub async fn dispatch(
        &self,
        key: &ResourceKey,
        request_id: RequestId,
        message: Arc<StreamMessage>,
    ) -> DispatchOutcome {
        let Some(slot) = self.existing_slot(key) else {
            return DispatchOutcome::default();
        };
        let mut state = slot.state.lock().await;
        if !self.is_current(key, &slot) {
            return DispatchOutcome::default();
        }
        match &state.handle {
            Some(handle) if handle.request_id == request_id => {}
            Some(handle) => {
                tracing::trace!(
                    key = %key,
                    stale = %request_id,
                    live = %handle.request_id,
                    "Discarding update from previous subscription"
                );
                return DispatchOutcome::default();
            }
            None => return DispatchOutcome::default(),
        }

        let mut outcome = DispatchOutcome::default();
        let mut failed = Vec::new();
        for (id, sink) in &state.sinks {
            match sink.deliver(Arc::clone(&message)) {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    tracing::debug!(key = %key, sink = %id, error = %err, "Dropping sink");
                    failed.push(*id);
                }
            }
        }

        for id in &failed {
            state.sinks.remove(id);
        }
        outcome.dropped = failed.len();
        metrics::record_dispatched(key.channel(), outcome.delivered);

        if outcome.dropped > 0 {
            self.sinks.fetch_sub(outcome.dropped, Ordering::Relaxed);
            metrics::record_sinks_dropped(key.channel(), outcome.dropped);
            if state.sinks.is_empty() {
                self.retire(key, &slot, &mut state).await;
            }
            self.publish_gauges();
        }

        outcome
    }

    /// Whether `key` currently has a slot, in any phase.
    #[must_use]
    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.slots.lock().contains_key(key)
    }

    /// Registry-wide counts.
    #[must_use]
    pub fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            active_keys: self.active_keys.load(Ordering::Relaxed),
            sinks: self.sinks.load(Ordering::Relaxed),
        }
    }

    /// Keys that currently hold an upstream subscription.
    pub async fn active_keys(&self) -> Vec<ResourceKey> {
        let snapshot: Vec<(ResourceKey, Arc<KeySlot>)> = self
            .slots
            .lock()
            .iter()
            .map(|(key, slot)| (key.clone(), Arc::clone(slot)))
            .collect();

        let mut keys = Vec::with_capacity(snapshot.len());
        for (key, slot) in snapshot {
            if slot.state.lock().await.handle.is_some() {
                keys.push(key);
            }
        }
        keys
    }

    /// Number of sinks registered under `key`.
    pub async fn sink_count(&self, key: &ResourceKey) -> usize {
        match self.existing_slot(key) {
            Some(slot) => slot.state.lock().await.sinks.len(),
            None => 0,
        }
    }

    /// Lifecycle phase of `key`.
    pub async fn phase(&self, key: &ResourceKey) -> KeyPhase {
        match self.existing_slot(key) {
            Some(slot) => slot.state.lock().await.phase,
            None => KeyPhase::Unsubscribed,
        }
    }

    // ---- internals ----

    fn slot_for(&self, key: &ResourceKey) -> Arc<KeySlot> {
        Arc::clone(self.slots.lock().entry(key.clone()).or_default())
    }

    fn existing_slot(&self, key: &ResourceKey) -> Option<Arc<KeySlot>> {
        self.slots.lock().get(key).cloned()
    }

    fn is_current(&self, key: &ResourceKey, slot: &Arc<KeySlot>) -> bool {
        self.slots
            .lock()
            .get(key)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
    }

    fn remove_slot(&self, key: &ResourceKey, slot: &Arc<KeySlot>) {
        let mut slots = self.slots.lock();
        if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, slot)) {
            slots.remove(key);
        }
    }

    fn add_sink(&self, key: &ResourceKey, state: &mut SlotState, sink: &SharedSink) {
        if state.sinks.insert(sink.id(), Arc::clone(sink)).is_none() {
            self.sinks.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(key = %key, sink = %sink.id(), total = state.sinks.len(), "Sink added");
            self.publish_gauges();
        }
    }

    /// Cancel the upstream subscription and drop the slot. Caller holds the
    /// slot lock and has verified the sink set is empty.
    async fn retire(
        &self,
        key: &ResourceKey,
        slot: &Arc<KeySlot>,
        state: &mut MutexGuard<'_, SlotState>,
    ) {
        tracing::debug!(key = %key, from = state.phase.as_str(), "Retiring key");
        state.phase = KeyPhase::Unsubscribing;
        if let Some(handle) = state.handle.take() {
            if let Err(e) = self.upstream.cancel_stream(&handle).await {
                tracing::warn!(
                    key = %key,
                    request_id = %handle.request_id,
                    error = %e,
                    "Upstream cancel failed"
                );
            }
            self.active_keys.fetch_sub(1, Ordering::Relaxed);
            metrics::record_upstream_cancel(key.channel());
            tracing::info!(key = %key, "Upstream subscription cancelled");
        }
        state.phase = KeyPhase::Unsubscribed;
        self.remove_slot(key, slot);
    }

    fn publish_gauges(&self) {
        let stats = self.stats();
        metrics::set_active_stream_keys(stats.active_keys);
        metrics::set_registered_sinks(stats.sinks);
    }
}

/// Slot lock held across an upstream subscribe. Dropped while armed, it
/// forgets the key so the slot is not left in `Subscribing`.
struct PendingOpen<'a> {
    registry: &'a SubscriptionRegistry,
    key: &'a ResourceKey,
    slot: &'a Arc<KeySlot>,
    state: MutexGuard<'a, SlotState>,
    armed: bool,
}

impl Drop for PendingOpen<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.phase = KeyPhase::Unsubscribed;
            self.registry.remove_slot(self.key, self.slot);
            tracing::warn!(key = %self.key, "Upstream subscribe abandoned");
        }
    }
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Tests
// =============================================================================
