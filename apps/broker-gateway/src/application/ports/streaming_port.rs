//! Streaming Port (Driven Port)
//!
//! Upstream side of the Subscription Registry: one `subscribe_stream` per
//! resource key going from zero to one sink, one `cancel_stream` per key
//! going back to zero.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::BrokerError;
use crate::domain::streaming::StreamMessage;
use crate::domain::subscription::ResourceKey;

/// Broker-side request id of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub i64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle of a live upstream subscription.
///
/// Returned to every subscriber of the key so all of them see the same
/// upstream identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamHandle {
    /// Request id the broker tags updates with.
    pub request_id: RequestId,
    /// Key the subscription is for.
    pub key: ResourceKey,
    /// When the upstream subscription was opened.
    pub opened_at: DateTime<Utc>,
}

/// Asynchronous notification from the Broker Session.
#[derive(Debug, Clone, PartialEq)]
pub enum BrokerEvent {
    /// Session (re)connected.
    Connected,
    /// Session lost its connection.
    Disconnected {
        /// Reason given by the session.
        reason: String,
    },
    /// Streaming update for a key.
    Update {
        /// Key the update belongs to.
        key: ResourceKey,
        /// Upstream subscription that produced the update.
        request_id: RequestId,
        /// The update.
        message: StreamMessage,
    },
    /// Error reported by the broker outside any request.
    Error {
        /// Broker error code.
        code: i32,
        /// Error text.
        message: String,
    },
}

/// Port for opening and cancelling upstream streaming subscriptions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StreamingPort: Send + Sync {
    /// Open the upstream subscription for `key`.
    ///
    /// Updates are emitted as [`BrokerEvent::Update`] until the handle is
    /// cancelled.
    async fn subscribe_stream(&self, key: &ResourceKey) -> Result<UpstreamHandle, BrokerError>;

    /// Cancel an upstream subscription.
    async fn cancel_stream(&self, handle: &UpstreamHandle) -> Result<(), BrokerError>;
}
