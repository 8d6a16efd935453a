//! Broker Session State
//!
//! Connection bookkeeping for the Broker Session, updated by the event loop
//! and read by the health and connection endpoints.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Connection state of the Broker Session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Connected.
    Connected,
    /// Last event was an error.
    Error,
}

/// Snapshot of [`SessionState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    /// Connection state.
    pub state: ConnectionState,
    /// Last time the session connected.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Last error reported.
    pub last_error: Option<String>,
    /// Streaming updates received.
    pub messages_received: u64,
}

/// Tracks the state of the Broker Session connection.
#[derive(Debug, Default)]
pub struct SessionState {
    state: parking_lot::RwLock<ConnectionState>,
    last_connected_at: parking_lot::RwLock<Option<DateTime<Utc>>>,
    last_error: parking_lot::RwLock<Option<String>>,
    messages_received: AtomicU64,
}

impl SessionState {
    /// Create a disconnected session state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
        }
    }

    /// Record an error. A connected session stays connected.
    pub fn set_error(&self, message: String) {
        {
            let mut state = self.state.write();
            if *state != ConnectionState::Connected {
                *state = ConnectionState::Error;
            }
        }
        *self.last_error.write() = Some(message);
    }

    /// Count a streaming update.
    pub fn increment_messages(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Whether the session is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Streaming updates received so far.
    #[must_use]
    pub fn messages_received(&self) -> u64 {
        self.messages_received.load(Ordering::Relaxed)
    }

    /// Point-in-time copy of every field.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
            messages_received: self.messages_received(),
        }
    }
}
