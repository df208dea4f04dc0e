// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal typed event bus.
//!
//! A thin wrapper around `tokio::sync::broadcast` that stamps each event
//! with an id and timestamp. State changes publish typed events onto the
//! bus; a host loop consumes them in order. This replaces ad hoc callback
//! registration: publishers never run subscriber code, so there are no
//! re-entrancy hazards.
//!
//! Slow subscribers lag rather than block publishers; a lagged receiver
//! observes `RecvError::Lagged` and continues from the oldest retained
//! event.

use serde::Serialize;
use tokio::sync::broadcast;

/// An event wrapped with identity and publish time.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    /// Unique event id (uuid v4).
    pub id: String,
    /// RFC 3339 publish timestamp.
    pub timestamp: String,
    /// The typed event.
    pub event: T,
}

/// A broadcast bus for events of type `T`.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
#[derive(Debug, Clone)]
pub struct EventBus<T: Clone> {
    tx: broadcast::Sender<Envelope<T>>,
}

impl<T: Clone + Send + 'static> EventBus<T> {
    /// Create a bus retaining up to `capacity` undelivered events per
    /// subscriber before the oldest are dropped.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event to all current subscribers.
    ///
    /// Returns the envelope id. Publishing with no subscribers is not an
    /// error; the event is simply dropped.
    pub fn publish(&self, event: T) -> String {
        let envelope = Envelope {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            event,
        };
        let id = envelope.id.clone();
        if self.tx.send(envelope).is_err() {
            tracing::trace!("event published with no subscribers");
        }
        id
    }

    /// Subscribe to events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope<T>> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T: Clone + Send + 'static> Default for EventBus<T> {
    fn default() -> Self {
        Self::new(256)
    }
}
