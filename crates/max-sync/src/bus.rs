// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broadcast-based event bus for decoupled [`SyncEvent`] distribution.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default channel capacity for the event bus.
const DEFAULT_CAPACITY: usize = 256;

/// An observable occurrence during a sync run, published to the bus so
/// external observers can track progress without polling the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
#[serde(rename_all_fields = "camelCase")]
pub enum SyncEvent {
    /// A sync run began executing its plan.
    SyncStarted {
        /// The sync run that started.
        sync_id: String,
    },
    /// One task completed successfully.
    TaskCompleted {
        /// The entity type the task operated on.
        entity_type: String,
        /// Number of entities touched, when the runner reports one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        count: Option<usize>,
    },
    /// One task failed.
    TaskFailed {
        /// The entity type the task operated on.
        entity_type: String,
    },
}

/// Shared statistics counters for an [`EventBus`].
#[derive(Debug, Default)]
struct StatsInner {
    total_published: AtomicU64,
    dropped_events: AtomicU64,
}

/// Broadcast-based event bus for distributing [`SyncEvent`]s to multiple
/// subscribers with built-in statistics tracking.
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    stats: Arc<StatsInner>,
}

impl EventBus {
    /// Create a new event bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new event bus with the given channel capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Create a new [`EventSubscription`] that receives future events.
    #[must_use]
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If no subscribers are listening the event is silently dropped and
    /// counted in [`EventBusStats::dropped_events`].
    pub fn publish(&self, event: SyncEvent) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Return the number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Return a snapshot of the current bus statistics.
    #[must_use]
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_published: self.stats.total_published.load(Ordering::Relaxed),
            active_subscribers: self.tx.receiver_count(),
            dropped_events: self.stats.dropped_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for receiving events from an [`EventBus`].
pub struct EventSubscription {
    rx: broadcast::Receiver<SyncEvent>,
    stats: Arc<StatsInner>,
}

impl EventSubscription {
    /// Receive the next event, waiting asynchronously.
    ///
    /// Returns `None` when the bus is closed or the subscriber lagged.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Try to receive an event without blocking.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                self.rx.try_recv().ok()
            }
            Err(_) => None,
        }
    }
}

/// Snapshot of event bus statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusStats {
    /// Total number of events published to the bus.
    pub total_published: u64,
    /// Number of subscribers currently listening.
    pub active_subscribers: usize,
    /// Events lost because no subscribers were listening or a subscriber lagged.
    pub dropped_events: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe();
        bus.publish(SyncEvent::SyncStarted { sync_id: "sync-1".into() });
        let event = sub.recv().await.unwrap();
        assert_eq!(event, SyncEvent::SyncStarted { sync_id: "sync-1".into() });
    }

    #[test]
    fn publish_without_subscribers_counts_as_dropped() {
        let bus = EventBus::new();
        bus.publish(SyncEvent::TaskFailed { entity_type: "contact".into() });
        let stats = bus.stats();
        assert_eq!(stats.total_published, 1);
        assert_eq!(stats.dropped_events, 1);
    }

    #[test]
    fn event_tag_and_fields_use_wire_casing() {
        let json = serde_json::to_value(SyncEvent::TaskCompleted {
            entity_type: "contact".into(),
            count: Some(3),
        })
        .unwrap();
        assert_eq!(json["type"], "task-completed");
        assert_eq!(json["entityType"], "contact");
        assert_eq!(json["count"], 3);
    }
}
