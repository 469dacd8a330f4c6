//! Notification sinks for ledger events.

use std::sync::Arc;

use crowdfund_types::LedgerEvent;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::info;

/// Fire-and-forget observer of ledger events.
///
/// Implementations must not block and must not fail the caller.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: &LedgerEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event: &LedgerEvent) {}
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: RwLock<Vec<LedgerEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<LedgerEvent> {
        self.events.read().clone()
    }

    pub fn count_of(&self, kind: &str) -> usize {
        self.events
            .read()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

impl NotificationSink for MemorySink {
    fn publish(&self, event: &LedgerEvent) {
        self.events.write().push(event.clone());
    }
}

/// Fans events out to live subscribers over a tokio broadcast channel.
pub struct BroadcastSink {
    sender: broadcast::Sender<LedgerEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl NotificationSink for BroadcastSink {
    fn publish(&self, event: &LedgerEvent) {
        // No receivers is not an error.
        let _ = self.sender.send(event.clone());
    }
}

/// Logs each event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn publish(&self, event: &LedgerEvent) {
        info!(
            event = event.kind(),
            campaign_id = %event.campaign_id(),
            "ledger event"
        );
    }
}

/// Publishes to several sinks in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl NotificationSink for FanoutSink {
    fn publish(&self, event: &LedgerEvent) {
        for sink in &self.sinks {
            sink.publish(event);
        }
    }
}
