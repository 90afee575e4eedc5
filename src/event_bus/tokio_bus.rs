use tokio::sync::broadcast;

use super::traits::{EventBus, EventFilter, RuntimeEvent};

const DEFAULT_CAPACITY: usize = 1024;

/// [`EventBus`] implementation backed by a `tokio::sync::broadcast` channel.
pub struct TokioBroadcastBus {
    sender: broadcast::Sender<RuntimeEvent>,
}

impl TokioBroadcastBus {
    /// Create with the default channel capacity (1024).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create with an explicit channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for TokioBroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for TokioBroadcastBus {
    fn publish(&self, event: RuntimeEvent) -> Result<(), String> {
        // `send` fails only when there are no receivers — that is fine.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    fn subscribe_filtered(&self, _filter: EventFilter) -> broadcast::Receiver<RuntimeEvent> {
        // The underlying broadcast channel delivers all events; consumers
        // apply EventFilter::matches() to discard unwanted messages.
        self.sender.subscribe()
    }
}
