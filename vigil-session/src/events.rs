//! Session event bus
//!
//! Broadcast fan-out for host-observable lifecycle events. The UI layer
//! subscribes; publishing with no live subscribers is reported to the
//! caller so terminal transitions can fall back to direct cleanup.

use crate::session::types::SessionEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// Broadcast bus for session lifecycle events
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; returns false when no subscriber received it
    pub fn publish(&self, event: SessionEvent) -> bool {
        match self.sender.send(event) {
            Ok(receivers) => {
                debug!(receivers, "Published session event");
                true
            }
            Err(_) => {
                debug!("No subscribers for session event");
                false
            }
        }
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
