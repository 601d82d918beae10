//! Event system for session and pairing notifications
//!
//! The session and the pairing agent publish here; the binary subscribes
//! and logs.

pub mod types;

pub use types::SystemEvent;

use tokio::sync::broadcast;

/// Event channel capacity (ring buffer size)
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Event bus broadcasting [`SystemEvent`]s
///
/// # Example
///
/// ```no_run
/// use bt_gamepad::events::{EventBus, SystemEvent};
///
/// let bus = EventBus::new();
/// let mut rx = bus.subscribe();
///
/// bus.publish(SystemEvent::PairableChanged { pairable: true });
///
/// tokio::spawn(async move {
///     while let Ok(event) = rx.recv().await {
///         println!("Received event: {:?}", event);
///     }
/// });
/// ```
pub struct EventBus {
    tx: broadcast::Sender<SystemEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish an event to all subscribers
    ///
    /// If there are no active subscribers, the event is dropped.
    pub fn publish(&self, event: SystemEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events
    ///
    /// A subscriber that falls too far behind receives `Lagged` and misses
    /// some events.
    pub fn subscribe(&self) -> broadcast::Receiver<SystemEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SystemEvent::DiscoverableChanged { discoverable: true });

        let event = rx.recv().await.unwrap();
        assert!(matches!(
            event,
            SystemEvent::DiscoverableChanged { discoverable: true }
        ));
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(SystemEvent::ReportChannelLost {
            reason: "broken pipe".to_string(),
        });

        assert!(matches!(
            rx1.recv().await.unwrap(),
            SystemEvent::ReportChannelLost { .. }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap(),
            SystemEvent::ReportChannelLost { .. }
        ));
    }

    #[test]
    fn test_no_subscribers() {
        let bus = EventBus::new();
        bus.publish(SystemEvent::PairableChanged { pairable: false });

        // Late subscribers only see later events
        let mut rx = bus.subscribe();
        assert!(rx.try_recv().is_err());
    }
}
