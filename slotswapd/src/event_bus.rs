//! Event bus for swap notifications.
//!
//! The coordinator publishes through [`NotificationSink`]; every SSE
//! connection holds its own receiver. Uses tokio broadcast channels for
//! fan-out to multiple receivers.

use slotswap_coordinator::NotificationSink;
use slotswap_domain::{SwapEvent, UserId};
use tokio::sync::broadcast;
use tracing::debug;

// =============================================================================
// Notification
// =============================================================================

/// A published swap event with its channel name.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Channel name (`swapUpdated`)
    pub name: String,
    /// The event payload
    pub event: SwapEvent,
}

impl Notification {
    /// Check if `user` is a party to the event.
    pub fn concerns(&self, user: UserId) -> bool {
        self.event.parties().contains(&user)
    }
}

// =============================================================================
// Event Bus
// =============================================================================

/// Broadcast bus for swap notifications.
///
/// Multiple producers can send events, and multiple consumers can receive.
pub struct EventBus {
    sender: broadcast::Sender<Notification>,
}

impl EventBus {
    /// Create a new event bus with specified capacity.
    ///
    /// Capacity determines how many events can be buffered before
    /// slow receivers start missing events (lagging).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send a notification to all subscribers.
    ///
    /// Returns the number of receivers that got it, 0 when nobody listens.
    pub fn send(&self, notification: Notification) -> usize {
        self.sender.send(notification).unwrap_or(0)
    }

    /// Subscribe to notifications sent after this call.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver { receiver: self.sender.subscribe() }
    }

    /// Get the number of active receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl NotificationSink for EventBus {
    fn publish(&self, event_name: &str, event: &SwapEvent) {
        let delivered = self.send(Notification { name: event_name.to_string(), event: event.clone() });
        debug!(
            event = event.event_type(),
            swap_id = %event.swap_id(),
            delivered,
            "Notification published"
        );
    }
}

/// Receiver for swap notifications.
pub struct EventReceiver {
    receiver: broadcast::Receiver<Notification>,
}

impl EventReceiver {
    /// Receive the next notification.
    ///
    /// Returns `None` if the sender has been dropped.
    /// Returns error description if the receiver lagged (missed events).
    pub async fn recv(&mut self) -> Option<Result<Notification, String>> {
        match self.receiver.recv().await {
            Ok(notification) => Some(Ok(notification)),
            Err(broadcast::error::RecvError::Closed) => None,
            Err(broadcast::error::RecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }

    /// Try to receive a notification without blocking.
    ///
    /// Returns `None` if nothing is immediately available.
    pub fn try_recv(&mut self) -> Option<Result<Notification, String>> {
        match self.receiver.try_recv() {
            Ok(notification) => Some(Ok(notification)),
            Err(broadcast::error::TryRecvError::Empty) => None,
            Err(broadcast::error::TryRecvError::Closed) => None,
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                Some(Err(format!("Receiver lagged, missed {} events", count)))
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use slotswap_domain::SWAP_UPDATED;
    use uuid::Uuid;

    fn rejected(requester: UserId, responder: UserId) -> SwapEvent {
        SwapEvent::SwapRejected {
            swap_id: Uuid::now_v7(),
            requester,
            responder,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        let event = rejected(Uuid::now_v7(), Uuid::now_v7());

        bus.publish(SWAP_UPDATED, &event);

        let notification = receiver.recv().await.unwrap().unwrap();
        assert_eq!(notification.name, SWAP_UPDATED);
        assert_eq!(notification.event, event);
    }

    #[tokio::test]
    async fn test_multiple_receivers() {
        let bus = EventBus::new(10);
        let mut receiver1 = bus.subscribe();
        let mut receiver2 = bus.subscribe();
        assert_eq!(bus.receiver_count(), 2);

        bus.publish(SWAP_UPDATED, &rejected(Uuid::now_v7(), Uuid::now_v7()));

        assert!(receiver1.recv().await.unwrap().is_ok());
        assert!(receiver2.recv().await.unwrap().is_ok());
    }

    #[test]
    fn test_no_receivers_does_not_fail() {
        let bus = EventBus::new(10);
        let count = bus.send(Notification {
            name: SWAP_UPDATED.to_string(),
            event: rejected(Uuid::now_v7(), Uuid::now_v7()),
        });
        assert_eq!(count, 0);
    }

    #[test]
    fn test_lagging_receiver_reports_missed() {
        let bus = EventBus::new(2);
        let mut receiver = bus.subscribe();

        for _ in 0..4 {
            bus.publish(SWAP_UPDATED, &rejected(Uuid::now_v7(), Uuid::now_v7()));
        }

        let lagged = receiver.try_recv().unwrap();
        assert!(lagged.unwrap_err().contains("missed 2"));
        assert!(receiver.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_concerns_only_parties() {
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        let notification =
            Notification { name: SWAP_UPDATED.to_string(), event: rejected(alice, bob) };

        assert!(notification.concerns(alice));
        assert!(notification.concerns(bob));
        assert!(!notification.concerns(Uuid::now_v7()));
    }

    #[test]
    fn test_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();
        assert!(receiver.try_recv().is_none());
    }
}
