//! Stub implementations for testing.
//!
//! These sinks stand in for a real notification transport.

use parking_lot::Mutex;

use slotswap_domain::SwapEvent;

use crate::ports::NotificationSink;

// =============================================================================
// Null Sink
// =============================================================================

/// Sink that discards every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event_name: &str, _event: &SwapEvent) {}
}

// =============================================================================
// Recording Sink
// =============================================================================

/// Sink that records every notification in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    published: Mutex<Vec<(String, SwapEvent)>>,
}

impl RecordingSink {
    /// Create an empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<SwapEvent> {
        self.published.lock().iter().map(|(_, event)| event.clone()).collect()
    }

    /// Event names recorded so far, oldest first.
    pub fn names(&self) -> Vec<String> {
        self.published.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Number of recorded notifications.
    pub fn count(&self) -> usize {
        self.published.lock().len()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.published.lock().clear();
    }
}

impl NotificationSink for RecordingSink {
    fn publish(&self, event_name: &str, event: &SwapEvent) {
        self.published.lock().push((event_name.to_string(), event.clone()));
    }
}
