//! Coordinator port definitions.
//!
//! Ports define the interfaces for collaborators outside the coordinator.
//! Adapters implement them for specific transports (broadcast bus, stub, etc.).

use slotswap_domain::SwapEvent;

// =============================================================================
// Notification Port
// =============================================================================

/// Port for announcing committed swap changes.
///
/// Called only after the transaction that produced `event` has committed.
/// Delivery is best effort: implementations must not block and must not
/// report failure back into the operation that already succeeded.
///
/// Implementations:
/// - `NullSink` - Drops everything
/// - `RecordingSink` - Keeps events in memory for assertions
/// - `EventBus` (slotswapd) - Broadcast channel feeding SSE clients
pub trait NotificationSink: Send + Sync {
    /// Publish `event` under `event_name` (always `swapUpdated` today).
    fn publish(&self, event_name: &str, event: &SwapEvent);
}
