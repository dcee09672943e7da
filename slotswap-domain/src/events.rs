//! Domain Events for SlotSwap
//!
//! Events describe committed swap state changes.
//! They are published to the notification sink after each commit.

use crate::entities::{SlotId, SwapId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel name clients subscribe to for swap updates
pub const SWAP_UPDATED: &str = "swapUpdated";

/// Swap lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwapEvent {
    /// A new PENDING request was created
    SwapRequested {
        /// Request identifier
        swap_id: SwapId,
        /// User offering `my_slot`
        requester: UserId,
        /// Owner of `their_slot`
        responder: UserId,
        /// Offered slot
        my_slot: SlotId,
        /// Wanted slot
        their_slot: SlotId,
        /// When the request was committed
        timestamp: DateTime<Utc>,
    },

    /// The responder accepted; owners were exchanged
    SwapAccepted {
        /// Request identifier
        swap_id: SwapId,
        /// Previous owner of `my_slot`, now owner of `their_slot`
        requester: UserId,
        /// Previous owner of `their_slot`, now owner of `my_slot`
        responder: UserId,
        /// When the acceptance was committed
        timestamp: DateTime<Utc>,
    },

    /// The responder rejected; locked slots were released
    SwapRejected {
        /// Request identifier
        swap_id: SwapId,
        /// User whose offer was declined
        requester: UserId,
        /// User who declined
        responder: UserId,
        /// When the rejection was committed
        timestamp: DateTime<Utc>,
    },

    /// A pending request was rejected because a slot it referenced
    /// changed hands in another swap
    SwapInvalidated {
        /// Invalidated request
        swap_id: SwapId,
        /// Requester of the invalidated request
        requester: UserId,
        /// Responder of the invalidated request
        responder: UserId,
        /// Accepted request that caused the invalidation
        superseded_by: SwapId,
        /// When the invalidation was committed
        timestamp: DateTime<Utc>,
    },
}

impl SwapEvent {
    /// Get the swap this event is about
    pub fn swap_id(&self) -> SwapId {
        match self {
            SwapEvent::SwapRequested { swap_id, .. }
            | SwapEvent::SwapAccepted { swap_id, .. }
            | SwapEvent::SwapRejected { swap_id, .. }
            | SwapEvent::SwapInvalidated { swap_id, .. } => *swap_id,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SwapEvent::SwapRequested { .. } => "swap_requested",
            SwapEvent::SwapAccepted { .. } => "swap_accepted",
            SwapEvent::SwapRejected { .. } => "swap_rejected",
            SwapEvent::SwapInvalidated { .. } => "swap_invalidated",
        }
    }

    /// Users who should care about this event
    pub fn parties(&self) -> [UserId; 2] {
        match self {
            SwapEvent::SwapRequested { requester, responder, .. }
            | SwapEvent::SwapAccepted { requester, responder, .. }
            | SwapEvent::SwapRejected { requester, responder, .. }
            | SwapEvent::SwapInvalidated { requester, responder, .. } => [*requester, *responder],
        }
    }
}
