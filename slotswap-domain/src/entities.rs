//! Domain Entities for SlotSwap
//!
//! Core business entities with lifecycle management.
//! All entities have identity and state transitions.

use crate::value_objects::{DomainError, TimeRange, Title};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// Identifiers
// =============================================================================

/// Unique identifier for a Slot
pub type SlotId = Uuid;

/// Unique identifier for a SwapRequest
pub type SwapId = Uuid;

/// Stable user identifier supplied by the identity collaborator
pub type UserId = Uuid;

// =============================================================================
// Slot Status
// =============================================================================

/// Status of a slot
///
/// ```text
/// BUSY ⇄ SWAPPABLE → SWAP_PENDING → SWAPPABLE (rejected / invalidated)
///                                 → BUSY      (accepted, owner transferred)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// Not offered for trade
    Busy,
    /// Offered for trade
    Swappable,
    /// Locked by an in-flight swap negotiation
    SwapPending,
}

impl SlotStatus {
    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Busy => "BUSY",
            SlotStatus::Swappable => "SWAPPABLE",
            SlotStatus::SwapPending => "SWAP_PENDING",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUSY" => Ok(SlotStatus::Busy),
            "SWAPPABLE" => Ok(SlotStatus::Swappable),
            "SWAP_PENDING" => Ok(SlotStatus::SwapPending),
            other => Err(DomainError::InvalidStatus(format!("Unknown slot status: {}", other))),
        }
    }
}

// =============================================================================
// Slot
// =============================================================================

/// A time-bounded calendar resource owned by exactly one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: SlotId,
    pub title: Title,
    pub time_range: TimeRange,
    pub owner: UserId,
    pub status: SlotStatus,

    // Audit
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Create a new BUSY slot for `owner`
    pub fn new(owner: UserId, title: Title, time_range: TimeRange) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            title,
            time_range,
            owner,
            status: SlotStatus::Busy,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if `user` owns this slot
    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owner == user
    }

    /// Check if the slot is locked by a swap negotiation
    pub fn is_locked(&self) -> bool {
        self.status == SlotStatus::SwapPending
    }

    /// Lock the slot for a swap negotiation (SWAPPABLE → SWAP_PENDING)
    pub fn lock_for_swap(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.expect_status(SlotStatus::Swappable)?;
        self.status = SlotStatus::SwapPending;
        self.updated_at = at;
        Ok(())
    }

    /// Release the swap lock (SWAP_PENDING → SWAPPABLE)
    pub fn release(&mut self, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.expect_status(SlotStatus::SwapPending)?;
        self.status = SlotStatus::Swappable;
        self.updated_at = at;
        Ok(())
    }

    /// Hand the slot to its new owner (SWAP_PENDING → BUSY)
    ///
    /// Only the accepted side of a negotiation goes through here; a slot that
    /// was targeted without being locked is transferred with
    /// [`Slot::transfer_unlocked`].
    pub fn transfer_to(&mut self, new_owner: UserId, at: DateTime<Utc>) -> Result<(), DomainError> {
        self.expect_status(SlotStatus::SwapPending)?;
        self.transfer_unlocked(new_owner, at);
        Ok(())
    }

    /// Hand the slot to its new owner regardless of status, ending as BUSY
    pub fn transfer_unlocked(&mut self, new_owner: UserId, at: DateTime<Utc>) {
        self.owner = new_owner;
        self.status = SlotStatus::Busy;
        self.updated_at = at;
    }

    fn expect_status(&self, expected: SlotStatus) -> Result<(), DomainError> {
        if self.status != expected {
            return Err(DomainError::InvalidSlotTransition {
                slot_id: self.id,
                expected,
                actual: self.status,
            });
        }
        Ok(())
    }
}

/// Owner-editable fields of a slot
///
/// `None` leaves the field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotPatch {
    /// New title
    #[serde(default)]
    pub title: Option<Title>,
    /// New start, paired with the current end if `end_time` is absent
    #[serde(default, alias = "startTime")]
    pub start_time: Option<DateTime<Utc>>,
    /// New end
    #[serde(default, alias = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    /// BUSY or SWAPPABLE
    #[serde(default)]
    pub status: Option<SlotStatus>,
}

impl SlotPatch {
    /// Check if the patch changes nothing
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
            && self.status.is_none()
    }

    /// Check if the patch moves the slot in time
    pub fn changes_time(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

// =============================================================================
// Swap Request
// =============================================================================

/// Status of a swap request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapStatus {
    /// Waiting for the responder
    Pending,
    /// Ownership exchanged (terminal)
    Accepted,
    /// Declined or invalidated (terminal)
    Rejected,
}

impl SwapStatus {
    /// Wire/storage representation
    pub fn as_str(&self) -> &'static str {
        match self {
            SwapStatus::Pending => "PENDING",
            SwapStatus::Accepted => "ACCEPTED",
            SwapStatus::Rejected => "REJECTED",
        }
    }

    /// Check if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SwapStatus::Pending)
    }
}

impl fmt::Display for SwapStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SwapStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(SwapStatus::Pending),
            "ACCEPTED" => Ok(SwapStatus::Accepted),
            "REJECTED" => Ok(SwapStatus::Rejected),
            other => Err(DomainError::InvalidStatus(format!("Unknown swap status: {}", other))),
        }
    }
}

/// Outcome chosen by the responder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SwapOutcome {
    /// Exchange ownership
    Accepted,
    /// Decline and release
    Rejected,
}

impl SwapOutcome {
    /// Map the responder's boolean answer
    pub fn from_accept(accept: bool) -> Self {
        if accept {
            SwapOutcome::Accepted
        } else {
            SwapOutcome::Rejected
        }
    }
}

impl From<SwapOutcome> for SwapStatus {
    fn from(outcome: SwapOutcome) -> Self {
        match outcome {
            SwapOutcome::Accepted => SwapStatus::Accepted,
            SwapOutcome::Rejected => SwapStatus::Rejected,
        }
    }
}

/// A proposed exchange of ownership between two slots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub id: SwapId,
    /// Slot offered by the requester
    pub my_slot: SlotId,
    /// Slot the requester wants
    pub their_slot: SlotId,
    pub requester: UserId,
    pub responder: UserId,
    pub status: SwapStatus,
    /// Whether creating the request also locked `their_slot`
    pub their_slot_locked: bool,

    // Audit
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl SwapRequest {
    /// Create a PENDING request; requester and responder are taken from the
    /// current slot owners.
    pub fn pending(
        my_slot: &Slot,
        their_slot: &Slot,
        their_slot_locked: bool,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            my_slot: my_slot.id,
            their_slot: their_slot.id,
            requester: my_slot.owner,
            responder: their_slot.owner,
            status: SwapStatus::Pending,
            their_slot_locked,
            created_at: at,
            resolved_at: None,
        }
    }

    /// Check if the request is still waiting for a response
    pub fn is_pending(&self) -> bool {
        self.status == SwapStatus::Pending
    }

    /// Check if the request references `slot_id` on either side
    pub fn touches(&self, slot_id: SlotId) -> bool {
        self.my_slot == slot_id || self.their_slot == slot_id
    }

    /// Check if `user` is one of the two parties
    pub fn involves(&self, user: UserId) -> bool {
        self.requester == user || self.responder == user
    }

    /// Slots this request holds a SWAP_PENDING lock on
    pub fn locked_slots(&self) -> Vec<SlotId> {
        if self.their_slot_locked {
            vec![self.my_slot, self.their_slot]
        } else {
            vec![self.my_slot]
        }
    }

    /// Move to a terminal status
    ///
    /// # Errors
    /// Returns `DomainError::SwapAlreadyResolved` unless PENDING
    pub fn resolve(&mut self, outcome: SwapOutcome, at: DateTime<Utc>) -> Result<(), DomainError> {
        if !self.is_pending() {
            return Err(DomainError::SwapAlreadyResolved(self.id));
        }
        self.status = outcome.into();
        self.resolved_at = Some(at);
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
