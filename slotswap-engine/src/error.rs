//! Engine error types.

use slotswap_domain::{DomainError, SlotId, SlotStatus, SwapId, SwapStatus, UserId};
use thiserror::Error;

/// Reasons the engine refuses a transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// Actor does not own the slot
    #[error("User {actor} does not own slot {slot_id}")]
    NotSlotOwner { slot_id: SlotId, actor: UserId },

    /// Actor is not the responder of the request
    #[error("User {actor} is not the responder of swap request {swap_id}")]
    NotResponder { swap_id: SwapId, actor: UserId },

    /// Requester targeted a slot they already own
    #[error("Cannot swap with your own slot {slot_id}")]
    SelfSwap { slot_id: SlotId },

    /// Slot must be SWAPPABLE to enter a negotiation
    #[error("Slot {slot_id} must be SWAPPABLE, got {status}")]
    SlotNotSwappable { slot_id: SlotId, status: SlotStatus },

    /// Slot lost its SWAP_PENDING lock before the response
    #[error("Slot {slot_id} is no longer locked for this swap (status {status})")]
    SlotNotLocked { slot_id: SlotId, status: SlotStatus },

    /// Slot referenced by the request was removed
    #[error("Slot {0} no longer exists")]
    SlotMissing(SlotId),

    /// Slot owner differs from the party recorded on the request
    #[error("Slot {slot_id} changed owner since the request was made")]
    OwnershipChanged { slot_id: SlotId },

    /// Request is already terminal
    #[error("Swap request {swap_id} is already {status}")]
    SwapAlreadyResolved { swap_id: SwapId, status: SwapStatus },

    /// Slot is under negotiation and cannot be edited or deleted
    #[error("Slot {0} is locked by a pending swap")]
    SlotLocked(SlotId),

    /// Slot is named by a pending request and cannot be deleted yet
    #[error("Slot {slot_id} is referenced by pending swap request {swap_id}")]
    SlotReferenced { slot_id: SlotId, swap_id: SwapId },

    /// Clients may not write SWAP_PENDING directly
    #[error("Status SWAP_PENDING can only be set by a swap request")]
    ReservedStatus,

    /// Domain validation failure
    #[error(transparent)]
    Domain(#[from] DomainError),
}

/// Result type for engine decisions.
pub type EngineResult<T> = Result<T, EngineError>;
