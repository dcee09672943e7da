//! SlotSwap Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains entities, value objects, events, and domain rules.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod events;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{
    Slot, SlotId, SlotPatch, SlotStatus, SwapId, SwapOutcome, SwapRequest, SwapStatus, UserId,
};
pub use events::{SwapEvent, SWAP_UPDATED};
pub use value_objects::{DomainError, TimeRange, Title};
