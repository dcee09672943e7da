//! SlotSwap Coordination Layer
//!
//! Runs slot edits and swap negotiations as atomic store transactions.
//!
//! # Architecture
//!
//! ```text
//! Caller → Coordinator → Store tx (load) → Engine decision → Store tx (write, commit) → Sink
//! ```
//!
//! # Components
//!
//! - **Ports**: Traits for collaborators (notification sink)
//! - **SlotService**: Slot CRUD with overlap and lock checks
//! - **SwapCoordinator**: Swap request/response state machine with cascade
//! - **Stub**: Test sinks
//!
//! # Example
//!
//! ```rust,ignore
//! use slotswap_coordinator::{RecordingSink, RequestSwap, SwapCoordinator};
//! use slotswap_engine::Engine;
//! use slotswap_store::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! let sink = Arc::new(RecordingSink::new());
//! let coordinator = SwapCoordinator::new(store, sink, Engine::default());
//!
//! let details = coordinator
//!     .request_swap(bob, RequestSwap { my_slot_id: call, their_slot_id: gym })
//!     .await?;
//! ```

#![warn(clippy::all)]

pub mod coordinator;
pub mod error;
pub mod ports;
pub mod slots;
pub mod stub;
mod unit_of_work;

// Re-exports for convenience
pub use coordinator::{
    RequestSwap, RespondToSwap, SwapCoordinator, SwapDetails, SwapRequestLists, SwapResolution,
};
pub use error::{CoordinatorError, CoordinatorResult};
pub use ports::NotificationSink;
pub use slots::{CreateSlot, SlotService};
pub use stub::{NullSink, RecordingSink};
