//! SlotSwap Engine Layer
//!
//! Pure decision logic, deterministic, no I/O.
//! Takes loaded entities → Returns the entities to write and events to publish.

#![warn(clippy::all)]

pub mod engine;
pub mod error;

pub use engine::{CascadeDecision, Engine, RequestDecision, ResponseDecision, SwapPolicy};
pub use error::{EngineError, EngineResult};
