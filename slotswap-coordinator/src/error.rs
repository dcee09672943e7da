//! Coordinator error types.
//!
//! Every failure a caller can see falls into one of six kinds. Lower layers
//! (`DomainError`, `EngineError`, `StoreError`) are folded into these kinds
//! here so the application layer only has one enum to map.

use chrono::{DateTime, Utc};
use thiserror::Error;

use slotswap_domain::{DomainError, Slot};
use slotswap_engine::EngineError;
use slotswap_store::StoreError;

/// Errors returned by coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Malformed input or a forbidden combination of fields
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced slot or swap request does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record (slot, swap_request)
        entity: String,
        /// Requested identifier
        id: String,
    },

    /// Actor is not allowed to perform the operation
    #[error("Not authorized: {0}")]
    Authorization(String),

    /// Requested time range overlaps an existing slot
    #[error(
        "Time range overlaps slot {} ({}); next available at {}",
        .existing.id,
        .existing.time_range,
        .next_available.to_rfc3339()
    )]
    Conflict {
        /// The slot already occupying the range
        existing: Box<Slot>,
        /// Earliest instant after the conflicting slot
        next_available: DateTime<Utc>,
    },

    /// Operation not valid in the current state
    #[error("Invalid state: {message}")]
    State {
        /// What was wrong
        message: String,
        /// Set when the transaction lost a write conflict and the whole
        /// operation may be retried
        retryable: bool,
    },

    /// Storage infrastructure failure
    #[error("Storage error: {0}")]
    Storage(StoreError),
}

impl CoordinatorError {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound { entity: entity.into(), id: id.to_string() }
    }

    /// Create a non-retryable state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State { message: message.into(), retryable: false }
    }

    /// Create a conflict error for an overlapping slot
    pub fn conflict(existing: Slot) -> Self {
        let next_available = existing.time_range.end();
        Self::Conflict { existing: Box::new(existing), next_available }
    }

    /// Check if the caller may retry the whole operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoordinatorError::State { retryable: true, .. })
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::Validation(_) => "validation",
            CoordinatorError::NotFound { .. } => "not_found",
            CoordinatorError::Authorization(_) => "authorization",
            CoordinatorError::Conflict { .. } => "conflict",
            CoordinatorError::State { .. } => "state",
            CoordinatorError::Storage(_) => "storage",
        }
    }
}

impl From<DomainError> for CoordinatorError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidTitle(_)
            | DomainError::InvalidTimeRange(_)
            | DomainError::InvalidStatus(_) => CoordinatorError::Validation(err.to_string()),
            DomainError::InvalidSlotTransition { .. } | DomainError::SwapAlreadyResolved(_) => {
                CoordinatorError::state(err.to_string())
            },
        }
    }
}

impl From<EngineError> for CoordinatorError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotSlotOwner { .. } | EngineError::NotResponder { .. } => {
                CoordinatorError::Authorization(err.to_string())
            },
            EngineError::SelfSwap { .. } | EngineError::ReservedStatus => {
                CoordinatorError::Validation(err.to_string())
            },
            EngineError::SlotNotSwappable { .. }
            | EngineError::SlotNotLocked { .. }
            | EngineError::SlotMissing(_)
            | EngineError::OwnershipChanged { .. }
            | EngineError::SwapAlreadyResolved { .. }
            | EngineError::SlotLocked(_)
            | EngineError::SlotReferenced { .. } => CoordinatorError::state(err.to_string()),
            EngineError::Domain(domain) => domain.into(),
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WriteConflict(_) => CoordinatorError::State {
                message: format!("{}; retry the operation", err),
                retryable: true,
            },
            StoreError::NotFound { entity_type, id } => {
                CoordinatorError::NotFound { entity: entity_type, id }
            },
            StoreError::InvalidState { message } => CoordinatorError::state(message),
            StoreError::Domain(domain) => domain.into(),
            other => CoordinatorError::Storage(other),
        }
    }
}

/// Result type for coordinator operations.
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
