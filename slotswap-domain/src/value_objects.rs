//! Value Objects for the SlotSwap Domain
//!
//! Immutable, validated domain primitives.
//! All value objects enforce invariants at construction time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::entities::{SlotId, SlotStatus, SwapId};

/// Domain errors for value object validation and entity transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Title must be non-empty and bounded
    #[error("Invalid title: {0}")]
    InvalidTitle(String),

    /// Start must be strictly before end
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    /// Unknown status string (parsing from storage or requests)
    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    /// Slot is not in the status required for the transition
    #[error("Slot {slot_id} is {actual}, expected {expected}")]
    InvalidSlotTransition {
        /// Slot being transitioned
        slot_id: SlotId,
        /// Status the transition requires
        expected: SlotStatus,
        /// Status the slot is actually in
        actual: SlotStatus,
    },

    /// Swap request already reached a terminal status
    #[error("Swap request {0} is already resolved")]
    SwapAlreadyResolved(SwapId),
}

// =============================================================================
// Title
// =============================================================================

/// Title of a slot
///
/// # Invariants
/// - Non-empty after trimming surrounding whitespace
/// - At most [`Title::MAX_LEN`] characters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Title(String);

impl Title {
    /// Maximum number of characters in a title
    pub const MAX_LEN: usize = 200;

    /// Create a new Title with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTitle` if blank or too long
    pub fn new(value: impl Into<String>) -> Result<Self, DomainError> {
        let value = value.into();
        let trimmed = value.trim();

        if trimmed.is_empty() {
            return Err(DomainError::InvalidTitle("Title must not be empty".to_string()));
        }
        if trimmed.chars().count() > Self::MAX_LEN {
            return Err(DomainError::InvalidTitle(format!(
                "Title must be at most {} characters",
                Self::MAX_LEN
            )));
        }

        Ok(Self(trimmed.to_string()))
    }

    /// Get the title as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Title {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Title> for String {
    fn from(title: Title) -> Self {
        title.0
    }
}

impl fmt::Display for Title {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// TimeRange
// =============================================================================

/// Half-open time interval `[start, end)`
///
/// # Invariants
/// - `start < end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawTimeRange")]
pub struct TimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawTimeRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<RawTimeRange> for TimeRange {
    type Error = DomainError;

    fn try_from(raw: RawTimeRange) -> Result<Self, Self::Error> {
        Self::new(raw.start, raw.end)
    }
}

impl TimeRange {
    /// Create a new TimeRange with validation
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTimeRange` if `start >= end`
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DomainError> {
        if start >= end {
            return Err(DomainError::InvalidTimeRange(format!(
                "start ({}) must be before end ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    /// Inclusive start instant
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end instant
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Check whether two ranges overlap.
    ///
    /// `self.start < other.end && self.end > other.start`. Ranges that only
    /// touch (one ends exactly when the other starts) do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Replace one or both bounds, re-validating the result
    pub fn with_bounds(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Self, DomainError> {
        Self::new(start.unwrap_or(self.start), end.unwrap_or(self.end))
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

// =============================================================================
// Tests
// =============================================================================
