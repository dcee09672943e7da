//! Repository trait definitions (Ports)
//!
//! These traits define the storage interface for the domain.
//! Implementations can be PostgreSQL, in-memory, or mock for testing.
//!
//! Read-only listings go through [`SlotRepository`] and [`SwapLedger`].
//! Every mutation goes through a [`StoreTx`] so that the checks and the
//! writes they justify commit together or not at all.

use crate::error::StoreError;
use async_trait::async_trait;
use slotswap_domain::{Slot, SlotId, SwapId, SwapRequest, TimeRange, UserId};

/// Read access to slots
#[async_trait]
pub trait SlotRepository: Send + Sync {
    /// Find a slot by ID
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError>;

    /// Slots owned by `user`, start ascending
    async fn list_owned_by(&self, user: UserId) -> Result<Vec<Slot>, StoreError>;

    /// Slots owned by anyone but `user`, start ascending
    async fn list_not_owned_by(&self, user: UserId) -> Result<Vec<Slot>, StoreError>;

    /// SWAPPABLE slots owned by anyone but `viewer`, start ascending
    async fn list_swappable(&self, viewer: UserId) -> Result<Vec<Slot>, StoreError>;
}

/// Read access to swap requests
#[async_trait]
pub trait SwapLedger: Send + Sync {
    /// Find a request by ID
    async fn find_by_id(&self, id: SwapId) -> Result<Option<SwapRequest>, StoreError>;

    /// PENDING requests where `user` is the responder, newest first
    async fn list_incoming(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError>;

    /// PENDING requests where `user` is the requester, newest first
    async fn list_outgoing(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError>;

    /// Every request (any status) involving `user`, newest first
    async fn list_for_user(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError>;

    /// PENDING requests other than `exclude` that reference `slot_id` on either side
    async fn find_conflicting_pending(
        &self,
        slot_id: SlotId,
        exclude: SwapId,
    ) -> Result<Vec<SwapRequest>, StoreError>;
}

/// A unit of work over slots and swap requests.
///
/// Reads observe the transaction's own uncommitted writes. Nothing is visible
/// to other callers until [`StoreTx::commit`] succeeds. Dropping the
/// transaction without committing discards every write.
#[async_trait]
pub trait StoreTx: Send {
    /// Load a slot, registering it in the transaction's read set
    async fn load_slot(&mut self, id: SlotId) -> Result<Option<Slot>, StoreError>;

    /// First slot (start ascending) whose range overlaps `range`, ignoring `exclude`
    async fn find_overlapping(
        &mut self,
        range: &TimeRange,
        exclude: Option<SlotId>,
    ) -> Result<Option<Slot>, StoreError>;

    /// Load a swap request, registering it in the transaction's read set
    async fn load_swap(&mut self, id: SwapId) -> Result<Option<SwapRequest>, StoreError>;

    /// PENDING requests other than `exclude` that reference `slot_id`
    async fn find_conflicting_pending(
        &mut self,
        slot_id: SlotId,
        exclude: SwapId,
    ) -> Result<Vec<SwapRequest>, StoreError>;

    /// Insert a new slot
    async fn insert_slot(&mut self, slot: &Slot) -> Result<(), StoreError>;

    /// Overwrite an existing slot
    async fn update_slot(&mut self, slot: &Slot) -> Result<(), StoreError>;

    /// Remove a slot
    async fn delete_slot(&mut self, id: SlotId) -> Result<(), StoreError>;

    /// Insert a PENDING swap request
    async fn create_pending(&mut self, request: &SwapRequest) -> Result<(), StoreError>;

    /// Persist a terminal (ACCEPTED/REJECTED) swap request; resolved records are kept
    async fn resolve(&mut self, request: &SwapRequest) -> Result<(), StoreError>;

    /// Make every write visible atomically.
    ///
    /// # Errors
    /// `StoreError::WriteConflict` if data read by this transaction was
    /// changed by a transaction that committed first.
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard every write
    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Combined store interface
#[async_trait]
pub trait Store: Send + Sync {
    /// Get slot repository
    fn slots(&self) -> &dyn SlotRepository;

    /// Get swap ledger
    fn swaps(&self) -> &dyn SwapLedger;

    /// Begin a transaction
    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError>;
}
