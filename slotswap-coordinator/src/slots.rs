//! Slot service: create, edit and delete slots.
//!
//! Every mutation runs the overlap or lock check and the write in one store
//! transaction. The SWAP_PENDING lock itself is never touched here; only
//! [`crate::SwapCoordinator`] sets or clears it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use slotswap_domain::{Slot, SlotId, SlotPatch, SwapId, TimeRange, Title, UserId};
use slotswap_engine::Engine;
use slotswap_store::{Store, StoreTx};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::unit_of_work::finish;

/// Input for [`SlotService::create_slot`].
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSlot {
    pub title: String,
    #[serde(alias = "startTime")]
    pub start_time: DateTime<Utc>,
    #[serde(alias = "endTime")]
    pub end_time: DateTime<Utc>,
}

/// Slot CRUD on top of a transactional store.
pub struct SlotService<S: Store> {
    store: Arc<S>,
    engine: Engine,
}

impl<S: Store> SlotService<S> {
    /// Create a new slot service.
    pub fn new(store: Arc<S>, engine: Engine) -> Self {
        Self { store, engine }
    }

    /// Create a BUSY slot for `owner`.
    ///
    /// # Errors
    /// - `Validation` for a blank title or `start >= end`
    /// - `Conflict` if any slot, whoever owns it, overlaps the range
    pub async fn create_slot(&self, owner: UserId, input: CreateSlot) -> CoordinatorResult<Slot> {
        let title = Title::new(input.title)?;
        let range = TimeRange::new(input.start_time, input.end_time)?;
        let slot = Slot::new(owner, title, range);

        let mut tx = self.store.begin().await?;
        let result = insert_without_overlap(tx.as_mut(), &slot).await;
        finish(tx, result).await?;

        info!(slot_id = %slot.id, %owner, range = %slot.time_range, "Slot created");
        Ok(slot)
    }

    /// Slots owned by `user`, start ascending.
    pub async fn list_owned_by(&self, user: UserId) -> CoordinatorResult<Vec<Slot>> {
        Ok(self.store.slots().list_owned_by(user).await?)
    }

    /// Slots owned by anyone else, start ascending.
    pub async fn list_not_owned_by(&self, user: UserId) -> CoordinatorResult<Vec<Slot>> {
        Ok(self.store.slots().list_not_owned_by(user).await?)
    }

    /// Apply an owner's edit.
    ///
    /// # Errors
    /// - `NotFound` if the slot does not exist
    /// - `Authorization` unless `actor` owns it
    /// - `Validation` for a bad title or range, or a `SWAP_PENDING` status
    /// - `State` while the slot is locked by a swap
    /// - `Conflict` if the new range overlaps another slot
    pub async fn update_slot(
        &self,
        actor: UserId,
        slot_id: SlotId,
        patch: SlotPatch,
    ) -> CoordinatorResult<Slot> {
        let mut tx = self.store.begin().await?;
        let result = self.apply_patch(tx.as_mut(), actor, slot_id, &patch).await;
        let updated = finish(tx, result).await?;

        info!(%slot_id, %actor, status = %updated.status, "Slot updated");
        Ok(updated)
    }

    /// Delete a slot.
    ///
    /// # Errors
    /// - `NotFound` if the slot does not exist
    /// - `Authorization` unless `actor` owns it
    /// - `State` while the slot is locked by a swap or named by a pending
    ///   request
    pub async fn delete_slot(&self, actor: UserId, slot_id: SlotId) -> CoordinatorResult<()> {
        let mut tx = self.store.begin().await?;
        let result = self.remove(tx.as_mut(), actor, slot_id).await;
        finish(tx, result).await?;

        info!(%slot_id, %actor, "Slot deleted");
        Ok(())
    }

    async fn apply_patch(
        &self,
        tx: &mut dyn StoreTx,
        actor: UserId,
        slot_id: SlotId,
        patch: &SlotPatch,
    ) -> CoordinatorResult<Slot> {
        let current = tx
            .load_slot(slot_id)
            .await?
            .ok_or_else(|| CoordinatorError::not_found("slot", slot_id))?;

        let updated = self.engine.decide_slot_update(actor, &current, patch, Utc::now())?;

        if updated.time_range != current.time_range {
            if let Some(existing) = tx.find_overlapping(&updated.time_range, Some(slot_id)).await? {
                return Err(CoordinatorError::conflict(existing));
            }
        }

        tx.update_slot(&updated).await?;
        Ok(updated)
    }

    async fn remove(
        &self,
        tx: &mut dyn StoreTx,
        actor: UserId,
        slot_id: SlotId,
    ) -> CoordinatorResult<()> {
        let current = tx
            .load_slot(slot_id)
            .await?
            .ok_or_else(|| CoordinatorError::not_found("slot", slot_id))?;

        // Read in the same transaction so a request created concurrently
        // conflicts at commit instead of pointing at a deleted slot.
        let pending = tx.find_conflicting_pending(slot_id, SwapId::nil()).await?;
        self.engine.check_delete(actor, &current, &pending)?;
        tx.delete_slot(slot_id).await?;
        Ok(())
    }
}

async fn insert_without_overlap(tx: &mut dyn StoreTx, slot: &Slot) -> CoordinatorResult<()> {
    if let Some(existing) = tx.find_overlapping(&slot.time_range, None).await? {
        return Err(CoordinatorError::conflict(existing));
    }
    tx.insert_slot(slot).await?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
