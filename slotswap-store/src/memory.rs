//! In-memory store implementation
//!
//! Used for testing and development without a database.
//!
//! Transactions use optimistic concurrency control. Every committed record
//! carries a version; a transaction remembers the version of every record it
//! read (absent = 0) plus the table epoch of every range scan. Writes are
//! buffered in the transaction. Commit takes the write lock, checks that
//! nothing it read has moved, and applies all writes, so the first committer
//! wins and the loser gets [`StoreError::WriteConflict`].

use crate::error::StoreError;
use crate::repository::{SlotRepository, Store, StoreTx, SwapLedger};
use async_trait::async_trait;
use parking_lot::RwLock;
use slotswap_domain::{Slot, SlotId, SlotStatus, SwapId, SwapRequest, TimeRange, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Committed state
// =============================================================================

#[derive(Debug, Clone)]
struct Versioned<T> {
    value: T,
    version: u64,
}

#[derive(Debug, Default)]
struct State {
    slots: HashMap<SlotId, Versioned<Slot>>,
    swaps: HashMap<SwapId, Versioned<SwapRequest>>,
    /// Bumped when the set of occupied time ranges changes
    slot_epoch: u64,
    /// Bumped on every swap request write
    swap_epoch: u64,
    next_version: u64,
}

impl State {
    fn slot_version(&self, id: &SlotId) -> u64 {
        self.slots.get(id).map(|v| v.version).unwrap_or(0)
    }

    fn swap_version(&self, id: &SwapId) -> u64 {
        self.swaps.get(id).map(|v| v.version).unwrap_or(0)
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }
}

fn sort_by_start(slots: &mut [Slot]) {
    slots.sort_by(|a, b| {
        a.time_range
            .start()
            .cmp(&b.time_range.start())
            .then_with(|| a.id.cmp(&b.id))
    });
}

fn sort_newest_first(swaps: &mut [SwapRequest]) {
    swaps.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}

// =============================================================================
// MemoryStore
// =============================================================================

/// In-memory store for testing and development
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of slots
    pub fn slot_count(&self) -> usize {
        self.state.read().slots.len()
    }

    /// Get the number of swap requests (any status)
    pub fn swap_count(&self) -> usize {
        self.state.read().swaps.len()
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        let mut state = self.state.write();
        state.slots.clear();
        state.swaps.clear();
        state.slot_epoch += 1;
        state.swap_epoch += 1;
    }

    fn collect_slots(&self, filter: impl Fn(&Slot) -> bool) -> Vec<Slot> {
        let state = self.state.read();
        let mut slots: Vec<Slot> =
            state.slots.values().map(|v| &v.value).filter(|s| filter(s)).cloned().collect();
        sort_by_start(&mut slots);
        slots
    }

    fn collect_swaps(&self, filter: impl Fn(&SwapRequest) -> bool) -> Vec<SwapRequest> {
        let state = self.state.read();
        let mut swaps: Vec<SwapRequest> =
            state.swaps.values().map(|v| &v.value).filter(|r| filter(r)).cloned().collect();
        sort_newest_first(&mut swaps);
        swaps
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn slots(&self) -> &dyn SlotRepository {
        self
    }

    fn swaps(&self) -> &dyn SwapLedger {
        self
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        Ok(Box::new(MemoryTx::new(Arc::clone(&self.state))))
    }
}

// =============================================================================
// Slot Repository Implementation
// =============================================================================

#[async_trait]
impl SlotRepository for MemoryStore {
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        Ok(self.state.read().slots.get(&id).map(|v| v.value.clone()))
    }

    async fn list_owned_by(&self, user: UserId) -> Result<Vec<Slot>, StoreError> {
        Ok(self.collect_slots(|s| s.owner == user))
    }

    async fn list_not_owned_by(&self, user: UserId) -> Result<Vec<Slot>, StoreError> {
        Ok(self.collect_slots(|s| s.owner != user))
    }

    async fn list_swappable(&self, viewer: UserId) -> Result<Vec<Slot>, StoreError> {
        Ok(self.collect_slots(|s| s.owner != viewer && s.status == SlotStatus::Swappable))
    }
}

// =============================================================================
// Swap Ledger Implementation
// =============================================================================

#[async_trait]
impl SwapLedger for MemoryStore {
    async fn find_by_id(&self, id: SwapId) -> Result<Option<SwapRequest>, StoreError> {
        Ok(self.state.read().swaps.get(&id).map(|v| v.value.clone()))
    }

    async fn list_incoming(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        Ok(self.collect_swaps(|r| r.responder == user && r.is_pending()))
    }

    async fn list_outgoing(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        Ok(self.collect_swaps(|r| r.requester == user && r.is_pending()))
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        Ok(self.collect_swaps(|r| r.involves(user)))
    }

    async fn find_conflicting_pending(
        &self,
        slot_id: SlotId,
        exclude: SwapId,
    ) -> Result<Vec<SwapRequest>, StoreError> {
        Ok(self.collect_swaps(|r| r.id != exclude && r.is_pending() && r.touches(slot_id)))
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// Buffered slot write; `None` deletes
type SlotWrite = Option<Slot>;

struct MemoryTx {
    state: Arc<RwLock<State>>,
    slot_reads: HashMap<SlotId, u64>,
    swap_reads: HashMap<SwapId, u64>,
    slot_epoch: Option<u64>,
    swap_epoch: Option<u64>,
    slot_writes: HashMap<SlotId, SlotWrite>,
    swap_writes: HashMap<SwapId, SwapRequest>,
}

impl MemoryTx {
    fn new(state: Arc<RwLock<State>>) -> Self {
        Self {
            state,
            slot_reads: HashMap::new(),
            swap_reads: HashMap::new(),
            slot_epoch: None,
            swap_epoch: None,
            slot_writes: HashMap::new(),
            swap_writes: HashMap::new(),
        }
    }

    /// Current view of a slot: own writes first, then committed state.
    /// Records the committed version the first time the key is seen.
    fn read_slot(&mut self, id: SlotId) -> Option<Slot> {
        let state = self.state.read();
        self.slot_reads.entry(id).or_insert_with(|| state.slot_version(&id));
        match self.slot_writes.get(&id) {
            Some(write) => write.clone(),
            None => state.slots.get(&id).map(|v| v.value.clone()),
        }
    }

    fn read_swap(&mut self, id: SwapId) -> Option<SwapRequest> {
        let state = self.state.read();
        self.swap_reads.entry(id).or_insert_with(|| state.swap_version(&id));
        match self.swap_writes.get(&id) {
            Some(write) => Some(write.clone()),
            None => state.swaps.get(&id).map(|v| v.value.clone()),
        }
    }

    /// Every slot as this transaction sees it
    fn visible_slots(&mut self) -> Vec<Slot> {
        let state = self.state.read();
        self.slot_epoch.get_or_insert(state.slot_epoch);

        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|v| !self.slot_writes.contains_key(&v.value.id))
            .map(|v| v.value.clone())
            .collect();
        slots.extend(self.slot_writes.values().flatten().cloned());
        sort_by_start(&mut slots);
        slots
    }

    fn visible_swaps(&mut self) -> Vec<SwapRequest> {
        let state = self.state.read();
        self.swap_epoch.get_or_insert(state.swap_epoch);

        let mut swaps: Vec<SwapRequest> = state
            .swaps
            .values()
            .filter(|v| !self.swap_writes.contains_key(&v.value.id))
            .map(|v| v.value.clone())
            .collect();
        swaps.extend(self.swap_writes.values().cloned());
        swaps.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        swaps
    }

    fn validate(&self, state: &State) -> Result<(), StoreError> {
        for (id, seen) in &self.slot_reads {
            if state.slot_version(id) != *seen {
                return Err(StoreError::WriteConflict(format!("slot {} changed", id)));
            }
        }
        for (id, seen) in &self.swap_reads {
            if state.swap_version(id) != *seen {
                return Err(StoreError::WriteConflict(format!("swap request {} changed", id)));
            }
        }
        if self.slot_epoch.is_some_and(|seen| seen != state.slot_epoch) {
            return Err(StoreError::WriteConflict("slot time ranges changed".to_string()));
        }
        if self.swap_epoch.is_some_and(|seen| seen != state.swap_epoch) {
            return Err(StoreError::WriteConflict("pending swap requests changed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn load_slot(&mut self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        Ok(self.read_slot(id))
    }

    async fn find_overlapping(
        &mut self,
        range: &TimeRange,
        exclude: Option<SlotId>,
    ) -> Result<Option<Slot>, StoreError> {
        Ok(self
            .visible_slots()
            .into_iter()
            .find(|s| Some(s.id) != exclude && s.time_range.overlaps(range)))
    }

    async fn load_swap(&mut self, id: SwapId) -> Result<Option<SwapRequest>, StoreError> {
        Ok(self.read_swap(id))
    }

    async fn find_conflicting_pending(
        &mut self,
        slot_id: SlotId,
        exclude: SwapId,
    ) -> Result<Vec<SwapRequest>, StoreError> {
        Ok(self
            .visible_swaps()
            .into_iter()
            .filter(|r| r.id != exclude && r.is_pending() && r.touches(slot_id))
            .collect())
    }

    async fn insert_slot(&mut self, slot: &Slot) -> Result<(), StoreError> {
        if self.read_slot(slot.id).is_some() {
            return Err(StoreError::duplicate("slot", slot.id.to_string()));
        }
        self.slot_writes.insert(slot.id, Some(slot.clone()));
        Ok(())
    }

    async fn update_slot(&mut self, slot: &Slot) -> Result<(), StoreError> {
        if self.read_slot(slot.id).is_none() {
            return Err(StoreError::not_found("slot", slot.id.to_string()));
        }
        self.slot_writes.insert(slot.id, Some(slot.clone()));
        Ok(())
    }

    async fn delete_slot(&mut self, id: SlotId) -> Result<(), StoreError> {
        if self.read_slot(id).is_none() {
            return Err(StoreError::not_found("slot", id.to_string()));
        }
        self.slot_writes.insert(id, None);
        Ok(())
    }

    async fn create_pending(&mut self, request: &SwapRequest) -> Result<(), StoreError> {
        if !request.is_pending() {
            return Err(StoreError::invalid_state(format!(
                "new swap request {} must be PENDING, got {}",
                request.id, request.status
            )));
        }
        if self.read_swap(request.id).is_some() {
            return Err(StoreError::duplicate("swap_request", request.id.to_string()));
        }
        self.swap_writes.insert(request.id, request.clone());
        Ok(())
    }

    async fn resolve(&mut self, request: &SwapRequest) -> Result<(), StoreError> {
        if !request.status.is_terminal() {
            return Err(StoreError::invalid_state(format!(
                "swap request {} cannot be resolved as {}",
                request.id, request.status
            )));
        }
        match self.read_swap(request.id) {
            None => Err(StoreError::not_found("swap_request", request.id.to_string())),
            Some(current) if current.status.is_terminal() => Err(StoreError::invalid_state(
                format!("swap request {} is already {}", request.id, current.status),
            )),
            Some(_) => {
                self.swap_writes.insert(request.id, request.clone());
                Ok(())
            },
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let tx = *self;
        let mut state = tx.state.write();
        tx.validate(&state)?;

        let mut ranges_changed = false;
        for (id, write) in tx.slot_writes {
            let previous = state.slots.get(&id).map(|v| v.value.time_range);
            match write {
                Some(slot) => {
                    ranges_changed |= previous != Some(slot.time_range);
                    let version = state.bump_version();
                    state.slots.insert(id, Versioned { value: slot, version });
                },
                None => {
                    ranges_changed |= previous.is_some();
                    state.slots.remove(&id);
                },
            }
        }
        if ranges_changed {
            state.slot_epoch += 1;
        }

        if !tx.swap_writes.is_empty() {
            for (id, request) in tx.swap_writes {
                let version = state.bump_version();
                state.swaps.insert(id, Versioned { value: request, version });
            }
            state.swap_epoch += 1;
        }

        debug!(version = state.next_version, "Memory transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
