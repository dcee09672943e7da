//! Swap Coordinator: runs swap negotiations against the store.
//!
//! # Flow
//!
//! ```text
//! begin tx → load slots/request → Engine decides → write slots + ledger → commit → notify
//! ```
//!
//! A failure anywhere before the commit rolls the whole transaction back.
//! Notifications go out only after a successful commit.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use slotswap_domain::{
    Slot, SlotId, SwapEvent, SwapId, SwapOutcome, SwapRequest, UserId, SWAP_UPDATED,
};
use slotswap_engine::{CascadeDecision, Engine, RequestDecision, ResponseDecision};
use slotswap_store::{Store, StoreTx};

use crate::error::{CoordinatorError, CoordinatorResult};
use crate::ports::NotificationSink;
use crate::unit_of_work::finish;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Input for [`SwapCoordinator::request_swap`].
#[derive(Debug, Clone, Deserialize)]
pub struct RequestSwap {
    /// Slot the requester offers
    #[serde(alias = "mySlotId")]
    pub my_slot_id: SlotId,
    /// Slot the requester wants
    #[serde(alias = "theirSlotId")]
    pub their_slot_id: SlotId,
}

/// Input for [`SwapCoordinator::respond_to_swap`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RespondToSwap {
    /// `true` accepts, `false` rejects
    pub accept: bool,
}

/// A swap request together with the slots it references.
///
/// Slots are `None` only in history listings, when a slot has since been deleted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwapDetails {
    pub request: SwapRequest,
    pub my_slot: Option<Slot>,
    pub their_slot: Option<Slot>,
}

/// Pending requests split by the user's role.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SwapRequestLists {
    /// Requests awaiting this user's answer
    pub incoming: Vec<SwapDetails>,
    /// Requests this user made
    pub outgoing: Vec<SwapDetails>,
}

/// Result of a committed response.
#[derive(Debug, Clone, Serialize)]
pub struct SwapResolution {
    #[serde(flatten)]
    pub details: SwapDetails,
    /// Other requests rejected because this swap was accepted
    pub invalidated: Vec<SwapId>,
}

// =============================================================================
// Swap Coordinator
// =============================================================================

/// Orchestrates swap negotiations with an injected store and notification sink.
pub struct SwapCoordinator<S: Store> {
    store: Arc<S>,
    sink: Arc<dyn NotificationSink>,
    engine: Engine,
}

impl<S: Store> SwapCoordinator<S> {
    /// Create a new coordinator.
    pub fn new(store: Arc<S>, sink: Arc<dyn NotificationSink>, engine: Engine) -> Self {
        Self { store, sink, engine }
    }

    /// Get the decision engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Offer `my_slot_id` in exchange for `their_slot_id`.
    ///
    /// Locks the offered slot (and the target under the both-swappable
    /// policy) and records a PENDING request, all in one commit.
    ///
    /// # Errors
    /// - `NotFound` if either slot is missing
    /// - `Authorization` unless `requester` owns the offered slot
    /// - `Validation` if the target is the requester's own slot
    /// - `State` if a slot is not SWAPPABLE, or a concurrent writer won
    ///   (`retryable`)
    pub async fn request_swap(
        &self,
        requester: UserId,
        input: RequestSwap,
    ) -> CoordinatorResult<SwapDetails> {
        let mut tx = self.store.begin().await?;
        let result = self.plan_request(tx.as_mut(), requester, &input).await;
        let decision = finish(tx, result).await?;

        info!(
            swap_id = %decision.request.id,
            %requester,
            responder = %decision.request.responder,
            my_slot = %decision.my_slot.id,
            their_slot = %decision.their_slot.id,
            "Swap requested"
        );
        self.publish(&decision.events);

        Ok(SwapDetails {
            request: decision.request,
            my_slot: Some(decision.my_slot),
            their_slot: Some(decision.their_slot),
        })
    }

    /// Accept or reject a pending request.
    ///
    /// Acceptance exchanges the two owners and rejects every other pending
    /// request that touches either slot, releasing the slots those requests
    /// had locked. Everything commits together.
    ///
    /// # Errors
    /// - `NotFound` if the request is missing
    /// - `Authorization` unless `responder` is the request's responder
    /// - `State` if the request is already resolved, a slot vanished, lost
    ///   its lock or changed owner, or a concurrent writer won (`retryable`)
    pub async fn respond_to_swap(
        &self,
        responder: UserId,
        swap_id: SwapId,
        input: RespondToSwap,
    ) -> CoordinatorResult<SwapResolution> {
        let outcome = SwapOutcome::from_accept(input.accept);

        let mut tx = self.store.begin().await?;
        let result = self.plan_response(tx.as_mut(), responder, swap_id, outcome).await;
        let (decision, cascade) = finish(tx, result).await?;

        info!(
            %swap_id,
            %responder,
            status = %decision.request.status,
            invalidated = cascade.rejected.len(),
            "Swap resolved"
        );
        self.publish(&decision.events);
        self.publish(&cascade.events);

        Ok(SwapResolution {
            details: SwapDetails {
                request: decision.request,
                my_slot: Some(decision.my_slot),
                their_slot: decision.their_slot,
            },
            invalidated: cascade.rejected.iter().map(|r| r.id).collect(),
        })
    }

    /// SWAPPABLE slots of other users, start ascending.
    pub async fn list_swappable(&self, viewer: UserId) -> CoordinatorResult<Vec<Slot>> {
        Ok(self.store.slots().list_swappable(viewer).await?)
    }

    /// Pending requests involving `user`, newest first.
    pub async fn list_swap_requests(&self, user: UserId) -> CoordinatorResult<SwapRequestLists> {
        let incoming = self.store.swaps().list_incoming(user).await?;
        let outgoing = self.store.swaps().list_outgoing(user).await?;

        Ok(SwapRequestLists {
            incoming: self.populate(incoming).await?,
            outgoing: self.populate(outgoing).await?,
        })
    }

    /// Every request involving `user`, any status, newest first.
    pub async fn list_swap_history(&self, user: UserId) -> CoordinatorResult<Vec<SwapDetails>> {
        let requests = self.store.swaps().list_for_user(user).await?;
        self.populate(requests).await
    }

    // =========================================================================
    // Transaction bodies
    // =========================================================================

    async fn plan_request(
        &self,
        tx: &mut dyn StoreTx,
        requester: UserId,
        input: &RequestSwap,
    ) -> CoordinatorResult<RequestDecision> {
        let my_slot = load_slot(tx, input.my_slot_id).await?;
        let their_slot = load_slot(tx, input.their_slot_id).await?;

        let decision =
            self.engine.decide_request(requester, &my_slot, &their_slot, Utc::now())?;

        for slot in &decision.updated_slots {
            tx.update_slot(slot).await?;
        }
        tx.create_pending(&decision.request).await?;

        Ok(decision)
    }

    async fn plan_response(
        &self,
        tx: &mut dyn StoreTx,
        responder: UserId,
        swap_id: SwapId,
        outcome: SwapOutcome,
    ) -> CoordinatorResult<(ResponseDecision, CascadeDecision)> {
        let request = tx
            .load_swap(swap_id)
            .await?
            .ok_or_else(|| CoordinatorError::not_found("swap_request", swap_id))?;

        if request.responder != responder {
            return Err(CoordinatorError::Authorization(format!(
                "User {} is not the responder of swap request {}",
                responder, swap_id
            )));
        }

        let my_slot = tx.load_slot(request.my_slot).await?;
        let their_slot = tx.load_slot(request.their_slot).await?;
        let now = Utc::now();

        let decision = self.engine.decide_response(
            responder,
            &request,
            my_slot.as_ref(),
            their_slot.as_ref(),
            outcome,
            now,
        )?;

        for slot in &decision.updated_slots {
            tx.update_slot(slot).await?;
        }
        tx.resolve(&decision.request).await?;

        let cascade = match outcome {
            SwapOutcome::Accepted => self.plan_cascade(tx, &decision.request, now).await?,
            SwapOutcome::Rejected => CascadeDecision::default(),
        };

        Ok((decision, cascade))
    }

    async fn plan_cascade(
        &self,
        tx: &mut dyn StoreTx,
        accepted: &SwapRequest,
        now: chrono::DateTime<Utc>,
    ) -> CoordinatorResult<CascadeDecision> {
        let mut seen = HashSet::new();
        let mut conflicting = Vec::new();
        for slot_id in [accepted.my_slot, accepted.their_slot] {
            for other in tx.find_conflicting_pending(slot_id, accepted.id).await? {
                if seen.insert(other.id) {
                    conflicting.push(other);
                }
            }
        }

        if conflicting.is_empty() {
            return Ok(CascadeDecision::default());
        }

        let mut slots = HashMap::new();
        for slot_id in conflicting.iter().flat_map(|r| r.locked_slots()) {
            if slots.contains_key(&slot_id) {
                continue;
            }
            if let Some(slot) = tx.load_slot(slot_id).await? {
                slots.insert(slot_id, slot);
            }
        }

        let cascade = self.engine.decide_cascade(accepted, conflicting, &slots, now)?;

        for slot in &cascade.released {
            tx.update_slot(slot).await?;
        }
        for rejected in &cascade.rejected {
            tx.resolve(rejected).await?;
            debug!(swap_id = %rejected.id, superseded_by = %accepted.id, "Swap invalidated");
        }

        Ok(cascade)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn populate(&self, requests: Vec<SwapRequest>) -> CoordinatorResult<Vec<SwapDetails>> {
        let mut details = Vec::with_capacity(requests.len());
        for request in requests {
            let my_slot = self.store.slots().find_by_id(request.my_slot).await?;
            let their_slot = self.store.slots().find_by_id(request.their_slot).await?;
            details.push(SwapDetails { request, my_slot, their_slot });
        }
        Ok(details)
    }

    fn publish(&self, events: &[SwapEvent]) {
        for event in events {
            debug!(swap_id = %event.swap_id(), event_type = event.event_type(), "Publishing");
            self.sink.publish(SWAP_UPDATED, event);
        }
    }
}

async fn load_slot(tx: &mut dyn StoreTx, slot_id: SlotId) -> CoordinatorResult<Slot> {
    tx.load_slot(slot_id)
        .await?
        .ok_or_else(|| CoordinatorError::not_found("slot", slot_id))
}

// =============================================================================
// Tests
// =============================================================================
