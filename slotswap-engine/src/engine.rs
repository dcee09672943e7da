//! Swap decision engine.
//!
//! Every method takes fully loaded entities and returns the entities as they
//! must be written, plus the events to publish once the write commits.
//! Nothing here touches storage; the coordinator owns the transaction.
//!
//! # Negotiation state machine
//!
//! ```text
//! Requested ──accept──► Accepted   (owners exchanged, slots BUSY, cascade)
//!     │
//!     └──────reject──► Rejected   (locked slots back to SWAPPABLE)
//! ```

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use slotswap_domain::{
    Slot, SlotId, SlotPatch, SlotStatus, SwapEvent, SwapOutcome, SwapRequest, UserId,
};

use crate::error::{EngineError, EngineResult};

// =============================================================================
// Policy
// =============================================================================

/// Which slots must be SWAPPABLE (and get locked) when a swap is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SwapPolicy {
    /// Both slots must be SWAPPABLE and both become SWAP_PENDING
    #[default]
    BothSwappable,
    /// Only the offered slot must be SWAPPABLE; the target stays untouched
    /// until the responder answers
    RequesterOnly,
}

impl SwapPolicy {
    /// Check if the target slot is locked at request time
    pub fn locks_target(&self) -> bool {
        matches!(self, SwapPolicy::BothSwappable)
    }
}

impl fmt::Display for SwapPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapPolicy::BothSwappable => write!(f, "both-swappable"),
            SwapPolicy::RequesterOnly => write!(f, "requester-only"),
        }
    }
}

impl FromStr for SwapPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "both-swappable" | "both" => Ok(SwapPolicy::BothSwappable),
            "requester-only" | "requester" => Ok(SwapPolicy::RequesterOnly),
            other => Err(format!(
                "Invalid swap policy: {}. Expected: both-swappable, requester-only",
                other
            )),
        }
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Outcome of a valid swap request.
#[derive(Debug, Clone)]
pub struct RequestDecision {
    /// New PENDING request to insert
    pub request: SwapRequest,
    /// Offered slot, now SWAP_PENDING
    pub my_slot: Slot,
    /// Target slot (SWAP_PENDING under [`SwapPolicy::BothSwappable`])
    pub their_slot: Slot,
    /// Slots whose stored state changed
    pub updated_slots: Vec<Slot>,
    /// Events to publish after commit
    pub events: Vec<SwapEvent>,
}

/// Outcome of a valid response.
#[derive(Debug, Clone)]
pub struct ResponseDecision {
    /// Request in its terminal status
    pub request: SwapRequest,
    /// Offered slot after the transition
    pub my_slot: Slot,
    /// Target slot after the transition; `None` only for a rejected request
    /// whose unlocked target was deleted
    pub their_slot: Option<Slot>,
    /// Slots whose stored state changed
    pub updated_slots: Vec<Slot>,
    /// Events to publish after commit
    pub events: Vec<SwapEvent>,
}

/// Requests invalidated by an accepted swap.
#[derive(Debug, Clone, Default)]
pub struct CascadeDecision {
    /// Requests now REJECTED
    pub rejected: Vec<SwapRequest>,
    /// Slots released back to SWAPPABLE
    pub released: Vec<Slot>,
    /// Events to publish after commit
    pub events: Vec<SwapEvent>,
}

impl CascadeDecision {
    /// Check if nothing was invalidated
    pub fn is_empty(&self) -> bool {
        self.rejected.is_empty()
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Pure decision logic for slot edits and swap negotiations.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    policy: SwapPolicy,
}

impl Engine {
    /// Create an engine with the given request policy.
    pub fn new(policy: SwapPolicy) -> Self {
        Self { policy }
    }

    /// Get the active request policy.
    pub fn policy(&self) -> SwapPolicy {
        self.policy
    }

    /// Decide whether `requester` may offer `my_slot` for `their_slot`.
    ///
    /// Checks run in a fixed order so the caller sees the same error for the
    /// same input: ownership, self-swap, then slot status.
    pub fn decide_request(
        &self,
        requester: UserId,
        my_slot: &Slot,
        their_slot: &Slot,
        now: DateTime<Utc>,
    ) -> EngineResult<RequestDecision> {
        if !my_slot.is_owned_by(requester) {
            return Err(EngineError::NotSlotOwner { slot_id: my_slot.id, actor: requester });
        }

        if their_slot.is_owned_by(requester) {
            return Err(EngineError::SelfSwap { slot_id: their_slot.id });
        }

        if my_slot.status != SlotStatus::Swappable {
            return Err(EngineError::SlotNotSwappable {
                slot_id: my_slot.id,
                status: my_slot.status,
            });
        }

        let locks_target = self.policy.locks_target();
        if locks_target && their_slot.status != SlotStatus::Swappable {
            return Err(EngineError::SlotNotSwappable {
                slot_id: their_slot.id,
                status: their_slot.status,
            });
        }

        let mut my_slot = my_slot.clone();
        let mut their_slot = their_slot.clone();

        my_slot.lock_for_swap(now)?;
        let mut updated_slots = vec![my_slot.clone()];
        if locks_target {
            their_slot.lock_for_swap(now)?;
            updated_slots.push(their_slot.clone());
        }

        let request = SwapRequest::pending(&my_slot, &their_slot, locks_target, now);

        debug!(
            swap_id = %request.id,
            my_slot = %my_slot.id,
            their_slot = %their_slot.id,
            policy = %self.policy,
            "Swap request decided"
        );

        let events = vec![SwapEvent::SwapRequested {
            swap_id: request.id,
            requester: request.requester,
            responder: request.responder,
            my_slot: request.my_slot,
            their_slot: request.their_slot,
            timestamp: now,
        }];

        Ok(RequestDecision { request, my_slot, their_slot, updated_slots, events })
    }

    /// Decide the responder's answer to a pending request.
    ///
    /// `my_slot` and `their_slot` must be freshly loaded in the same
    /// transaction that will write the decision; `None` means the slot is gone.
    pub fn decide_response(
        &self,
        responder: UserId,
        request: &SwapRequest,
        my_slot: Option<&Slot>,
        their_slot: Option<&Slot>,
        outcome: SwapOutcome,
        now: DateTime<Utc>,
    ) -> EngineResult<ResponseDecision> {
        if request.responder != responder {
            return Err(EngineError::NotResponder { swap_id: request.id, actor: responder });
        }

        if !request.is_pending() {
            return Err(EngineError::SwapAlreadyResolved {
                swap_id: request.id,
                status: request.status,
            });
        }

        let mut my_slot = my_slot.cloned().ok_or(EngineError::SlotMissing(request.my_slot))?;
        // A target that was never locked may have been deleted by its owner;
        // the offer can still be declined so the requester's slot is released.
        let mut their_slot = match their_slot {
            Some(slot) => Some(slot.clone()),
            None if outcome == SwapOutcome::Rejected && !request.their_slot_locked => None,
            None => return Err(EngineError::SlotMissing(request.their_slot)),
        };

        if !my_slot.is_locked() {
            return Err(EngineError::SlotNotLocked { slot_id: my_slot.id, status: my_slot.status });
        }
        if let Some(their) = &their_slot {
            if request.their_slot_locked && !their.is_locked() {
                return Err(EngineError::SlotNotLocked { slot_id: their.id, status: their.status });
            }
        }
        if !my_slot.is_owned_by(request.requester) {
            return Err(EngineError::OwnershipChanged { slot_id: my_slot.id });
        }
        if let Some(their) = &their_slot {
            if !their.is_owned_by(request.responder) {
                return Err(EngineError::OwnershipChanged { slot_id: their.id });
            }
        }

        let mut request = request.clone();
        request.resolve(outcome, now)?;

        let (updated_slots, event) = match outcome {
            SwapOutcome::Accepted => {
                let their = their_slot
                    .as_mut()
                    .ok_or(EngineError::SlotMissing(request.their_slot))?;
                my_slot.transfer_to(request.responder, now)?;
                if request.their_slot_locked {
                    their.transfer_to(request.requester, now)?;
                } else {
                    their.transfer_unlocked(request.requester, now);
                }
                (
                    vec![my_slot.clone(), their.clone()],
                    SwapEvent::SwapAccepted {
                        swap_id: request.id,
                        requester: request.requester,
                        responder: request.responder,
                        timestamp: now,
                    },
                )
            },
            SwapOutcome::Rejected => {
                my_slot.release(now)?;
                let mut updated = vec![my_slot.clone()];
                if let Some(their) = their_slot.as_mut().filter(|_| request.their_slot_locked) {
                    their.release(now)?;
                    updated.push(their.clone());
                }
                (
                    updated,
                    SwapEvent::SwapRejected {
                        swap_id: request.id,
                        requester: request.requester,
                        responder: request.responder,
                        timestamp: now,
                    },
                )
            },
        };

        Ok(ResponseDecision {
            request,
            my_slot,
            their_slot,
            updated_slots,
            events: vec![event],
        })
    }

    /// Decide which pending requests die with an accepted swap.
    ///
    /// Every still-pending request in `conflicting` is rejected. Slots it had
    /// locked are released to SWAPPABLE, except the two slots of `accepted`,
    /// which just changed hands and stay BUSY. `slots` holds the current state
    /// of every slot the conflicting requests reference.
    pub fn decide_cascade(
        &self,
        accepted: &SwapRequest,
        conflicting: Vec<SwapRequest>,
        slots: &HashMap<SlotId, Slot>,
        now: DateTime<Utc>,
    ) -> EngineResult<CascadeDecision> {
        let mut working: HashMap<SlotId, Slot> = HashMap::new();
        let mut released_order: Vec<SlotId> = Vec::new();
        let mut decision = CascadeDecision::default();

        for mut other in conflicting {
            if other.id == accepted.id || !other.is_pending() {
                continue;
            }

            for slot_id in other.locked_slots() {
                if accepted.touches(slot_id) {
                    continue;
                }

                let slot = match slots.get(&slot_id) {
                    Some(current) => working.entry(slot_id).or_insert_with(|| current.clone()),
                    None => {
                        warn!(swap_id = %other.id, %slot_id, "Cascade skipped missing slot");
                        continue;
                    },
                };

                if slot.is_locked() {
                    slot.release(now)?;
                    released_order.push(slot_id);
                }
            }

            other.resolve(SwapOutcome::Rejected, now)?;
            decision.events.push(SwapEvent::SwapInvalidated {
                swap_id: other.id,
                requester: other.requester,
                responder: other.responder,
                superseded_by: accepted.id,
                timestamp: now,
            });
            decision.rejected.push(other);
        }

        decision.released = released_order
            .into_iter()
            .filter_map(|slot_id| working.remove(&slot_id))
            .collect();

        Ok(decision)
    }

    /// Apply an owner's edit to a slot.
    ///
    /// The swap lock is never editable from here: SWAP_PENDING cannot be
    /// written, and a locked slot cannot be changed at all.
    pub fn decide_slot_update(
        &self,
        actor: UserId,
        slot: &Slot,
        patch: &SlotPatch,
        now: DateTime<Utc>,
    ) -> EngineResult<Slot> {
        if !slot.is_owned_by(actor) {
            return Err(EngineError::NotSlotOwner { slot_id: slot.id, actor });
        }
        if patch.status == Some(SlotStatus::SwapPending) {
            return Err(EngineError::ReservedStatus);
        }
        if slot.is_locked() {
            return Err(EngineError::SlotLocked(slot.id));
        }

        let mut updated = slot.clone();
        if let Some(title) = &patch.title {
            updated.title = title.clone();
        }
        if patch.changes_time() {
            updated.time_range = slot.time_range.with_bounds(patch.start_time, patch.end_time)?;
        }
        if let Some(status) = patch.status {
            updated.status = status;
        }
        if !patch.is_empty() {
            updated.updated_at = now;
        }

        Ok(updated)
    }

    /// Check that `actor` may delete `slot`.
    ///
    /// `pending` holds the PENDING requests that reference the slot. A slot
    /// named by an open request stays until that request is answered, even
    /// when the request did not lock it.
    pub fn check_delete(
        &self,
        actor: UserId,
        slot: &Slot,
        pending: &[SwapRequest],
    ) -> EngineResult<()> {
        if !slot.is_owned_by(actor) {
            return Err(EngineError::NotSlotOwner { slot_id: slot.id, actor });
        }
        if slot.is_locked() {
            return Err(EngineError::SlotLocked(slot.id));
        }
        if let Some(open) = pending.iter().find(|r| r.is_pending() && r.touches(slot.id)) {
            return Err(EngineError::SlotReferenced { slot_id: slot.id, swap_id: open.id });
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use slotswap_domain::{SwapStatus, TimeRange, Title};
    use uuid::Uuid;

    fn slot(owner: UserId, title: &str, start_hour: u32, status: SlotStatus) -> Slot {
        let start = Utc.with_ymd_and_hms(2025, 3, 10, start_hour, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 3, 10, start_hour + 1, 0, 0).unwrap();
        let mut slot =
            Slot::new(owner, Title::new(title).unwrap(), TimeRange::new(start, end).unwrap());
        slot.status = status;
        slot
    }

    struct Fixture {
        alice: UserId,
        bob: UserId,
        gym: Slot,
        call: Slot,
    }

    fn fixture() -> Fixture {
        let alice = Uuid::now_v7();
        let bob = Uuid::now_v7();
        Fixture {
            alice,
            bob,
            gym: slot(alice, "Gym", 17, SlotStatus::Swappable),
            call: slot(bob, "Call", 18, SlotStatus::Swappable),
        }
    }

    // Request tests
    #[test]
    fn test_request_locks_both_slots() {
        let f = fixture();
        let engine = Engine::default();

        let decision = engine.decide_request(f.bob, &f.call, &f.gym, Utc::now()).unwrap();

        assert_eq!(decision.my_slot.status, SlotStatus::SwapPending);
        assert_eq!(decision.their_slot.status, SlotStatus::SwapPending);
        assert_eq!(decision.updated_slots.len(), 2);
        assert_eq!(decision.request.requester, f.bob);
        assert_eq!(decision.request.responder, f.alice);
        assert!(decision.request.their_slot_locked);
        assert!(matches!(decision.events[0], SwapEvent::SwapRequested { .. }));
    }

    #[test]
    fn test_request_requester_only_leaves_target() {
        let f = fixture();
        let engine = Engine::new(SwapPolicy::RequesterOnly);
        let mut gym = f.gym.clone();
        gym.status = SlotStatus::Busy;

        let decision = engine.decide_request(f.bob, &f.call, &gym, Utc::now()).unwrap();

        assert_eq!(decision.my_slot.status, SlotStatus::SwapPending);
        assert_eq!(decision.their_slot.status, SlotStatus::Busy);
        assert_eq!(decision.updated_slots.len(), 1);
        assert!(!decision.request.their_slot_locked);
    }

    #[test]
    fn test_request_requires_ownership() {
        let f = fixture();
        let engine = Engine::default();

        let err = engine.decide_request(f.alice, &f.call, &f.gym, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::NotSlotOwner { .. }));
    }

    #[test]
    fn test_request_rejects_self_swap() {
        let f = fixture();
        let engine = Engine::default();
        let other_gym = slot(f.alice, "Gym again", 20, SlotStatus::Swappable);

        let err = engine.decide_request(f.alice, &f.gym, &other_gym, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::SelfSwap { .. }));

        let err = engine.decide_request(f.alice, &f.gym, &f.gym, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::SelfSwap { .. }));
    }

    #[test]
    fn test_request_requires_swappable_slots() {
        let f = fixture();
        let engine = Engine::default();

        let mut busy_call = f.call.clone();
        busy_call.status = SlotStatus::Busy;
        let err = engine.decide_request(f.bob, &busy_call, &f.gym, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            EngineError::SlotNotSwappable { slot_id: busy_call.id, status: SlotStatus::Busy }
        );

        let mut locked_gym = f.gym.clone();
        locked_gym.status = SlotStatus::SwapPending;
        let err = engine.decide_request(f.bob, &f.call, &locked_gym, Utc::now()).unwrap_err();
        assert_eq!(
            err,
            EngineError::SlotNotSwappable { slot_id: locked_gym.id, status: SlotStatus::SwapPending }
        );
    }

    // Response tests
    fn requested(f: &Fixture, engine: &Engine) -> RequestDecision {
        engine.decide_request(f.bob, &f.call, &f.gym, Utc::now()).unwrap()
    }

    #[test]
    fn test_accept_exchanges_owners() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);

        let decision = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&req.my_slot),
                Some(&req.their_slot),
                SwapOutcome::Accepted,
                Utc::now(),
            )
            .unwrap();

        assert_eq!(decision.request.status, SwapStatus::Accepted);
        assert_eq!(decision.my_slot.owner, f.alice);
        let their = decision.their_slot.as_ref().unwrap();
        assert_eq!(their.owner, f.bob);
        assert_eq!(decision.my_slot.status, SlotStatus::Busy);
        assert_eq!(their.status, SlotStatus::Busy);
        assert!(matches!(decision.events[0], SwapEvent::SwapAccepted { .. }));
    }

    #[test]
    fn test_reject_releases_locks() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);

        let decision = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&req.my_slot),
                Some(&req.their_slot),
                SwapOutcome::Rejected,
                Utc::now(),
            )
            .unwrap();

        assert_eq!(decision.request.status, SwapStatus::Rejected);
        assert_eq!(decision.my_slot.owner, f.bob);
        let their = decision.their_slot.as_ref().unwrap();
        assert_eq!(their.owner, f.alice);
        assert_eq!(decision.my_slot.status, SlotStatus::Swappable);
        assert_eq!(their.status, SlotStatus::Swappable);
    }

    #[test]
    fn test_reject_requester_only_keeps_target_status() {
        let f = fixture();
        let engine = Engine::new(SwapPolicy::RequesterOnly);
        let mut gym = f.gym.clone();
        gym.status = SlotStatus::Busy;
        let req = engine.decide_request(f.bob, &f.call, &gym, Utc::now()).unwrap();

        let decision = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&req.my_slot),
                Some(&req.their_slot),
                SwapOutcome::Rejected,
                Utc::now(),
            )
            .unwrap();

        assert_eq!(decision.updated_slots.len(), 1);
        assert_eq!(decision.my_slot.status, SlotStatus::Swappable);
        assert_eq!(decision.their_slot.unwrap().status, SlotStatus::Busy);
    }

    #[test]
    fn test_reject_after_unlocked_target_deleted() {
        let f = fixture();
        let engine = Engine::new(SwapPolicy::RequesterOnly);
        let mut gym = f.gym.clone();
        gym.status = SlotStatus::Busy;
        let req = engine.decide_request(f.bob, &f.call, &gym, Utc::now()).unwrap();

        let decision = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&req.my_slot),
                None,
                SwapOutcome::Rejected,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(decision.request.status, SwapStatus::Rejected);
        assert_eq!(decision.my_slot.status, SlotStatus::Swappable);
        assert!(decision.their_slot.is_none());
        assert_eq!(decision.updated_slots, vec![decision.my_slot.clone()]);

        // Accepting still needs the target
        let err = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&req.my_slot),
                None,
                SwapOutcome::Accepted,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, EngineError::SlotMissing(gym.id));
    }

    #[test]
    fn test_locked_target_missing_fails_both_ways() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);

        for outcome in [SwapOutcome::Accepted, SwapOutcome::Rejected] {
            let err = engine
                .decide_response(
                    f.alice,
                    &req.request,
                    Some(&req.my_slot),
                    None,
                    outcome,
                    Utc::now(),
                )
                .unwrap_err();
            assert_eq!(err, EngineError::SlotMissing(f.gym.id));
        }
    }

    #[test]
    fn test_response_only_by_responder() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);

        let err = engine
            .decide_response(
                f.bob,
                &req.request,
                Some(&req.my_slot),
                Some(&req.their_slot),
                SwapOutcome::Accepted,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::NotResponder { .. }));
    }

    #[test]
    fn test_response_on_resolved_request_fails() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);
        let mut resolved = req.request.clone();
        resolved.resolve(SwapOutcome::Rejected, Utc::now()).unwrap();

        for outcome in [SwapOutcome::Accepted, SwapOutcome::Rejected] {
            let err = engine
                .decide_response(
                    f.alice,
                    &resolved,
                    Some(&req.my_slot),
                    Some(&req.their_slot),
                    outcome,
                    Utc::now(),
                )
                .unwrap_err();
            assert!(matches!(err, EngineError::SwapAlreadyResolved { .. }));
        }
    }

    #[test]
    fn test_response_rechecks_slot_state() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);

        let mut released = req.their_slot.clone();
        released.status = SlotStatus::Swappable;
        let err = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&req.my_slot),
                Some(&released),
                SwapOutcome::Accepted,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::SlotNotLocked { .. }));

        let err = engine
            .decide_response(
                f.alice,
                &req.request,
                None,
                Some(&req.their_slot),
                SwapOutcome::Accepted,
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(err, EngineError::SlotMissing(req.request.my_slot));

        let mut stolen = req.my_slot.clone();
        stolen.owner = Uuid::now_v7();
        let err = engine
            .decide_response(
                f.alice,
                &req.request,
                Some(&stolen),
                Some(&req.their_slot),
                SwapOutcome::Accepted,
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::OwnershipChanged { .. }));
    }

    // Cascade tests
    #[test]
    fn test_cascade_rejects_and_releases_outside_pair() {
        // X is offered in R1 (X for Y) and R2 (X for Z); R1 is accepted.
        let carol = Uuid::now_v7();
        let dave = Uuid::now_v7();
        let erin = Uuid::now_v7();
        let now = Utc::now();
        let engine = Engine::default();

        let x = slot(carol, "X", 9, SlotStatus::SwapPending);
        let y = slot(dave, "Y", 10, SlotStatus::SwapPending);
        let z = slot(erin, "Z", 11, SlotStatus::SwapPending);

        let mut r1 = SwapRequest::pending(&x, &y, true, now);
        let r2 = SwapRequest::pending(&x, &z, true, now);
        r1.resolve(SwapOutcome::Accepted, now).unwrap();

        let mut x_after = x.clone();
        x_after.transfer_to(dave, now).unwrap();
        let slots: HashMap<SlotId, Slot> =
            [(x.id, x_after), (z.id, z.clone())].into_iter().collect();

        let cascade = engine.decide_cascade(&r1, vec![r2.clone()], &slots, now).unwrap();

        assert_eq!(cascade.rejected.len(), 1);
        assert_eq!(cascade.rejected[0].id, r2.id);
        assert_eq!(cascade.rejected[0].status, SwapStatus::Rejected);
        assert_eq!(cascade.released.len(), 1);
        assert_eq!(cascade.released[0].id, z.id);
        assert_eq!(cascade.released[0].status, SlotStatus::Swappable);
        assert!(matches!(
            cascade.events[0],
            SwapEvent::SwapInvalidated { superseded_by, .. } if superseded_by == r1.id
        ));
    }

    #[test]
    fn test_cascade_releases_offered_slot_of_competing_request() {
        // Requester-only: Bob and Carol both want Alice's gym; Bob wins.
        let engine = Engine::new(SwapPolicy::RequesterOnly);
        let f = fixture();
        let carol = Uuid::now_v7();
        let now = Utc::now();
        let tea = slot(carol, "Tea", 20, SlotStatus::Swappable);

        let bob_req = engine.decide_request(f.bob, &f.call, &f.gym, now).unwrap();
        let carol_req = engine.decide_request(carol, &tea, &f.gym, now).unwrap();

        let accepted = engine
            .decide_response(
                f.alice,
                &bob_req.request,
                Some(&bob_req.my_slot),
                Some(&bob_req.their_slot),
                SwapOutcome::Accepted,
                now,
            )
            .unwrap();

        let slots: HashMap<SlotId, Slot> = [
            (carol_req.my_slot.id, carol_req.my_slot.clone()),
            (f.gym.id, accepted.their_slot.clone().unwrap()),
        ]
        .into_iter()
        .collect();

        let cascade = engine
            .decide_cascade(&accepted.request, vec![carol_req.request.clone()], &slots, now)
            .unwrap();

        assert_eq!(cascade.rejected[0].id, carol_req.request.id);
        assert_eq!(cascade.released.len(), 1);
        assert_eq!(cascade.released[0].id, tea.id);
        assert_eq!(cascade.released[0].status, SlotStatus::Swappable);
    }

    #[test]
    fn test_cascade_ignores_accepted_and_resolved() {
        let f = fixture();
        let engine = Engine::default();
        let req = requested(&f, &engine);
        let now = Utc::now();

        let mut accepted = req.request.clone();
        accepted.resolve(SwapOutcome::Accepted, now).unwrap();

        let cascade = engine
            .decide_cascade(&accepted, vec![req.request.clone()], &HashMap::new(), now)
            .unwrap();
        assert!(cascade.is_empty());
    }

    // Slot edit tests
    #[test]
    fn test_slot_update_by_owner() {
        let f = fixture();
        let engine = Engine::default();
        let mut busy = f.gym.clone();
        busy.status = SlotStatus::Busy;

        let patch = SlotPatch {
            title: Some(Title::new("Gym (legs)").unwrap()),
            status: Some(SlotStatus::Swappable),
            ..Default::default()
        };
        let updated = engine.decide_slot_update(f.alice, &busy, &patch, Utc::now()).unwrap();

        assert_eq!(updated.title.as_str(), "Gym (legs)");
        assert_eq!(updated.status, SlotStatus::Swappable);
        assert_eq!(updated.time_range, busy.time_range);
    }

    #[test]
    fn test_slot_update_guards() {
        let f = fixture();
        let engine = Engine::default();

        let patch = SlotPatch { status: Some(SlotStatus::Busy), ..Default::default() };
        let err = engine.decide_slot_update(f.bob, &f.gym, &patch, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::NotSlotOwner { .. }));

        let patch = SlotPatch { status: Some(SlotStatus::SwapPending), ..Default::default() };
        let err = engine.decide_slot_update(f.alice, &f.gym, &patch, Utc::now()).unwrap_err();
        assert_eq!(err, EngineError::ReservedStatus);

        let mut locked = f.gym.clone();
        locked.status = SlotStatus::SwapPending;
        let patch = SlotPatch { status: Some(SlotStatus::Busy), ..Default::default() };
        let err = engine.decide_slot_update(f.alice, &locked, &patch, Utc::now()).unwrap_err();
        assert_eq!(err, EngineError::SlotLocked(locked.id));
    }

    #[test]
    fn test_slot_update_validates_time_range() {
        let f = fixture();
        let engine = Engine::default();

        let patch = SlotPatch {
            end_time: Some(f.gym.time_range.start()),
            ..Default::default()
        };
        let err = engine.decide_slot_update(f.alice, &f.gym, &patch, Utc::now()).unwrap_err();
        assert!(matches!(err, EngineError::Domain(_)));
    }

    #[test]
    fn test_check_delete() {
        let f = fixture();
        let engine = Engine::default();

        assert!(engine.check_delete(f.alice, &f.gym, &[]).is_ok());
        assert!(matches!(
            engine.check_delete(f.bob, &f.gym, &[]),
            Err(EngineError::NotSlotOwner { .. })
        ));

        let mut locked = f.gym.clone();
        locked.status = SlotStatus::SwapPending;
        assert_eq!(
            engine.check_delete(f.alice, &locked, &[]),
            Err(EngineError::SlotLocked(locked.id))
        );
    }

    #[test]
    fn test_check_delete_refuses_slot_named_by_pending_request() {
        let f = fixture();
        let engine = Engine::new(SwapPolicy::RequesterOnly);
        let mut gym = f.gym.clone();
        gym.status = SlotStatus::Busy;
        let req = engine.decide_request(f.bob, &f.call, &gym, Utc::now()).unwrap();

        // The target is not locked, but the open offer still pins it
        assert!(!gym.is_locked());
        assert_eq!(
            engine.check_delete(f.alice, &gym, std::slice::from_ref(&req.request)),
            Err(EngineError::SlotReferenced { slot_id: gym.id, swap_id: req.request.id })
        );

        let mut resolved = req.request.clone();
        resolved.resolve(SwapOutcome::Rejected, Utc::now()).unwrap();
        assert!(engine.check_delete(f.alice, &gym, &[resolved]).is_ok());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("both-swappable".parse::<SwapPolicy>().unwrap(), SwapPolicy::BothSwappable);
        assert_eq!("Requester-Only".parse::<SwapPolicy>().unwrap(), SwapPolicy::RequesterOnly);
        assert!("anything".parse::<SwapPolicy>().is_err());
        assert_eq!(SwapPolicy::default().to_string(), "both-swappable");
    }
}
