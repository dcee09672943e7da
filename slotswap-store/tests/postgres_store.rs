//! DB-backed integration tests for the PostgreSQL store
//!
//! Run with `cargo test -p slotswap-store --features postgres -- --ignored`
//! and DATABASE_URL pointing at a scratch database.

#![cfg(feature = "postgres")]

use chrono::{DateTime, TimeZone, Utc};
use slotswap_domain::{Slot, SlotStatus, SwapOutcome, SwapRequest, SwapStatus, TimeRange, Title};
use slotswap_store::{PgStore, Store, StoreError};
use sqlx::PgPool;
use uuid::Uuid;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, hour, 0, 0).unwrap()
}

fn slot(owner: Uuid, title: &str, start: u32, end: u32) -> Slot {
    Slot::new(owner, Title::new(title).unwrap(), TimeRange::new(at(start), at(end)).unwrap())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_slot_round_trip_and_overlap(pool: PgPool) -> anyhow::Result<()> {
    let store = PgStore::from_pool(pool);
    let alice = Uuid::now_v7();
    let gym = slot(alice, "Gym", 17, 18);

    let mut tx = store.begin().await?;
    assert!(tx.find_overlapping(&gym.time_range, None).await?.is_none());
    tx.insert_slot(&gym).await?;
    tx.commit().await?;

    let stored = store.slots().find_by_id(gym.id).await?.expect("slot stored");
    assert_eq!(stored.title.as_str(), "Gym");
    assert_eq!(stored.status, SlotStatus::Busy);

    let mut tx = store.begin().await?;
    let adjacent = TimeRange::new(at(18), at(19))?;
    assert!(tx.find_overlapping(&adjacent, None).await?.is_none());
    let overlapping = TimeRange::new(at(16), at(18))?;
    let found = tx.find_overlapping(&overlapping, None).await?.expect("overlap found");
    assert_eq!(found.id, gym.id);
    assert!(tx.find_overlapping(&overlapping, Some(gym.id)).await?.is_none());
    tx.rollback().await?;

    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_rollback_discards_writes(pool: PgPool) -> anyhow::Result<()> {
    let store = PgStore::from_pool(pool);
    let gym = slot(Uuid::now_v7(), "Gym", 17, 18);

    let mut tx = store.begin().await?;
    tx.insert_slot(&gym).await?;
    tx.rollback().await?;

    assert!(store.slots().find_by_id(gym.id).await?.is_none());
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_swap_request_retained_after_resolution(pool: PgPool) -> anyhow::Result<()> {
    let store = PgStore::from_pool(pool);
    let alice = Uuid::now_v7();
    let bob = Uuid::now_v7();
    let gym = slot(alice, "Gym", 17, 18);
    let call = slot(bob, "Call", 18, 19);
    let request = SwapRequest::pending(&call, &gym, true, Utc::now());

    let mut tx = store.begin().await?;
    tx.insert_slot(&gym).await?;
    tx.insert_slot(&call).await?;
    tx.create_pending(&request).await?;
    tx.commit().await?;

    assert_eq!(store.swaps().list_incoming(alice).await?.len(), 1);
    assert_eq!(store.swaps().list_outgoing(bob).await?.len(), 1);

    let mut resolved = request.clone();
    resolved.resolve(SwapOutcome::Accepted, Utc::now())?;
    let mut tx = store.begin().await?;
    tx.resolve(&resolved).await?;
    tx.commit().await?;

    // Second resolution is refused by the row guard
    let mut tx = store.begin().await?;
    let err = tx.resolve(&resolved).await.unwrap_err();
    assert!(matches!(err, StoreError::InvalidState { .. }));
    tx.rollback().await?;

    assert!(store.swaps().list_incoming(alice).await?.is_empty());
    let history = store.swaps().list_for_user(bob).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, SwapStatus::Accepted);
    Ok(())
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL"]
async fn test_concurrent_lock_is_write_conflict(pool: PgPool) -> anyhow::Result<()> {
    let store = PgStore::from_pool(pool);
    let mut gym = slot(Uuid::now_v7(), "Gym", 17, 18);
    gym.status = SlotStatus::Swappable;

    let mut tx = store.begin().await?;
    tx.insert_slot(&gym).await?;
    tx.commit().await?;

    let mut first = store.begin().await?;
    let mut locked = first.load_slot(gym.id).await?.expect("slot present");
    locked.lock_for_swap(Utc::now())?;
    first.update_slot(&locked).await?;

    // The second reader blocks on FOR UPDATE until the first commits,
    // then fails serialization.
    let second_store = store.clone();
    let slot_id = gym.id;
    let second = tokio::spawn(async move {
        let mut tx = second_store.begin().await?;
        let current = tx.load_slot(slot_id).await?;
        tx.commit().await?;
        Ok::<_, StoreError>(current)
    });

    first.commit().await?;

    match second.await? {
        Err(err) => assert!(err.is_write_conflict(), "unexpected error: {err}"),
        Ok(current) => {
            // The read may also land after the commit and observe the lock
            assert_eq!(current.map(|s| s.status), Some(SlotStatus::SwapPending));
        },
    }
    Ok(())
}
