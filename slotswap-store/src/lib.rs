//! SlotSwap Storage Layer
//!
//! Provides persistence for slots and swap requests.
//!
//! # Architecture
//!
//! - **Repository traits**: Define the storage interface (ports)
//! - **Transactions**: Every mutation runs in a [`StoreTx`] unit of work
//! - **In-memory store**: Optimistic concurrency, used for tests and development
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! # Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use slotswap_domain::{Slot, TimeRange, Title};
//! use slotswap_store::{MemoryStore, Store};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!     let owner = Uuid::now_v7();
//!     let range = TimeRange::new(
//!         Utc.with_ymd_and_hms(2025, 3, 10, 17, 0, 0).unwrap(),
//!         Utc.with_ymd_and_hms(2025, 3, 10, 18, 0, 0).unwrap(),
//!     )
//!     .unwrap();
//!     let slot = Slot::new(owner, Title::new("Gym").unwrap(), range);
//!
//!     let mut tx = store.begin().await.unwrap();
//!     assert!(tx.find_overlapping(&range, None).await.unwrap().is_none());
//!     tx.insert_slot(&slot).await.unwrap();
//!     tx.commit().await.unwrap();
//!
//!     let mine = store.slots().list_owned_by(owner).await.unwrap();
//!     println!("Slots: {}", mine.len());
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;
pub use repository::{SlotRepository, Store, StoreTx, SwapLedger};
