//! PostgreSQL store implementation (feature `postgres`).
//!
//! Transactions run at `SERIALIZABLE` isolation and lock point reads with
//! `SELECT ... FOR UPDATE`. PostgreSQL aborts the later of two conflicting
//! transactions with SQLSTATE 40001 (or 40P01 on deadlock); both surface as
//! [`StoreError::WriteConflict`].
//!
//! This module uses dynamic queries (sqlx::query) instead of compile-time
//! checked macros (sqlx::query!) to allow compilation without DATABASE_URL.

use crate::error::StoreError;
use crate::repository::{SlotRepository, Store, StoreTx, SwapLedger};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slotswap_domain::{
    Slot, SlotId, SlotStatus, SwapId, SwapRequest, SwapStatus, TimeRange, Title, UserId,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, info};

const SLOT_COLUMNS: &str = "id, title, start_time, end_time, owner_id, status, created_at, updated_at";

const SWAP_COLUMNS: &str = "id, my_slot_id, their_slot_id, requester_id, responder_id, status, \
                            their_slot_locked, created_at, resolved_at";

// =============================================================================
// Row mapping
// =============================================================================

fn slot_from_row(row: &PgRow) -> Result<Slot, StoreError> {
    let status: String = row.try_get("status")?;
    let title: String = row.try_get("title")?;
    let start: DateTime<Utc> = row.try_get("start_time")?;
    let end: DateTime<Utc> = row.try_get("end_time")?;

    Ok(Slot {
        id: row.try_get("id")?,
        title: Title::new(title).map_err(|e| StoreError::Deserialization(e.to_string()))?,
        time_range: TimeRange::new(start, end)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?,
        owner: row.try_get("owner_id")?,
        status: status
            .parse::<SlotStatus>()
            .map_err(|e| StoreError::Deserialization(e.to_string()))?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn swap_from_row(row: &PgRow) -> Result<SwapRequest, StoreError> {
    let status: String = row.try_get("status")?;

    Ok(SwapRequest {
        id: row.try_get("id")?,
        my_slot: row.try_get("my_slot_id")?,
        their_slot: row.try_get("their_slot_id")?,
        requester: row.try_get("requester_id")?,
        responder: row.try_get("responder_id")?,
        status: status
            .parse::<SwapStatus>()
            .map_err(|e| StoreError::Deserialization(e.to_string()))?,
        their_slot_locked: row.try_get("their_slot_locked")?,
        created_at: row.try_get("created_at")?,
        resolved_at: row.try_get("resolved_at")?,
    })
}

fn slots_from_rows(rows: &[PgRow]) -> Result<Vec<Slot>, StoreError> {
    rows.iter().map(slot_from_row).collect()
}

fn swaps_from_rows(rows: &[PgRow]) -> Result<Vec<SwapRequest>, StoreError> {
    rows.iter().map(swap_from_row).collect()
}

// =============================================================================
// PgStore
// =============================================================================

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to `database_url`
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Get a reference to the underlying pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_slots(&self, sql: &str, user: UserId) -> Result<Vec<Slot>, StoreError> {
        let rows = sqlx::query(sql).bind(user).fetch_all(&self.pool).await?;
        slots_from_rows(&rows)
    }

    async fn fetch_swaps(&self, sql: &str, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        let rows = sqlx::query(sql).bind(user).fetch_all(&self.pool).await?;
        swaps_from_rows(&rows)
    }
}

#[async_trait]
impl Store for PgStore {
    fn slots(&self) -> &dyn SlotRepository {
        self
    }

    fn swaps(&self) -> &dyn SwapLedger {
        self
    }

    async fn begin(&self) -> Result<Box<dyn StoreTx>, StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgTx { tx }))
    }
}

#[async_trait]
impl SlotRepository for PgStore {
    async fn find_by_id(&self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(&format!("SELECT {} FROM slots WHERE id = $1", SLOT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(slot_from_row).transpose()
    }

    async fn list_owned_by(&self, user: UserId) -> Result<Vec<Slot>, StoreError> {
        let sql = format!(
            "SELECT {} FROM slots WHERE owner_id = $1 ORDER BY start_time, id",
            SLOT_COLUMNS
        );
        self.fetch_slots(&sql, user).await
    }

    async fn list_not_owned_by(&self, user: UserId) -> Result<Vec<Slot>, StoreError> {
        let sql = format!(
            "SELECT {} FROM slots WHERE owner_id <> $1 ORDER BY start_time, id",
            SLOT_COLUMNS
        );
        self.fetch_slots(&sql, user).await
    }

    async fn list_swappable(&self, viewer: UserId) -> Result<Vec<Slot>, StoreError> {
        let sql = format!(
            "SELECT {} FROM slots WHERE owner_id <> $1 AND status = 'SWAPPABLE' \
             ORDER BY start_time, id",
            SLOT_COLUMNS
        );
        self.fetch_slots(&sql, viewer).await
    }
}

#[async_trait]
impl SwapLedger for PgStore {
    async fn find_by_id(&self, id: SwapId) -> Result<Option<SwapRequest>, StoreError> {
        let row =
            sqlx::query(&format!("SELECT {} FROM swap_requests WHERE id = $1", SWAP_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.as_ref().map(swap_from_row).transpose()
    }

    async fn list_incoming(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM swap_requests WHERE responder_id = $1 AND status = 'PENDING' \
             ORDER BY created_at DESC, id DESC",
            SWAP_COLUMNS
        );
        self.fetch_swaps(&sql, user).await
    }

    async fn list_outgoing(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM swap_requests WHERE requester_id = $1 AND status = 'PENDING' \
             ORDER BY created_at DESC, id DESC",
            SWAP_COLUMNS
        );
        self.fetch_swaps(&sql, user).await
    }

    async fn list_for_user(&self, user: UserId) -> Result<Vec<SwapRequest>, StoreError> {
        let sql = format!(
            "SELECT {} FROM swap_requests WHERE requester_id = $1 OR responder_id = $1 \
             ORDER BY created_at DESC, id DESC",
            SWAP_COLUMNS
        );
        self.fetch_swaps(&sql, user).await
    }

    async fn find_conflicting_pending(
        &self,
        slot_id: SlotId,
        exclude: SwapId,
    ) -> Result<Vec<SwapRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM swap_requests \
             WHERE status = 'PENDING' AND id <> $2 AND (my_slot_id = $1 OR their_slot_id = $1) \
             ORDER BY created_at DESC, id DESC",
            SWAP_COLUMNS
        ))
        .bind(slot_id)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        swaps_from_rows(&rows)
    }
}

// =============================================================================
// Transaction
// =============================================================================

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    async fn load_slot(&mut self, id: SlotId) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM slots WHERE id = $1 FOR UPDATE",
            SLOT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(slot_from_row).transpose()
    }

    async fn find_overlapping(
        &mut self,
        range: &TimeRange,
        exclude: Option<SlotId>,
    ) -> Result<Option<Slot>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM slots \
             WHERE start_time < $2 AND end_time > $1 AND ($3::uuid IS NULL OR id <> $3) \
             ORDER BY start_time, id LIMIT 1",
            SLOT_COLUMNS
        ))
        .bind(range.start())
        .bind(range.end())
        .bind(exclude)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(slot_from_row).transpose()
    }

    async fn load_swap(&mut self, id: SwapId) -> Result<Option<SwapRequest>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM swap_requests WHERE id = $1 FOR UPDATE",
            SWAP_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(swap_from_row).transpose()
    }

    async fn find_conflicting_pending(
        &mut self,
        slot_id: SlotId,
        exclude: SwapId,
    ) -> Result<Vec<SwapRequest>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM swap_requests \
             WHERE status = 'PENDING' AND id <> $2 AND (my_slot_id = $1 OR their_slot_id = $1) \
             ORDER BY created_at, id FOR UPDATE",
            SWAP_COLUMNS
        ))
        .bind(slot_id)
        .bind(exclude)
        .fetch_all(&mut *self.tx)
        .await?;
        swaps_from_rows(&rows)
    }

    async fn insert_slot(&mut self, slot: &Slot) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO slots (id, title, start_time, end_time, owner_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(slot.id)
        .bind(slot.title.as_str())
        .bind(slot.time_range.start())
        .bind(slot.time_range.end())
        .bind(slot.owner)
        .bind(slot.status.as_str())
        .bind(slot.created_at)
        .bind(slot.updated_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate { .. } => StoreError::duplicate("slot", slot.id.to_string()),
            other => other,
        })?;
        Ok(())
    }

    async fn update_slot(&mut self, slot: &Slot) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE slots
            SET title = $2, start_time = $3, end_time = $4, owner_id = $5, status = $6,
                updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(slot.id)
        .bind(slot.title.as_str())
        .bind(slot.time_range.start())
        .bind(slot.time_range.end())
        .bind(slot.owner)
        .bind(slot.status.as_str())
        .bind(slot.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("slot", slot.id.to_string()));
        }
        Ok(())
    }

    async fn delete_slot(&mut self, id: SlotId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM slots WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("slot", id.to_string()));
        }
        Ok(())
    }

    async fn create_pending(&mut self, request: &SwapRequest) -> Result<(), StoreError> {
        if !request.is_pending() {
            return Err(StoreError::invalid_state(format!(
                "new swap request {} must be PENDING, got {}",
                request.id, request.status
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO swap_requests (
                id, my_slot_id, their_slot_id, requester_id, responder_id, status,
                their_slot_locked, created_at, resolved_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL)
            "#,
        )
        .bind(request.id)
        .bind(request.my_slot)
        .bind(request.their_slot)
        .bind(request.requester)
        .bind(request.responder)
        .bind(request.status.as_str())
        .bind(request.their_slot_locked)
        .bind(request.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Duplicate { .. } => {
                StoreError::duplicate("swap_request", request.id.to_string())
            },
            other => other,
        })?;
        Ok(())
    }

    async fn resolve(&mut self, request: &SwapRequest) -> Result<(), StoreError> {
        if !request.status.is_terminal() {
            return Err(StoreError::invalid_state(format!(
                "swap request {} cannot be resolved as {}",
                request.id, request.status
            )));
        }

        // Only a PENDING row may move; a terminal row stays as it is
        let result = sqlx::query(
            r#"
            UPDATE swap_requests
            SET status = $2, resolved_at = $3
            WHERE id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(request.id)
        .bind(request.status.as_str())
        .bind(request.resolved_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::invalid_state(format!(
                "swap request {} is missing or already resolved",
                request.id
            )));
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        debug!("PostgreSQL transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
