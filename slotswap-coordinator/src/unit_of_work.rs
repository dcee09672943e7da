//! Commit-or-rollback helper shared by every mutating operation.

use tracing::{debug, warn};

use slotswap_store::StoreTx;

use crate::error::CoordinatorResult;

/// Close `tx` according to `result`.
///
/// `Ok` commits (a failed commit replaces the value with the commit error);
/// `Err` rolls back and returns the original error. A failed rollback is only
/// logged since nothing was made visible.
pub(crate) async fn finish<T>(
    tx: Box<dyn StoreTx>,
    result: CoordinatorResult<T>,
) -> CoordinatorResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        },
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            debug!(error = %err, kind = err.kind(), "Transaction rolled back");
            Err(err)
        },
    }
}
