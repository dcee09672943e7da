//! Daemon error types.

use slotswap_coordinator::CoordinatorError;
use slotswap_store::StoreError;
use thiserror::Error;

/// Daemon-level errors.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Coordinator error
    #[error("Coordinator error: {0}")]
    Coordinator(#[from] CoordinatorError),

    /// Store error (connection, migrations)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener could not be bound or served
    #[error("Server error: {0}")]
    Server(#[from] std::io::Error),
}

/// Result type for daemon operations.
pub type DaemonResult<T> = Result<T, DaemonError>;
