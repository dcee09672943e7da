//! SlotSwap Daemon Library
//!
//! HTTP application layer over the swap coordinator.
//!
//! # Architecture
//!
//! ```text
//! Client → API Server → SlotService / SwapCoordinator → Store
//!              ↑                    │
//!         SSE stream  ←  Event Bus ←┘ (swap notifications)
//! ```
//!
//! # Components
//!
//! - **Daemon**: Main runtime orchestrator
//! - **API**: HTTP endpoints and the notification stream
//! - **Identity**: Caller extraction from the `x-user-id` header
//! - **Event Bus**: Broadcast of swap notifications
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use slotswapd::{Config, Daemon};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let daemon = Daemon::new_memory(config);
//!     daemon.run().await.expect("Daemon error");
//! }
//! ```

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod daemon;
pub mod error;
pub mod event_bus;
pub mod identity;

// Re-exports for convenience
pub use api::{create_router, ApiState, ErrorResponse};
pub use config::{ApiConfig, Config, Environment, LogFormat};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
pub use event_bus::{EventBus, EventReceiver, Notification};
pub use identity::{AuthenticatedUser, USER_ID_HEADER};
