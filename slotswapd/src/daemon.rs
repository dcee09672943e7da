//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties together all components:
//! - Store (in-memory, or PostgreSQL with the `postgres` feature)
//! - Slot service and swap coordinator
//! - Event Bus (swap notifications)
//! - API Server (HTTP endpoints)
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Initialize components
//! 3. Start API server
//! 4. Wait for SIGINT
//! 5. Graceful shutdown

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use slotswap_coordinator::{NotificationSink, SlotService, SwapCoordinator};
use slotswap_engine::Engine;
use slotswap_store::{MemoryStore, Store};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::DaemonResult;
use crate::event_bus::EventBus;

/// How long open connections (SSE streams included) may drain on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Daemon
// =============================================================================

/// The main SlotSwap daemon.
pub struct Daemon<S: Store + 'static> {
    /// Configuration
    config: Config,
    /// Handler state shared by every request
    state: Arc<ApiState<S>>,
    /// Event bus
    event_bus: Arc<EventBus>,
    /// Signals the API server to stop accepting connections
    shutdown: Arc<Notify>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon backed by the in-memory store.
    pub fn new_memory(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }
}

#[cfg(feature = "postgres")]
impl Daemon<slotswap_store::PgStore> {
    /// Connect to `DATABASE_URL`, run migrations and build the daemon.
    pub async fn connect_postgres(config: Config) -> DaemonResult<Self> {
        let url = config.database_url.clone().ok_or_else(|| {
            crate::error::DaemonError::Config("DATABASE_URL is required".to_string())
        })?;

        let store = slotswap_store::PgStore::connect(&url).await?;
        store.migrate().await?;
        info!("Database migrations applied");

        Ok(Self::new(config, Arc::new(store)))
    }
}

impl<S: Store + 'static> Daemon<S> {
    /// Create a daemon over the given store.
    pub fn new(config: Config, store: Arc<S>) -> Self {
        let event_bus = Arc::new(EventBus::new(config.event_bus_capacity));
        let sink: Arc<dyn NotificationSink> = event_bus.clone();
        let engine = Engine::new(config.swap_policy);

        let state = Arc::new(ApiState {
            slots: SlotService::new(Arc::clone(&store), engine.clone()),
            swaps: SwapCoordinator::new(store, sink, engine),
            event_bus: Arc::clone(&event_bus),
        });

        Self { config, state, event_bus, shutdown: Arc::new(Notify::new()) }
    }

    /// Build the HTTP router over this daemon's state.
    pub fn router(&self) -> Router {
        create_router(Arc::clone(&self.state))
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            swap_policy = %self.config.swap_policy,
            "Starting SlotSwap daemon"
        );

        let (api_addr, mut server) = self.start_api_server().await?;
        info!(%api_addr, "API server started");

        let stopped_early = tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                false
            }

            _ = &mut server => true,
        };

        if stopped_early {
            warn!("API server stopped unexpectedly");
        } else {
            info!("Received shutdown signal");
            self.shutdown(server).await;
        }

        Ok(())
    }

    /// Bind the listener and serve the API on a background task.
    ///
    /// The task ends after [`Daemon::request_shutdown`] once open
    /// connections close.
    pub async fn start_api_server(&self) -> DaemonResult<(SocketAddr, JoinHandle<()>)> {
        let router = self.router();
        let addr = self.config.api.bind_addr();

        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        let shutdown = Arc::clone(&self.shutdown);
        let server = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await;

            if let Err(e) = result {
                error!(error = %e, "API server error");
            }
        });

        Ok((local_addr, server))
    }

    /// Ask the API server to stop accepting connections.
    pub fn request_shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Graceful shutdown.
    async fn shutdown(&self, server: JoinHandle<()>) {
        info!(subscribers = self.event_bus.receiver_count(), "Initiating graceful shutdown");
        self.request_shutdown();

        match tokio::time::timeout(SHUTDOWN_GRACE, server).await {
            Ok(Ok(())) => info!("Shutdown complete"),
            Ok(Err(e)) => error!(error = %e, "API server task failed"),
            Err(_) => {
                warn!(grace_secs = SHUTDOWN_GRACE.as_secs(), "Connections still open, shutting down")
            },
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
