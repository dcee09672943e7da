//! SlotSwap Daemon
//!
//! HTTP front end for slot management and swap negotiation.
//!
//! # Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! cargo run -p slotswapd
//!
//! # Start with PostgreSQL
//! DATABASE_URL=postgres://localhost/slotswap cargo run -p slotswapd --features postgres
//! ```
//!
//! # Environment Variables
//!
//! - `SLOTSWAP_ENV`: Environment (test, development, production)
//! - `SLOTSWAP_API_HOST`: API host (default: 0.0.0.0)
//! - `SLOTSWAP_API_PORT`: API port (fallback `PORT`, default: 4000)
//! - `SLOTSWAP_SWAP_POLICY`: both-swappable (default) or requester-only
//! - `SLOTSWAP_EVENT_BUS_CAPACITY`: Notification buffer (default: 1000)
//! - `SLOTSWAP_LOG_FORMAT`: pretty (default) or json
//! - `DATABASE_URL`: PostgreSQL connection string (`postgres` feature)

use slotswapd::{Config, Daemon, LogFormat};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration before logging so the format can be chosen
    let config = Config::from_env()?;

    let filter = EnvFilter::from_default_env().add_directive("slotswapd=info".parse()?);
    match config.log_format {
        LogFormat::Json => {
            tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init()
        },
        LogFormat::Pretty => tracing_subscriber::registry().with(fmt::layer()).with(filter).init(),
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        swap_policy = %config.swap_policy,
        "SlotSwap Daemon"
    );

    run(config).await
}

#[cfg(feature = "postgres")]
async fn run(config: Config) -> anyhow::Result<()> {
    if config.database_url.is_some() {
        info!("Using PostgreSQL store");
        Daemon::connect_postgres(config).await?.run().await?;
    } else {
        info!("DATABASE_URL not set, using in-memory store");
        Daemon::new_memory(config).run().await?;
    }
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn run(config: Config) -> anyhow::Result<()> {
    if config.database_url.is_some() {
        tracing::warn!("DATABASE_URL ignored: built without the postgres feature");
    }
    Daemon::new_memory(config).run().await?;
    Ok(())
}
