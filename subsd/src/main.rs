//! Online Subs Daemon
//!
//! Subscription tracking service: CRUD, listing and cost aggregation over HTTP.
//!
//! # Usage
//!
//! ```bash
//! # Start with the in-memory store
//! cargo run -p subsd
//!
//! # Start against PostgreSQL
//! DATABASE_URL=postgres://localhost/subs cargo run -p subsd --features postgres
//! ```
//!
//! # Environment Variables
//!
//! - `SUBS_ENV`: Environment (test, development, production)
//! - `SUBS_API_HOST`: API host (default: 0.0.0.0)
//! - `SUBS_API_PORT`: API port (default: 8080)
//! - `DATABASE_URL`: PostgreSQL DSN (default: unset, in-memory store)
//! - `SUBS_DB_MAX_CONNECTIONS`: Pool size (default: 10)
//! - `SUBS_STORE_TIMEOUT_SECS`: Per-operation deadline (default: 5)
//! - `SUBS_DEFAULT_PAGE_LIMIT`: List page size (default: 10)
//! - `SUBS_MAX_PAGE_LIMIT`: Largest accepted page size (default: 100)

use subsd::{Config, Daemon, Environment};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::from_default_env()
        .add_directive("subsd=info".parse()?)
        .add_directive("subs_store=info".parse()?);

    if config.environment == Environment::Production {
        tracing_subscriber::registry().with(fmt::layer().json()).with(filter).init();
    } else {
        tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        api_host = %config.api.host,
        api_port = config.api.port,
        "Online Subs Daemon"
    );

    run(config).await
}

#[cfg(feature = "postgres")]
async fn run(config: Config) -> anyhow::Result<()> {
    if config.store.database_url.is_some() {
        let daemon = Daemon::connect(config).await?;
        daemon.run().await?;
    } else {
        warn!("DATABASE_URL not set, using in-memory store");
        Daemon::new_memory(config).run().await?;
    }
    Ok(())
}

#[cfg(not(feature = "postgres"))]
async fn run(config: Config) -> anyhow::Result<()> {
    if config.store.database_url.is_some() {
        warn!("DATABASE_URL ignored: built without the postgres feature");
    }
    Daemon::new_memory(config).run().await?;
    Ok(())
}
