//! Daemon: Main runtime orchestrator.
//!
//! The Daemon ties the subscription store to the HTTP API.
//!
//! # Lifecycle
//!
//! 1. Load configuration
//! 2. Open the store (PostgreSQL pool or in-memory)
//! 3. Start API server
//! 4. Serve until SIGINT, then drain in-flight requests

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};

use subs_store::{MemoryStore, SubscriptionRepository};

use crate::api::{create_router, ApiState};
use crate::config::Config;
use crate::error::{DaemonError, DaemonResult};

// =============================================================================
// Daemon
// =============================================================================

/// The subscriptions daemon.
pub struct Daemon<S: SubscriptionRepository + 'static> {
    /// Configuration
    config: Config,
    /// Store
    store: Arc<S>,
}

impl Daemon<MemoryStore> {
    /// Create a daemon backed by the in-memory store (for testing/development).
    pub fn new_memory(config: Config) -> Self {
        let store = Arc::new(MemoryStore::with_timeout(config.store.op_timeout));
        Self::new(config, store)
    }
}

#[cfg(feature = "postgres")]
impl Daemon<subs_store::PgSubscriptionStore> {
    /// Create a daemon backed by PostgreSQL at `config.store.database_url`.
    pub async fn connect(config: Config) -> DaemonResult<Self> {
        let url = config
            .store
            .database_url
            .clone()
            .ok_or_else(|| DaemonError::Config("DATABASE_URL is required for PostgreSQL".to_string()))?;

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.store.max_connections)
            .acquire_timeout(config.store.op_timeout)
            .connect(&url)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to connect to database: {}", e)))?;

        info!(max_connections = config.store.max_connections, "Connected to PostgreSQL");

        let store = Arc::new(subs_store::PgSubscriptionStore::with_timeout(pool, config.store.op_timeout));
        Ok(Self::new(config, store))
    }
}

impl<S: SubscriptionRepository + 'static> Daemon<S> {
    /// Create a new daemon with provided components.
    pub fn new(config: Config, store: Arc<S>) -> Self {
        Self { config, store }
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run the daemon.
    ///
    /// This method blocks until shutdown is requested (SIGINT).
    pub async fn run(self) -> DaemonResult<()> {
        info!(
            version = env!("CARGO_PKG_VERSION"),
            environment = %self.config.environment,
            "Starting subscriptions daemon"
        );

        let listener = self.bind().await?;
        let api_addr = listener.local_addr()?;
        info!(%api_addr, "API server started");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Shutdown complete");
        Ok(())
    }

    /// Start the API server in a background task and return its address.
    ///
    /// Unlike [`Daemon::run`] this returns immediately and does not install
    /// a shutdown handler.
    pub async fn start_api_server(&self) -> DaemonResult<SocketAddr> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        // Spawn the server task
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                error!(error = %e, "API server error");
            }
        });

        Ok(local_addr)
    }

    fn router(&self) -> axum::Router {
        let state = Arc::new(ApiState::new(self.store.clone(), &self.config.api));
        create_router(state)
    }

    async fn bind(&self) -> DaemonResult<TcpListener> {
        let addr = format!("{}:{}", self.config.api.host, self.config.api.port);

        TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::Config(format!("Failed to bind to {}: {}", addr, e)))
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{BasicResponse, CostResponse};
    use subs_domain::{Month, NewSubscription};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_daemon_memory_creation() {
        let config = Config::test();
        let daemon = Daemon::new_memory(config);

        assert_eq!(daemon.store().count(), 0);
    }

    #[tokio::test]
    async fn test_daemon_api_server_start() {
        let config = Config::test();
        let daemon = Daemon::new_memory(config);

        let addr = daemon.start_api_server().await.unwrap();

        // Server should be running on a port
        assert!(addr.port() > 0);

        // Can make a health check request
        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();

        assert!(response.status().is_success());
    }

    #[tokio::test]
    async fn test_daemon_serves_store_over_http() {
        let daemon = Daemon::new_memory(Config::test());
        let user = Uuid::new_v4();
        daemon
            .store()
            .create(
                &NewSubscription::new("Spotify", 50, user, Month::parse("01-2023").unwrap(), None)
                    .unwrap(),
            )
            .await
            .unwrap();

        let addr = daemon.start_api_server().await.unwrap();
        let client = reqwest::Client::new();

        let created: BasicResponse = client
            .post(format!("http://{}/subscriptions/v1/create", addr))
            .json(&serde_json::json!({
                "service_name": "Netflix",
                "price": 100,
                "user_id": user,
                "start_date": "06-2024",
                "end_date": "08-2024",
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(created.message, "success");

        let total: CostResponse = client
            .get(format!(
                "http://{}/subscriptions/v1/total?startDate=01-2024&endDate=12-2024",
                addr
            ))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(total.sum_cost, 100 * 3 + 50 * 12);
    }
}
