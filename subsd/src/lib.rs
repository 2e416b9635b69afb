//! Online Subs Daemon Library
//!
//! HTTP service over the subscription repository.
//!
//! # Architecture
//!
//! ```text
//! HTTP client → API (axum) → SubscriptionRepository → PostgreSQL | memory
//! ```
//!
//! # Components
//!
//! - **Daemon**: Binds the listener, serves the API, shuts down on Ctrl-C
//! - **API**: CRUD, listing and total cost endpoints under `/subscriptions/v1`
//! - **Config**: Environment-based configuration
//!
//! # Example
//!
//! ```rust,ignore
//! use subsd::{Config, Daemon};
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

// Re-exports for convenience
pub use config::{ApiConfig, Config, Environment, StoreConfig};
pub use daemon::Daemon;
pub use error::{DaemonError, DaemonResult};
