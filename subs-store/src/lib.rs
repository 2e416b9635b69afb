//! Online Subs Storage Layer
//!
//! Provides persistence for subscriptions.
//!
//! # Architecture
//!
//! - **Repository trait**: Defines the storage interface (port)
//! - **In-memory store**: Fast implementation for testing and local runs
//! - **PostgreSQL store**: Production implementation (feature `postgres`)
//!
//! Every operation runs under a deadline (5 seconds by default) and fails
//! with [`StoreError::Timeout`] when it expires.
//!
//! # Usage
//!
//! ```rust
//! use subs_domain::{Month, NewSubscription, SubscriptionFilter};
//! use subs_store::{MemoryStore, SubscriptionRepository};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = MemoryStore::new();
//!
//!     let subscription = NewSubscription::new(
//!         "Yandex Plus",
//!         400,
//!         Uuid::new_v4(),
//!         Month::parse("07-2025").unwrap(),
//!         None,
//!     )
//!     .unwrap();
//!     let id = store.create(&subscription).await.unwrap();
//!
//!     let window = SubscriptionFilter::new()
//!         .between(Month::parse("07-2025").unwrap(), Month::parse("12-2025").unwrap());
//!     let total = store.get_total_cost(&window).await.unwrap();
//!     println!("subscription {} costs {} over the window", id, total);
//! }
//! ```

#![warn(clippy::all)]

// Modules
mod deadline;
mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod repository;

// Re-exports
pub use deadline::DEFAULT_OP_TIMEOUT;
pub use error::{ErrorKind, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgSubscriptionStore;
pub use repository::SubscriptionRepository;
