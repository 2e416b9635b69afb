//! Online Subs Domain Layer
//!
//! Pure domain logic with zero I/O dependencies.
//! Contains the subscription entity, the month value object, query
//! criteria, and the period arithmetic used for cost aggregation.

#![warn(missing_docs)]
#![warn(clippy::all)]

// Public modules
pub mod entities;
pub mod filter;
pub mod period;
pub mod value_objects;

// Re-export commonly used types
pub use entities::{NewSubscription, Subscription, SubscriptionId, UserId};
pub use filter::{SortOrder, SubscriptionFilter, SubscriptionsPage};
pub use period::overlapped_months;
pub use value_objects::{DomainError, Month};
