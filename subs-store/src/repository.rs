//! Repository trait definition (Port)
//!
//! This trait defines the storage interface for subscriptions.
//! Implementations can be PostgreSQL or in-memory.
//!
//! Every implementation must:
//! - run each operation under a deadline and report expiry as
//!   `StoreError::Timeout`
//! - detect create conflicts and update/delete misses from the number of
//!   rows the write touched, never by reading first

use crate::error::StoreError;
use async_trait::async_trait;
use subs_domain::{
    Month, NewSubscription, Subscription, SubscriptionFilter, SubscriptionId, SubscriptionsPage,
    UserId,
};

/// Repository for Subscription entities
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Insert a subscription, returning its assigned id.
    ///
    /// Fails with `AlreadyExists` when (service, user_id, start_date) is taken.
    async fn create(&self, subscription: &NewSubscription) -> Result<SubscriptionId, StoreError>;

    /// Find a subscription by id
    async fn read_by_id(&self, id: SubscriptionId) -> Result<Subscription, StoreError>;

    /// Find a subscription by its natural key.
    ///
    /// `service`, `user_id` and `start_date` must all be set (equality, not
    /// window); otherwise fails with `WrongParams`.
    async fn read_by_params(&self, filter: &SubscriptionFilter) -> Result<Subscription, StoreError>;

    /// Replace every mutable field of subscription `id`
    async fn update(&self, id: SubscriptionId, updated: &NewSubscription) -> Result<(), StoreError>;

    /// Delete subscription `id`
    async fn delete_by_id(&self, id: SubscriptionId) -> Result<(), StoreError>;

    /// List subscriptions active within the filter window, with total count
    /// and cost sum over every match
    async fn list(&self, filter: &SubscriptionFilter) -> Result<SubscriptionsPage, StoreError>;

    /// Sum of `cost * overlapped months` over subscriptions active within
    /// `[start_date, end_date]`; both bounds are required
    async fn get_total_cost(&self, filter: &SubscriptionFilter) -> Result<i64, StoreError>;
}

// =============================================================================
// Shared precondition checks
// =============================================================================

/// Natural key of a point lookup, or `WrongParams` naming what is missing
pub(crate) fn require_natural_key(
    filter: &SubscriptionFilter,
) -> Result<(&str, UserId, Month), StoreError> {
    filter.natural_key().ok_or_else(|| {
        StoreError::wrong_params(format!(
            "point lookup requires {}",
            filter.missing_key_fields().join(", ")
        ))
    })
}

/// Aggregation window; both bounds must be given explicitly
pub(crate) fn require_window(filter: &SubscriptionFilter) -> Result<(Month, Month), StoreError> {
    match (filter.start_date, filter.end_date) {
        (Some(from), Some(to)) => Ok((from, to)),
        _ => Err(StoreError::wrong_params("total cost requires start_date and end_date")),
    }
}

/// Total accrued by `candidates` within `[from, to]`; fails if the sum
/// leaves the `i64` range
pub(crate) fn accrued_cost<'a>(
    candidates: impl IntoIterator<Item = &'a Subscription>,
    from: Month,
    to: Month,
) -> Result<i64, StoreError> {
    candidates
        .into_iter()
        .try_fold(0i64, |total, sub| total.checked_add(sub.cost_within(from, to)))
        .ok_or_else(|| StoreError::Database(format!("total cost overflow for {} to {}", from, to)))
}
