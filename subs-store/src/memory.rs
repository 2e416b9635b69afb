//! In-memory store implementation
//!
//! Used for testing and development without a database.
//! Thread-safe using RwLock for concurrent access; the write lock is held
//! across the uniqueness check and the insert, which makes create atomic
//! the way the unique index does for PostgreSQL.

use crate::deadline::{within_deadline, DEFAULT_OP_TIMEOUT};
use crate::error::StoreError;
use crate::repository::{accrued_cost, require_natural_key, require_window, SubscriptionRepository};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use subs_domain::{
    NewSubscription, Subscription, SubscriptionFilter, SubscriptionId, SubscriptionsPage,
};
use tracing::{debug, info, warn};

type Rows = BTreeMap<SubscriptionId, Subscription>;

/// In-memory subscription store
pub struct MemoryStore {
    subscriptions: RwLock<Rows>,
    next_id: AtomicI64,
    op_timeout: Duration,
}

impl MemoryStore {
    /// Create a new empty in-memory store
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_OP_TIMEOUT)
    }

    /// Create a new empty store with a custom per-operation deadline
    pub fn with_timeout(op_timeout: Duration) -> Self {
        Self {
            subscriptions: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(0),
            op_timeout,
        }
    }

    /// Get the number of subscriptions
    pub fn count(&self) -> usize {
        self.rows().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Clear all data (useful for test setup)
    pub fn clear(&self) {
        if let Ok(mut rows) = self.rows_mut() {
            rows.clear();
        }
        self.next_id.store(0, Ordering::SeqCst);
    }

    fn rows(&self) -> Result<RwLockReadGuard<'_, Rows>, StoreError> {
        self.subscriptions
            .read()
            .map_err(|_| StoreError::Database("subscriptions lock poisoned".to_string()))
    }

    fn rows_mut(&self) -> Result<RwLockWriteGuard<'_, Rows>, StoreError> {
        self.subscriptions
            .write()
            .map_err(|_| StoreError::Database("subscriptions lock poisoned".to_string()))
    }

    // The row-level checks PostgreSQL enforces through table constraints.
    fn check_constraints(subscription: &NewSubscription) -> Result<(), StoreError> {
        subscription
            .validate()
            .map_err(|e| StoreError::Database(format!("check constraint violated: {}", e)))
    }

    fn insert(&self, subscription: &NewSubscription) -> Result<SubscriptionId, StoreError> {
        Self::check_constraints(subscription)?;

        let mut rows = self.rows_mut()?;
        if rows.values().any(|row| row.same_key(subscription)) {
            return Err(StoreError::AlreadyExists {
                service: subscription.service.clone(),
                user_id: subscription.user_id,
                start_date: subscription.start_date,
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        rows.insert(id, Subscription::from_new(id, subscription.clone()));
        Ok(id)
    }

    fn replace(&self, id: SubscriptionId, updated: &NewSubscription) -> Result<(), StoreError> {
        let mut rows = self.rows_mut()?;

        // Zero rows touched: no constraint can fire.
        if !rows.contains_key(&id) {
            return Err(StoreError::not_found(format!("id {}", id)));
        }

        Self::check_constraints(updated)?;
        if rows.values().any(|row| row.id != id && row.same_key(updated)) {
            return Err(StoreError::Database(
                "duplicate key value violates unique constraint \"index_subs\"".to_string(),
            ));
        }

        if let Some(row) = rows.get_mut(&id) {
            row.apply(updated);
        }
        Ok(())
    }

    fn matching(&self, filter: &SubscriptionFilter) -> Result<Vec<Subscription>, StoreError> {
        let rows = self.rows()?;
        Ok(rows.values().filter(|row| filter.matches(row)).cloned().collect())
    }

    fn page(&self, filter: &SubscriptionFilter) -> Result<SubscriptionsPage, StoreError> {
        let mut matches = self.matching(filter)?;

        let total = matches.len() as i64;
        if total == 0 {
            debug!(?filter, "no subscriptions found with provided filter");
            return Ok(SubscriptionsPage::empty());
        }
        let sum_cost = matches.iter().map(|sub| i64::from(sub.cost)).sum();

        let order = filter.sort_order();
        matches.sort_by(|a, b| order.compare(a, b));

        let offset = filter.effective_offset().unwrap_or(0);
        let subscriptions: Vec<Subscription> = match filter.effective_limit() {
            Some(limit) => matches
                .into_iter()
                .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => matches.into_iter().skip(usize::try_from(offset).unwrap_or(usize::MAX)).collect(),
        };

        Ok(SubscriptionsPage {
            subscriptions,
            total,
            sum_cost,
        })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Subscription Repository Implementation
// =============================================================================

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn create(&self, subscription: &NewSubscription) -> Result<SubscriptionId, StoreError> {
        debug!(?subscription, "create subscription");

        let id = within_deadline("create", self.op_timeout, async { self.insert(subscription) }).await?;

        info!(id, service = %subscription.service, "subscription created");
        Ok(id)
    }

    async fn read_by_id(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        debug!(id, "read subscription by id");

        within_deadline("read_by_id", self.op_timeout, async {
            self.rows()?
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::not_found(format!("id {}", id)))
        })
        .await
    }

    async fn read_by_params(&self, filter: &SubscriptionFilter) -> Result<Subscription, StoreError> {
        debug!(?filter, "read subscription by params");

        let (service, user_id, start_date) = require_natural_key(filter).inspect_err(|e| {
            warn!(error = %e, ?filter, "invalid filter for point lookup");
        })?;

        within_deadline("read_by_params", self.op_timeout, async {
            self.rows()?
                .values()
                .find(|row| {
                    row.service == service && row.user_id == user_id && row.start_date == start_date
                })
                .cloned()
                .ok_or_else(|| {
                    StoreError::not_found(format!("{} for user {} starting {}", service, user_id, start_date))
                })
        })
        .await
    }

    async fn update(&self, id: SubscriptionId, updated: &NewSubscription) -> Result<(), StoreError> {
        debug!(id, subscription = ?updated, "update subscription");

        within_deadline("update", self.op_timeout, async { self.replace(id, updated) }).await?;

        info!(id, "subscription updated");
        Ok(())
    }

    async fn delete_by_id(&self, id: SubscriptionId) -> Result<(), StoreError> {
        debug!(id, "delete subscription");

        within_deadline("delete_by_id", self.op_timeout, async {
            match self.rows_mut()?.remove(&id) {
                Some(_) => Ok(()),
                None => Err(StoreError::not_found(format!("id {}", id))),
            }
        })
        .await?;

        info!(id, "subscription deleted");
        Ok(())
    }

    async fn list(&self, filter: &SubscriptionFilter) -> Result<SubscriptionsPage, StoreError> {
        debug!(?filter, "list subscriptions");

        let page = within_deadline("list", self.op_timeout, async { self.page(filter) }).await?;

        info!(total = page.total, returned = page.subscriptions.len(), "subscriptions listed");
        Ok(page)
    }

    async fn get_total_cost(&self, filter: &SubscriptionFilter) -> Result<i64, StoreError> {
        debug!(?filter, "get total cost of subscriptions");

        let (from, to) = require_window(filter).inspect_err(|e| {
            warn!(error = %e, ?filter, "aggregation window missing");
        })?;

        let sum_cost = within_deadline("get_total_cost", self.op_timeout, async {
            let candidates = self.matching(filter)?;
            accrued_cost(&candidates, from, to)
        })
        .await?;

        info!(sum_cost, %from, %to, "total cost calculated");
        Ok(sum_cost)
    }
}

// =============================================================================
// Tests
// =============================================================================
