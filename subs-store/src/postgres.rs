//! PostgreSQL subscription store.
//!
//! Conflict and miss detection rely on what each single statement reports:
//! - create is `INSERT ... ON CONFLICT DO NOTHING RETURNING id`; no returned
//!   row means the unique index rejected the insert
//! - update/delete check `rows_affected()`
//!
//! This module uses dynamic queries (sqlx::query, sqlx::QueryBuilder)
//! instead of compile-time checked macros (sqlx::query!) to allow
//! compilation without DATABASE_URL.

use crate::deadline::{within_deadline, DEFAULT_OP_TIMEOUT};
use crate::error::StoreError;
use crate::repository::{accrued_cost, require_natural_key, require_window, SubscriptionRepository};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use subs_domain::{
    Month, NewSubscription, SortOrder, Subscription, SubscriptionFilter, SubscriptionId,
    SubscriptionsPage,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SELECT_SUBSCRIPTIONS: &str =
    "SELECT id, service, cost, user_id, start_date, end_date FROM subscriptions";

const COUNT_SUBSCRIPTIONS: &str =
    "SELECT COUNT(*), COALESCE(SUM(cost), 0)::BIGINT FROM subscriptions";

/// PostgreSQL-backed [`SubscriptionRepository`].
///
/// Expects the `subscriptions` table from `migrations/0001_subscriptions.sql`,
/// including the unique index on `(service, user_id, start_date)`.
#[derive(Clone)]
pub struct PgSubscriptionStore {
    /// PostgreSQL connection pool
    pool: PgPool,
    /// Deadline applied to every operation
    op_timeout: Duration,
}

impl PgSubscriptionStore {
    /// Create a store with the default 5 second deadline.
    pub fn new(pool: PgPool) -> Self {
        Self::with_timeout(pool, DEFAULT_OP_TIMEOUT)
    }

    /// Create a store with a custom per-operation deadline.
    pub fn with_timeout(pool: PgPool, op_timeout: Duration) -> Self {
        Self { pool, op_timeout }
    }

    /// Get a reference to the underlying pool (for testing).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Row struct for subscriptions query results.
#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: i64,
    service: String,
    cost: i32,
    user_id: Uuid,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let month = |date: NaiveDate| {
            Month::try_from(date).map_err(|e| {
                StoreError::Deserialization(format!("subscription {}: {}", row.id, e))
            })
        };

        Ok(Subscription {
            id: row.id,
            start_date: month(row.start_date)?,
            end_date: row.end_date.map(month).transpose()?,
            service: row.service,
            cost: row.cost,
            user_id: row.user_id,
        })
    }
}

fn into_subscriptions(rows: Vec<SubscriptionRow>) -> Result<Vec<Subscription>, StoreError> {
    rows.into_iter().map(Subscription::try_from).collect()
}

// =============================================================================
// Query composition
// =============================================================================

/// Append the windowed, conjunctive predicate of `filter`.
///
/// Date fields describe a window the subscription's active interval must
/// intersect. Point lookups do not go through here.
fn push_filter(builder: &mut QueryBuilder<'static, Postgres>, filter: &SubscriptionFilter) {
    builder.push(" WHERE TRUE");

    if let Some(service) = &filter.service {
        builder.push(" AND service = ").push_bind(service.clone());
    }
    if let Some(user_id) = filter.user_id {
        builder.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(cost) = filter.cost {
        builder.push(" AND cost = ").push_bind(cost);
    }
    if let Some((from, to)) = filter.query_window() {
        builder.push(" AND start_date <= ").push_bind(to.first_day());
        builder
            .push(" AND (end_date IS NULL OR end_date >= ")
            .push_bind(from.first_day())
            .push(")");
    }
}

fn order_by(order: SortOrder) -> &'static str {
    match order {
        SortOrder::CostAsc => " ORDER BY cost ASC, id ASC",
        SortOrder::CostDesc => " ORDER BY cost DESC, id ASC",
        SortOrder::ServiceAsc => " ORDER BY service COLLATE \"C\" ASC, id ASC",
        SortOrder::ServiceDesc => " ORDER BY service COLLATE \"C\" DESC, id ASC",
        SortOrder::StartDateAsc => " ORDER BY start_date ASC, id ASC",
        SortOrder::StartDateDesc => " ORDER BY start_date DESC, id ASC",
    }
}

/// `(total, sum_cost)` over every match
fn totals_query(filter: &SubscriptionFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(COUNT_SUBSCRIPTIONS);
    push_filter(&mut builder, filter);
    builder
}

/// Ordered, paginated matches
fn page_query(filter: &SubscriptionFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = candidates_query(filter);
    builder.push(order_by(filter.sort_order()));

    if let Some(limit) = filter.effective_limit() {
        builder.push(" LIMIT ").push_bind(limit);
    }
    if let Some(offset) = filter.effective_offset() {
        builder.push(" OFFSET ").push_bind(offset);
    }
    builder
}

/// Every match, unordered
fn candidates_query(filter: &SubscriptionFilter) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(SELECT_SUBSCRIPTIONS);
    push_filter(&mut builder, filter);
    builder
}

// =============================================================================
// Subscription Repository Implementation
// =============================================================================

#[async_trait]
impl SubscriptionRepository for PgSubscriptionStore {
    async fn create(&self, subscription: &NewSubscription) -> Result<SubscriptionId, StoreError> {
        debug!(?subscription, "create subscription");

        let id = within_deadline("create", self.op_timeout, async {
            let inserted: Option<i64> = sqlx::query_scalar(
                r#"
                INSERT INTO subscriptions (service, cost, user_id, start_date, end_date)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (service, user_id, start_date) DO NOTHING
                RETURNING id
                "#,
            )
            .bind(&subscription.service)
            .bind(subscription.cost)
            .bind(subscription.user_id)
            .bind(subscription.start_date.first_day())
            .bind(subscription.end_date.map(|m| m.first_day()))
            .fetch_optional(&self.pool)
            .await?;

            inserted.ok_or_else(|| StoreError::AlreadyExists {
                service: subscription.service.clone(),
                user_id: subscription.user_id,
                start_date: subscription.start_date,
            })
        })
        .await?;

        info!(id, service = %subscription.service, "subscription created");
        Ok(id)
    }

    async fn read_by_id(&self, id: SubscriptionId) -> Result<Subscription, StoreError> {
        debug!(id, "read subscription by id");

        let subscription = within_deadline("read_by_id", self.op_timeout, async {
            let row: Option<SubscriptionRow> = sqlx::query_as(
                r#"
                SELECT id, service, cost, user_id, start_date, end_date
                FROM subscriptions
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

            Subscription::try_from(row.ok_or_else(|| StoreError::not_found(format!("id {}", id)))?)
        })
        .await?;

        debug!(id, "subscription found");
        Ok(subscription)
    }

    async fn read_by_params(&self, filter: &SubscriptionFilter) -> Result<Subscription, StoreError> {
        debug!(?filter, "read subscription by params");

        let (service, user_id, start_date) = require_natural_key(filter).inspect_err(|e| {
            warn!(error = %e, ?filter, "invalid filter for point lookup");
        })?;

        let subscription = within_deadline("read_by_params", self.op_timeout, async {
            let row: Option<SubscriptionRow> = sqlx::query_as(
                r#"
                SELECT id, service, cost, user_id, start_date, end_date
                FROM subscriptions
                WHERE service = $1 AND user_id = $2 AND start_date = $3
                "#,
            )
            .bind(service)
            .bind(user_id)
            .bind(start_date.first_day())
            .fetch_optional(&self.pool)
            .await?;

            let row = row.ok_or_else(|| {
                StoreError::not_found(format!("{} for user {} starting {}", service, user_id, start_date))
            })?;
            Subscription::try_from(row)
        })
        .await?;

        debug!(id = subscription.id, "subscription found");
        Ok(subscription)
    }

    async fn update(&self, id: SubscriptionId, updated: &NewSubscription) -> Result<(), StoreError> {
        debug!(id, subscription = ?updated, "update subscription");

        within_deadline("update", self.op_timeout, async {
            let result = sqlx::query(
                r#"
                UPDATE subscriptions
                SET service = $1, cost = $2, user_id = $3, start_date = $4, end_date = $5
                WHERE id = $6
                "#,
            )
            .bind(&updated.service)
            .bind(updated.cost)
            .bind(updated.user_id)
            .bind(updated.start_date.first_day())
            .bind(updated.end_date.map(|m| m.first_day()))
            .bind(id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("id {}", id)));
            }
            Ok::<_, StoreError>(())
        })
        .await?;

        info!(id, "subscription updated");
        Ok(())
    }

    async fn delete_by_id(&self, id: SubscriptionId) -> Result<(), StoreError> {
        debug!(id, "delete subscription");

        within_deadline("delete_by_id", self.op_timeout, async {
            let result = sqlx::query("DELETE FROM subscriptions WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;

            if result.rows_affected() == 0 {
                return Err(StoreError::not_found(format!("id {}", id)));
            }
            Ok::<_, StoreError>(())
        })
        .await?;

        info!(id, "subscription deleted");
        Ok(())
    }

    async fn list(&self, filter: &SubscriptionFilter) -> Result<SubscriptionsPage, StoreError> {
        debug!(?filter, "list subscriptions");

        let page = within_deadline("list", self.op_timeout, async {
            let (total, sum_cost): (i64, i64) =
                totals_query(filter).build_query_as().fetch_one(&self.pool).await?;

            if total == 0 {
                debug!(?filter, "no subscriptions found with provided filter");
                return Ok(SubscriptionsPage::empty());
            }

            let rows: Vec<SubscriptionRow> =
                page_query(filter).build_query_as().fetch_all(&self.pool).await?;

            Ok::<_, StoreError>(SubscriptionsPage {
                subscriptions: into_subscriptions(rows)?,
                total,
                sum_cost,
            })
        })
        .await?;

        info!(total = page.total, returned = page.subscriptions.len(), "subscriptions listed");
        Ok(page)
    }

    async fn get_total_cost(&self, filter: &SubscriptionFilter) -> Result<i64, StoreError> {
        debug!(?filter, "get total cost of subscriptions");

        let (from, to) = require_window(filter).inspect_err(|e| {
            warn!(error = %e, ?filter, "aggregation window missing");
        })?;

        let sum_cost = within_deadline("get_total_cost", self.op_timeout, async {
            let rows: Vec<SubscriptionRow> =
                candidates_query(filter).build_query_as().fetch_all(&self.pool).await?;

            let candidates = into_subscriptions(rows)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn month(s: &str) -> Month {
        Month::parse(s).unwrap()
    }

    fn new_sub(service: &str, cost: i32, user: Uuid, start: &str, end: Option<&str>) -> NewSubscription {
        NewSubscription::new(service, cost, user, month(start), end.map(month)).unwrap()
    }

    // Query composition (no database needed)

    #[test]
    fn test_push_filter_unconstrained() {
        let builder = candidates_query(&SubscriptionFilter::new());
        assert_eq!(
            builder.sql(),
            "SELECT id, service, cost, user_id, start_date, end_date FROM subscriptions WHERE TRUE"
        );
    }

    #[test]
    fn test_push_filter_all_predicates() {
        let filter = SubscriptionFilter::new()
            .service("Netflix")
            .user(Uuid::nil())
            .cost(400)
            .between(month("01-2024"), month("12-2024"));

        let builder = candidates_query(&filter);
        assert_eq!(
            builder.sql(),
            "SELECT id, service, cost, user_id, start_date, end_date FROM subscriptions WHERE TRUE \
             AND service = $1 AND user_id = $2 AND cost = $3 \
             AND start_date <= $4 AND (end_date IS NULL OR end_date >= $5)"
        );
    }

    #[test]
    fn test_page_query_orders_and_paginates() {
        let filter = SubscriptionFilter::new().sort("cost_desc").limit(2).offset(2);
        assert_eq!(
            page_query(&filter).sql(),
            "SELECT id, service, cost, user_id, start_date, end_date FROM subscriptions WHERE TRUE \
             ORDER BY cost DESC, id ASC LIMIT $1 OFFSET $2"
        );

        // Non-positive values are dropped, unknown sort falls back to newest first
        let filter = SubscriptionFilter::new().sort("bogus").limit(0).offset(0);
        assert_eq!(
            page_query(&filter).sql(),
            "SELECT id, service, cost, user_id, start_date, end_date FROM subscriptions WHERE TRUE \
             ORDER BY start_date DESC, id ASC"
        );
    }

    #[test]
    fn test_service_order_uses_bytewise_collation() {
        let filter = SubscriptionFilter::new().sort("service_asc");
        assert_eq!(
            page_query(&filter).sql(),
            "SELECT id, service, cost, user_id, start_date, end_date FROM subscriptions WHERE TRUE \
             ORDER BY service COLLATE \"C\" ASC, id ASC"
        );
    }

    #[test]
    fn test_totals_query_ignores_pagination() {
        let filter = SubscriptionFilter::new().service("Netflix").limit(5).offset(5).sort("cost_asc");
        assert_eq!(
            totals_query(&filter).sql(),
            "SELECT COUNT(*), COALESCE(SUM(cost), 0)::BIGINT FROM subscriptions WHERE TRUE AND service = $1"
        );
    }

    // Integration tests against a real database.
    //
    // Run with:
    //   DATABASE_URL=postgres://... cargo test -p subs-store --features postgres -- --ignored

    async fn seed_five(store: &PgSubscriptionStore, user: Uuid) {
        for (service, cost, start) in [
            ("Netflix", 300, "01-2024"),
            ("Spotify", 100, "02-2024"),
            ("Kinopoisk", 500, "03-2024"),
            ("Yandex Plus", 200, "04-2024"),
            ("Apple Music", 400, "05-2024"),
        ] {
            store.create(&new_sub(service, cost, user, start, None)).await.unwrap();
        }
    }

    async fn row_count(pool: &PgPool) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM subscriptions").fetch_one(pool).await.unwrap()
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_create_read_update_delete(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool);
        let user = Uuid::new_v4();
        let sub = new_sub("Netflix", 400, user, "07-2025", None);

        let id = store.create(&sub).await.unwrap();
        let found = store.read_by_id(id).await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(NewSubscription::from(found), sub);

        let updated = new_sub("Netflix", 500, user, "07-2025", Some("12-2025"));
        store.update(id, &updated).await.unwrap();
        let found = store.read_by_id(id).await.unwrap();
        assert_eq!(found.id, id);
        assert_eq!(NewSubscription::from(found), updated);

        store.delete_by_id(id).await.unwrap();
        assert!(matches!(store.read_by_id(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.delete_by_id(id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.update(id, &updated).await, Err(StoreError::NotFound(_))));
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_duplicate_create_leaves_store_unchanged(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool.clone());
        let user = Uuid::new_v4();

        store.create(&new_sub("Netflix", 400, user, "07-2025", None)).await.unwrap();
        let err = store
            .create(&new_sub("Netflix", 999, user, "07-2025", Some("09-2025")))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(row_count(&pool).await, 1);
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_read_by_params(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool);
        let user = Uuid::new_v4();
        let id = store.create(&new_sub("Netflix", 400, user, "07-2025", None)).await.unwrap();

        let filter = SubscriptionFilter::new().service("Netflix").user(user).start_date(month("07-2025"));
        assert_eq!(store.read_by_params(&filter).await.unwrap().id, id);

        let filter = SubscriptionFilter::new().service("Netflix").user(user).start_date(month("08-2025"));
        assert_eq!(store.read_by_params(&filter).await.unwrap_err().kind(), ErrorKind::NotFound);

        let filter = SubscriptionFilter::new().service("Netflix");
        assert_eq!(store.read_by_params(&filter).await.unwrap_err().kind(), ErrorKind::WrongParams);
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_list_ordering_and_pagination(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool);
        let user = Uuid::new_v4();
        seed_five(&store, user).await;

        let page = store.list(&SubscriptionFilter::new().user(user)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.sum_cost, 1500);
        assert_eq!(page.subscriptions[0].start_date, month("05-2024"));

        let full = store.list(&SubscriptionFilter::new().sort("cost_asc")).await.unwrap();
        let costs: Vec<i32> = full.subscriptions.iter().map(|s| s.cost).collect();
        assert!(costs.windows(2).all(|w| w[0] <= w[1]));

        let page = store
            .list(&SubscriptionFilter::new().sort("cost_asc").limit(2).offset(2))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.subscriptions, full.subscriptions[2..4].to_vec());
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_service_order_matches_memory_store(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool);
        let memory = crate::memory::MemoryStore::new();
        let user = Uuid::new_v4();
        for service in ["apple music", "Zvuk", "Netflix", "kinopoisk"] {
            let sub = new_sub(service, 100, user, "01-2024", None);
            store.create(&sub).await.unwrap();
            memory.create(&sub).await.unwrap();
        }

        for token in ["service_asc", "service_desc"] {
            let filter = SubscriptionFilter::new().sort(token);
            let services = |page: SubscriptionsPage| -> Vec<String> {
                page.subscriptions.into_iter().map(|s| s.service).collect()
            };
            assert_eq!(
                services(store.list(&filter).await.unwrap()),
                services(memory.list(&filter).await.unwrap())
            );
        }
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_list_empty_with_invalid_sort(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool);

        let page = store
            .list(&SubscriptionFilter::new().service("Nobody").sort("'; DROP TABLE subscriptions; --"))
            .await
            .unwrap();
        assert_eq!(page, SubscriptionsPage::empty());
    }

    #[sqlx::test(migrations = "../migrations")]
    #[ignore = "requires DATABASE_URL"]
    async fn test_total_cost(pool: PgPool) {
        let store = PgSubscriptionStore::new(pool);
        let user = Uuid::new_v4();
        store.create(&new_sub("Netflix", 100, user, "06-2024", Some("08-2024"))).await.unwrap();
        store.create(&new_sub("Spotify", 50, user, "01-2023", None)).await.unwrap();
        store.create(&new_sub("Kinopoisk", 10_000, user, "01-2025", None)).await.unwrap();

        let filter = SubscriptionFilter::new().between(month("01-2024"), month("12-2024"));
        assert_eq!(store.get_total_cost(&filter).await.unwrap(), 100 * 3 + 50 * 12);

        let err = store
            .get_total_cost(&SubscriptionFilter::new().start_date(month("01-2024")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WrongParams);
    }
}
