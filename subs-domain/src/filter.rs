//! Query criteria and results
//!
//! `SubscriptionFilter` is a sparse set of predicates: every field left as
//! `None` means "no constraint on this dimension". Its date fields mean
//! different things per operation:
//!
//! - point lookup treats `start_date` as equality on the natural key
//!   (see [`SubscriptionFilter::natural_key`])
//! - listing and cost aggregation treat `start_date`/`end_date` as a query
//!   window that a subscription's active interval must intersect
//!   (see [`SubscriptionFilter::query_window`])

use serde::Serialize;
use std::cmp::Ordering;

use crate::entities::{Subscription, UserId};
use crate::value_objects::Month;

// =============================================================================
// SubscriptionFilter
// =============================================================================

/// Sparse lookup, listing and aggregation criteria
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionFilter {
    /// Exact service name
    pub service: Option<String>,
    /// Exact cost
    pub cost: Option<i32>,
    /// Owning user
    pub user_id: Option<UserId>,
    /// Window start (or natural-key start month for point lookup)
    pub start_date: Option<Month>,
    /// Window end
    pub end_date: Option<Month>,
    /// Page size; `<= 0` means no limit
    pub limit: Option<i64>,
    /// Rows to skip; `<= 0` means no offset
    pub offset: Option<i64>,
    /// Raw sort token, see [`SortOrder::from_token`]
    pub sort: Option<String>,
}

impl SubscriptionFilter {
    /// Create an empty (unconstrained) filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by service name
    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Filter by cost
    pub fn cost(mut self, cost: i32) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Filter by owning user
    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Set the start month
    pub fn start_date(mut self, month: Month) -> Self {
        self.start_date = Some(month);
        self
    }

    /// Set the end month
    pub fn end_date(mut self, month: Month) -> Self {
        self.end_date = Some(month);
        self
    }

    /// Set both window bounds
    pub fn between(self, from: Month, to: Month) -> Self {
        self.start_date(from).end_date(to)
    }

    /// Limit results
    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip results
    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Sort token
    pub fn sort(mut self, token: impl Into<String>) -> Self {
        self.sort = Some(token.into());
        self
    }

    /// Windowed interpretation of the date fields.
    ///
    /// A single present bound collapses the window onto itself, so a
    /// start-only or end-only filter means "active in this month".
    pub fn query_window(&self) -> Option<(Month, Month)> {
        match (self.start_date, self.end_date) {
            (Some(from), Some(to)) => Some((from, to)),
            (Some(only), None) | (None, Some(only)) => Some((only, only)),
            (None, None) => None,
        }
    }

    /// Natural key `(service, user_id, start_date)` if all three are present
    pub fn natural_key(&self) -> Option<(&str, UserId, Month)> {
        match (&self.service, self.user_id, self.start_date) {
            (Some(service), Some(user_id), Some(start)) => Some((service.as_str(), user_id, start)),
            _ => None,
        }
    }

    /// Names of the natural-key fields that are missing
    pub fn missing_key_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.service.is_none() {
            missing.push("service");
        }
        if self.user_id.is_none() {
            missing.push("user_id");
        }
        if self.start_date.is_none() {
            missing.push("start_date");
        }
        missing
    }

    /// Resolved ordering (falls back to the default for unknown tokens)
    pub fn sort_order(&self) -> SortOrder {
        self.sort.as_deref().and_then(SortOrder::from_token).unwrap_or_default()
    }

    /// Effective limit, `None` when unbounded
    pub fn effective_limit(&self) -> Option<i64> {
        self.limit.filter(|l| *l > 0)
    }

    /// Effective offset, `None` when zero
    pub fn effective_offset(&self) -> Option<i64> {
        self.offset.filter(|o| *o > 0)
    }

    /// Evaluate the windowed predicate against one subscription
    pub fn matches(&self, sub: &Subscription) -> bool {
        if self.service.as_deref().is_some_and(|s| s != sub.service) {
            return false;
        }
        if self.user_id.is_some_and(|u| u != sub.user_id) {
            return false;
        }
        if self.cost.is_some_and(|c| c != sub.cost) {
            return false;
        }
        match self.query_window() {
            Some((from, to)) => sub.is_active_within(from, to),
            None => true,
        }
    }
}

// =============================================================================
// SortOrder
// =============================================================================

/// Listing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// `cost_asc`
    CostAsc,
    /// `cost_desc`
    CostDesc,
    /// `service_asc`
    ServiceAsc,
    /// `service_desc`
    ServiceDesc,
    /// `start_date`
    StartDateAsc,
    /// Newest first
    #[default]
    StartDateDesc,
}

impl SortOrder {
    /// Parse a sort token; `None` for unknown tokens
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "cost_asc" => Some(Self::CostAsc),
            "cost_desc" => Some(Self::CostDesc),
            "service_asc" => Some(Self::ServiceAsc),
            "service_desc" => Some(Self::ServiceDesc),
            "start_date" => Some(Self::StartDateAsc),
            _ => None,
        }
    }

    /// Compare two subscriptions in this order, ties broken by ascending id
    ///
    /// Service names compare byte-wise, matching `COLLATE "C"` in SQL, so
    /// upper case sorts before lower case.
    pub fn compare(&self, a: &Subscription, b: &Subscription) -> Ordering {
        let primary = match self {
            Self::CostAsc => a.cost.cmp(&b.cost),
            Self::CostDesc => b.cost.cmp(&a.cost),
            Self::ServiceAsc => a.service.cmp(&b.service),
            Self::ServiceDesc => b.service.cmp(&a.service),
            Self::StartDateAsc => a.start_date.cmp(&b.start_date),
            Self::StartDateDesc => b.start_date.cmp(&a.start_date),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

// =============================================================================
// SubscriptionsPage
// =============================================================================

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubscriptionsPage {
    /// Matching subscriptions inside the limit/offset window
    pub subscriptions: Vec<Subscription>,
    /// Number of matches ignoring pagination
    pub total: i64,
    /// Sum of `cost` over all matches ignoring pagination
    pub sum_cost: i64,
}

impl SubscriptionsPage {
    /// Page with no matches
    pub fn empty() -> Self {
        Self::default()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::NewSubscription;
    use uuid::Uuid;

    fn month(s: &str) -> Month {
        Month::parse(s).unwrap()
    }

    fn sub(id: i64, service: &str, cost: i32, start: &str) -> Subscription {
        Subscription::from_new(
            id,
            NewSubscription::new(service, cost, Uuid::nil(), month(start), None).unwrap(),
        )
    }

    #[test]
    fn test_query_window_collapses_single_bound() {
        let jan = month("01-2024");
        let dec = month("12-2024");

        assert_eq!(SubscriptionFilter::new().query_window(), None);
        assert_eq!(SubscriptionFilter::new().between(jan, dec).query_window(), Some((jan, dec)));
        assert_eq!(SubscriptionFilter::new().start_date(jan).query_window(), Some((jan, jan)));
        assert_eq!(SubscriptionFilter::new().end_date(dec).query_window(), Some((dec, dec)));
    }

    #[test]
    fn test_natural_key_requires_all_three() {
        let user = Uuid::new_v4();
        let start = month("01-2024");

        let full = SubscriptionFilter::new().service("Netflix").user(user).start_date(start);
        assert_eq!(full.natural_key(), Some(("Netflix", user, start)));
        assert!(full.missing_key_fields().is_empty());

        let partial = SubscriptionFilter::new().service("Netflix");
        assert!(partial.natural_key().is_none());
        assert_eq!(partial.missing_key_fields(), vec!["user_id", "start_date"]);
    }

    #[test]
    fn test_sort_order_tokens() {
        assert_eq!(SortOrder::from_token("cost_asc"), Some(SortOrder::CostAsc));
        assert_eq!(SortOrder::from_token("start_date"), Some(SortOrder::StartDateAsc));
        assert_eq!(SortOrder::from_token("bogus"), None);

        assert_eq!(SubscriptionFilter::new().sort_order(), SortOrder::StartDateDesc);
        assert_eq!(SubscriptionFilter::new().sort("bogus").sort_order(), SortOrder::StartDateDesc);
        assert_eq!(SubscriptionFilter::new().sort("service_desc").sort_order(), SortOrder::ServiceDesc);
    }

    #[test]
    fn test_sort_compare_breaks_ties_by_id() {
        let a = sub(1, "Netflix", 100, "01-2024");
        let b = sub(2, "Spotify", 100, "01-2024");

        assert_eq!(SortOrder::CostAsc.compare(&a, &b), Ordering::Less);
        assert_eq!(SortOrder::CostDesc.compare(&a, &b), Ordering::Less);
        assert_eq!(SortOrder::ServiceDesc.compare(&a, &b), Ordering::Greater);
    }

    #[test]
    fn test_effective_pagination() {
        let filter = SubscriptionFilter::new().limit(0).offset(-3);
        assert_eq!(filter.effective_limit(), None);
        assert_eq!(filter.effective_offset(), None);

        let filter = SubscriptionFilter::new().limit(5).offset(10);
        assert_eq!(filter.effective_limit(), Some(5));
        assert_eq!(filter.effective_offset(), Some(10));
    }

    #[test]
    fn test_matches_applies_window_and_equality() {
        let s = sub(1, "Netflix", 100, "03-2024");

        assert!(SubscriptionFilter::new().matches(&s));
        assert!(SubscriptionFilter::new().service("Netflix").cost(100).matches(&s));
        assert!(!SubscriptionFilter::new().service("Spotify").matches(&s));
        assert!(!SubscriptionFilter::new().cost(101).matches(&s));
        assert!(!SubscriptionFilter::new().user(Uuid::new_v4()).matches(&s));

        // Open-ended: active from 03-2024 onwards
        assert!(SubscriptionFilter::new().start_date(month("07-2030")).matches(&s));
        assert!(!SubscriptionFilter::new().end_date(month("02-2024")).matches(&s));
    }

    #[test]
    fn test_service_order_is_bytewise() {
        let lower = sub(1, "apple music", 100, "01-2024");
        let upper = sub(2, "Zvuk", 100, "01-2024");

        assert_eq!(SortOrder::ServiceAsc.compare(&upper, &lower), Ordering::Less);
        assert_eq!(SortOrder::ServiceDesc.compare(&lower, &upper), Ordering::Less);
    }
}
