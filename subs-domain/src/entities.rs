//! Domain entities
//!
//! A subscription is identified by a store-assigned id and, naturally, by
//! the `(service, user_id, start_date)` triple, which is unique.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{DomainError, Month};

/// Store-assigned subscription identifier
pub type SubscriptionId = i64;

/// Owning user identifier
pub type UserId = Uuid;

// =============================================================================
// NewSubscription
// =============================================================================

/// Every field of a subscription except its identifier.
///
/// Input of create and update. Construct through [`NewSubscription::new`]
/// to enforce the invariants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSubscription {
    /// Display name of the subscribed service
    pub service: String,
    /// Monthly cost, non-negative
    pub cost: i32,
    /// Owning user
    pub user_id: UserId,
    /// First active month
    pub start_date: Month,
    /// Last active month, `None` while still active
    pub end_date: Option<Month>,
}

impl NewSubscription {
    /// Create a validated subscription payload
    ///
    /// The service name is trimmed.
    ///
    /// # Errors
    /// - `DomainError::InvalidService` if the service name is blank
    /// - `DomainError::InvalidCost` if cost < 0
    /// - `DomainError::InvalidPeriod` if end_date precedes start_date
    pub fn new(
        service: impl Into<String>,
        cost: i32,
        user_id: UserId,
        start_date: Month,
        end_date: Option<Month>,
    ) -> Result<Self, DomainError> {
        let new = Self {
            service: service.into().trim().to_string(),
            cost,
            user_id,
            start_date,
            end_date,
        };
        new.validate()?;
        Ok(new)
    }

    /// Check the entity invariants
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.service.trim().is_empty() {
            return Err(DomainError::InvalidService("service name must not be empty".to_string()));
        }
        if self.cost < 0 {
            return Err(DomainError::InvalidCost(format!(
                "cost must be non-negative, got {}",
                self.cost
            )));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(DomainError::InvalidPeriod(format!(
                    "end date {} precedes start date {}",
                    end, self.start_date
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// A persisted subscription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Store-assigned identifier, immutable
    pub id: SubscriptionId,
    /// Display name of the subscribed service
    pub service: String,
    /// Monthly cost, non-negative
    pub cost: i32,
    /// Owning user
    pub user_id: UserId,
    /// First active month
    pub start_date: Month,
    /// Last active month, `None` while still active
    pub end_date: Option<Month>,
}

impl Subscription {
    /// Attach an identifier to a payload
    pub fn from_new(id: SubscriptionId, new: NewSubscription) -> Self {
        Self {
            id,
            service: new.service,
            cost: new.cost,
            user_id: new.user_id,
            start_date: new.start_date,
            end_date: new.end_date,
        }
    }

    /// Replace every mutable field, keeping the identifier
    pub fn apply(&mut self, updated: &NewSubscription) {
        self.service = updated.service.clone();
        self.cost = updated.cost;
        self.user_id = updated.user_id;
        self.start_date = updated.start_date;
        self.end_date = updated.end_date;
    }

    /// Whether this subscription shares its natural key with `other`
    pub fn same_key(&self, other: &NewSubscription) -> bool {
        self.service == other.service
            && self.user_id == other.user_id
            && self.start_date == other.start_date
    }

    /// Whether the subscription is active at any point of `[from, to]`
    pub fn is_active_within(&self, from: Month, to: Month) -> bool {
        self.start_date <= to && self.end_date.map_or(true, |end| end >= from)
    }
}

impl From<Subscription> for NewSubscription {
    fn from(sub: Subscription) -> Self {
        Self {
            service: sub.service,
            cost: sub.cost,
            user_id: sub.user_id,
            start_date: sub.start_date,
            end_date: sub.end_date,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
