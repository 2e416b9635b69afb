//! Month-interval arithmetic for period cost aggregation

use crate::entities::Subscription;
use crate::value_objects::Month;

/// Number of calendar months shared by a query window and a subscription.
///
/// Both intervals are inclusive at month granularity; `sub_end = None`
/// means the subscription is still active. Returns 0 when the intervals do
/// not intersect, including when `window_end < window_start`.
///
/// # Examples
/// ```
/// # use subs_domain::{overlapped_months, Month};
/// let m = |s: &str| Month::parse(s).unwrap();
/// assert_eq!(overlapped_months(m("01-2024"), m("12-2024"), m("06-2024"), Some(m("08-2024"))), 3);
/// assert_eq!(overlapped_months(m("01-2024"), m("12-2024"), m("01-2023"), None), 12);
/// assert_eq!(overlapped_months(m("01-2024"), m("12-2024"), m("01-2025"), None), 0);
/// ```
pub fn overlapped_months(
    window_start: Month,
    window_end: Month,
    sub_start: Month,
    sub_end: Option<Month>,
) -> i64 {
    let effective_start = window_start.max(sub_start);
    let effective_end = match sub_end {
        Some(end) => window_end.min(end),
        None => window_end,
    };

    if effective_end < effective_start {
        return 0;
    }
    effective_end.ordinal() - effective_start.ordinal() + 1
}

impl Subscription {
    /// Months this subscription is active within `[from, to]`
    pub fn overlapped_months(&self, from: Month, to: Month) -> i64 {
        overlapped_months(from, to, self.start_date, self.end_date)
    }

    /// Cost accrued within `[from, to]`: monthly cost times overlapped months
    pub fn cost_within(&self, from: Month, to: Month) -> i64 {
        i64::from(self.cost) * self.overlapped_months(from, to)
    }
}
