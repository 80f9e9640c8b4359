//! Overdue fine calculation.
//!
//! Inputs are `DateTime<Utc>`; naive or offset timestamps are normalized by
//! `common::time` before they get here.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Money;

/// Whole days between `due_at` and `at`, rounded down. Zero when not late.
pub fn days_overdue(due_at: DateTime<Utc>, at: DateTime<Utc>) -> u32 {
    if at <= due_at {
        return 0;
    }
    u32::try_from((at - due_at).num_days()).unwrap_or(u32::MAX)
}

/// Fine owed for a loan returned (or assessed) at `returned_at_or_now`.
///
/// A timestamp earlier than `borrowed_at`, which can only come from clock
/// skew between services, is clamped to `borrowed_at`.
pub fn fine(
    borrowed_at: DateTime<Utc>,
    due_at: DateTime<Utc>,
    returned_at_or_now: DateTime<Utc>,
    rate_per_day: Money,
) -> Money {
    let at = returned_at_or_now.max(borrowed_at);
    rate_per_day.multiply(days_overdue(due_at, at))
}

/// Fine rate applied by the borrowing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePolicy {
    pub rate_per_day: Money,
}

impl FinePolicy {
    pub fn new(rate_per_day: Money) -> Self {
        Self { rate_per_day }
    }

    pub fn assess(
        &self,
        borrowed_at: DateTime<Utc>,
        due_at: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Money {
        fine(borrowed_at, due_at, at, self.rate_per_day)
    }
}

impl Default for FinePolicy {
    /// One dollar per day.
    fn default() -> Self {
        Self::new(Money::from_dollars(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn six_days_late_at_one_dollar() {
        let now = now();
        let amount = fine(
            now - Duration::days(20),
            now - Duration::days(6),
            now,
            Money::from_dollars(1),
        );
        assert_eq!(amount, Money::from_cents(600));
        assert_eq!(amount.to_string(), "$6.00");
    }

    #[test]
    fn on_time_return_is_free() {
        let now = now();
        let due = now + Duration::days(1);
        assert!(fine(now - Duration::days(13), due, now, Money::from_dollars(1)).is_zero());
        assert!(fine(now - Duration::days(14), now, now, Money::from_dollars(1)).is_zero());
    }

    #[test]
    fn partial_days_round_down() {
        let due = now();
        let at = due + Duration::days(2) + Duration::hours(23);
        assert_eq!(days_overdue(due, at), 2);
        assert_eq!(days_overdue(due, due + Duration::hours(5)), 0);
    }

    #[test]
    fn timestamp_before_borrow_is_clamped() {
        let borrowed = now();
        let due = borrowed + Duration::days(14);
        let skewed = borrowed - Duration::days(30);
        assert!(fine(borrowed, due, skewed, Money::from_dollars(1)).is_zero());
    }

    #[test]
    fn policy_uses_its_rate() {
        let policy = FinePolicy::new(Money::from_cents(25));
        let due = now();
        let amount = policy.assess(due - Duration::days(14), due, due + Duration::days(4));
        assert_eq!(amount.cents(), 100);
        assert_eq!(FinePolicy::default().rate_per_day, Money::from_dollars(1));
    }
}
