use chrono::{DateTime, Duration, Utc};

use campusops_core::Money;

/// Time limits and fine schedule for lending.
///
/// One fine rate applies everywhere fines are assessed (on return requests,
/// on staff returns, and on read-triggered overdue refreshes).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingPolicy {
    /// How long an approved reservation waits for pickup.
    pub reservation_window: Duration,
    /// Loan length from collection to due date.
    pub loan_period: Duration,
    pub fine_per_day: Money,
}

impl Default for LendingPolicy {
    fn default() -> Self {
        Self {
            reservation_window: Duration::hours(24),
            loan_period: Duration::days(14),
            fine_per_day: Money::from_major(5),
        }
    }
}

impl LendingPolicy {
    /// Fine owed for a loan due at `due`, or `None` if it isn't late.
    ///
    /// Partial days round up: one second late is one day late.
    pub fn fine_for(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> Option<Money> {
        if now <= due {
            return None;
        }

        let late = now - due;
        let day_secs = Duration::days(1).num_seconds();
        let secs = late.num_seconds() + i64::from(late.subsec_nanos() > 0);
        let days = (secs + day_secs - 1) / day_secs;

        Some(self.fine_per_day.times(days))
    }

    /// Whether a reservation that started at `reserved_at` has lapsed.
    pub fn reservation_expired(&self, reserved_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - reserved_at > self.reservation_window
    }

    pub fn due_date_from(&self, collected_at: DateTime<Utc>) -> DateTime<Utc> {
        collected_at + self.loan_period
    }
}
