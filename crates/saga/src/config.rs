//! Lending policy and remote-call settings.

use std::time::Duration;

use common::Money;

/// Settings for the borrowing coordinator.
#[derive(Debug, Clone)]
pub struct LendingConfig {
    /// Maximum number of active borrowings per user.
    pub borrow_limit: u32,
    /// Default time between borrowing and due date.
    pub loan_period: chrono::Duration,
    /// Longest loan a single borrow may ask for.
    pub max_loan_period_days: u32,
    /// Fine charged per whole day overdue.
    pub fine_per_day: Money,
    /// Upper bound on a single call to the inventory service.
    pub remote_timeout: Duration,
    /// Additional attempts after a timed out or unreachable call.
    pub remote_retries: u32,
    /// Pause before the first retry; doubles on each following one.
    pub retry_backoff: Duration,
    /// Time-to-live of cached reads.
    pub cache_ttl: Duration,
    /// Pause between background reconciliation passes.
    pub reconcile_interval: Duration,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            borrow_limit: 3,
            loan_period: chrono::Duration::days(14),
            max_loan_period_days: 3650,
            fine_per_day: Money::from_dollars(1),
            remote_timeout: Duration::from_secs(2),
            remote_retries: 2,
            retry_backoff: Duration::from_millis(50),
            cache_ttl: Duration::from_secs(300),
            reconcile_interval: Duration::from_secs(30),
        }
    }
}

impl LendingConfig {
    pub fn with_borrow_limit(mut self, limit: u32) -> Self {
        self.borrow_limit = limit;
        self
    }

    pub fn with_loan_period(mut self, period: chrono::Duration) -> Self {
        self.loan_period = period;
        self
    }

    pub fn with_max_loan_period_days(mut self, days: u32) -> Self {
        self.max_loan_period_days = days;
        self
    }

    pub fn with_fine_per_day(mut self, rate: Money) -> Self {
        self.fine_per_day = rate;
        self
    }

    pub fn with_remote_timeout(mut self, timeout: Duration, retries: u32) -> Self {
        self.remote_timeout = timeout;
        self.remote_retries = retries;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_reconcile_interval(mut self, interval: Duration) -> Self {
        self.reconcile_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_library_policy() {
        let config = LendingConfig::default();
        assert_eq!(config.borrow_limit, 3);
        assert_eq!(config.loan_period, chrono::Duration::days(14));
        assert_eq!(config.fine_per_day.cents(), 100);
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.max_loan_period_days, 3650);
    }

    #[test]
    fn builders_override_fields() {
        let config = LendingConfig::default()
            .with_borrow_limit(5)
            .with_remote_timeout(Duration::from_millis(10), 0);
        assert_eq!(config.borrow_limit, 5);
        assert_eq!(config.remote_timeout, Duration::from_millis(10));
        assert_eq!(config.remote_retries, 0);
    }
}
