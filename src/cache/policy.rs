//! Regeneration timing policy: dead-claim watchdog and failure backoff.

use chrono::{DateTime, Duration, Utc};

/// Timing rules the store applies to claims and failed regenerations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegenerationPolicy {
    watchdog: Duration,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl RegenerationPolicy {
    pub fn new(
        watchdog: std::time::Duration,
        backoff_base: std::time::Duration,
        backoff_max: std::time::Duration,
    ) -> Self {
        Self {
            watchdog: to_chrono(watchdog),
            backoff_base: to_chrono(backoff_base),
            backoff_max: to_chrono(backoff_max),
        }
    }

    /// Maximum time a record may stay in `regenerating` before it can be reclaimed.
    pub fn watchdog(&self) -> Duration {
        self.watchdog
    }

    /// Delay before the next claim after `failures` consecutive failures:
    /// `base * 2^(failures - 1)`, capped at the configured maximum.
    pub fn backoff(&self, failures: u32) -> Duration {
        if failures == 0 {
            return Duration::zero();
        }
        let exponent = failures - 1;
        let factor = if exponent >= 30 { i32::MAX } else { 1i32 << exponent };
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |d| d.min(self.backoff_max))
    }

    /// Instant at which a claim taken at `claimed_at` stops protecting the record.
    pub fn claim_deadline(&self, claimed_at: DateTime<Utc>) -> DateTime<Utc> {
        saturating_add(claimed_at, self.watchdog)
    }

    /// Claims taken at or before this instant are dead at `now`.
    pub fn watchdog_cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.watchdog)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Earliest instant a record that just failed for the `failures`-th time may be claimed.
    pub fn retry_after(&self, now: DateTime<Utc>, failures: u32) -> DateTime<Utc> {
        saturating_add(now, self.backoff(failures))
    }
}

impl Default for RegenerationPolicy {
    fn default() -> Self {
        Self::new(
            std::time::Duration::from_secs(600),
            std::time::Duration::from_secs(60),
            std::time::Duration::from_secs(6 * 3600),
        )
    }
}

/// `at + by`, clamped to the latest representable instant.
pub fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn to_chrono(d: std::time::Duration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}
