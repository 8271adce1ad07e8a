//! Backoff for throttled and failing Blob service calls
//!
//! The service answers overload with `503 Server Busy` or `429` and usually
//! names a `Retry-After` interval. The policy doubles its own delay per
//! attempt but never waits less than the service asked for.

use blobsync_types::{Error, Result};
use std::time::Duration;

/// Retry policy for transient Blob service failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub base_delay: Duration,
    /// Upper bound on any single delay, service hints included
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `base_delay` may not exceed `max_delay`
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Result<Self> {
        if base_delay > max_delay {
            return Err(Error::config(format!(
                "retry base delay {base_delay:?} exceeds max delay {max_delay:?}"
            )));
        }
        Ok(Self {
            max_retries,
            base_delay,
            max_delay,
        })
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether retry number `attempt` (zero-based) may run after `error`
    pub fn should_retry(&self, attempt: u32, error: &Error) -> bool {
        error.is_retryable() && attempt < self.max_retries
    }

    /// Own backoff for retry number `attempt`: `base_delay * 2^attempt`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }

    /// Delay before retry number `attempt`, honouring the service's hint
    pub fn delay_for(&self, attempt: u32, error: &Error) -> Duration {
        let own = self.backoff(attempt);
        error
            .retry_after()
            .map_or(own, |hint| hint.max(own))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Parse a `Retry-After` value given in whole seconds
///
/// The Blob service never sends the HTTP-date form, so anything else is
/// ignored.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(700)).unwrap()
    }

    #[rstest]
    #[case(0, 100)]
    #[case(1, 200)]
    #[case(2, 400)]
    #[case(3, 700)]
    #[case(40, 700)]
    fn test_backoff_doubles_up_to_cap(#[case] attempt: u32, #[case] millis: u64) {
        assert_eq!(policy().backoff(attempt), Duration::from_millis(millis));
    }

    #[test]
    fn test_service_hint_extends_but_never_exceeds_cap() {
        let policy = policy();
        let short = Error::throttled("busy", Some(Duration::from_millis(50)));
        let medium = Error::throttled("busy", Some(Duration::from_millis(500)));
        let long = Error::throttled("busy", Some(Duration::from_secs(30)));

        assert_eq!(policy.delay_for(1, &short), Duration::from_millis(200));
        assert_eq!(policy.delay_for(1, &medium), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1, &long), Duration::from_millis(700));
    }

    #[test]
    fn test_only_retryable_errors_within_budget() {
        let policy = policy();
        assert!(policy.should_retry(4, &Error::transient("reset")));
        assert!(!policy.should_retry(5, &Error::transient("reset")));
        assert!(!policy.should_retry(0, &Error::from_status(403, "denied")));
        assert!(!RetryPolicy::none().should_retry(0, &Error::transient("reset")));
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        assert!(RetryPolicy::new(1, Duration::from_secs(2), Duration::from_secs(1)).is_err());
    }

    #[rstest]
    #[case("12", Some(Duration::from_secs(12)))]
    #[case(" 3 ", Some(Duration::from_secs(3)))]
    #[case("Wed, 21 Oct 2015 07:28:00 GMT", None)]
    fn test_parse_retry_after(#[case] value: &str, #[case] expected: Option<Duration>) {
        assert_eq!(parse_retry_after(value), expected);
    }
}
