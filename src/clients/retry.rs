//! Retry budget for provider calls.

use std::time::Duration;

use super::errors::ProviderError;

/// How often and how long to wait between provider call attempts.
///
/// - Rate limiting waits for the provider's `retry_after`, or
///   `default_rate_limit_delay` when none is given.
/// - Transport failures wait `attempt * base_delay`.
///
/// Both count against the same `max_attempts` budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Backoff unit for transport failures.
    pub base_delay: Duration,
    /// Wait applied when the provider rate limits without a delay.
    pub default_rate_limit_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            default_rate_limit_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff after transport failure number `attempt` (1-based).
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }

    /// Returns the wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, error: &ProviderError, attempt: u32) -> Duration {
        match error {
            ProviderError::RateLimited {
                retry_after: Some(seconds),
            } => Duration::from_secs(*seconds),
            ProviderError::RateLimited { retry_after: None } => self.default_rate_limit_delay,
            _ => self.delay_for_attempt(attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_error() -> ProviderError {
        ProviderError::Decode {
            status: 502,
            message: "not json".to_string(),
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_transport_backoff_grows_linearly_with_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(&decode_error(), 1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(&decode_error(), 2), Duration::from_secs(2));
    }

    #[test]
    fn test_rate_limit_uses_provider_delay() {
        let policy = RetryPolicy::default();
        let error = ProviderError::RateLimited {
            retry_after: Some(5),
        };
        assert_eq!(policy.delay_after(&error, 1), Duration::from_secs(5));
    }

    #[test]
    fn test_rate_limit_without_delay_uses_default() {
        let policy = RetryPolicy {
            default_rate_limit_delay: Duration::from_millis(250),
            ..RetryPolicy::default()
        };
        let error = ProviderError::RateLimited { retry_after: None };
        assert_eq!(policy.delay_after(&error, 2), Duration::from_millis(250));
    }
}
