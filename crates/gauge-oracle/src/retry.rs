//! Exponential backoff for transient oracle failures

use gauge_core::config::OracleSettings;
use std::time::Duration;

/// Retry schedule for one artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Retries after the first call
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Total sleep allowed per artifact
    pub max_total: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_settings(&OracleSettings::default())
    }
}

impl BackoffPolicy {
    pub fn from_settings(settings: &OracleSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_total: Duration::from_millis(settings.max_backoff_total_ms),
        }
    }

    /// Uncapped delay before retry `n` (1-based): `base * 2^(n-1)`
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    /// Delay before retry `n` given the sleep already spent on this artifact.
    ///
    /// Returns `None` once retries or the sleep budget are exhausted. The last
    /// delay is shortened to fit the remaining budget.
    pub fn next_delay(&self, retry: u32, slept: Duration) -> Option<Duration> {
        if retry == 0 || retry > self.max_retries {
            return None;
        }
        let remaining = self.max_total.saturating_sub(slept);
        if remaining.is_zero() {
            return None;
        }
        Some(self.delay_for(retry).min(remaining))
    }

    /// Like `next_delay`, but never shorter than a server-provided
    /// `retry-after`, still capped by the remaining sleep budget
    pub fn next_delay_after(
        &self,
        retry: u32,
        slept: Duration,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        let delay = self.next_delay(retry, slept)?;
        let remaining = self.max_total.saturating_sub(slept);
        Some(retry_after.map_or(delay, |hint| delay.max(hint)).min(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> BackoffPolicy {
        BackoffPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_total: Duration::from_secs(30),
        }
    }

    #[test]
    fn test_delays_double() {
        let p = policy();
        assert_eq!(p.delay_for(1), Duration::from_secs(2));
        assert_eq!(p.delay_for(2), Duration::from_secs(4));
        assert_eq!(p.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn test_retries_exhausted() {
        let p = policy();
        assert!(p.next_delay(3, Duration::from_secs(6)).is_some());
        assert_eq!(p.next_delay(4, Duration::from_secs(14)), None);
        assert_eq!(p.next_delay(0, Duration::ZERO), None);
    }

    #[test]
    fn test_total_sleep_cap() {
        let p = BackoffPolicy {
            max_retries: 10,
            ..policy()
        };
        // 2 + 4 + 8 = 14 slept; the next 16s delay is cut to the 16s left
        assert_eq!(p.next_delay(4, Duration::from_secs(14)), Some(Duration::from_secs(16)));
        assert_eq!(p.next_delay(5, Duration::from_secs(25)), Some(Duration::from_secs(5)));
        assert_eq!(p.next_delay(6, Duration::from_secs(30)), None);
    }

    #[test]
    fn test_retry_after_is_a_lower_bound() {
        let p = policy();
        let hint = |secs| Some(Duration::from_secs(secs));
        // Longer server hint wins over the 2s schedule
        assert_eq!(p.next_delay_after(1, Duration::ZERO, hint(10)), Some(Duration::from_secs(10)));
        // Shorter hint leaves the schedule alone
        assert_eq!(p.next_delay_after(3, Duration::from_secs(6), hint(1)), Some(Duration::from_secs(8)));
        assert_eq!(p.next_delay_after(1, Duration::ZERO, None), Some(Duration::from_secs(2)));
        // The budget still caps the hint
        assert_eq!(p.next_delay_after(2, Duration::from_secs(25), hint(60)), Some(Duration::from_secs(5)));
        assert_eq!(p.next_delay_after(4, Duration::ZERO, hint(1)), None);
    }

    #[test]
    fn test_defaults_from_settings() {
        let p = BackoffPolicy::default();
        assert_eq!(p.max_retries, 3);
        assert_eq!(p.base_delay, Duration::from_millis(2000));
        assert_eq!(p.max_total, Duration::from_millis(30000));
    }
}
