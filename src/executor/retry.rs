use super::{ExecutionResult, FailureKind};
use rand::Rng;
use std::time::Duration;

/// Backoff policy for caller-driven resubmission of failed tasks.
///
/// The executor never retries on its own; see
/// [`crate::executor::TaskExecutor::run_with_retry`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first run
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
    pub retry_on_timeout: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: true,
            retry_on_timeout: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Default::default()
        }
    }

    /// Single attempt, no resubmission
    pub fn never() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    /// Whether the run that just finished as `attempt` should be resubmitted
    pub fn should_retry(&self, result: &ExecutionResult, attempt: u32) -> bool {
        if result.success || attempt >= self.max_attempts {
            return false;
        }

        match result.error_kind {
            Some(FailureKind::NotFound) => false,
            Some(FailureKind::Timeout) => self.retry_on_timeout,
            Some(FailureKind::Fault) | Some(FailureKind::NonZeroExit) | None => true,
        }
    }

    /// Exponential backoff after `attempt` (1-based), capped at `max_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.pow(exponent))
            .min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            let spread = delay.as_millis() as u64 / 4;
            let extra = rand::rng().random_range(0..=spread);
            (delay + Duration::from_millis(extra)).min(self.max_delay)
        } else {
            delay
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn failed(kind: Option<FailureKind>) -> ExecutionResult {
        ExecutionResult {
            task_id: Uuid::new_v4(),
            success: false,
            output: String::new(),
            error: "boom".to_string(),
            error_kind: kind,
            duration_seconds: 0.1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_exponential_backoff_without_jitter() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_jitter(false)
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(10));

        for _ in 0..50 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn test_retry_classification() {
        let policy = RetryPolicy::new(3, Duration::ZERO);

        assert!(policy.should_retry(&failed(Some(FailureKind::Fault)), 1));
        assert!(policy.should_retry(&failed(Some(FailureKind::NonZeroExit)), 2));
        assert!(!policy.should_retry(&failed(Some(FailureKind::Fault)), 3));
        assert!(!policy.should_retry(&failed(Some(FailureKind::NotFound)), 1));
        assert!(!policy.should_retry(&failed(Some(FailureKind::Timeout)), 1));

        let timeouts = policy.clone().retry_on_timeout(true);
        assert!(timeouts.should_retry(&failed(Some(FailureKind::Timeout)), 1));
    }

    #[test]
    fn test_success_is_never_retried() {
        let policy = RetryPolicy::default();
        let mut result = failed(None);
        result.success = true;
        assert!(!policy.should_retry(&result, 1));
        assert!(!RetryPolicy::never().should_retry(&failed(None), 1));
    }
}
