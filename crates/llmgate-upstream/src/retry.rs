use std::time::Duration;

/// Backoff schedule for retryable upstream failures.
///
/// `delay(n)` is `base_delay * 2^n`: a pure function of the attempt index
/// with no jitter and no cap. Large retry budgets therefore produce very
/// long tail delays; callers pick the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    Success,
    /// Retrying cannot help; terminal regardless of remaining budget.
    Auth,
    /// Rate limiting or upstream server trouble; retry with backoff.
    Retryable,
    /// Any other non-2xx; terminal without retry.
    Terminal,
}

pub fn classify_status(status: u16) -> StatusClass {
    match status {
        200..=299 => StatusClass::Success,
        401 | 403 => StatusClass::Auth,
        429 | 500..=599 => StatusClass::Retryable,
        _ => StatusClass::Terminal,
    }
}
