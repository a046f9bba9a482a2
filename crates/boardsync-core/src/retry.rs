use crate::error::Result;
use std::time::Duration;

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry for external calls: up to `attempts` invocations with a
/// fixed blocking delay between them.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// No delay between attempts. Keeps engine tests fast.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Invoke `op` until it succeeds or the policy is exhausted, sleeping
/// `policy.delay` between attempts. Only transient errors are retried;
/// anything else surfaces immediately. On exhaustion the last error is
/// returned, earlier ones are discarded.
pub fn retry<T>(policy: &RetryPolicy, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let mut last_err = None;
    for attempt in 1..=policy.attempts.max(1) {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if !e.is_transient() => return Err(e),
            Err(e) => {
                tracing::debug!(attempt, error = %e, "retrying after transient failure");
                last_err = Some(e);
                if attempt < policy.attempts {
                    std::thread::sleep(policy.delay);
                }
            }
        }
    }
    // attempts >= 1, so last_err is set when we fall through.
    Err(last_err.expect("retry ran at least once"))
}
