//! Poll an async condition until it holds or a deadline passes.

use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::debug;

/// Timing for [`wait_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Overall bound on the wait.
    pub timeout: Duration,
    /// Pause between two evaluations of the condition.
    pub interval: Duration,
    /// Extra pause once the condition holds, before returning.
    pub delay_after_success: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            interval: Duration::from_secs(1),
            delay_after_success: Duration::ZERO,
        }
    }
}

impl WaitOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    #[must_use]
    pub fn with_delay_after_success(mut self, delay: Duration) -> Self {
        self.delay_after_success = delay;
        self
    }
}

/// Evaluates `check` until it returns true or `options.timeout` elapses.
///
/// The condition is always evaluated at least once. Returns whether it held.
pub async fn wait_for<F, Fut>(mut check: F, options: WaitOptions) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + options.timeout;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if check().await {
            debug!(attempts, "condition met");
            if !options.delay_after_success.is_zero() {
                sleep(options.delay_after_success).await;
            }
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(attempts, timeout = ?options.timeout, "condition not met before timeout");
            return false;
        }
        sleep(options.interval.min(deadline - now)).await;
    }
}
