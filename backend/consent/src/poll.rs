//! Bounded polling: re-run a check at a fixed interval until it yields a
//! value or the budget runs out.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Total budget and spacing for a poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollPolicy {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

/// Run `check` until it returns `Ok(Some(_))`, returns an error, or
/// `policy.timeout` elapses.
///
/// The check gets the remaining budget and is cut off when it runs out, so a
/// check that never resolves still ends the loop on time. The first attempt
/// happens immediately. `Ok(None)` means the budget ran out.
pub async fn poll_until<T, E, F, Fut>(policy: PollPolicy, mut check: F) -> Result<Option<T>, E>
where
    F: FnMut(Duration) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut attempt: u32 = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            debug!(attempts = attempt, timeout_ms = policy.timeout.as_millis() as u64, "Poll budget exhausted");
            return Ok(None);
        }

        attempt += 1;
        match tokio::time::timeout(remaining, check(remaining)).await {
            Ok(Ok(Some(value))) => return Ok(Some(value)),
            Ok(Ok(None)) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Ok(None),
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::time::sleep(policy.interval.min(remaining)).await;
    }
}
