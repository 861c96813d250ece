//! Bounded retry with pluggable backoff.
//!
//! Both the store connector and the queue client retry their initial connect
//! through [`retry_with_backoff`]. The delay sequence comes from a
//! [`BackoffPolicy`], so tuning it never touches connector code.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rand::Rng;
use tokio_retry::strategy::FixedInterval;

/// How the delay between attempts grows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffPolicy {
    /// The same delay before every retry.
    Fixed(Duration),
    /// `base`, `2 * base`, `4 * base`, ... capped at `max`.
    Exponential {
        /// First delay
        base: Duration,
        /// Upper bound for any delay
        max: Duration,
    },
    /// Exponential delays where each one is drawn from `[d/2, d]`.
    Jittered {
        /// First delay before jitter
        base: Duration,
        /// Upper bound for any delay
        max: Duration,
    },
}

impl BackoffPolicy {
    /// Delays to sleep between `max_attempts` attempts.
    ///
    /// `max_attempts` attempts need `max_attempts - 1` delays; the iterator is
    /// empty when a single attempt is allowed.
    pub fn delays(&self, max_attempts: usize) -> Box<dyn Iterator<Item = Duration> + Send> {
        let retries = max_attempts.saturating_sub(1);
        match *self {
            BackoffPolicy::Fixed(delay) => Box::new(FixedInterval::new(delay).take(retries)),
            BackoffPolicy::Exponential { base, max } => {
                Box::new(doubling(base, max).take(retries))
            }
            BackoffPolicy::Jittered { base, max } => {
                Box::new(doubling(base, max).take(retries).map(jitter))
            }
        }
    }
}

fn doubling(base: Duration, max: Duration) -> impl Iterator<Item = Duration> + Send {
    std::iter::successors(Some(base.min(max)), move |d| {
        Some(d.checked_mul(2).unwrap_or(max).min(max))
    })
}

fn jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread_ms = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
    half + Duration::from_millis(rand::rng().random_range(0..=spread_ms))
}

/// Runs `op` until it succeeds or the policy allows no more attempts.
///
/// Each failed attempt is logged with `what` as the subject. Returns the final
/// result together with the number of attempts made.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &BackoffPolicy,
    max_attempts: usize,
    what: &str,
    mut op: F,
) -> (Result<T, E>, usize)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let attempt_count = AtomicUsize::new(0);

    let result = tokio_retry::Retry::spawn(policy.delays(max_attempts), || {
        let attempt = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
        let fut = op();
        async move {
            let result = fut.await;
            if let Err(e) = &result {
                log::warn!(
                    "{} failed (attempt {}/{}): {}",
                    what,
                    attempt,
                    max_attempts,
                    e
                );
            }
            result
        }
    })
    .await;

    (result, attempt_count.load(Ordering::SeqCst))
}
