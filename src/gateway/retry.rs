//! Bounded retry with fixed delay for provider fetches.
//!
//! Both gateway fetch paths share this one combinator, parameterized by
//! attempt count, delay, and a validity predicate. Exhaustion is a normal
//! outcome (`None`), never an error.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::metrics;
use crate::provider::ProviderError;

/// Fixed-delay retry policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(400),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it yields a value accepted by `is_valid`, up to
    /// `max_attempts` times.
    ///
    /// An invalid value (e.g. a zero tempo) means the provider has not
    /// finished computing and is retried exactly like an empty response or
    /// a transport error. Returns `None` once attempts are exhausted.
    pub async fn run<T, F, Fut>(
        &self,
        kind: &'static str,
        is_valid: impl Fn(&T) -> bool,
        op: F,
    ) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Option<T>, ProviderError>>,
    {
        for attempt in 1..=self.max_attempts {
            match op().await {
                Ok(Some(value)) if is_valid(&value) => {
                    metrics::record_provider_fetch(kind, "ok");
                    return Some(value);
                }
                Ok(Some(_)) => {
                    metrics::record_provider_fetch(kind, "invalid");
                    debug!(
                        "Provider returned not-yet-ready {} (attempt {}/{})",
                        kind, attempt, self.max_attempts
                    );
                }
                Ok(None) => {
                    metrics::record_provider_fetch(kind, "empty");
                    debug!(
                        "Provider has no {} yet (attempt {}/{})",
                        kind, attempt, self.max_attempts
                    );
                }
                Err(e) => {
                    metrics::record_provider_fetch(kind, "error");
                    warn!(
                        "Provider {} fetch failed (attempt {}/{}): {}",
                        kind, attempt, self.max_attempts, e
                    );
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.delay).await;
            }
        }

        debug!(
            "Giving up on {} after {} attempts",
            kind, self.max_attempts
        );
        None
    }
}
