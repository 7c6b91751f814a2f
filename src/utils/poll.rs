//! Bounded polling
//!
//! Every wait in the run loop (station convergence, sniffer shutdown) is a
//! bounded number of checks separated by a fixed interval. A check returning
//! `Some` ends the wait; running out of attempts is a [`AppError::Timeout`].

use crate::error::{AppError, Result};
use std::future::Future;
use std::time::Duration;

/// Retry policy for a single wait
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedPoll {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl BoundedPoll {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self { max_attempts, interval }
    }

    /// Run `check` until it yields a value or attempts are exhausted.
    ///
    /// The check receives the 1-based attempt number. No sleep follows the
    /// final attempt.
    pub async fn until<T, F, Fut>(&self, what: &str, mut check: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let attempts = self.max_attempts.max(1);
        for attempt in 1..=attempts {
            if let Some(value) = check(attempt).await {
                return Ok(value);
            }
            if attempt < attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(AppError::timeout(format!(
            "{} not satisfied after {} attempt(s)",
            what, attempts
        )))
    }
}
