// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded retry with backoff for flaky external resources.
//!
//! One primitive shared by the map script loader, the geocoding client and
//! the image classifier. Callers pick:
//! - how many retries follow the first attempt
//! - the delay formula (exponential or linear)
//! - what happens once retries run out (fail, or produce a fallback value)

use std::future::Future;
use std::time::Duration;

/// Failure of a single acquisition attempt, or of the whole acquisition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LoadError {
    #[error("network error: {0}")]
    TransientNetwork(String),

    #[error("timed out after {0:?}")]
    TransientTimeout(Duration),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("configuration error: {0}")]
    PermanentConfiguration(String),

    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: Box<LoadError> },
}

impl LoadError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LoadError::TransientNetwork(_)
                | LoadError::TransientTimeout(_)
                | LoadError::MalformedResponse(_)
        )
    }

    /// Whether this is the terminal error produced after retries ran out.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoadError::Exhausted { .. })
    }
}

/// Delay formula between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^attempt`
    Exponential { base: Duration },
    /// `base * (attempt + 1)`
    Linear { base: Duration },
}

impl Backoff {
    /// Delay to wait after the given (0-indexed) failed attempt.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Exponential { base } => base.saturating_mul(2u32.saturating_pow(attempt)),
            Backoff::Linear { base } => base.saturating_mul(attempt.saturating_add(1)),
        }
    }
}

/// How an acquisition is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt. Total attempts = `max_retries + 1`.
    pub max_retries: u32,
    pub backoff: Backoff,
    /// Wall-clock limit raced against every attempt.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn exponential(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Exponential { base },
            attempt_timeout: None,
        }
    }

    pub fn linear(max_retries: u32, base: Duration) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Linear { base },
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Map script: 3 retries, 1s * 2^attempt, 10s per attempt.
    pub fn map_script() -> Self {
        Self::exponential(3, Duration::from_millis(1000)).with_attempt_timeout(Duration::from_secs(10))
    }

    /// Image classification: 2 retries, 1s * (attempt + 1).
    pub fn classification() -> Self {
        Self::linear(2, Duration::from_millis(1000))
    }

    /// Geocoding: 2 retries, 500ms * 2^attempt.
    pub fn geocoding() -> Self {
        Self::exponential(2, Duration::from_millis(500))
    }
}

/// What to do once retries are exhausted.
#[derive(Debug, Clone)]
pub enum TerminalPolicy<T> {
    /// Reject with [`LoadError::Exhausted`] (or the permanent error itself).
    Fail,
    /// Resolve with this value instead of failing.
    Fallback(T),
}

impl<T> TerminalPolicy<T> {
    fn conclude(self, error: LoadError) -> Result<T, LoadError> {
        match self {
            TerminalPolicy::Fail => Err(error),
            TerminalPolicy::Fallback(value) => Ok(value),
        }
    }
}

/// Run `op` until it succeeds, the error is permanent, or retries run out.
///
/// `op` receives the 0-indexed attempt number. Transient failures wait
/// `policy.backoff.delay_for_attempt(attempt)` before the next attempt; the
/// last failure never waits.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    terminal: TerminalPolicy<T>,
    label: &str,
    mut op: F,
) -> Result<T, LoadError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, LoadError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(LoadError::TransientTimeout(limit)),
            },
            None => op(attempt).await,
        };

        let error = match outcome {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(resource = label, attempt, "Acquired after retry");
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_transient() {
            tracing::error!(resource = label, error = %error, "Permanent failure, not retrying");
            return terminal.conclude(error);
        }

        if attempt >= policy.max_retries {
            tracing::error!(
                resource = label,
                attempts = attempt + 1,
                error = %error,
                "Retries exhausted"
            );
            return terminal.conclude(LoadError::Exhausted {
                attempts: attempt + 1,
                last: Box::new(error),
            });
        }

        let delay = policy.backoff.delay_for_attempt(attempt);
        tracing::warn!(
            resource = label,
            attempt = attempt + 1,
            max = policy.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Attempt failed, retrying"
        );
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}
