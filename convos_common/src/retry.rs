//! A retry strategy for transient failures against the messaging network.
//!
//! Errors opt in to being retried through [`RetryableError`]; everything is
//! terminal by default.

use std::time::Duration;

use rand::Rng;

/// Specifies which errors are retryable.
pub trait RetryableError: std::error::Error {
    fn is_retryable(&self) -> bool;
}

impl<E: RetryableError> RetryableError for &E {
    fn is_retryable(&self) -> bool {
        (**self).is_retryable()
    }
}

/// Options specifying how often and how fast to retry a fallible async
/// operation.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Retry {
    retries: usize,
    duration: Duration,
    multiplier: u32,
    max_jitter_ms: u64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            retries: 5,
            duration: Duration::from_millis(200),
            multiplier: 2,
            max_jitter_ms: 25,
        }
    }
}

impl Retry {
    pub fn builder() -> RetryBuilder {
        RetryBuilder::default()
    }

    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Backoff duration for the given attempt (zero-indexed), with jitter.
    pub fn duration(&self, attempt: usize) -> Duration {
        let backoff = self.duration * self.multiplier.saturating_pow(attempt as u32);
        let jitter = rand::thread_rng().gen_range(0..=self.max_jitter_ms);
        backoff + Duration::from_millis(jitter)
    }
}

#[derive(Default, PartialEq, Eq, Copy, Clone)]
pub struct RetryBuilder {
    retries: Option<usize>,
    duration: Option<Duration>,
    multiplier: Option<u32>,
}

impl RetryBuilder {
    pub fn retries(mut self, retries: usize) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    pub fn build(self) -> Retry {
        let default = Retry::default();
        Retry {
            retries: self.retries.unwrap_or(default.retries),
            duration: self.duration.unwrap_or(default.duration),
            multiplier: self.multiplier.unwrap_or(default.multiplier),
            max_jitter_ms: default.max_jitter_ms,
        }
    }
}

/// Retry an async operation until it succeeds, fails with a non-retryable
/// error, or the retry budget is exhausted.
pub async fn retry_async<F, Fut, T, E>(retry: Retry, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: RetryableError,
{
    let mut attempt = 0;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if e.is_retryable() && attempt < retry.retries() => {
                tracing::debug!(attempt, error = %e, "retrying after retryable error");
                tokio::time::sleep(retry.duration(attempt)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
