//! Retry helpers: backoff for transient store failures during bulk jobs, and
//! re-runs for commits whose guards lost a race.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::store::StoreError;

/// Retry configuration with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let delay = Duration::from_secs_f64(secs);
        delay.min(self.max_delay)
    }
}

/// Errors that warrant another attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for StoreError {
    fn is_transient(&self) -> bool {
        StoreError::is_transient(self)
    }
}

impl Transient for AppError {
    fn is_transient(&self) -> bool {
        matches!(self, AppError::Store(e) if e.is_transient())
    }
}

/// Runs `op`, retrying only transient failures (store unavailable or rate
/// limited) until `config.max_attempts` is reached.
pub async fn retry_with_backoff<T, E, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Transient + std::fmt::Debug,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < config.max_attempts => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {:?}; retrying in {:?}",
                    label,
                    attempt + 1,
                    config.max_attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

const CONFLICT_ATTEMPTS: u32 = 8;

/// Re-runs a read-then-commit operation whose guards were invalidated by a
/// concurrent writer. Each run must re-read the state it guards on.
pub async fn retry_on_conflict<T, F, Fut>(label: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(AppError::Store(StoreError::Conflict(reason))) if attempt < CONFLICT_ATTEMPTS => {
                debug!("{} raced a concurrent write (attempt {}): {}", label, attempt, reason);
                attempt += 1;
                tokio::task::yield_now().await;
            }
            Err(AppError::Store(StoreError::Conflict(reason))) => {
                warn!("{} gave up after {} attempts: {}", label, attempt, reason);
                return Err(AppError::Conflict(
                    "Too many concurrent updates, please retry".to_string(),
                ));
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_exponential_backoff() {
        let config = RetryConfig::default();

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2000));
        // Capped
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, StoreError> = retry_with_backoff(&fast(), "op", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(StoreError::Unavailable("connection reset".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), StoreError> = retry_with_backoff(&fast(), "op", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::RateLimited)
        })
        .await;

        assert!(matches!(result, Err(StoreError::RateLimited)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_other_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), AppError> = retry_with_backoff(&fast(), "op", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Store(StoreError::Conflict("taken".into())))
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_on_conflict_reruns_then_gives_up() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: AppResult<u32> = retry_on_conflict("toggle", || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(AppError::Store(StoreError::Conflict("flag changed".into())))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 1);

        let result: AppResult<()> = retry_on_conflict("toggle", || async {
            Err(AppError::Store(StoreError::Conflict("always".into())))
        })
        .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
