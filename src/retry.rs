//! Exponential-backoff retry for remote operations.
//!
//! An operation is attempted up to [`RetryPolicy::attempts`] times. After
//! each failure except the last the policy sleeps, starting at
//! [`RetryPolicy::base_delay`] and doubling every time. The sleep can be
//! interrupted through a [`CancellationToken`]; an attempt already in
//! flight always runs to completion.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total number of attempts, including the first one
  pub attempts: u32,
  /// Delay before the first retry
  pub base_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      attempts: 3,
      base_delay: Duration::from_secs(1),
    }
  }
}

impl RetryPolicy {
  pub fn new(attempts: u32, base_delay: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      base_delay,
    }
  }

  /// Delay to wait after the given failed attempt (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    self
      .base_delay
      .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
  }

  /// Run `op` until it succeeds or the attempts are used up.
  ///
  /// Returns the error of the last attempt made. If `cancel` fires while
  /// waiting between attempts, no further attempts are made.
  pub async fn run<T, E, F, Fut>(&self, cancel: &CancellationToken, mut op: F) -> Result<T, E>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
  {
    let mut attempt = 1;
    loop {
      let err = match op().await {
        Ok(value) => return Ok(value),
        Err(err) => err,
      };

      if attempt >= self.attempts {
        tracing::warn!(attempt, error = %err, "Giving up after final attempt");
        return Err(err);
      }

      let delay = self.delay_after(attempt);
      tracing::debug!(
        attempt,
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "Attempt failed, retrying"
      );

      tokio::select! {
        _ = cancel.cancelled() => {
          tracing::debug!(attempt, "Retry cancelled");
          return Err(err);
        }
        _ = tokio::time::sleep(delay) => {}
      }

      attempt += 1;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;
  use tokio::time::Instant;

  #[test]
  fn test_delays_double() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay_after(1), Duration::from_secs(1));
    assert_eq!(policy.delay_after(2), Duration::from_secs(2));
    assert_eq!(policy.delay_after(3), Duration::from_secs(4));
  }

  #[test]
  fn test_zero_attempts_still_tries_once() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).attempts, 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_exactly_three_attempts_with_backoff() {
    let calls = Arc::new(AtomicU32::new(0));
    let started = Instant::now();
    let cancel = CancellationToken::new();

    let counter = calls.clone();
    let result: Result<(), String> = RetryPolicy::default()
      .run(&cancel, || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move { Err(format!("failure {n}")) }
      })
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    // 1s after the first failure, 2s after the second, nothing after the last
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert_eq!(result.unwrap_err(), "failure 3");
  }

  #[tokio::test(start_paused = true)]
  async fn test_stops_on_first_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let cancel = CancellationToken::new();

    let counter = calls.clone();
    let result = RetryPolicy::default()
      .run(&cancel, || {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
          if n < 2 {
            Err("down".to_string())
          } else {
            Ok(n)
          }
        }
      })
      .await;

    assert_eq!(result, Ok(2));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_interrupts_backoff() {
    let calls = Arc::new(AtomicU32::new(0));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let counter = calls.clone();
    let result: Result<(), String> = RetryPolicy::default()
      .run(&cancel, || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err("down".to_string()) }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejections_are_retried_too() {
    let calls = Arc::new(AtomicU32::new(0));
    let cancel = CancellationToken::new();

    let counter = calls.clone();
    let result: Result<(), crate::error::BackendError> = RetryPolicy::default()
      .run(&cancel, || {
        counter.fetch_add(1, Ordering::SeqCst);
        async {
          Err(crate::error::BackendError::Status {
            status: 400,
            message: "invalid input".to_string(),
          })
        }
      })
      .await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let err = result.unwrap_err();
    assert!(!err.is_transient());
    assert!(err.user_message().contains("invalid input"));
  }
}
