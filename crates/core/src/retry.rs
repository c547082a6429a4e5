//! Bounded retry for fallible connect operations.
//!
//! The policy knows nothing about what it retries; the bridge negotiation is
//! the only caller today. Each attempt is bounded by its own timeout, and the
//! whole loop can be abandoned through a [`CancellationToken`].

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Error, Result};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Position of one attempt within a retry loop. Handed to the attempt closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
	/// 1-based.
	pub attempt: u32,
	pub max_attempts: u32,
	pub attempt_timeout: Duration,
	pub delay: Duration,
}

impl RetryAttempt {
	pub fn is_last(&self) -> bool {
		self.attempt >= self.max_attempts
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
	max_attempts: u32,
	attempt_timeout: Duration,
	delay: Duration,
}

impl Default for RetryPolicy {
	fn default() -> Self {
		Self {
			max_attempts: DEFAULT_MAX_ATTEMPTS,
			attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
			delay: DEFAULT_RETRY_DELAY,
		}
	}
}

impl RetryPolicy {
	/// A policy making at most `max_attempts` calls. Zero is treated as one.
	pub fn new(max_attempts: u32) -> Self {
		Self {
			max_attempts: max_attempts.max(1),
			..Self::default()
		}
	}

	pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
		self.attempt_timeout = timeout;
		self
	}

	pub fn with_delay(mut self, delay: Duration) -> Self {
		self.delay = delay;
		self
	}

	pub fn max_attempts(&self) -> u32 {
		self.max_attempts
	}

	pub fn attempt_timeout(&self) -> Duration {
		self.attempt_timeout
	}

	pub fn delay(&self) -> Duration {
		self.delay
	}

	/// Runs `attempt` until it succeeds, the attempts run out, or `cancel` fires.
	///
	/// # Errors
	///
	/// * [`Error::RetryExhausted`] with the attempt count and the last failure
	/// * [`Error::Cancelled`] when the token fires before or during any attempt
	///   or delay; no further attempts are made
	pub async fn execute<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt: F) -> Result<T>
	where
		F: FnMut(RetryAttempt) -> Fut,
		Fut: Future<Output = Result<T>>,
	{
		let max_attempts = self.max_attempts.max(1);
		let mut last_error = String::from("no attempt made");

		for n in 1..=max_attempts {
			if cancel.is_cancelled() {
				debug!(target = "rover.retry", attempt = n, "cancelled before attempt");
				return Err(Error::Cancelled);
			}

			let info = RetryAttempt {
				attempt: n,
				max_attempts,
				attempt_timeout: self.attempt_timeout,
				delay: self.delay,
			};

			let outcome = tokio::select! {
				biased;
				_ = cancel.cancelled() => {
					debug!(target = "rover.retry", attempt = n, "cancelled during attempt");
					return Err(Error::Cancelled);
				}
				outcome = tokio::time::timeout(self.attempt_timeout, attempt(info)) => outcome,
			};

			match outcome {
				Ok(Ok(value)) => {
					debug!(target = "rover.retry", attempt = n, max_attempts, "attempt succeeded");
					return Ok(value);
				}
				Ok(Err(err)) => last_error = err.to_string(),
				Err(_) => last_error = format!("attempt timed out after {:?}", self.attempt_timeout),
			}

			warn!(target = "rover.retry", attempt = n, max_attempts, error = %last_error, "attempt failed");

			if n < max_attempts {
				tokio::select! {
					biased;
					_ = cancel.cancelled() => {
						debug!(target = "rover.retry", attempt = n, "cancelled while waiting to retry");
						return Err(Error::Cancelled);
					}
					_ = tokio::time::sleep(self.delay) => {}
				}
			}
		}

		Err(Error::RetryExhausted {
			attempts: max_attempts,
			last: last_error,
		})
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicU32, Ordering};

	use super::*;

	fn fast(max_attempts: u32) -> RetryPolicy {
		RetryPolicy::new(max_attempts)
			.with_attempt_timeout(Duration::from_millis(50))
			.with_delay(Duration::from_millis(1))
	}

	#[test]
	fn defaults_match_bridge_negotiation() {
		let policy = RetryPolicy::default();
		assert_eq!(policy.max_attempts(), 5);
		assert_eq!(policy.attempt_timeout(), Duration::from_secs(5));
		assert_eq!(policy.delay(), Duration::from_secs(1));
		assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
	}

	#[tokio::test]
	async fn stops_at_first_success() {
		let calls = Arc::new(AtomicU32::new(0));
		let policy = fast(5);

		let result = policy
			.execute(&CancellationToken::new(), |info| {
				let calls = Arc::clone(&calls);
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					if info.attempt < 3 {
						Err(Error::Transport("refused".into()))
					} else {
						Ok(info.attempt)
					}
				}
			})
			.await
			.unwrap();

		assert_eq!(result, 3);
		assert_eq!(calls.load(Ordering::SeqCst), 3);
	}

	#[tokio::test]
	async fn exhaustion_reports_count_and_last_reason() {
		let calls = Arc::new(AtomicU32::new(0));
		let policy = fast(5);

		let err = policy
			.execute(&CancellationToken::new(), |info| {
				let calls = Arc::clone(&calls);
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Err::<(), _>(Error::Transport(format!("refused #{}", info.attempt)))
				}
			})
			.await
			.unwrap_err();

		assert_eq!(calls.load(Ordering::SeqCst), 5);
		match err {
			Error::RetryExhausted { attempts, last } => {
				assert_eq!(attempts, 5);
				assert!(last.contains("refused #5"), "last = {last}");
			}
			other => panic!("expected RetryExhausted, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn slow_attempt_counts_as_failure() {
		let policy = RetryPolicy::new(2)
			.with_attempt_timeout(Duration::from_millis(5))
			.with_delay(Duration::from_millis(1));

		let err = policy
			.execute(&CancellationToken::new(), |_| async {
				tokio::time::sleep(Duration::from_secs(10)).await;
				Ok(())
			})
			.await
			.unwrap_err();

		assert!(matches!(err, Error::RetryExhausted { attempts: 2, ref last } if last.contains("timed out")));
	}

	#[tokio::test]
	async fn cancelled_token_makes_no_attempt() {
		let calls = Arc::new(AtomicU32::new(0));
		let cancel = CancellationToken::new();
		cancel.cancel();

		let err = fast(5)
			.execute(&cancel, |_| {
				let calls = Arc::clone(&calls);
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok(())
				}
			})
			.await
			.unwrap_err();

		assert!(matches!(err, Error::Cancelled));
		assert_eq!(calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn cancel_during_delay_aborts_loop() {
		let calls = Arc::new(AtomicU32::new(0));
		let cancel = CancellationToken::new();
		let policy = RetryPolicy::new(5)
			.with_attempt_timeout(Duration::from_millis(50))
			.with_delay(Duration::from_secs(30));

		let trigger = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			trigger.cancel();
		});

		let result = tokio::time::timeout(
			Duration::from_secs(5),
			policy.execute(&cancel, |_| {
				let calls = Arc::clone(&calls);
				async move {
					calls.fetch_add(1, Ordering::SeqCst);
					Err::<(), _>(Error::Transport("refused".into()))
				}
			}),
		)
		.await
		.expect("cancellation should end the loop well before the delay");

		assert!(matches!(result, Err(Error::Cancelled)));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}
