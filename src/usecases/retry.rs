//! Fixed-budget retry for venue observations.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ReconcileError;
use crate::usecases::scheduler::Clock;

/// Attempt budget for reads against a venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
  /// Total attempts, including the first.
  pub attempts: u32,
  /// Fixed delay between attempts.
  pub delay: Duration,
}

impl Default for FetchPolicy {
  fn default() -> Self {
    Self {
      attempts: 5,
      delay: Duration::from_secs(3),
    }
  }
}

/// Run `op` until it succeeds or the budget is spent.
///
/// # Errors
/// Returns `AdapterUnavailable` carrying the last failure once every
/// attempt has failed.
pub async fn with_retry<T, F, Fut>(
  policy: FetchPolicy,
  clock: &dyn Clock,
  what: &str,
  mut op: F,
) -> Result<T, ReconcileError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = anyhow::Result<T>>,
{
  let attempts = policy.attempts.max(1);
  let mut last_error = String::new();

  for attempt in 1..=attempts {
    match op().await {
      Ok(value) => return Ok(value),
      Err(e) => {
        warn!(what, attempt, attempts, error = %e, "Venue read failed");
        last_error = format!("{e:#}");
        if attempt < attempts {
          clock.sleep(policy.delay).await;
        }
      }
    }
  }

  Err(ReconcileError::AdapterUnavailable {
    attempts,
    last_error,
  })
}
