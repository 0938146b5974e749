//! Swap Rotation - Walk a Closed Route of Assets
//!
//! Each cycle swaps the current asset into the next one on the route.
//! The amount carried into the next hop is re-observed from the venue
//! (balance delta of the output asset), never taken from the quote.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::report::SwapReport;
use crate::domain::types::{AssetId, SubmissionOutcome};
use crate::error::ReconcileError;
use crate::ports::swap::SwapVenue;
use crate::usecases::retry::{with_retry, FetchPolicy};
use crate::usecases::scheduler::Clock;
use crate::usecases::submitter::TransactionSubmitter;

/// Static rotation parameters.
#[derive(Debug, Clone)]
pub struct RotationPlan {
  /// Assets visited in order; the last hop swaps back into the first.
  pub route: Vec<AssetId>,
  /// Amount of `route[0]` swapped on the first hop.
  pub initial_amount: u64,
  /// Slippage tolerance passed to the quote.
  pub slippage_bps: u16,
  /// Read retry budget.
  pub fetch: FetchPolicy,
}

/// Position on the route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
  /// Index of the asset swapped out of on the next hop.
  pub hop: usize,
  /// Amount to swap on the next hop.
  pub amount: u64,
  /// Whether `amount` came from a venue observation.
  pub verified: bool,
}

/// Runs swap hops for one session.
pub struct SwapRotation {
  /// Session name used in reports.
  session: String,
  /// Swap router.
  venue: Arc<dyn SwapVenue>,
  /// Session-owned submitter.
  submitter: Arc<TransactionSubmitter>,
  /// Clock for retry delays and timestamps.
  clock: Arc<dyn Clock>,
  /// Route and sizing.
  plan: RotationPlan,
  /// Progress along the route.
  state: Mutex<RotationState>,
}

impl SwapRotation {
  /// Create a rotation starting at the first asset of the route.
  ///
  /// # Errors
  /// Returns error if the route has fewer than two assets.
  pub fn new(
    session: impl Into<String>,
    venue: Arc<dyn SwapVenue>,
    submitter: Arc<TransactionSubmitter>,
    clock: Arc<dyn Clock>,
    plan: RotationPlan,
  ) -> anyhow::Result<Self> {
    anyhow::ensure!(
      plan.route.len() >= 2,
      "swap route needs at least two assets, got {}",
      plan.route.len()
    );
    let state = RotationState {
      hop: 0,
      amount: plan.initial_amount,
      verified: false,
    };
    Ok(Self {
      session: session.into(),
      venue,
      submitter,
      clock,
      plan,
      state: Mutex::new(state),
    })
  }

  /// Session name.
  #[must_use]
  pub fn session(&self) -> &str {
    &self.session
  }

  /// Current position on the route.
  pub async fn state(&self) -> RotationState {
    *self.state.lock().await
  }

  /// Execute the next hop.
  #[instrument(skip(self), fields(session = %self.session))]
  pub async fn run_hop(&self) -> SwapReport {
    let started_at = self.clock.now();
    let mut state = self.state.lock().await;
    let len = self.plan.route.len();
    let input = self.plan.route[state.hop % len].clone();
    let output = self.plan.route[(state.hop + 1) % len].clone();

    let mut report = SwapReport {
      hop_id: Uuid::new_v4(),
      session: self.session.clone(),
      input: input.clone(),
      output: output.clone(),
      in_amount: 0,
      expected_out: 0,
      observed_out: None,
      outcome: None,
      started_at,
      finished_at: started_at,
      errors: Vec::new(),
    };

    // Unverified amounts are bounded by what the venue shows as held.
    if !state.verified {
      match self.balance(&input).await {
        Ok(held) => {
          state.amount = state.amount.min(held);
          state.verified = true;
        }
        Err(e) => {
          report.errors.push(e);
          report.finished_at = self.clock.now();
          return report;
        }
      }
    }

    if state.amount == 0 {
      warn!(asset = %input, "Nothing held to swap, skipping hop");
      report.errors.push(ReconcileError::EmptyBalance {
        asset: input.clone(),
      });
      // Advance only once the next hop's amount is actually observed.
      match self.balance(&output).await {
        Ok(held) => {
          state.hop = (state.hop + 1) % len;
          state.amount = held;
          state.verified = true;
        }
        Err(e) => {
          report.errors.push(e);
          state.verified = false;
        }
      }
      report.finished_at = self.clock.now();
      return report;
    }
    let amount = state.amount;
    report.in_amount = amount;

    let quote = with_retry(self.plan.fetch, self.clock.as_ref(), "swap quote", || {
      self
        .venue
        .quote(&input, &output, amount, self.plan.slippage_bps)
    })
    .await;
    let quote = match quote {
      Ok(q) => q,
      Err(e) => {
        report.errors.push(e);
        report.finished_at = self.clock.now();
        return report;
      }
    };
    report.expected_out = quote.out_amount;

    let before = match self.balance(&output).await {
      Ok(b) => b,
      Err(e) => {
        report.errors.push(e);
        report.finished_at = self.clock.now();
        return report;
      }
    };

    let intent = match self.venue.build_swap(&quote).await {
      Ok(intent) => intent,
      Err(e) => {
        report.errors.push(ReconcileError::ActionFailed {
          action: format!("swap {input}->{output}"),
          reason: format!("intent build failed: {e:#}"),
        });
        report.finished_at = self.clock.now();
        return report;
      }
    };

    let outcome = self.submitter.submit(&intent).await;
    match &outcome {
      SubmissionOutcome::Confirmed(tx) => {
        let observed = self
          .balance(&output)
          .await
          .map(|after| after.saturating_sub(before));
        state.hop = (state.hop + 1) % len;
        match observed {
          Ok(out) => {
            info!(tx = %tx, %input, %output, in_amount = report.in_amount, out, "Swap confirmed");
            report.observed_out = Some(out);
            state.amount = out;
            state.verified = true;
          }
          Err(e) => {
            report.errors.push(e);
            state.amount = quote.out_amount;
            state.verified = false;
          }
        }
      }
      SubmissionOutcome::Failed(reason) => {
        report.errors.push(ReconcileError::ActionFailed {
          action: format!("swap {input}->{output}"),
          reason: reason.clone(),
        });
        state.verified = false;
      }
      SubmissionOutcome::Unknown => {
        report.errors.push(ReconcileError::ActionUnknown {
          action: format!("swap {input}->{output}"),
        });
        state.verified = false;
      }
    }

    report.outcome = Some(outcome);
    report.finished_at = self.clock.now();
    report
  }

  async fn balance(&self, asset: &AssetId) -> Result<u64, ReconcileError> {
    with_retry(self.plan.fetch, self.clock.as_ref(), "balance", || {
      self.venue.balance(asset)
    })
    .await
  }
}
