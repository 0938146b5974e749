//! Paired-Leg Coordinator - Delta-Neutral Round Lifecycle
//!
//! Keeps two perp accounts in lockstep: one opens long, the other opens
//! short, both hold, both close. Leg submissions are always issued
//! together and joined (fan-out of exactly two).
//!
//! A round reports `Complete` only when every step confirmed on both
//! legs and both ended flat. If exactly one leg moved the round reports
//! `AsymmetricLegFailure`, and the next round starts by flattening
//! whatever is left instead of opening new exposure.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::report::{LegPhase, LegRecord, RoundKind, RoundReport, RoundStatus};
use crate::domain::types::{Direction, Intent, PairTarget, PerpPosition, SubmissionOutcome};
use crate::error::ReconcileError;
use crate::ports::perp::PerpLeg;
use crate::usecases::retry::{with_retry, FetchPolicy};
use crate::usecases::scheduler::{CooldownKind, CooldownScheduler, StopSignal};
use crate::usecases::submitter::TransactionSubmitter;

/// Pricing of leg orders relative to the mark.
#[derive(Debug, Clone, Copy)]
pub struct PairPolicy {
  /// Fraction above mark for the long open and below mark for the short.
  pub price_offset: Decimal,
  /// Fraction past mark used when closing, so closes cross the book.
  pub close_offset: Decimal,
  /// Read retry budget.
  pub fetch: FetchPolicy,
}

/// Outcome of a step issued on both legs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairStep {
  Both,
  OnlyLong,
  OnlyShort,
  Neither,
}

impl PairStep {
  const fn from_flags(long: bool, short: bool) -> Self {
    match (long, short) {
      (true, true) => Self::Both,
      (true, false) => Self::OnlyLong,
      (false, true) => Self::OnlyShort,
      (false, false) => Self::Neither,
    }
  }
}

/// Runs paired-leg rounds for one session.
pub struct PairedLegCoordinator {
  /// Session name used in reports.
  session: String,
  /// Account opening long.
  long: Arc<dyn PerpLeg>,
  /// Account opening short.
  short: Arc<dyn PerpLeg>,
  /// Session-owned submitter shared by both legs.
  submitter: Arc<TransactionSubmitter>,
  /// Hold and settle delays.
  scheduler: Arc<CooldownScheduler>,
  /// Shortens the hold when fired.
  stop: StopSignal,
  /// Position sizes per leg.
  target: PairTarget,
  /// Leg pricing.
  policy: PairPolicy,
}

impl PairedLegCoordinator {
  /// Create a coordinator for one pair session.
  #[allow(clippy::too_many_arguments)]
  #[must_use]
  pub fn new(
    session: impl Into<String>,
    long: Arc<dyn PerpLeg>,
    short: Arc<dyn PerpLeg>,
    submitter: Arc<TransactionSubmitter>,
    scheduler: Arc<CooldownScheduler>,
    stop: StopSignal,
    target: PairTarget,
    policy: PairPolicy,
  ) -> Self {
    Self {
      session: session.into(),
      long,
      short,
      submitter,
      scheduler,
      stop,
      target,
      policy,
    }
  }

  /// Session name.
  #[must_use]
  pub fn session(&self) -> &str {
    &self.session
  }

  /// Run one round: synchronize, then open, hold, and close.
  #[instrument(skip(self), fields(session = %self.session))]
  pub async fn run_round(&self) -> RoundReport {
    let started_at = self.scheduler.clock().now();
    let mut legs = Vec::new();
    let mut errors = Vec::new();

    // ── 1. Synchronize ─────────────────────────────────
    let positions = tokio::join!(self.positions(&self.long), self.positions(&self.short));
    let (long_positions, short_positions) = match positions {
      (Ok(l), Ok(s)) => (l, s),
      (l, s) => {
        errors.extend(l.err());
        errors.extend(s.err());
        return self.finish(RoundKind::Resync, RoundStatus::Degraded, started_at, legs, errors);
      }
    };

    if !long_positions.is_empty() || !short_positions.is_empty() {
      warn!(
        long_open = long_positions.len(),
        short_open = short_positions.len(),
        "Leftover exposure found, flattening before opening"
      );
      let status = self.flatten(&mut legs, &mut errors).await;
      return self.finish(RoundKind::Resync, status, started_at, legs, errors);
    }

    // ── 2. Open both legs ──────────────────────────────
    let mark = match with_retry(self.policy.fetch, self.scheduler.clock().as_ref(), "mark price", || {
      self.long.mark_price()
    })
    .await
    {
      Ok(mark) => mark,
      Err(e) => {
        errors.push(e);
        return self.finish(RoundKind::Fresh, RoundStatus::Degraded, started_at, legs, errors);
      }
    };

    let long_limit = (mark * (Decimal::ONE + self.policy.price_offset)).round_dp(9);
    let short_limit = (mark * (Decimal::ONE - self.policy.price_offset)).round_dp(9);

    // Both intents exist before either is broadcast.
    let built = tokio::join!(
      self.long.open(Direction::Long, self.target.desired_long, long_limit),
      self.short.open(Direction::Short, self.target.desired_short, short_limit),
    );
    let (long_intent, short_intent) = match built {
      (Ok(l), Ok(s)) => (l, s),
      (l, s) => {
        for (leg, result) in [(&self.long, l.err()), (&self.short, s.err())] {
          if let Some(e) = result {
            errors.push(ReconcileError::ActionFailed {
              action: format!("open {}", leg.account()),
              reason: format!("intent build failed: {e:#}"),
            });
          }
        }
        return self.finish(RoundKind::Fresh, RoundStatus::Degraded, started_at, legs, errors);
      }
    };

    info!(%mark, %long_limit, %short_limit, "Opening both legs");
    let step = self
      .submit_pair(
        LegPhase::Open,
        &long_intent,
        &short_intent,
        &mut legs,
        &mut errors,
      )
      .await;
    if step != PairStep::Both {
      let status = self.classify(step, "open", &mut errors);
      return self.finish(RoundKind::Fresh, status, started_at, legs, errors);
    }

    // ── 3. Hold, then close ────────────────────────────
    if !self.scheduler.cooldown(CooldownKind::InterLeg, &self.stop).await {
      info!("Stop requested during hold, closing early");
    }

    let status = self.flatten(&mut legs, &mut errors).await;
    self.finish(RoundKind::Fresh, status, started_at, legs, errors)
  }

  /// Cancel resting orders, close every position on both legs, settle,
  /// and verify both legs are flat.
  async fn flatten(&self, legs: &mut Vec<LegRecord>, errors: &mut Vec<ReconcileError>) -> RoundStatus {
    let cancels = tokio::join!(self.long.cancel_all(), self.short.cancel_all());
    match cancels {
      (Ok(l), Ok(s)) => {
        self
          .submit_pair(LegPhase::CancelResting, &l, &s, legs, errors)
          .await;
      }
      (l, s) => {
        for (leg, direction, result) in [
          (&self.long, Direction::Long, l),
          (&self.short, Direction::Short, s),
        ] {
          match result {
            Ok(intent) => {
              let outcome = self.submitter.submit(&intent).await;
              record(legs, errors, leg.account(), direction, LegPhase::CancelResting, outcome);
            }
            Err(e) => errors.push(ReconcileError::ActionFailed {
              action: format!("cancel resting {}", leg.account()),
              reason: format!("{e:#}"),
            }),
          }
        }
      }
    }

    let mark = with_retry(self.policy.fetch, self.scheduler.clock().as_ref(), "mark price", || {
      self.long.mark_price()
    })
    .await;
    let mark = match mark {
      Ok(mark) => mark,
      Err(e) => {
        errors.push(e);
        return self.verify_flat(errors).await;
      }
    };

    let (long_closes, short_closes) = tokio::join!(
      self.close_leg(&self.long, mark),
      self.close_leg(&self.short, mark),
    );
    for (records, issues) in [long_closes, short_closes] {
      legs.extend(records);
      errors.extend(issues);
    }

    self.scheduler.pause(CooldownKind::Settle).await;
    self.verify_flat(errors).await
  }

  /// Close every open position on one leg, sequentially.
  async fn close_leg(&self, leg: &Arc<dyn PerpLeg>, mark: Decimal) -> (Vec<LegRecord>, Vec<ReconcileError>) {
    let mut legs = Vec::new();
    let mut errors = Vec::new();

    let positions = match self.positions(leg).await {
      Ok(p) => p,
      Err(e) => {
        errors.push(e);
        return (legs, errors);
      }
    };

    for position in positions {
      let limit = close_limit(&position, mark, self.policy.close_offset);
      match leg.close(&position, limit).await {
        Ok(intent) => {
          let outcome = self.submitter.submit(&intent).await;
          record(&mut legs, &mut errors, leg.account(), position.direction, LegPhase::Close, outcome);
        }
        Err(e) => errors.push(ReconcileError::ActionFailed {
          action: format!("close {} {}", leg.account(), position.id),
          reason: format!("intent build failed: {e:#}"),
        }),
      }
    }
    (legs, errors)
  }

  /// Re-observe both legs and classify the result.
  async fn verify_flat(&self, errors: &mut Vec<ReconcileError>) -> RoundStatus {
    let observed = tokio::join!(self.positions(&self.long), self.positions(&self.short));
    match observed {
      (Ok(l), Ok(s)) => {
        let step = PairStep::from_flags(l.is_empty(), s.is_empty());
        if step == PairStep::Both {
          info!("Both legs flat");
          RoundStatus::Complete
        } else {
          self.classify(step, "close", errors)
        }
      }
      (l, s) => {
        errors.extend(l.err());
        errors.extend(s.err());
        RoundStatus::Degraded
      }
    }
  }

  /// Submit one intent per leg concurrently and record both outcomes.
  async fn submit_pair(
    &self,
    phase: LegPhase,
    long_intent: &Intent,
    short_intent: &Intent,
    legs: &mut Vec<LegRecord>,
    errors: &mut Vec<ReconcileError>,
  ) -> PairStep {
    let (long_outcome, short_outcome) = tokio::join!(
      self.submitter.submit(long_intent),
      self.submitter.submit(short_intent),
    );
    let step = PairStep::from_flags(long_outcome.is_confirmed(), short_outcome.is_confirmed());
    record(legs, errors, self.long.account(), Direction::Long, phase, long_outcome);
    record(legs, errors, self.short.account(), Direction::Short, phase, short_outcome);
    step
  }

  /// Map a non-`Both` step onto a round status, recording asymmetry.
  fn classify(&self, step: PairStep, what: &str, errors: &mut Vec<ReconcileError>) -> RoundStatus {
    let (confirmed, failed) = match step {
      PairStep::OnlyLong => (self.long.account(), self.short.account()),
      PairStep::OnlyShort => (self.short.account(), self.long.account()),
      PairStep::Both => return RoundStatus::Complete,
      PairStep::Neither => return RoundStatus::Degraded,
    };
    error!(confirmed, failed, step = what, "Asymmetric leg failure, one side unhedged");
    errors.push(ReconcileError::AsymmetricLegFailure {
      confirmed: confirmed.to_string(),
      failed: failed.to_string(),
      outcome: format!("did not {what}"),
    });
    RoundStatus::AsymmetricLegFailure
  }

  async fn positions(&self, leg: &Arc<dyn PerpLeg>) -> Result<Vec<PerpPosition>, ReconcileError> {
    with_retry(self.policy.fetch, self.scheduler.clock().as_ref(), "positions", || {
      leg.positions()
    })
    .await
  }

  fn finish(
    &self,
    kind: RoundKind,
    status: RoundStatus,
    started_at: DateTime<Utc>,
    legs: Vec<LegRecord>,
    errors: Vec<ReconcileError>,
  ) -> RoundReport {
    info!(kind = ?kind, status = ?status, issues = errors.len(), "Round finished");
    RoundReport {
      round_id: Uuid::new_v4(),
      session: self.session.clone(),
      kind,
      status,
      started_at,
      finished_at: self.scheduler.clock().now(),
      legs,
      errors,
    }
  }
}

/// Limit price that crosses the book when flattening `position`.
fn close_limit(position: &PerpPosition, mark: Decimal, offset: Decimal) -> Decimal {
  let price = match position.direction {
    Direction::Long => mark * (Decimal::ONE - offset),
    Direction::Short => mark * (Decimal::ONE + offset),
  };
  price.round_dp(9)
}

fn record(
  legs: &mut Vec<LegRecord>,
  errors: &mut Vec<ReconcileError>,
  account: &str,
  direction: Direction,
  phase: LegPhase,
  outcome: SubmissionOutcome,
) {
  let action = format!("{phase:?} {account}").to_lowercase();
  match &outcome {
    SubmissionOutcome::Confirmed(_) => {}
    SubmissionOutcome::Failed(reason) => errors.push(ReconcileError::ActionFailed {
      action,
      reason: reason.clone(),
    }),
    SubmissionOutcome::Unknown => errors.push(ReconcileError::ActionUnknown { action }),
  }
  legs.push(LegRecord {
    account: account.to_string(),
    direction,
    phase,
    outcome,
  });
}
