//! Reconciliation Engine - Observe, Diff, Correct, Report
//!
//! One generic engine drives every order-book venue through the
//! [`VenueAdapter`] port. Each cycle:
//! 1. Observes the venue with a fixed retry budget
//! 2. Plans the buy side, then the sell side, against the target
//! 3. Issues cancels before places through the submitter, under a
//!    per-cycle action budget
//! 4. Re-observes before sell-side places when confirmed cancels may
//!    have released inventory
//! 5. Returns a [`CycleReport`]; the cycle itself never fails
//!
//! The engine keeps no memory between cycles. Outcomes only feed the
//! report; the next cycle re-derives everything from the venue.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, instrument, warn};

use crate::domain::planner::{
  bound_by_inventory, place_orders, plan_side, PricingPolicy, RefreshMode, SidePlan,
};
use crate::domain::report::{ActionRecord, CycleReport};
use crate::domain::types::{
  Action, InventoryItem, Layout, ObservedState, Side, SideCounts, SubmissionOutcome, TargetState,
};
use crate::error::ReconcileError;
use crate::ports::venue::VenueAdapter;
use crate::usecases::retry::{with_retry, FetchPolicy};
use crate::usecases::scheduler::Clock;
use crate::usecases::submitter::TransactionSubmitter;

/// Per-session book policy.
#[derive(Debug, Clone, Copy)]
pub struct BookPolicy {
  /// Commitment layout of the buy side.
  pub buy_layout: Layout,
  /// Commitment layout of the sell side.
  pub sell_layout: Layout,
  /// Quote offsets.
  pub pricing: PricingPolicy,
  /// Refresh behavior for balanced sides.
  pub refresh_mode: RefreshMode,
  /// Maximum actions issued per cycle.
  pub max_actions_per_cycle: u64,
  /// Read retry budget.
  pub fetch: FetchPolicy,
}

impl BookPolicy {
  const fn layout(&self, side: Side) -> Layout {
    match side {
      Side::Buy => self.buy_layout,
      Side::Sell => self.sell_layout,
    }
  }
}

/// Caps the number of actions submitted in one cycle.
#[derive(Debug)]
struct ActionBudget {
  remaining: u64,
  deferred: u64,
}

impl ActionBudget {
  const fn new(limit: u64) -> Self {
    Self {
      remaining: limit,
      deferred: 0,
    }
  }

  fn take(&mut self) -> bool {
    if self.remaining == 0 {
      self.deferred += 1;
      false
    } else {
      self.remaining -= 1;
      true
    }
  }
}

/// Drives order-book reconciliation for one session.
pub struct ReconciliationEngine {
  /// Session name used in reports.
  session: String,
  /// Session-owned submitter.
  submitter: Arc<TransactionSubmitter>,
  /// Clock for retry delays and report timestamps.
  clock: Arc<dyn Clock>,
  /// Book policy.
  policy: BookPolicy,
}

impl ReconciliationEngine {
  /// Create an engine for one session.
  #[must_use]
  pub fn new(
    session: impl Into<String>,
    submitter: Arc<TransactionSubmitter>,
    clock: Arc<dyn Clock>,
    policy: BookPolicy,
  ) -> Self {
    Self {
      session: session.into(),
      submitter,
      clock,
      policy,
    }
  }

  /// Session name.
  #[must_use]
  pub fn session(&self) -> &str {
    &self.session
  }

  /// Run one reconciliation cycle. Never fails; every problem is
  /// folded into the returned report.
  #[instrument(skip(self, adapter, target), fields(session = %self.session, venue = adapter.venue_id()))]
  pub async fn reconcile_cycle(&self, adapter: &dyn VenueAdapter, target: &TargetState) -> CycleReport {
    let mut report = CycleReport::begin(&self.session, self.clock.now());

    let observed = match self.observe(adapter).await {
      Ok(state) => state,
      Err(e) => {
        warn!(error = %e, "Venue unavailable, cycle aborted");
        report.errors.push(e);
        report.finished_at = self.clock.now();
        return report;
      }
    };

    report.counts_before = observed.counts();
    let mut after = report.counts_before;
    let mut budget = ActionBudget::new(self.policy.max_actions_per_cycle);

    info!(
      buy = report.counts_before.buy,
      sell = report.counts_before.sell,
      held = report.counts_before.held,
      desired_buy = target.desired_buy_side,
      desired_sell = target.desired_sell_side,
      "Observed venue state"
    );

    // ── Buy side ───────────────────────────────────────
    let buy_price = self.policy.pricing.price(Side::Buy, &observed.quote);
    let buy_plan = plan_side(
      Side::Buy,
      &observed.buy_side_commitments,
      target.desired_buy_side,
      self.policy.refresh_mode,
      buy_price,
    );
    self
      .apply_cancels_and_amends(adapter, &buy_plan, buy_price, &mut budget, &mut report, &mut after)
      .await;
    let buy_orders = place_orders(
      Side::Buy,
      buy_plan.place_units,
      self.policy.buy_layout,
      buy_price,
      &[],
    );
    for order in buy_orders {
      self
        .execute(adapter, Action::Place(order), &mut budget, &mut report, &mut after)
        .await;
    }

    // ── Sell side ──────────────────────────────────────
    let sell_price = self.policy.pricing.price(Side::Sell, &observed.quote);
    let sell_plan = plan_side(
      Side::Sell,
      &observed.sell_side_commitments,
      target.desired_sell_side,
      self.policy.refresh_mode,
      sell_price,
    );
    let released = self
      .apply_cancels_and_amends(adapter, &sell_plan, sell_price, &mut budget, &mut report, &mut after)
      .await;

    if sell_plan.place_units > 0 {
      let inventory = if released > 0 {
        // Released items are only trusted once the venue shows them.
        match self.observe(adapter).await {
          Ok(state) => Some(state.held_inventory),
          Err(e) => {
            warn!(error = %e, "Re-observation failed, sell-side places skipped");
            report.errors.push(e);
            None
          }
        }
      } else {
        Some(observed.held_inventory.clone())
      };

      if let Some(items) = inventory {
        self
          .place_sell_side(adapter, &sell_plan, sell_price, &items, &mut budget, &mut report, &mut after)
          .await;
      }
    }

    if budget.deferred > 0 {
      report.errors.push(ReconcileError::ActionBudgetExhausted {
        deferred: budget.deferred,
      });
    }

    report.counts_after_intent = after;
    report.finished_at = self.clock.now();

    info!(
      actions = report.actions_taken.len(),
      errors = report.errors.len(),
      buy_after = after.buy,
      sell_after = after.sell,
      "Cycle complete"
    );
    report
  }

  async fn observe(&self, adapter: &dyn VenueAdapter) -> Result<ObservedState, ReconcileError> {
    with_retry(self.policy.fetch, self.clock.as_ref(), "venue state", || {
      adapter.get_state()
    })
    .await
  }

  /// Issue planned cancels (oldest first) and amends.
  ///
  /// Returns the number of units whose cancel was confirmed.
  async fn apply_cancels_and_amends(
    &self,
    adapter: &dyn VenueAdapter,
    plan: &SidePlan,
    price: Decimal,
    budget: &mut ActionBudget,
    report: &mut CycleReport,
    after: &mut SideCounts,
  ) -> u64 {
    debug!(side = %plan.side, branch = ?plan.branch, cancels = plan.cancels.len(), places = plan.place_units, "Side plan");

    let mut released = 0u64;
    for commitment in &plan.cancels {
      let action = Action::Cancel {
        id: commitment.id.clone(),
        side: plan.side,
        qty: commitment.qty,
      };
      let outcome = self.execute(adapter, action, budget, report, after).await;
      if outcome.as_ref().is_some_and(SubmissionOutcome::is_confirmed) {
        released += commitment.qty;
      }
    }
    for commitment in &plan.amends {
      let action = Action::Amend {
        id: commitment.id.clone(),
        side: plan.side,
        new_price: price,
      };
      self.execute(adapter, action, budget, report, after).await;
    }
    released
  }

  #[allow(clippy::too_many_arguments)]
  async fn place_sell_side(
    &self,
    adapter: &dyn VenueAdapter,
    plan: &SidePlan,
    price: Decimal,
    items: &[InventoryItem],
    budget: &mut ActionBudget,
    report: &mut CycleReport,
    after: &mut SideCounts,
  ) {
    let available = items.len() as u64;
    let (units, shortfall) = bound_by_inventory(plan.place_units, available);
    if let Some(needed) = shortfall {
      warn!(needed, available, "Insufficient inventory for sell side");
      report.errors.push(ReconcileError::InsufficientInventory {
        side: Side::Sell,
        needed,
        available,
      });
    }

    let orders = place_orders(Side::Sell, units, self.policy.layout(Side::Sell), price, items);
    for order in orders {
      self
        .execute(adapter, Action::Place(order), budget, report, after)
        .await;
    }
  }

  /// Build, submit, and record one action.
  ///
  /// Returns `None` when the action budget is already spent.
  async fn execute(
    &self,
    adapter: &dyn VenueAdapter,
    action: Action,
    budget: &mut ActionBudget,
    report: &mut CycleReport,
    after: &mut SideCounts,
  ) -> Option<SubmissionOutcome> {
    if !budget.take() {
      debug!(action = %action.label(), "Action budget spent, deferring");
      return None;
    }

    let built = match &action {
      Action::Place(order) => adapter.place(order).await,
      Action::Cancel { id, .. } => adapter.cancel(id).await,
      Action::Amend { id, new_price, .. } => adapter.amend(id, *new_price).await,
    };

    let (intent_id, outcome) = match built {
      Ok(intent) => {
        let outcome = self.submitter.submit(&intent).await;
        (Some(intent.id), outcome)
      }
      Err(e) => (None, SubmissionOutcome::Failed(format!("intent build failed: {e:#}"))),
    };

    match &outcome {
      SubmissionOutcome::Confirmed(tx) => {
        info!(action = %action.label(), tx = %tx, "Action confirmed");
      }
      SubmissionOutcome::Failed(reason) => {
        warn!(action = %action.label(), reason = %reason, "Action failed");
        report.errors.push(ReconcileError::ActionFailed {
          action: action.label(),
          reason: reason.clone(),
        });
      }
      SubmissionOutcome::Unknown => {
        warn!(action = %action.label(), "Action outcome unknown");
        report.errors.push(ReconcileError::ActionUnknown {
          action: action.label(),
        });
      }
    }

    project(after, &action);
    report.actions_taken.push(ActionRecord {
      action,
      intent_id,
      outcome: outcome.clone(),
    });
    Some(outcome)
  }
}

/// Apply an issued action to the projected counts.
fn project(counts: &mut SideCounts, action: &Action) {
  match action {
    Action::Place(order) => match order.side {
      Side::Buy => counts.buy += order.qty,
      Side::Sell => {
        counts.sell += order.qty;
        counts.held = counts.held.saturating_sub(order.qty);
      }
    },
    Action::Cancel { side, qty, .. } => match side {
      Side::Buy => counts.buy = counts.buy.saturating_sub(*qty),
      Side::Sell => {
        counts.sell = counts.sell.saturating_sub(*qty);
        counts.held += qty;
      }
    },
    Action::Amend { .. } => {}
  }
}
