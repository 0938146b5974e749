//! Cycle, round, and hop reports handed to the notification sink.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::types::{Action, Direction, IntentId, Side, SideCounts, SubmissionOutcome};
use crate::error::{ReconcileError, Severity};

/// One action the engine issued and what became of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionRecord {
    pub action: Action,
    /// Intent id, absent when the venue could not build the intent.
    pub intent_id: Option<IntentId>,
    pub outcome: SubmissionOutcome,
}

/// Result of one reconciliation cycle against an order-book venue.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub session: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Counts observed at the start of the cycle.
    pub counts_before: SideCounts,
    pub actions_taken: Vec<ActionRecord>,
    /// Counts the venue would show if every issued action landed.
    pub counts_after_intent: SideCounts,
    pub errors: Vec<ReconcileError>,
}

impl CycleReport {
    /// Empty report for a cycle starting now.
    #[must_use]
    pub fn begin(session: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            session: session.to_string(),
            started_at,
            finished_at: started_at,
            counts_before: SideCounts::default(),
            actions_taken: Vec::new(),
            counts_after_intent: SideCounts::default(),
            errors: Vec::new(),
        }
    }

    /// Number of `Place` actions issued on `side`.
    #[must_use]
    pub fn places(&self, side: Side) -> usize {
        self.count_actions(side, "place")
    }

    /// Number of `Cancel` actions issued on `side`.
    #[must_use]
    pub fn cancels(&self, side: Side) -> usize {
        self.count_actions(side, "cancel")
    }

    /// Number of `Amend` actions issued on `side`.
    #[must_use]
    pub fn amends(&self, side: Side) -> usize {
        self.count_actions(side, "amend")
    }

    fn count_actions(&self, side: Side, kind: &str) -> usize {
        self.actions_taken
            .iter()
            .filter(|r| r.action.side() == side && r.action.kind() == kind)
            .count()
    }

    /// Whether any recorded error has the given kind label.
    #[must_use]
    pub fn has_error(&self, kind: &str) -> bool {
        self.errors.iter().any(|e| e.kind() == kind)
    }

    /// True when the venue could not be observed at all.
    #[must_use]
    pub fn adapter_unavailable(&self) -> bool {
        self.has_error("adapter_unavailable")
    }
}

/// Terminal status of a paired-leg round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Both legs confirmed at every step and ended flat.
    Complete,
    /// Neither leg confirmed the step. Unknown outcomes may still land;
    /// the next round's synchronize step flattens whatever did.
    Degraded,
    /// Exactly one leg moved; the other side is unhedged.
    AsymmetricLegFailure,
}

/// Whether a round opened fresh positions or only re-synchronized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundKind {
    Fresh,
    Resync,
}

/// Which step of a round a leg action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LegPhase {
    Open,
    CancelResting,
    Close,
}

/// One leg action within a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LegRecord {
    pub account: String,
    pub direction: Direction,
    pub phase: LegPhase,
    pub outcome: SubmissionOutcome,
}

/// Result of one paired-leg round.
#[derive(Debug, Clone, Serialize)]
pub struct RoundReport {
    pub round_id: Uuid,
    pub session: String,
    pub kind: RoundKind,
    pub status: RoundStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub legs: Vec<LegRecord>,
    pub errors: Vec<ReconcileError>,
}

impl RoundReport {
    /// True when the round left one leg exposed without its hedge.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.status == RoundStatus::AsymmetricLegFailure
            || self.errors.iter().any(|e| e.severity() == Severity::Critical)
    }
}

/// Result of one swap-rotation hop.
#[derive(Debug, Clone, Serialize)]
pub struct SwapReport {
    pub hop_id: Uuid,
    pub session: String,
    pub input: String,
    pub output: String,
    pub in_amount: u64,
    pub expected_out: u64,
    /// Output re-observed from the venue after confirmation.
    pub observed_out: Option<u64>,
    pub outcome: Option<SubmissionOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub errors: Vec<ReconcileError>,
}
