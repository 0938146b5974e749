//! Reconciliation Errors - Recoverable Failure Taxonomy
//!
//! Every failure the engine, coordinator, or rotation can run into is
//! folded into one of these variants and recorded in the cycle report.
//! None of them terminate a session loop; only an external stop does.

use serde::Serialize;
use thiserror::Error;

use crate::domain::types::Side;

/// How loudly an issue must be surfaced to the notification sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recovered locally, next cycle re-derives from fresh state.
    Warning,
    /// Unhedged exposure or another condition needing operator attention.
    Critical,
}

/// A recoverable failure recorded in a cycle, round, or hop report.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconcileError {
    #[error("venue unavailable after {attempts} attempts: {last_error}")]
    AdapterUnavailable { attempts: u32, last_error: String },

    #[error("{action} failed: {reason}")]
    ActionFailed { action: String, reason: String },

    #[error("{action} outcome unknown, treated as possibly pending")]
    ActionUnknown { action: String },

    #[error("insufficient inventory on {side} side: needed {needed}, available {available}")]
    InsufficientInventory {
        side: Side,
        needed: u64,
        available: u64,
    },

    #[error("nothing held of {asset}, swap hop skipped")]
    EmptyBalance { asset: String },

    #[error("asymmetric leg failure: {confirmed} confirmed, {failed} {outcome}")]
    AsymmetricLegFailure {
        confirmed: String,
        failed: String,
        outcome: String,
    },

    #[error("action budget exhausted, {deferred} actions deferred to next cycle")]
    ActionBudgetExhausted { deferred: u64 },
}

impl ReconcileError {
    /// Severity used for routing to notifiers.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::AsymmetricLegFailure { .. } => Severity::Critical,
            _ => Severity::Warning,
        }
    }

    /// Stable short label, used as a metric label value.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::AdapterUnavailable { .. } => "adapter_unavailable",
            Self::ActionFailed { .. } => "action_failed",
            Self::ActionUnknown { .. } => "action_unknown",
            Self::InsufficientInventory { .. } => "insufficient_inventory",
            Self::EmptyBalance { .. } => "empty_balance",
            Self::AsymmetricLegFailure { .. } => "asymmetric_leg_failure",
            Self::ActionBudgetExhausted { .. } => "action_budget_exhausted",
        }
    }
}
