//! Domain layer - Core reconciliation model.
//!
//! Pure types and decision logic for converging a remote venue toward a
//! target inventory. No I/O here (hexagonal architecture inner ring).
//! All types are serializable and testable in isolation.

pub mod planner;
pub mod report;
pub mod types;

// Re-export core types for convenience
pub use planner::{PricingPolicy, RefreshMode, SellMode, SidePlan};
pub use report::{CycleReport, RoundReport, RoundStatus, SwapReport};
pub use types::{
    Action, Commitment, Direction, Intent, IntentId, InventoryItem, Layout, ObservedState,
    PairTarget, PerpPosition, PlaceOrder, ReferenceQuote, Side, SideCounts, SubmissionOutcome,
    SwapQuote, TargetState,
};
