//! Core reconciliation domain types.
//!
//! Defines the entities the engine reasons about: commitments held open
//! on a venue, inventory, reference quotes, targets, actions, intents,
//! and submission outcomes. These types are the foundation of the
//! hexagonal architecture's inner ring and perform no I/O.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ────────────────────────────────────────────
// Identifiers
// ────────────────────────────────────────────

/// Venue-assigned identifier of an open commitment.
pub type CommitmentId = String;

/// Venue-assigned identifier of a held inventory item.
pub type ItemId = String;

/// Ledger identifier of a broadcast transaction (hash or signature).
pub type TxId = String;

/// Identifier of an asset on a swap venue (mint, token address).
pub type AssetId = String;

/// Locally generated identifier of a signed intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IntentId(pub Uuid);

impl IntentId {
    /// Generate a fresh random intent id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for IntentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for IntentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

// ────────────────────────────────────────────
// Sides and layouts
// ────────────────────────────────────────────

/// Book side of a commitment: bids on the buy side, listings on the sell side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// How units are packed into commitments on one side of a venue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    /// One commitment per unit (listings of individual items).
    #[default]
    Unit,
    /// One commitment may carry many units (a bid pool).
    Pooled,
}

/// Direction of a perpetual-futures position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// The direction that flattens a position in this direction.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

// ────────────────────────────────────────────
// Observed state
// ────────────────────────────────────────────

/// An open remote obligation (order, listing, bid pool) owned by the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    /// Venue-assigned identifier.
    pub id: CommitmentId,
    /// Book side.
    pub side: Side,
    /// Quoted price.
    pub price: Decimal,
    /// Units carried by this commitment (1 for unit layouts).
    pub qty: u64,
    /// When the venue recorded the commitment.
    pub created_at: DateTime<Utc>,
    /// Inventory item locked by a sell-side listing, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemId>,
}

/// A held, unlisted inventory item available for sell-side commitments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Venue-assigned identifier.
    pub id: ItemId,
}

/// Current reference prices used to re-quote commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceQuote {
    /// Best collection bid.
    pub bid: Decimal,
    /// Floor / best ask.
    pub ask: Decimal,
}

/// Snapshot of the venue, rebuilt wholesale every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedState {
    /// Open buy-side commitments.
    pub buy_side_commitments: Vec<Commitment>,
    /// Open sell-side commitments.
    pub sell_side_commitments: Vec<Commitment>,
    /// Held, unlisted items.
    pub held_inventory: Vec<InventoryItem>,
    /// Reference prices at observation time.
    pub quote: ReferenceQuote,
}

impl ObservedState {
    /// Commitments on one side.
    #[must_use]
    pub fn commitments(&self, side: Side) -> &[Commitment] {
        match side {
            Side::Buy => &self.buy_side_commitments,
            Side::Sell => &self.sell_side_commitments,
        }
    }

    /// Unit count on one side (sum of commitment quantities).
    #[must_use]
    pub fn count(&self, side: Side) -> u64 {
        unit_count(self.commitments(side))
    }

    /// Per-side counts for reporting.
    #[must_use]
    pub fn counts(&self) -> SideCounts {
        SideCounts {
            buy: self.count(Side::Buy),
            sell: self.count(Side::Sell),
            held: self.held_inventory.len() as u64,
        }
    }
}

/// Sum of units across a set of commitments.
#[must_use]
pub fn unit_count(commitments: &[Commitment]) -> u64 {
    commitments.iter().map(|c| c.qty).sum()
}

/// Unit counts per side plus held inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideCounts {
    pub buy: u64,
    pub sell: u64,
    pub held: u64,
}

// ────────────────────────────────────────────
// Targets
// ────────────────────────────────────────────

/// Desired unit counts per side. Immutable for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    /// Units the buy side should carry.
    pub desired_buy_side: u64,
    /// Units the sell side should carry.
    pub desired_sell_side: u64,
}

impl TargetState {
    /// Split a total evenly between both sides.
    #[must_use]
    pub const fn balanced(total: u64) -> Self {
        Self {
            desired_buy_side: total / 2,
            desired_sell_side: total / 2,
        }
    }

    /// Desired units on one side.
    #[must_use]
    pub const fn desired(&self, side: Side) -> u64 {
        match side {
            Side::Buy => self.desired_buy_side,
            Side::Sell => self.desired_sell_side,
        }
    }
}

/// Desired position amounts for a delta-neutral pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairTarget {
    /// Size of the long leg.
    pub desired_long: Decimal,
    /// Size of the short leg.
    pub desired_short: Decimal,
}

impl PairTarget {
    /// Split a total amount evenly between both legs.
    #[must_use]
    pub fn balanced(total_amount: Decimal) -> Self {
        let half = total_amount / Decimal::TWO;
        Self {
            desired_long: half,
            desired_short: half,
        }
    }
}

// ────────────────────────────────────────────
// Actions, intents, outcomes
// ────────────────────────────────────────────

/// Parameters of a new commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub side: Side,
    pub price: Decimal,
    pub qty: u64,
    /// Item to list, for unit sell-side places.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<ItemId>,
}

/// A pending correction computed by the engine for the current cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Place(PlaceOrder),
    Cancel { id: CommitmentId, side: Side, qty: u64 },
    Amend { id: CommitmentId, side: Side, new_price: Decimal },
}

impl Action {
    /// Book side the action touches.
    #[must_use]
    pub const fn side(&self) -> Side {
        match self {
            Self::Place(order) => order.side,
            Self::Cancel { side, .. } | Self::Amend { side, .. } => *side,
        }
    }

    /// Short human-readable label for logs and error records.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Place(o) => format!("place {} {}@{}", o.side, o.qty, o.price),
            Self::Cancel { id, side, .. } => format!("cancel {side} {id}"),
            Self::Amend { id, new_price, .. } => format!("amend {id}->{new_price}"),
        }
    }

    /// Metric label of the action type.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Place(_) => "place",
            Self::Cancel { .. } => "cancel",
            Self::Amend { .. } => "amend",
        }
    }
}

/// A fully formed, signed instruction ready for broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Intent {
    /// Local identity; the submitter never broadcasts the same id twice.
    pub id: IntentId,
    /// Signed wire bytes.
    pub payload: Vec<u8>,
    /// Last ledger height at which the intent may still be included, when
    /// the venue supplied one at build time.
    pub last_valid_height: Option<u64>,
}

impl Intent {
    /// Wrap signed bytes into a fresh intent.
    #[must_use]
    pub fn new(payload: Vec<u8>, last_valid_height: Option<u64>) -> Self {
        Self {
            id: IntentId::new(),
            payload,
            last_valid_height,
        }
    }
}

/// Terminal result of submitting one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Included on the ledger; carries the transaction id.
    Confirmed(TxId),
    /// Definitely not included.
    Failed(String),
    /// Confirmation not observed before the validity deadline.
    Unknown,
}

impl SubmissionOutcome {
    #[must_use]
    pub const fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Metric label of the outcome.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "confirmed",
            Self::Failed(_) => "failed",
            Self::Unknown => "unknown",
        }
    }
}

// ────────────────────────────────────────────
// Perp and swap venue types
// ────────────────────────────────────────────

/// An open perpetual-futures position on one leg account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerpPosition {
    /// Venue-assigned identifier.
    pub id: String,
    /// Market the position is on.
    pub market: String,
    pub direction: Direction,
    /// Absolute position size.
    pub size: Decimal,
}

/// A routed swap quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub input: AssetId,
    pub output: AssetId,
    /// Input amount in base units.
    pub in_amount: u64,
    /// Expected output amount in base units.
    pub out_amount: u64,
    /// Venue route payload passed back when building the swap.
    #[serde(default)]
    pub route: serde_json::Value,
}
