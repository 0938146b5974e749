//! Venue API Request/Response Types
//!
//! Serialization types for the venue REST API. Venues build unsigned
//! transactions server-side and return them base64-encoded; adapters
//! sign them through the external signer.

use anyhow::{Context, Result};
use base64::Engine;
use chrono::DateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::types::{
    Commitment, Direction, InventoryItem, ObservedState, PerpPosition, ReferenceQuote, Side,
};

/// Book snapshot for one market and owner.
#[derive(Debug, Clone, Deserialize)]
pub struct BookSnapshotDto {
    /// Best collection bid.
    pub bid: Decimal,
    /// Floor price.
    pub ask: Decimal,
    /// Owner's open bids and listings.
    #[serde(default)]
    pub commitments: Vec<CommitmentDto>,
    /// Owner's held, unlisted items.
    #[serde(default)]
    pub inventory: Vec<ItemDto>,
}

/// One open bid or listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitmentDto {
    pub id: String,
    /// "bid" or "listing".
    pub kind: String,
    pub price: Decimal,
    /// Units; absent for single listings.
    #[serde(default = "one")]
    pub qty: u64,
    /// Creation time (Unix ms).
    pub created_at_ms: i64,
    /// Listed item, for listings.
    #[serde(default)]
    pub item: Option<String>,
}

const fn one() -> u64 {
    1
}

/// One held item.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemDto {
    pub id: String,
}

impl CommitmentDto {
    /// Convert to the domain commitment.
    ///
    /// # Errors
    /// Returns error on an unknown kind or out-of-range timestamp.
    pub fn into_domain(self) -> Result<Commitment> {
        let side = match self.kind.as_str() {
            "bid" => Side::Buy,
            "listing" => Side::Sell,
            other => anyhow::bail!("unknown commitment kind {other:?} for {}", self.id),
        };
        let created_at = DateTime::from_timestamp_millis(self.created_at_ms)
            .with_context(|| format!("invalid created_at_ms for {}", self.id))?;
        Ok(Commitment {
            id: self.id,
            side,
            price: self.price,
            qty: self.qty,
            created_at,
            item: self.item,
        })
    }
}

impl BookSnapshotDto {
    /// Convert to a fresh observed state.
    ///
    /// # Errors
    /// Returns error if any commitment fails to convert.
    pub fn into_observed(self) -> Result<ObservedState> {
        let mut state = ObservedState {
            buy_side_commitments: Vec::new(),
            sell_side_commitments: Vec::new(),
            held_inventory: self
                .inventory
                .into_iter()
                .map(|i| InventoryItem { id: i.id })
                .collect(),
            quote: ReferenceQuote {
                bid: self.bid,
                ask: self.ask,
            },
        };
        for dto in self.commitments {
            let commitment = dto.into_domain()?;
            match commitment.side {
                Side::Buy => state.buy_side_commitments.push(commitment),
                Side::Sell => state.sell_side_commitments.push(commitment),
            }
        }
        Ok(state)
    }
}

/// Unsigned transaction returned by the venue's build endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct UnsignedTxDto {
    /// Base64-encoded transaction bytes.
    pub tx: String,
    /// Last height at which the transaction may be included.
    #[serde(default)]
    pub last_valid_height: Option<u64>,
}

impl UnsignedTxDto {
    /// Decode the transaction bytes.
    ///
    /// # Errors
    /// Returns error on invalid base64.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.tx)
            .context("venue returned invalid base64 transaction")
    }
}

/// Build a bid pool or a listing.
#[derive(Debug, Clone, Serialize)]
pub struct PlaceTxRequest<'a> {
    pub market: &'a str,
    pub owner: &'a str,
    /// "bid" or "listing".
    pub kind: &'static str,
    pub price: Decimal,
    pub qty: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<&'a str>,
}

/// Cancel a bid pool or listing.
#[derive(Debug, Clone, Serialize)]
pub struct CancelTxRequest<'a> {
    pub market: &'a str,
    pub owner: &'a str,
    pub id: &'a str,
}

/// Re-price a listing in place.
#[derive(Debug, Clone, Serialize)]
pub struct AmendTxRequest<'a> {
    pub market: &'a str,
    pub owner: &'a str,
    pub id: &'a str,
    pub price: Decimal,
}

/// Map a book side onto the venue's commitment kind.
#[must_use]
pub const fn kind_for(side: Side) -> &'static str {
    match side {
        Side::Buy => "bid",
        Side::Sell => "listing",
    }
}

// ── Perp venue ─────────────────────────────────────────────

/// Mark price response.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkDto {
    pub mark: Decimal,
}

/// One open perp position.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionDto {
    pub id: String,
    pub market: String,
    /// Signed size: positive long, negative short.
    pub size: Decimal,
}

impl PositionDto {
    /// Convert to the domain position.
    #[must_use]
    pub fn into_domain(self) -> PerpPosition {
        let direction = if self.size.is_sign_negative() {
            Direction::Short
        } else {
            Direction::Long
        };
        PerpPosition {
            id: self.id,
            market: self.market,
            direction,
            size: self.size.abs(),
        }
    }
}

/// Build a perp limit order.
#[derive(Debug, Clone, Serialize)]
pub struct PerpOrderRequest<'a> {
    pub market: &'a str,
    pub account: &'a str,
    pub direction: Direction,
    pub size: Decimal,
    pub limit_price: Decimal,
    /// Set on closes so the order cannot flip the position.
    pub reduce_only: bool,
}

/// Cancel every resting order of an account.
#[derive(Debug, Clone, Serialize)]
pub struct PerpCancelAllRequest<'a> {
    pub market: &'a str,
    pub account: &'a str,
}

// ── Swap router ────────────────────────────────────────────

/// Swap quote response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteDto {
    pub in_amount: String,
    pub out_amount: String,
    /// Opaque route plan, passed back on build.
    #[serde(flatten)]
    pub rest: serde_json::Map<String, serde_json::Value>,
}

/// Build a swap from a quote.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapBuildRequest<'a> {
    pub quote_response: &'a serde_json::Value,
    pub user_public_key: &'a str,
}

/// Held balance of one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceDto {
    /// Base units, as a decimal string.
    pub amount: String,
}
