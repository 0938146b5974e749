//! Perp Leg Port - One Account on a Perpetual-Futures Venue
//!
//! A paired-leg session drives two of these, one per identity, and
//! keeps them in lockstep.

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::types::{Direction, Intent, PerpPosition};

/// Trait for a single perp-venue account.
#[async_trait]
pub trait PerpLeg: Send + Sync + 'static {
  /// Account identifier used in reports.
  fn account(&self) -> &str;

  /// Current mark price of the leg's market.
  async fn mark_price(&self) -> anyhow::Result<Decimal>;

  /// Open positions held by this account.
  async fn positions(&self) -> anyhow::Result<Vec<PerpPosition>>;

  /// Build a signed limit order opening a position.
  async fn open(
    &self,
    direction: Direction,
    size: Decimal,
    limit_price: Decimal,
  ) -> anyhow::Result<Intent>;

  /// Build a signed limit order flattening a position.
  async fn close(&self, position: &PerpPosition, limit_price: Decimal) -> anyhow::Result<Intent>;

  /// Build a signed instruction cancelling every resting order.
  async fn cancel_all(&self) -> anyhow::Result<Intent>;
}
