//! Venue Adapter Port - Order-Book Venue Interface
//!
//! Defines the capability set the reconciliation engine needs from a
//! venue: observe the full book state for the session owner, and build
//! signed intents for place / cancel / amend corrections.
//!
//! Key design decisions:
//! - Adapters build intents but never broadcast them; the submitter owns
//!   the ledger round-trip
//! - `get_state` returns a complete snapshot, never a diff

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::types::{CommitmentId, Intent, ObservedState, PlaceOrder};

/// Trait for order-book style venues (bids, listings, pools).
#[async_trait]
pub trait VenueAdapter: Send + Sync + 'static {
  /// Identifier used in logs and reports.
  fn venue_id(&self) -> &str;

  /// Observe commitments, held inventory, and the reference quote.
  ///
  /// # Errors
  /// Returns error on any transport or decode failure; the engine
  /// retries with a fixed budget.
  async fn get_state(&self) -> anyhow::Result<ObservedState>;

  /// Build a signed intent placing a new commitment.
  async fn place(&self, order: &PlaceOrder) -> anyhow::Result<Intent>;

  /// Build a signed intent cancelling an open commitment.
  async fn cancel(&self, id: &CommitmentId) -> anyhow::Result<Intent>;

  /// Build a signed intent re-pricing an open commitment in place.
  ///
  /// Venues without edit support keep the default, which refuses.
  async fn amend(&self, id: &CommitmentId, new_price: Decimal) -> anyhow::Result<Intent> {
    anyhow::bail!(
      "venue {} does not support amending {id} to {new_price}",
      self.venue_id()
    )
  }
}
