//! Swap Venue Port - Routed Swap Interface

use async_trait::async_trait;

use crate::domain::types::{AssetId, Intent, SwapQuote};

/// Trait for swap routers.
#[async_trait]
pub trait SwapVenue: Send + Sync + 'static {
  /// Quote swapping `amount` base units of `input` into `output`.
  async fn quote(
    &self,
    input: &AssetId,
    output: &AssetId,
    amount: u64,
    slippage_bps: u16,
  ) -> anyhow::Result<SwapQuote>;

  /// Build a signed intent executing a quote.
  async fn build_swap(&self, quote: &SwapQuote) -> anyhow::Result<Intent>;

  /// Held balance of `asset` in base units.
  async fn balance(&self, asset: &AssetId) -> anyhow::Result<u64>;
}
