//! REST Order-Book Venue - Bids and Listings for One Owner
//!
//! Observes the owner's bid pools, listings, and held items for one
//! market, and asks the venue to build place / cancel / amend
//! transactions which are then signed externally.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::sign_intent;
use super::types::{
    kind_for, AmendTxRequest, BookSnapshotDto, CancelTxRequest, PlaceTxRequest, UnsignedTxDto,
};
use crate::adapters::http::VenueHttpClient;
use crate::domain::types::{CommitmentId, Intent, ObservedState, PlaceOrder};
use crate::ports::signer::IntentSigner;
use crate::ports::venue::VenueAdapter;

/// Order-book venue adapter over the venue REST API.
pub struct RestBookVenue {
    /// Identifier for logs: `market/owner`.
    id: String,
    /// Paced HTTP client.
    client: Arc<VenueHttpClient>,
    /// External signer.
    signer: Arc<dyn IntentSigner>,
    /// Market / collection.
    market: String,
    /// Account whose commitments are reconciled.
    owner: String,
}

impl RestBookVenue {
    /// Create an adapter for one market and owner.
    #[must_use]
    pub fn new(
        client: Arc<VenueHttpClient>,
        signer: Arc<dyn IntentSigner>,
        market: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        let market = market.into();
        let owner = owner.into();
        Self {
            id: format!("{market}/{owner}"),
            client,
            signer,
            market,
            owner,
        }
    }

    async fn build(&self, path: &str, unsigned: Result<UnsignedTxDto>) -> Result<Intent> {
        let unsigned = unsigned.with_context(|| format!("Venue failed to build {path}"))?;
        sign_intent(self.signer.as_ref(), &self.owner, &unsigned).await
    }
}

#[async_trait]
impl VenueAdapter for RestBookVenue {
    fn venue_id(&self) -> &str {
        &self.id
    }

    #[instrument(skip(self), fields(venue = %self.id))]
    async fn get_state(&self) -> Result<ObservedState> {
        let path = format!("/v1/markets/{}/book?owner={}", self.market, self.owner);
        let snapshot: BookSnapshotDto = self.client.get_json(&path).await?;
        let state = snapshot.into_observed()?;
        debug!(
            bids = state.buy_side_commitments.len(),
            listings = state.sell_side_commitments.len(),
            held = state.held_inventory.len(),
            "Book snapshot"
        );
        Ok(state)
    }

    async fn place(&self, order: &PlaceOrder) -> Result<Intent> {
        let request = PlaceTxRequest {
            market: &self.market,
            owner: &self.owner,
            kind: kind_for(order.side),
            price: order.price,
            qty: order.qty,
            item: order.item.as_deref(),
        };
        let unsigned = self.client.post_json("/v1/tx/place", &request).await;
        self.build("place", unsigned).await
    }

    async fn cancel(&self, id: &CommitmentId) -> Result<Intent> {
        let request = CancelTxRequest {
            market: &self.market,
            owner: &self.owner,
            id,
        };
        let unsigned = self.client.post_json("/v1/tx/cancel", &request).await;
        self.build("cancel", unsigned).await
    }

    async fn amend(&self, id: &CommitmentId, new_price: Decimal) -> Result<Intent> {
        let request = AmendTxRequest {
            market: &self.market,
            owner: &self.owner,
            id,
            price: new_price,
        };
        let unsigned = self.client.post_json("/v1/tx/amend", &request).await;
        self.build("amend", unsigned).await
    }
}
