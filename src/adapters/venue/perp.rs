//! REST Perp Leg - One Account on a Perpetual-Futures Venue

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;

use super::sign_intent;
use super::types::{MarkDto, PerpCancelAllRequest, PerpOrderRequest, PositionDto, UnsignedTxDto};
use crate::adapters::http::VenueHttpClient;
use crate::domain::types::{Direction, Intent, PerpPosition};
use crate::ports::perp::PerpLeg;
use crate::ports::signer::IntentSigner;

/// Perp-venue account adapter.
pub struct RestPerpLeg {
    client: Arc<VenueHttpClient>,
    signer: Arc<dyn IntentSigner>,
    market: String,
    account: String,
}

impl RestPerpLeg {
    #[must_use]
    pub fn new(
        client: Arc<VenueHttpClient>,
        signer: Arc<dyn IntentSigner>,
        market: impl Into<String>,
        account: impl Into<String>,
    ) -> Self {
        Self {
            client,
            signer,
            market: market.into(),
            account: account.into(),
        }
    }

    async fn order(
        &self,
        direction: Direction,
        size: Decimal,
        limit_price: Decimal,
        reduce_only: bool,
    ) -> Result<Intent> {
        let request = PerpOrderRequest {
            market: &self.market,
            account: &self.account,
            direction,
            size,
            limit_price,
            reduce_only,
        };
        let unsigned: UnsignedTxDto = self
            .client
            .post_json("/v1/perp/tx/order", &request)
            .await
            .context("Venue failed to build perp order")?;
        sign_intent(self.signer.as_ref(), &self.account, &unsigned).await
    }
}

#[async_trait]
impl PerpLeg for RestPerpLeg {
    fn account(&self) -> &str {
        &self.account
    }

    async fn mark_price(&self) -> Result<Decimal> {
        let path = format!("/v1/perp/{}/mark", self.market);
        let mark: MarkDto = self.client.get_json(&path).await?;
        Ok(mark.mark)
    }

    async fn positions(&self) -> Result<Vec<PerpPosition>> {
        let path = format!("/v1/perp/{}/positions?account={}", self.market, self.account);
        let positions: Vec<PositionDto> = self.client.get_json(&path).await?;
        Ok(positions
            .into_iter()
            .map(PositionDto::into_domain)
            .filter(|p| !p.size.is_zero())
            .collect())
    }

    async fn open(&self, direction: Direction, size: Decimal, limit_price: Decimal) -> Result<Intent> {
        self.order(direction, size, limit_price, false).await
    }

    async fn close(&self, position: &PerpPosition, limit_price: Decimal) -> Result<Intent> {
        self.order(position.direction.opposite(), position.size, limit_price, true)
            .await
    }

    async fn cancel_all(&self) -> Result<Intent> {
        let request = PerpCancelAllRequest {
            market: &self.market,
            account: &self.account,
        };
        let unsigned: UnsignedTxDto = self
            .client
            .post_json("/v1/perp/tx/cancel-all", &request)
            .await
            .context("Venue failed to build cancel-all")?;
        sign_intent(self.signer.as_ref(), &self.account, &unsigned).await
    }
}
