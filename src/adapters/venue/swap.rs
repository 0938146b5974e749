//! REST Swap Venue - Routed Swaps Through an Aggregator

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::sign_intent;
use super::types::{BalanceDto, QuoteDto, SwapBuildRequest, UnsignedTxDto};
use crate::adapters::http::VenueHttpClient;
use crate::domain::types::{AssetId, Intent, SwapQuote};
use crate::ports::signer::IntentSigner;
use crate::ports::swap::SwapVenue;

/// Swap-router adapter for one owner.
pub struct RestSwapVenue {
    client: Arc<VenueHttpClient>,
    signer: Arc<dyn IntentSigner>,
    owner: String,
}

impl RestSwapVenue {
    #[must_use]
    pub fn new(client: Arc<VenueHttpClient>, signer: Arc<dyn IntentSigner>, owner: impl Into<String>) -> Self {
        Self {
            client,
            signer,
            owner: owner.into(),
        }
    }
}

fn parse_amount(field: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("invalid {field} amount {value:?}"))
}

#[async_trait]
impl SwapVenue for RestSwapVenue {
    async fn quote(
        &self,
        input: &AssetId,
        output: &AssetId,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<SwapQuote> {
        let path = format!(
            "/v1/swap/quote?inputMint={input}&outputMint={output}&amount={amount}&slippageBps={slippage_bps}"
        );
        let raw: serde_json::Value = self.client.get_json(&path).await?;
        let dto: QuoteDto = serde_json::from_value(raw.clone()).context("Malformed swap quote")?;
        Ok(SwapQuote {
            input: input.clone(),
            output: output.clone(),
            in_amount: parse_amount("in", &dto.in_amount)?,
            out_amount: parse_amount("out", &dto.out_amount)?,
            route: raw,
        })
    }

    async fn build_swap(&self, quote: &SwapQuote) -> Result<Intent> {
        let request = SwapBuildRequest {
            quote_response: &quote.route,
            user_public_key: &self.owner,
        };
        let unsigned: UnsignedTxDto = self
            .client
            .post_json("/v1/swap/build", &request)
            .await
            .context("Venue failed to build swap")?;
        sign_intent(self.signer.as_ref(), &self.owner, &unsigned).await
    }

    async fn balance(&self, asset: &AssetId) -> Result<u64> {
        let path = format!("/v1/balances/{}/{asset}", self.owner);
        let balance: BalanceDto = self.client.get_json(&path).await?;
        parse_amount("balance", &balance.amount)
    }
}
