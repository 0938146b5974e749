//! Remote Signer - Delegates Signing to an External Service
//!
//! Posts unsigned transaction bytes to a signing service and returns
//! the signed bytes. Keys stay in the signing service.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::ports::signer::IntentSigner;

#[derive(Debug, Serialize)]
struct SignRequest<'a> {
    account: &'a str,
    /// Base64 unsigned bytes.
    payload: String,
}

#[derive(Debug, Deserialize)]
struct SignResponse {
    /// Base64 signed bytes.
    signed: String,
}

/// HTTP client for the signing service.
pub struct RemoteSigner {
    http: Client,
    url: String,
}

impl RemoteSigner {
    /// Create a signer client.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build signer client")?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl IntentSigner for RemoteSigner {
    async fn sign(&self, account: &str, unsigned: &[u8]) -> Result<Vec<u8>> {
        let engine = base64::engine::general_purpose::STANDARD;
        let request = SignRequest {
            account,
            payload: engine.encode(unsigned),
        };
        let response: SignResponse = self
            .http
            .post(format!("{}/sign", self.url))
            .json(&request)
            .send()
            .await
            .context("Signer request failed")?
            .error_for_status()
            .context("Signer refused")?
            .json()
            .await
            .context("Signer returned malformed JSON")?;
        engine
            .decode(response.signed)
            .context("Signer returned invalid base64")
    }
}
