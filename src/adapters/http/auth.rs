//! Venue Authentication - HMAC-SHA256 Request Signing
//!
//! Signs every venue API request with HMAC-SHA256. Credentials come from
//! environment variables (VENUE_API_KEY, VENUE_API_SECRET,
//! VENUE_PASSPHRASE) and are never read from the config file.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use base64::Engine;

/// Header names sent with every signed request.
pub const HEADER_KEY: &str = "X-VENUE-KEY";
pub const HEADER_PASSPHRASE: &str = "X-VENUE-PASSPHRASE";
pub const HEADER_TIMESTAMP: &str = "X-VENUE-TIMESTAMP";
pub const HEADER_SIGNATURE: &str = "X-VENUE-SIGNATURE";

/// Venue API credentials and signer.
pub struct VenueAuth {
    /// API key sent in headers.
    api_key: String,
    /// API secret (never sent in headers).
    api_secret: String,
    /// Passphrase sent in headers.
    passphrase: String,
}

impl std::fmt::Debug for VenueAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VenueAuth")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish_non_exhaustive()
    }
}

/// Headers attached to one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub key: String,
    pub passphrase: String,
    pub timestamp: String,
    pub signature: String,
}

impl VenueAuth {
    /// Build from explicit credentials.
    #[must_use]
    pub fn new(api_key: String, api_secret: String, passphrase: String) -> Self {
        Self {
            api_key,
            api_secret,
            passphrase,
        }
    }

    /// Load credentials from environment variables.
    ///
    /// # Errors
    /// Returns error naming the first missing variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("VENUE_API_KEY").context("VENUE_API_KEY not set")?;
        let api_secret = std::env::var("VENUE_API_SECRET").context("VENUE_API_SECRET not set")?;
        let passphrase = std::env::var("VENUE_PASSPHRASE").context("VENUE_PASSPHRASE not set")?;
        Ok(Self::new(api_key, api_secret, passphrase))
    }

    /// Current Unix timestamp in seconds.
    #[must_use]
    pub fn timestamp() -> String {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .to_string()
    }

    /// Signature = base64(HMAC-SHA256(secret, timestamp + method + path + body)).
    #[must_use]
    pub fn sign(&self, timestamp: &str, method: &str, path: &str, body: &str) -> String {
        let message = format!("{timestamp}{method}{path}{body}");
        let mac = hmac_sha256::HMAC::mac(message.as_bytes(), self.api_secret.as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac)
    }

    /// Headers for one request signed at the current time.
    #[must_use]
    pub fn headers(&self, method: &str, path: &str, body: &str) -> SignedHeaders {
        let timestamp = Self::timestamp();
        let signature = self.sign(&timestamp, method, path, body);
        SignedHeaders {
            key: self.api_key.clone(),
            passphrase: self.passphrase.clone(),
            timestamp,
            signature,
        }
    }
}
