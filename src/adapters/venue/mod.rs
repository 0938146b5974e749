//! REST venue adapters: order book, perp legs, and swap router.

pub mod orderbook;
pub mod perp;
pub mod swap;
pub mod types;

use anyhow::{Context, Result};

use crate::domain::types::Intent;
use crate::ports::signer::IntentSigner;
use types::UnsignedTxDto;

pub use orderbook::RestBookVenue;
pub use perp::RestPerpLeg;
pub use swap::RestSwapVenue;

/// Sign a venue-built transaction and wrap it into an intent.
async fn sign_intent(signer: &dyn IntentSigner, account: &str, unsigned: &UnsignedTxDto) -> Result<Intent> {
    let bytes = unsigned.bytes()?;
    let signed = signer
        .sign(account, &bytes)
        .await
        .with_context(|| format!("Signer refused transaction for {account}"))?;
    Ok(Intent::new(signed, unsigned.last_valid_height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::Engine;

    /// Signer that appends the account name to the bytes.
    struct SuffixSigner;

    #[async_trait]
    impl IntentSigner for SuffixSigner {
        async fn sign(&self, account: &str, unsigned: &[u8]) -> Result<Vec<u8>> {
            let mut signed = unsigned.to_vec();
            signed.extend_from_slice(account.as_bytes());
            Ok(signed)
        }
    }

    #[tokio::test]
    async fn test_sign_intent_keeps_venue_deadline() {
        let unsigned = UnsignedTxDto {
            tx: base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]),
            last_valid_height: Some(812),
        };
        let intent = sign_intent(&SuffixSigner, "ab", &unsigned).await.unwrap();
        assert_eq!(intent.payload, vec![1, 2, 3, b'a', b'b']);
        assert_eq!(intent.last_valid_height, Some(812));
    }

    #[tokio::test]
    async fn test_sign_intent_rejects_bad_base64() {
        let unsigned = UnsignedTxDto {
            tx: "not base64!".to_string(),
            last_valid_height: None,
        };
        assert!(sign_intent(&SuffixSigner, "ab", &unsigned).await.is_err());
    }
}
