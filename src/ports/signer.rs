//! Intent Signer Port - External Key Custody
//!
//! Venue adapters hand unsigned transaction bytes to a signer; key
//! material never lives in this process.

use async_trait::async_trait;

/// Trait for signing services.
#[async_trait]
pub trait IntentSigner: Send + Sync + 'static {
  /// Sign `unsigned` bytes on behalf of `account`.
  ///
  /// # Errors
  /// Returns error if the signer refuses or is unreachable.
  async fn sign(&self, account: &str, unsigned: &[u8]) -> anyhow::Result<Vec<u8>>;
}
