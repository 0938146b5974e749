//! Ledger Client Port - Broadcast and Confirmation Interface
//!
//! The wire-level ledger client the transaction submitter drives. One
//! client may be shared read-only by every session in the process.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::types::TxId;

/// Why a broadcast did not return a transaction id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
  /// The node answered and refused the transaction; it cannot land.
  #[error("broadcast refused: {0}")]
  Refused(String),
  /// The request may have reached the node before failing, so the
  /// transaction may still land.
  #[error("broadcast outcome ambiguous: {0}")]
  Ambiguous(String),
}

/// Inclusion status of a broadcast transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerStatus {
  /// Not yet included (or not yet visible to the node).
  Pending,
  /// Included successfully.
  Confirmed,
  /// Definitely rejected, with the ledger's reason.
  Rejected(String),
}

/// Current ledger reference point used to bound validity windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBlock {
  /// Block height / slot.
  pub height: u64,
  /// Block hash, when the ledger reports one.
  pub hash: Option<String>,
}

/// Trait for ledger connections.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
  /// Broadcast signed bytes, returning the ledger transaction id.
  ///
  /// # Errors
  /// `Refused` when the node rejects the transaction outright,
  /// `Ambiguous` when delivery cannot be ruled out.
  async fn broadcast(&self, signed: &[u8]) -> Result<TxId, BroadcastError>;

  /// Query inclusion status of a broadcast transaction.
  async fn get_status(&self, id: &TxId) -> anyhow::Result<LedgerStatus>;

  /// Current reference block.
  async fn reference_block(&self) -> anyhow::Result<ReferenceBlock>;
}
