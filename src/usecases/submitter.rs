//! Transaction Submitter - Broadcast and Confirm Signed Intents
//!
//! Turns a signed intent into exactly one of `Confirmed`, `Failed`, or
//! `Unknown`:
//! - broadcast once; a refused broadcast is `Failed`, one that may have
//!   reached the ledger anyway is `Unknown`
//! - poll inclusion status on the injected clock
//! - `Rejected` from the ledger is `Failed`, inclusion is `Confirmed`
//! - once the ledger height passes the intent's validity deadline, or
//!   either status or height stops being observable, the outcome is
//!   `Unknown`
//!
//! An intent id is broadcast at most once per submitter. Callers that
//! want to try again must re-derive a new intent from fresh venue state.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::domain::types::{Intent, IntentId, SubmissionOutcome};
use crate::ports::ledger::{BroadcastError, LedgerClient, LedgerStatus};
use crate::usecases::scheduler::Clock;

/// Submitter tuning.
#[derive(Debug, Clone, Copy)]
pub struct SubmitterConfig {
  /// Blocks past the broadcast reference height an intent stays valid
  /// for, when the venue did not supply its own deadline.
  pub validity_window_blocks: u64,
  /// Delay between status polls.
  pub poll_interval: Duration,
  /// Consecutive failed status queries, or failed height queries,
  /// tolerated before giving up.
  pub max_status_errors: u32,
}

impl Default for SubmitterConfig {
  fn default() -> Self {
    Self {
      validity_window_blocks: 150,
      poll_interval: Duration::from_secs(2),
      max_status_errors: 10,
    }
  }
}

/// Broadcasts intents and waits for a terminal outcome.
///
/// Each session owns its own submitter; the ledger client behind it may
/// be shared.
pub struct TransactionSubmitter {
  /// Ledger connection.
  ledger: Arc<dyn LedgerClient>,
  /// Clock used between polls.
  clock: Arc<dyn Clock>,
  /// Tuning.
  config: SubmitterConfig,
  /// Every intent id this submitter has ever broadcast.
  submitted: Mutex<HashSet<IntentId>>,
}

impl TransactionSubmitter {
  /// Create a submitter over a ledger connection.
  #[must_use]
  pub fn new(ledger: Arc<dyn LedgerClient>, clock: Arc<dyn Clock>, config: SubmitterConfig) -> Self {
    Self {
      ledger,
      clock,
      config,
      submitted: Mutex::new(HashSet::new()),
    }
  }

  /// Number of distinct intents broadcast so far.
  pub async fn submitted_count(&self) -> usize {
    self.submitted.lock().await.len()
  }

  /// Submit one intent and block until its outcome is known.
  #[instrument(skip(self, intent), fields(intent = %intent.id))]
  pub async fn submit(&self, intent: &Intent) -> SubmissionOutcome {
    if self.submitted.lock().await.contains(&intent.id) {
      return already_submitted();
    }

    let deadline = match intent.last_valid_height {
      Some(height) => height,
      None => match self.ledger.reference_block().await {
        Ok(block) => block.height + self.config.validity_window_blocks,
        Err(e) => {
          return SubmissionOutcome::Failed(format!("reference block unavailable: {e:#}"));
        }
      },
    };

    if !self.submitted.lock().await.insert(intent.id) {
      return already_submitted();
    }
    let tx_id = match self.ledger.broadcast(&intent.payload).await {
      Ok(id) => id,
      Err(BroadcastError::Refused(reason)) => {
        warn!(reason = %reason, "Broadcast refused");
        return SubmissionOutcome::Failed(format!("broadcast refused: {reason}"));
      }
      Err(BroadcastError::Ambiguous(reason)) => {
        warn!(reason = %reason, "Broadcast may have reached the ledger, outcome unknown");
        return SubmissionOutcome::Unknown;
      }
    };
    debug!(tx = %tx_id, deadline, "Broadcast accepted, polling for inclusion");

    let mut status_errors = 0u32;
    let mut block_errors = 0u32;
    loop {
      self.clock.sleep(self.config.poll_interval).await;

      match self.ledger.get_status(&tx_id).await {
        Ok(LedgerStatus::Confirmed) => {
          info!(tx = %tx_id, "Intent confirmed");
          return SubmissionOutcome::Confirmed(tx_id);
        }
        Ok(LedgerStatus::Rejected(reason)) => {
          warn!(tx = %tx_id, reason = %reason, "Intent rejected");
          return SubmissionOutcome::Failed(reason);
        }
        Ok(LedgerStatus::Pending) => status_errors = 0,
        Err(e) => {
          status_errors += 1;
          debug!(error = %e, status_errors, "Status query failed");
        }
      }

      // The deadline must stay observable even while status reads succeed.
      match self.ledger.reference_block().await {
        Ok(block) if block.height > deadline => {
          warn!(tx = %tx_id, height = block.height, deadline, "Validity window elapsed");
          return SubmissionOutcome::Unknown;
        }
        Ok(_) => block_errors = 0,
        Err(e) => {
          block_errors += 1;
          debug!(error = %e, block_errors, "Reference block query failed");
        }
      }

      if status_errors.max(block_errors) >= self.config.max_status_errors {
        warn!(tx = %tx_id, status_errors, block_errors, "Ledger unobservable, outcome unknown");
        return SubmissionOutcome::Unknown;
      }
    }
  }
}

fn already_submitted() -> SubmissionOutcome {
  warn!("Refusing to re-broadcast an already submitted intent");
  SubmissionOutcome::Failed("intent already submitted".to_string())
}
