//! Paper Exchange - In-Memory Venue and Ledger Simulator
//!
//! One process-local exchange that plays every outside party at once:
//! an order-book venue for a single owner, a perp venue for any number
//! of leg accounts, a swap router, and the ledger that settles their
//! intents. Intents carry a JSON [`PaperTx`] as their payload; the
//! ledger applies it on broadcast according to the per-account
//! [`LedgerMode`].
//!
//! Used for dry-run sessions and as the deterministic backend of the
//! integration tests. Every state change goes through the ledger, so
//! an intent that is never broadcast never changes anything.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::types::{
    AssetId, Commitment, CommitmentId, Direction, Intent, InventoryItem, ItemId, ObservedState,
    PerpPosition, PlaceOrder, ReferenceQuote, Side, SwapQuote, TxId,
};
use crate::ports::ledger::{BroadcastError, LedgerClient, LedgerStatus, ReferenceBlock};
use crate::ports::perp::PerpLeg;
use crate::ports::swap::SwapVenue;
use crate::ports::venue::VenueAdapter;

/// How the simulated ledger treats intents from one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LedgerMode {
    /// Apply on broadcast and report confirmed.
    #[default]
    Confirm,
    /// Accept the broadcast but report rejected; nothing is applied.
    Reject,
    /// Accept the broadcast and stay pending forever; nothing is applied.
    Stall,
    /// Apply on broadcast but stay pending forever.
    LandSilently,
    /// Refuse the broadcast outright.
    Refuse,
    /// Fail the broadcast as if the connection dropped; nothing is applied.
    Disconnect,
}

/// State change carried by a paper intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PaperInstruction {
    Place { order: PlaceOrder },
    Cancel { id: CommitmentId },
    Amend { id: CommitmentId, price: Decimal },
    PerpOpen { direction: Direction, size: Decimal },
    PerpClose { position_id: String },
    PerpCancelAll,
    Swap {
        input: AssetId,
        output: AssetId,
        in_amount: u64,
        out_amount: u64,
    },
}

/// Payload of every paper intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperTx {
    /// Account whose ledger mode applies.
    pub account: String,
    pub instruction: PaperInstruction,
}

impl PaperTx {
    fn into_intent(self) -> Result<Intent> {
        let payload = serde_json::to_vec(&self).context("Failed to encode paper instruction")?;
        Ok(Intent::new(payload, None))
    }
}

#[derive(Debug, Default)]
struct PaperState {
    buy: Vec<Commitment>,
    sell: Vec<Commitment>,
    held: Vec<InventoryItem>,
    /// Items locked by each open listing.
    locked: HashMap<CommitmentId, Vec<ItemId>>,
    quote: Option<ReferenceQuote>,
    positions: HashMap<String, Vec<PerpPosition>>,
    mark: Decimal,
    market: String,
    balances: HashMap<AssetId, u64>,
    rates: HashMap<(AssetId, AssetId), Decimal>,
    modes: HashMap<String, LedgerMode>,
    statuses: HashMap<TxId, LedgerStatus>,
    height: u64,
    sequence: u64,
    fetch_failures: u32,
    broadcasts: u64,
}

impl PaperState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.sequence += 1;
        format!("{prefix}-{}", self.sequence)
    }

    fn check_fetch(&mut self, what: &str) -> Result<()> {
        if self.fetch_failures > 0 {
            self.fetch_failures -= 1;
            anyhow::bail!("paper venue unavailable while reading {what}");
        }
        Ok(())
    }

    fn apply(&mut self, created_at: DateTime<Utc>, tx: PaperTx) -> Result<()> {
        match tx.instruction {
            PaperInstruction::Place { order } => self.apply_place(created_at, order),
            PaperInstruction::Cancel { id } => self.apply_cancel(&id),
            PaperInstruction::Amend { id, price } => {
                let commitment = self
                    .buy
                    .iter_mut()
                    .chain(self.sell.iter_mut())
                    .find(|c| c.id == id)
                    .with_context(|| format!("unknown commitment {id}"))?;
                commitment.price = price;
                Ok(())
            }
            PaperInstruction::PerpOpen { direction, size } => {
                let id = self.next_id("pos");
                let market = self.market.clone();
                self.positions.entry(tx.account).or_default().push(PerpPosition {
                    id,
                    market,
                    direction,
                    size,
                });
                Ok(())
            }
            PaperInstruction::PerpClose { position_id } => {
                let positions = self.positions.entry(tx.account).or_default();
                let before = positions.len();
                positions.retain(|p| p.id != position_id);
                anyhow::ensure!(positions.len() < before, "unknown position {position_id}");
                Ok(())
            }
            PaperInstruction::PerpCancelAll => Ok(()),
            PaperInstruction::Swap {
                input,
                output,
                in_amount,
                out_amount,
            } => {
                let held = self.balances.get(&input).copied().unwrap_or(0);
                anyhow::ensure!(
                    held >= in_amount,
                    "insufficient {input}: held {held}, swapping {in_amount}"
                );
                self.balances.insert(input, held - in_amount);
                *self.balances.entry(output).or_default() += out_amount;
                Ok(())
            }
        }
    }

    fn apply_place(&mut self, created_at: DateTime<Utc>, order: PlaceOrder) -> Result<()> {
        let id = self.next_id("c");
        let mut item = None;
        if order.side == Side::Sell {
            let items = match &order.item {
                Some(wanted) => {
                    let pos = self
                        .held
                        .iter()
                        .position(|i| &i.id == wanted)
                        .with_context(|| format!("item {wanted} is not held"))?;
                    vec![self.held.remove(pos).id]
                }
                None => {
                    let qty = usize::try_from(order.qty).unwrap_or(usize::MAX);
                    anyhow::ensure!(
                        self.held.len() >= qty,
                        "listing {qty} units with {} held",
                        self.held.len()
                    );
                    self.held.drain(..qty).map(|i| i.id).collect()
                }
            };
            item = order.item.clone();
            self.locked.insert(id.clone(), items);
        }
        let commitment = Commitment {
            id,
            side: order.side,
            price: order.price,
            qty: order.qty,
            created_at,
            item,
        };
        match order.side {
            Side::Buy => self.buy.push(commitment),
            Side::Sell => self.sell.push(commitment),
        }
        Ok(())
    }

    fn apply_cancel(&mut self, id: &CommitmentId) -> Result<()> {
        if let Some(pos) = self.buy.iter().position(|c| &c.id == id) {
            self.buy.remove(pos);
            return Ok(());
        }
        let pos = self
            .sell
            .iter()
            .position(|c| &c.id == id)
            .with_context(|| format!("unknown commitment {id}"))?;
        self.sell.remove(pos);
        if let Some(items) = self.locked.remove(id) {
            self.held.extend(items.into_iter().map(|id| InventoryItem { id }));
        }
        Ok(())
    }
}

/// In-memory exchange implementing every venue port plus the ledger.
pub struct PaperExchange {
    /// Owner of the order book and swap balances.
    owner: String,
    venue_id: String,
    /// Timestamp base for commitment creation times.
    epoch: DateTime<Utc>,
    state: Mutex<PaperState>,
}

impl PaperExchange {
    /// Create an empty exchange for one book and swap owner.
    #[must_use]
    pub fn new(owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            venue_id: format!("paper/{owner}"),
            owner,
            epoch: Utc::now(),
            state: Mutex::new(PaperState {
                market: "PAPER-PERP".to_string(),
                mark: Decimal::ONE_HUNDRED,
                height: 1,
                ..PaperState::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaperState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Owner account of the book and swap balances.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    // ── Seeding ──

    /// Set the reference quote.
    pub fn set_quote(&self, bid: Decimal, ask: Decimal) {
        self.lock().quote = Some(ReferenceQuote { bid, ask });
    }

    /// Add held, unlisted items.
    pub fn add_inventory(&self, count: usize) {
        let mut state = self.lock();
        for _ in 0..count {
            let id = state.next_id("item");
            state.held.push(InventoryItem { id });
        }
    }

    /// Insert an already-open commitment, bypassing the ledger.
    ///
    /// Sell-side commitments lock `qty` freshly minted items.
    pub fn seed_commitment(&self, side: Side, price: Decimal, qty: u64) -> CommitmentId {
        let mut state = self.lock();
        let id = state.next_id("c");
        let created_at = self.epoch + ChronoDuration::seconds(i64::try_from(state.sequence).unwrap_or(0));
        let mut item = None;
        if side == Side::Sell {
            let items: Vec<ItemId> = (0..qty).map(|_| state.next_id("item")).collect();
            if qty == 1 {
                item = items.first().cloned();
            }
            state.locked.insert(id.clone(), items);
        }
        let commitment = Commitment {
            id: id.clone(),
            side,
            price,
            qty,
            created_at,
            item,
        };
        match side {
            Side::Buy => state.buy.push(commitment),
            Side::Sell => state.sell.push(commitment),
        }
        id
    }

    /// Fill a buy-side commitment, converting its units into held items.
    ///
    /// # Errors
    /// Returns error if no such buy-side commitment is open.
    pub fn fill_bid(&self, id: &CommitmentId) -> Result<()> {
        let mut state = self.lock();
        let pos = state
            .buy
            .iter()
            .position(|c| &c.id == id)
            .with_context(|| format!("unknown bid {id}"))?;
        let filled = state.buy.remove(pos);
        for _ in 0..filled.qty {
            let item = state.next_id("item");
            state.held.push(InventoryItem { id: item });
        }
        Ok(())
    }

    /// Insert an open perp position for `account`, bypassing the ledger.
    pub fn seed_position(&self, account: &str, direction: Direction, size: Decimal) -> String {
        let mut state = self.lock();
        let id = state.next_id("pos");
        let market = state.market.clone();
        state
            .positions
            .entry(account.to_string())
            .or_default()
            .push(PerpPosition {
                id: id.clone(),
                market,
                direction,
                size,
            });
        id
    }

    /// Set the perp market name and mark price.
    pub fn set_perp_market(&self, market: impl Into<String>, mark: Decimal) {
        let mut state = self.lock();
        state.market = market.into();
        state.mark = mark;
    }

    /// Set the swap rate from `input` to `output` (output units per input unit).
    pub fn set_rate(&self, input: &str, output: &str, rate: Decimal) {
        self.lock()
            .rates
            .insert((input.to_string(), output.to_string()), rate);
    }

    /// Set the owner's balance of one asset.
    pub fn set_balance(&self, asset: &str, amount: u64) {
        self.lock().balances.insert(asset.to_string(), amount);
    }

    /// Set how the ledger treats intents from `account`.
    pub fn set_mode(&self, account: &str, mode: LedgerMode) {
        self.lock().modes.insert(account.to_string(), mode);
    }

    /// Fail the next `n` venue reads.
    pub fn fail_next_fetches(&self, n: u32) {
        self.lock().fetch_failures = n;
    }

    // ── Inspection ──

    /// Current book snapshot without consuming injected failures.
    #[must_use]
    pub fn snapshot(&self) -> ObservedState {
        let state = self.lock();
        ObservedState {
            buy_side_commitments: state.buy.clone(),
            sell_side_commitments: state.sell.clone(),
            held_inventory: state.held.clone(),
            quote: state.quote.unwrap_or(ReferenceQuote {
                bid: Decimal::ZERO,
                ask: Decimal::ZERO,
            }),
        }
    }

    /// Open positions of one perp account.
    #[must_use]
    pub fn positions_of(&self, account: &str) -> Vec<PerpPosition> {
        self.lock().positions.get(account).cloned().unwrap_or_default()
    }

    /// Balance of one asset.
    #[must_use]
    pub fn balance_of(&self, asset: &str) -> u64 {
        self.lock().balances.get(asset).copied().unwrap_or(0)
    }

    /// Number of broadcasts accepted so far.
    #[must_use]
    pub fn broadcast_count(&self) -> u64 {
        self.lock().broadcasts
    }

    /// A perp leg bound to one account of this exchange.
    #[must_use]
    pub fn perp_leg(self: &Arc<Self>, account: impl Into<String>) -> PaperPerpLeg {
        PaperPerpLeg {
            exchange: Arc::clone(self),
            account: account.into(),
        }
    }

    fn book_tx(&self, instruction: PaperInstruction) -> Result<Intent> {
        PaperTx {
            account: self.owner.clone(),
            instruction,
        }
        .into_intent()
    }
}

#[async_trait]
impl VenueAdapter for PaperExchange {
    fn venue_id(&self) -> &str {
        &self.venue_id
    }

    async fn get_state(&self) -> Result<ObservedState> {
        let mut state = self.lock();
        state.check_fetch("book")?;
        let quote = state.quote.context("paper book has no reference quote")?;
        Ok(ObservedState {
            buy_side_commitments: state.buy.clone(),
            sell_side_commitments: state.sell.clone(),
            held_inventory: state.held.clone(),
            quote,
        })
    }

    async fn place(&self, order: &PlaceOrder) -> Result<Intent> {
        self.book_tx(PaperInstruction::Place {
            order: order.clone(),
        })
    }

    async fn cancel(&self, id: &CommitmentId) -> Result<Intent> {
        self.book_tx(PaperInstruction::Cancel { id: id.clone() })
    }

    async fn amend(&self, id: &CommitmentId, new_price: Decimal) -> Result<Intent> {
        self.book_tx(PaperInstruction::Amend {
            id: id.clone(),
            price: new_price,
        })
    }
}

#[async_trait]
impl LedgerClient for PaperExchange {
    async fn broadcast(&self, signed: &[u8]) -> Result<TxId, BroadcastError> {
        let tx: PaperTx = serde_json::from_slice(signed)
            .map_err(|e| BroadcastError::Refused(format!("payload is not a paper transaction: {e}")))?;
        let mut state = self.lock();
        let mode = state.modes.get(&tx.account).copied().unwrap_or_default();
        match mode {
            LedgerMode::Refuse => {
                return Err(BroadcastError::Refused(format!(
                    "paper ledger refused broadcast from {}",
                    tx.account
                )));
            }
            LedgerMode::Disconnect => {
                return Err(BroadcastError::Ambiguous(format!(
                    "paper ledger dropped the connection for {}",
                    tx.account
                )));
            }
            _ => {}
        }

        state.broadcasts += 1;
        let tx_id = state.next_id("tx");
        let created_at =
            self.epoch + ChronoDuration::seconds(i64::try_from(state.sequence).unwrap_or(0));
        let status = match mode {
            LedgerMode::Confirm => match state.apply(created_at, tx) {
                Ok(()) => LedgerStatus::Confirmed,
                Err(e) => LedgerStatus::Rejected(format!("{e:#}")),
            },
            LedgerMode::LandSilently => {
                if let Err(e) = state.apply(created_at, tx) {
                    debug!(error = %e, "Silent paper transaction did not apply");
                }
                LedgerStatus::Pending
            }
            LedgerMode::Reject => LedgerStatus::Rejected("rejected by paper ledger".to_string()),
            LedgerMode::Stall | LedgerMode::Refuse | LedgerMode::Disconnect => LedgerStatus::Pending,
        };
        debug!(tx = %tx_id, ?status, "Paper broadcast");
        state.statuses.insert(tx_id.clone(), status);
        Ok(tx_id)
    }

    async fn get_status(&self, id: &TxId) -> Result<LedgerStatus> {
        self.lock()
            .statuses
            .get(id)
            .cloned()
            .with_context(|| format!("unknown transaction {id}"))
    }

    async fn reference_block(&self) -> Result<ReferenceBlock> {
        let mut state = self.lock();
        state.height += 1;
        Ok(ReferenceBlock {
            height: state.height,
            hash: None,
        })
    }
}

#[async_trait]
impl SwapVenue for PaperExchange {
    async fn quote(
        &self,
        input: &AssetId,
        output: &AssetId,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<SwapQuote> {
        let mut state = self.lock();
        state.check_fetch("quote")?;
        let rate = state
            .rates
            .get(&(input.clone(), output.clone()))
            .copied()
            .with_context(|| format!("no paper route {input} -> {output}"))?;
        let out_amount = (Decimal::from(amount) * rate)
            .floor()
            .to_u64()
            .context("quoted output out of range")?;
        Ok(SwapQuote {
            input: input.clone(),
            output: output.clone(),
            in_amount: amount,
            out_amount,
            route: serde_json::json!({ "venue": "paper", "slippage_bps": slippage_bps }),
        })
    }

    async fn build_swap(&self, quote: &SwapQuote) -> Result<Intent> {
        self.book_tx(PaperInstruction::Swap {
            input: quote.input.clone(),
            output: quote.output.clone(),
            in_amount: quote.in_amount,
            out_amount: quote.out_amount,
        })
    }

    async fn balance(&self, asset: &AssetId) -> Result<u64> {
        let mut state = self.lock();
        state.check_fetch("balance")?;
        Ok(state.balances.get(asset).copied().unwrap_or(0))
    }
}

/// One perp account on a [`PaperExchange`].
pub struct PaperPerpLeg {
    exchange: Arc<PaperExchange>,
    account: String,
}

impl PaperPerpLeg {
    fn tx(&self, instruction: PaperInstruction) -> Result<Intent> {
        PaperTx {
            account: self.account.clone(),
            instruction,
        }
        .into_intent()
    }
}

#[async_trait]
impl PerpLeg for PaperPerpLeg {
    fn account(&self) -> &str {
        &self.account
    }

    async fn mark_price(&self) -> Result<Decimal> {
        let mut state = self.exchange.lock();
        state.check_fetch("mark price")?;
        Ok(state.mark)
    }

    async fn positions(&self) -> Result<Vec<PerpPosition>> {
        let mut state = self.exchange.lock();
        state.check_fetch("positions")?;
        Ok(state.positions.get(&self.account).cloned().unwrap_or_default())
    }

    async fn open(&self, direction: Direction, size: Decimal, _limit_price: Decimal) -> Result<Intent> {
        self.tx(PaperInstruction::PerpOpen { direction, size })
    }

    async fn close(&self, position: &PerpPosition, _limit_price: Decimal) -> Result<Intent> {
        self.tx(PaperInstruction::PerpClose {
            position_id: position.id.clone(),
        })
    }

    async fn cancel_all(&self) -> Result<Intent> {
        self.tx(PaperInstruction::PerpCancelAll)
    }
}
