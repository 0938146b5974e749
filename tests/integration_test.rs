//! Integration Tests - End-to-end Reconciliation Scenarios
//!
//! Drives the engine, submitter, coordinator, rotation, and session loop
//! against the in-memory paper exchange and mockall ledger mocks. All
//! waits go through `RecordingClock`, so no test sleeps in real time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mockall::mock;
use rust_decimal_macros::dec;

use venue_reconciler::adapters::paper::{LedgerMode, PaperExchange};
use venue_reconciler::domain::planner::{PricingPolicy, RefreshMode, SellMode};
use venue_reconciler::domain::report::{RoundKind, RoundStatus};
use venue_reconciler::domain::types::{
    AssetId, CommitmentId, Direction, Intent, Layout, ObservedState, PairTarget, PlaceOrder, Side,
    SubmissionOutcome, SwapQuote, TargetState, TxId,
};
use venue_reconciler::ports::ledger::{BroadcastError, LedgerClient, LedgerStatus, ReferenceBlock};
use venue_reconciler::ports::notifier::{Event, Notifier};
use venue_reconciler::ports::swap::SwapVenue;
use venue_reconciler::ports::venue::VenueAdapter;
use venue_reconciler::usecases::coordinator::{PairPolicy, PairedLegCoordinator};
use venue_reconciler::usecases::engine::{BookPolicy, ReconciliationEngine};
use venue_reconciler::usecases::retry::FetchPolicy;
use venue_reconciler::usecases::rotation::{RotationPlan, SwapRotation};
use venue_reconciler::usecases::scheduler::{
    stop_pair, Clock, CooldownScheduler, CooldownWindows, RecordingClock, StopSignal,
};
use venue_reconciler::usecases::session::{drain_sessions, BookSession, SessionLoop};
use venue_reconciler::usecases::submitter::{SubmitterConfig, TransactionSubmitter};

// ---- Mock Definitions ----

mock! {
    pub Ledger {}

    #[async_trait::async_trait]
    impl LedgerClient for Ledger {
        async fn broadcast(&self, signed: &[u8]) -> Result<TxId, BroadcastError>;
        async fn get_status(&self, id: &TxId) -> anyhow::Result<LedgerStatus>;
        async fn reference_block(&self) -> anyhow::Result<ReferenceBlock>;
    }
}

/// Notifier collecting every event for assertions.
#[derive(Default)]
struct CollectingNotifier {
    events: Mutex<Vec<Event>>,
}

impl CollectingNotifier {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for CollectingNotifier {
    fn notify(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }
}

/// Book venue whose buy-side places cannot be built and which keeps
/// the refusing default `amend`.
struct NoBuyPlaces {
    inner: Arc<PaperExchange>,
}

#[async_trait::async_trait]
impl VenueAdapter for NoBuyPlaces {
    fn venue_id(&self) -> &str {
        "no-buy-places"
    }

    async fn get_state(&self) -> anyhow::Result<ObservedState> {
        self.inner.get_state().await
    }

    async fn place(&self, order: &PlaceOrder) -> anyhow::Result<Intent> {
        anyhow::ensure!(order.side == Side::Sell, "buy pool closed");
        self.inner.place(order).await
    }

    async fn cancel(&self, id: &CommitmentId) -> anyhow::Result<Intent> {
        self.inner.cancel(id).await
    }
}

/// Swap venue whose balance reads for one asset always fail.
struct BrokenBalance {
    inner: Arc<PaperExchange>,
    asset: &'static str,
}

#[async_trait::async_trait]
impl SwapVenue for BrokenBalance {
    async fn quote(
        &self,
        input: &AssetId,
        output: &AssetId,
        amount: u64,
        slippage_bps: u16,
    ) -> anyhow::Result<SwapQuote> {
        self.inner.quote(input, output, amount, slippage_bps).await
    }

    async fn build_swap(&self, quote: &SwapQuote) -> anyhow::Result<Intent> {
        self.inner.build_swap(quote).await
    }

    async fn balance(&self, asset: &AssetId) -> anyhow::Result<u64> {
        anyhow::ensure!(asset != self.asset, "balance endpoint down for {asset}");
        self.inner.balance(asset).await
    }
}

// ---- Helpers ----

const OWNER: &str = "wallet-1";

fn submitter_config() -> SubmitterConfig {
    SubmitterConfig {
        validity_window_blocks: 3,
        poll_interval: Duration::from_secs(2),
        max_status_errors: 4,
    }
}

fn book_policy(refresh_mode: RefreshMode) -> BookPolicy {
    BookPolicy {
        buy_layout: Layout::Pooled,
        sell_layout: Layout::Unit,
        pricing: PricingPolicy {
            buy_offset: dec!(0.02),
            sell_offset: dec!(0.05),
            sell_mode: SellMode::Above,
        },
        refresh_mode,
        max_actions_per_cycle: 20,
        fetch: FetchPolicy::default(),
    }
}

fn paper_book() -> Arc<PaperExchange> {
    let exchange = Arc::new(PaperExchange::new(OWNER));
    exchange.set_quote(dec!(1.00), dec!(1.20));
    exchange
}

fn engine_on(
    exchange: &Arc<PaperExchange>,
    clock: &Arc<RecordingClock>,
    refresh_mode: RefreshMode,
) -> (ReconciliationEngine, Arc<TransactionSubmitter>) {
    let submitter = Arc::new(TransactionSubmitter::new(
        exchange.clone(),
        clock.clone(),
        submitter_config(),
    ));
    let engine = ReconciliationEngine::new(
        "book-a",
        Arc::clone(&submitter),
        clock.clone(),
        book_policy(refresh_mode),
    );
    (engine, submitter)
}

// ---- Order-book reconciliation ----

#[tokio::test]
async fn test_overfilled_buy_pool_and_balanced_sell_side_are_refreshed() {
    let exchange = paper_book();
    exchange.seed_commitment(Side::Buy, dec!(0.95), 3);
    exchange.seed_commitment(Side::Sell, dec!(1.30), 1);
    exchange.seed_commitment(Side::Sell, dec!(1.30), 1);

    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Replace);

    let report = engine
        .reconcile_cycle(exchange.as_ref(), &TargetState::balanced(4))
        .await;

    assert!(report.errors.is_empty(), "unexpected errors: {:?}", report.errors);
    assert_eq!(report.cancels(Side::Buy), 1);
    assert_eq!(report.places(Side::Buy), 1);
    assert_eq!(report.cancels(Side::Sell), 2);
    assert_eq!(report.places(Side::Sell), 2);

    let state = exchange.snapshot();
    assert_eq!(state.count(Side::Buy), 2);
    assert_eq!(state.count(Side::Sell), 2);
    assert_eq!(state.buy_side_commitments[0].price, dec!(0.98));
    assert!(state.sell_side_commitments.iter().all(|c| c.price == dec!(1.26)));
    assert_eq!(report.counts_after_intent.buy, 2);
    assert_eq!(report.counts_after_intent.sell, 2);
}

#[tokio::test]
async fn test_sell_places_are_bounded_by_held_inventory() {
    let exchange = paper_book();
    exchange.add_inventory(1);

    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Replace);

    let report = engine
        .reconcile_cycle(exchange.as_ref(), &TargetState::balanced(4))
        .await;

    assert_eq!(report.places(Side::Sell), 1);
    assert!(report.has_error("insufficient_inventory"));
    assert_eq!(report.places(Side::Buy), 1);

    let state = exchange.snapshot();
    assert_eq!(state.count(Side::Buy), 2);
    assert_eq!(state.count(Side::Sell), 1);
    assert!(state.held_inventory.is_empty());
}

#[tokio::test]
async fn test_unknown_outcomes_are_rederived_from_observation() {
    let exchange = paper_book();
    exchange.add_inventory(2);
    exchange.set_mode(OWNER, LedgerMode::Stall);

    let clock = Arc::new(RecordingClock::new());
    let (engine, submitter) = engine_on(&exchange, &clock, RefreshMode::Replace);
    let target = TargetState::balanced(4);

    let first = engine.reconcile_cycle(exchange.as_ref(), &target).await;
    let second = engine.reconcile_cycle(exchange.as_ref(), &target).await;

    assert!(first.has_error("action_unknown"));
    assert_eq!(first.counts_before, second.counts_before);
    assert_eq!(first.actions_taken.len(), second.actions_taken.len());
    assert_eq!(first.places(Side::Buy), second.places(Side::Buy));
    assert_eq!(first.places(Side::Sell), second.places(Side::Sell));

    // Stalled intents never landed, so nothing is open.
    let state = exchange.snapshot();
    assert_eq!(state.count(Side::Buy), 0);
    assert_eq!(state.count(Side::Sell), 0);
    assert_eq!(
        submitter.submitted_count().await,
        first.actions_taken.len() + second.actions_taken.len()
    );
}

#[tokio::test]
async fn test_silently_landed_actions_are_not_doubled() {
    let exchange = paper_book();
    exchange.add_inventory(2);
    exchange.set_mode(OWNER, LedgerMode::LandSilently);

    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Amend);
    let target = TargetState::balanced(4);

    let first = engine.reconcile_cycle(exchange.as_ref(), &target).await;
    assert!(first.has_error("action_unknown"));

    let second = engine.reconcile_cycle(exchange.as_ref(), &target).await;
    assert_eq!(second.counts_before.buy, 2);
    assert_eq!(second.counts_before.sell, 2);
    assert!(second.actions_taken.is_empty());

    let state = exchange.snapshot();
    assert_eq!(state.count(Side::Buy), 2);
    assert_eq!(state.count(Side::Sell), 2);
}

#[tokio::test]
async fn test_unreachable_venue_aborts_cycle_after_retry_budget() {
    let exchange = paper_book();
    exchange.fail_next_fetches(5);

    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Replace);

    let report = engine
        .reconcile_cycle(exchange.as_ref(), &TargetState::balanced(4))
        .await;

    assert!(report.adapter_unavailable());
    assert!(report.actions_taken.is_empty());
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(3); 4]);
    assert_eq!(exchange.broadcast_count(), 0);
}

#[tokio::test]
async fn test_transient_fetch_failures_are_absorbed() {
    let exchange = paper_book();
    exchange.add_inventory(2);
    exchange.fail_next_fetches(4);

    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Replace);

    let report = engine
        .reconcile_cycle(exchange.as_ref(), &TargetState::balanced(4))
        .await;

    assert!(!report.adapter_unavailable());
    assert_eq!(exchange.snapshot().count(Side::Buy), 2);
}

#[tokio::test]
async fn test_action_budget_defers_excess_actions() {
    let exchange = paper_book();
    exchange.add_inventory(4);

    let clock = Arc::new(RecordingClock::new());
    let submitter = Arc::new(TransactionSubmitter::new(
        exchange.clone(),
        clock.clone(),
        submitter_config(),
    ));
    let policy = BookPolicy {
        max_actions_per_cycle: 2,
        ..book_policy(RefreshMode::Replace)
    };
    let engine = ReconciliationEngine::new("book-a", submitter, clock.clone(), policy);

    let report = engine
        .reconcile_cycle(exchange.as_ref(), &TargetState::balanced(8))
        .await;

    assert_eq!(report.actions_taken.len(), 2);
    assert!(report.has_error("action_budget_exhausted"));
}

#[tokio::test]
async fn test_rejected_actions_do_not_abort_the_cycle() {
    let exchange = paper_book();
    exchange.add_inventory(2);
    exchange.set_mode(OWNER, LedgerMode::Reject);

    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Replace);

    let report = engine
        .reconcile_cycle(exchange.as_ref(), &TargetState::balanced(4))
        .await;

    // One pooled bid plus two unit listings, each attempted despite the rest failing.
    assert_eq!(report.places(Side::Buy), 1);
    assert_eq!(report.places(Side::Sell), 2);
    assert!(report
        .actions_taken
        .iter()
        .all(|a| matches!(a.outcome, SubmissionOutcome::Failed(_))));
    let failed = report
        .errors
        .iter()
        .filter(|e| e.kind() == "action_failed")
        .count();
    assert_eq!(failed, 3);

    let state = exchange.snapshot();
    assert_eq!(state.count(Side::Buy), 0);
    assert_eq!(state.count(Side::Sell), 0);
    assert_eq!(state.held_inventory.len(), 2);
}

#[tokio::test]
async fn test_intent_build_errors_do_not_abort_the_cycle() {
    let exchange = paper_book();
    exchange.seed_commitment(Side::Sell, dec!(1.30), 1);
    exchange.seed_commitment(Side::Sell, dec!(1.30), 1);
    let adapter = NoBuyPlaces {
        inner: Arc::clone(&exchange),
    };

    let clock = Arc::new(RecordingClock::new());
    let (engine, submitter) = engine_on(&exchange, &clock, RefreshMode::Amend);

    let report = engine
        .reconcile_cycle(&adapter, &TargetState::balanced(4))
        .await;

    // The failed bid build is followed by both refused amends.
    assert_eq!(report.actions_taken.len(), 3);
    assert_eq!(report.places(Side::Buy), 1);
    assert!(report.actions_taken.iter().all(|a| a.intent_id.is_none()));
    let reasons: Vec<String> = report.errors.iter().map(ToString::to_string).collect();
    assert!(reasons[0].contains("buy pool closed"), "{reasons:?}");
    assert!(reasons[1..]
        .iter()
        .all(|r| r.contains("does not support amending")));

    assert_eq!(submitter.submitted_count().await, 0);
    assert_eq!(exchange.broadcast_count(), 0);
    assert!(exchange
        .snapshot()
        .sell_side_commitments
        .iter()
        .all(|c| c.price == dec!(1.30)));
}

// ---- Transaction submitter ----

#[tokio::test]
async fn test_unknown_outcome_is_never_rebroadcast() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_reference_block()
        .returning(|| Ok(ReferenceBlock { height: 100, hash: None }));
    ledger
        .expect_broadcast()
        .times(1)
        .returning(|_| Ok("tx-1".to_string()));
    ledger
        .expect_get_status()
        .returning(|_| Err(anyhow::anyhow!("node unreachable")));

    let clock = Arc::new(RecordingClock::new());
    let submitter = TransactionSubmitter::new(Arc::new(ledger), clock.clone(), submitter_config());
    let intent = Intent::new(vec![1, 2, 3], None);

    assert_eq!(submitter.submit(&intent).await, SubmissionOutcome::Unknown);
    assert_eq!(clock.sleeps().len(), 4);

    match submitter.submit(&intent).await {
        SubmissionOutcome::Failed(reason) => assert!(reason.contains("already submitted")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(submitter.submitted_count().await, 1);
}

#[tokio::test]
async fn test_validity_window_expiry_is_unknown() {
    let height = Arc::new(Mutex::new(10u64));
    let mut ledger = MockLedger::new();
    let h = Arc::clone(&height);
    ledger.expect_reference_block().returning(move || {
        let mut height = h.lock().unwrap();
        *height += 1;
        Ok(ReferenceBlock {
            height: *height,
            hash: None,
        })
    });
    ledger
        .expect_broadcast()
        .times(1)
        .returning(|_| Ok("tx-9".to_string()));
    ledger
        .expect_get_status()
        .returning(|_| Ok(LedgerStatus::Pending));

    let clock = Arc::new(RecordingClock::new());
    let submitter = TransactionSubmitter::new(Arc::new(ledger), clock, submitter_config());

    let outcome = submitter.submit(&Intent::new(vec![7], Some(15))).await;
    assert_eq!(outcome, SubmissionOutcome::Unknown);
    assert!(*height.lock().unwrap() > 15);
}

#[tokio::test]
async fn test_refused_broadcast_is_failed() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_reference_block()
        .returning(|| Ok(ReferenceBlock { height: 1, hash: None }));
    ledger
        .expect_broadcast()
        .returning(|_| Err(BroadcastError::Refused("nonce too low".to_string())));
    ledger.expect_get_status().never();

    let submitter = TransactionSubmitter::new(
        Arc::new(ledger),
        Arc::new(RecordingClock::new()),
        submitter_config(),
    );
    match submitter.submit(&Intent::new(vec![1], None)).await {
        SubmissionOutcome::Failed(reason) => assert!(reason.contains("nonce too low")),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rejected_status_is_failed() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_reference_block()
        .returning(|| Ok(ReferenceBlock { height: 1, hash: None }));
    ledger
        .expect_broadcast()
        .returning(|_| Ok("tx-2".to_string()));
    ledger
        .expect_get_status()
        .times(1)
        .returning(|_| Ok(LedgerStatus::Rejected("reverted".to_string())));

    let submitter = TransactionSubmitter::new(
        Arc::new(ledger),
        Arc::new(RecordingClock::new()),
        submitter_config(),
    );
    assert_eq!(
        submitter.submit(&Intent::new(vec![1], None)).await,
        SubmissionOutcome::Failed("reverted".to_string())
    );
}

#[tokio::test]
async fn test_unobservable_deadline_is_unknown_while_status_pending() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_reference_block()
        .returning(|| Err(anyhow::anyhow!("block endpoint down")));
    ledger
        .expect_broadcast()
        .times(1)
        .returning(|_| Ok("tx-5".to_string()));
    ledger
        .expect_get_status()
        .returning(|_| Ok(LedgerStatus::Pending));

    let clock = Arc::new(RecordingClock::new());
    let submitter = TransactionSubmitter::new(Arc::new(ledger), clock.clone(), submitter_config());

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        submitter.submit(&Intent::new(vec![5], Some(5))),
    )
    .await
    .expect("submission must terminate");

    assert_eq!(outcome, SubmissionOutcome::Unknown);
    assert_eq!(clock.sleeps().len(), 4);
}

#[tokio::test]
async fn test_ambiguous_broadcast_is_unknown() {
    let mut ledger = MockLedger::new();
    ledger
        .expect_reference_block()
        .returning(|| Ok(ReferenceBlock { height: 1, hash: None }));
    ledger
        .expect_broadcast()
        .times(1)
        .returning(|_| Err(BroadcastError::Ambiguous("request timed out".to_string())));
    ledger.expect_get_status().never();

    let submitter = TransactionSubmitter::new(
        Arc::new(ledger),
        Arc::new(RecordingClock::new()),
        submitter_config(),
    );
    let intent = Intent::new(vec![4], None);

    assert_eq!(submitter.submit(&intent).await, SubmissionOutcome::Unknown);
    // It may have landed, so it is never sent again.
    assert!(matches!(
        submitter.submit(&intent).await,
        SubmissionOutcome::Failed(_)
    ));
    assert_eq!(submitter.submitted_count().await, 1);
}

#[tokio::test]
async fn test_failed_reference_read_leaves_intent_unused() {
    let reads = Arc::new(Mutex::new(0u32));
    let r = Arc::clone(&reads);
    let mut ledger = MockLedger::new();
    ledger.expect_reference_block().returning(move || {
        let mut reads = r.lock().unwrap();
        *reads += 1;
        if *reads == 1 {
            Err(anyhow::anyhow!("node syncing"))
        } else {
            Ok(ReferenceBlock { height: 40, hash: None })
        }
    });
    ledger
        .expect_broadcast()
        .times(1)
        .returning(|_| Ok("tx-3".to_string()));
    ledger
        .expect_get_status()
        .returning(|_| Ok(LedgerStatus::Confirmed));

    let submitter = TransactionSubmitter::new(
        Arc::new(ledger),
        Arc::new(RecordingClock::new()),
        submitter_config(),
    );
    let intent = Intent::new(vec![3], None);

    match submitter.submit(&intent).await {
        SubmissionOutcome::Failed(reason) => assert!(reason.contains("node syncing")),
        other => panic!("expected Failed, got {other:?}"),
    }
    assert_eq!(submitter.submitted_count().await, 0);

    assert_eq!(
        submitter.submit(&intent).await,
        SubmissionOutcome::Confirmed("tx-3".to_string())
    );
    assert_eq!(submitter.submitted_count().await, 1);
}

// ---- Paired legs ----

fn pair_on(
    exchange: &Arc<PaperExchange>,
    clock: &Arc<RecordingClock>,
    stop: StopSignal,
) -> PairedLegCoordinator {
    let submitter = Arc::new(TransactionSubmitter::new(
        exchange.clone(),
        clock.clone(),
        submitter_config(),
    ));
    let scheduler = Arc::new(CooldownScheduler::with_seed(
        CooldownWindows::default(),
        clock.clone(),
        42,
    ));
    PairedLegCoordinator::new(
        "pair-a",
        Arc::new(exchange.perp_leg("long")),
        Arc::new(exchange.perp_leg("short")),
        submitter,
        scheduler,
        stop,
        PairTarget::balanced(dec!(2)),
        PairPolicy {
            price_offset: dec!(0.01),
            close_offset: dec!(0.02),
            fetch: FetchPolicy::default(),
        },
    )
}

#[tokio::test]
async fn test_round_opens_holds_and_flattens_both_legs() {
    let exchange = Arc::new(PaperExchange::new("pair-a"));
    exchange.set_perp_market("SOL-PERP", dec!(150));
    let clock = Arc::new(RecordingClock::new());
    let coordinator = pair_on(&exchange, &clock, StopSignal::never());

    let report = coordinator.run_round().await;

    assert_eq!(report.status, RoundStatus::Complete);
    assert_eq!(report.kind, RoundKind::Fresh);
    assert!(!report.is_critical());
    assert!(exchange.positions_of("long").is_empty());
    assert!(exchange.positions_of("short").is_empty());

    let sleeps = clock.sleeps();
    assert!(sleeps
        .iter()
        .any(|d| *d >= Duration::from_secs(420) && *d <= Duration::from_secs(600)));
    assert!(sleeps.contains(&Duration::from_secs(10)));
}

#[tokio::test]
async fn test_one_sided_open_is_asymmetric_and_resynced_next_round() {
    let exchange = Arc::new(PaperExchange::new("pair-a"));
    exchange.set_perp_market("SOL-PERP", dec!(150));
    exchange.set_mode("short", LedgerMode::Reject);
    let clock = Arc::new(RecordingClock::new());
    let coordinator = pair_on(&exchange, &clock, StopSignal::never());

    let report = coordinator.run_round().await;

    assert_eq!(report.status, RoundStatus::AsymmetricLegFailure);
    assert_ne!(report.status, RoundStatus::Complete);
    assert!(report.is_critical());
    assert_eq!(exchange.positions_of("long").len(), 1);
    assert!(exchange.positions_of("short").is_empty());

    exchange.set_mode("short", LedgerMode::Confirm);
    let resync = coordinator.run_round().await;

    assert_eq!(resync.kind, RoundKind::Resync);
    assert_eq!(resync.status, RoundStatus::Complete);
    assert!(exchange.positions_of("long").is_empty());
}

#[tokio::test]
async fn test_both_legs_rejected_is_degraded_not_critical() {
    let exchange = Arc::new(PaperExchange::new("pair-a"));
    exchange.set_mode("long", LedgerMode::Reject);
    exchange.set_mode("short", LedgerMode::Reject);
    let clock = Arc::new(RecordingClock::new());
    let coordinator = pair_on(&exchange, &clock, StopSignal::never());

    let report = coordinator.run_round().await;

    assert_eq!(report.status, RoundStatus::Degraded);
    assert!(!report.is_critical());
}

#[tokio::test]
async fn test_stalled_leg_on_open_is_asymmetric() {
    let exchange = Arc::new(PaperExchange::new("pair-a"));
    exchange.set_perp_market("SOL-PERP", dec!(150));
    exchange.set_mode("short", LedgerMode::Stall);
    let clock = Arc::new(RecordingClock::new());
    let coordinator = pair_on(&exchange, &clock, StopSignal::never());

    let report = coordinator.run_round().await;

    assert_eq!(report.kind, RoundKind::Fresh);
    assert_eq!(report.status, RoundStatus::AsymmetricLegFailure);
    assert!(report.is_critical());
    assert!(report.errors.iter().any(|e| e.kind() == "action_unknown"));
    assert_eq!(exchange.positions_of("long").len(), 1);
    assert!(exchange.positions_of("short").is_empty());
    // No hold after a broken open.
    assert!(clock.sleeps().iter().all(|d| *d < Duration::from_secs(420)));
}

#[tokio::test]
async fn test_leg_still_open_after_settle_is_asymmetric() {
    let exchange = Arc::new(PaperExchange::new("pair-a"));
    exchange.set_perp_market("SOL-PERP", dec!(150));
    exchange.seed_position("long", Direction::Long, dec!(1));
    exchange.seed_position("short", Direction::Short, dec!(1));
    exchange.set_mode("short", LedgerMode::Reject);
    let clock = Arc::new(RecordingClock::new());
    let coordinator = pair_on(&exchange, &clock, StopSignal::never());

    let report = coordinator.run_round().await;

    assert_eq!(report.kind, RoundKind::Resync);
    assert_eq!(report.status, RoundStatus::AsymmetricLegFailure);
    assert!(report.is_critical());
    assert!(clock.sleeps().contains(&Duration::from_secs(10)));
    assert!(exchange.positions_of("long").is_empty());
    assert_eq!(exchange.positions_of("short").len(), 1);
}

// ---- Swap rotation ----

#[tokio::test]
async fn test_rotation_carries_observed_output_forward() {
    let exchange = Arc::new(PaperExchange::new(OWNER));
    exchange.set_balance("SOL", 1_000);
    exchange.set_rate("SOL", "USDC", dec!(2));
    exchange.set_rate("USDC", "SOL", dec!(0.5));

    let clock = Arc::new(RecordingClock::new());
    let submitter = Arc::new(TransactionSubmitter::new(
        exchange.clone(),
        clock.clone(),
        submitter_config(),
    ));
    let rotation = SwapRotation::new(
        "rotation-a",
        exchange.clone(),
        submitter,
        clock.clone(),
        RotationPlan {
            route: vec!["SOL".to_string(), "USDC".to_string()],
            initial_amount: 5_000,
            slippage_bps: 50,
            fetch: FetchPolicy::default(),
        },
    )
    .unwrap();

    let first = rotation.run_hop().await;
    assert_eq!(first.in_amount, 1_000);
    assert_eq!(first.observed_out, Some(2_000));
    let state = rotation.state().await;
    assert_eq!(state.hop, 1);
    assert_eq!(state.amount, 2_000);

    let second = rotation.run_hop().await;
    assert_eq!(second.input, "USDC");
    assert_eq!(second.observed_out, Some(1_000));
    assert_eq!(exchange.balance_of("SOL"), 1_000);
    assert_eq!(exchange.balance_of("USDC"), 0);
}

fn rotation_on(
    venue: Arc<dyn SwapVenue>,
    exchange: &Arc<PaperExchange>,
    clock: &Arc<RecordingClock>,
) -> SwapRotation {
    let submitter = Arc::new(TransactionSubmitter::new(
        exchange.clone(),
        clock.clone(),
        submitter_config(),
    ));
    SwapRotation::new(
        "rotation-a",
        venue,
        submitter,
        clock.clone(),
        RotationPlan {
            route: vec!["SOL".to_string(), "USDC".to_string()],
            initial_amount: 5_000,
            slippage_bps: 50,
            fetch: FetchPolicy::default(),
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_empty_hop_is_reported_and_advances_on_observed_balance() {
    let exchange = Arc::new(PaperExchange::new(OWNER));
    exchange.set_balance("USDC", 500);
    let clock = Arc::new(RecordingClock::new());
    let rotation = rotation_on(exchange.clone(), &exchange, &clock);

    let report = rotation.run_hop().await;

    assert!(report.outcome.is_none());
    assert!(report.errors.iter().any(|e| e.kind() == "empty_balance"));
    let state = rotation.state().await;
    assert_eq!(state.hop, 1);
    assert_eq!(state.amount, 500);
    assert!(state.verified);
}

#[tokio::test]
async fn test_failed_balance_read_keeps_rotation_on_hop() {
    let exchange = Arc::new(PaperExchange::new(OWNER));
    exchange.set_balance("USDC", 500);
    let venue = Arc::new(BrokenBalance {
        inner: Arc::clone(&exchange),
        asset: "USDC",
    });
    let clock = Arc::new(RecordingClock::new());
    let rotation = rotation_on(venue, &exchange, &clock);

    let report = rotation.run_hop().await;

    let kinds: Vec<&str> = report.errors.iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec!["empty_balance", "adapter_unavailable"]);
    let state = rotation.state().await;
    assert_eq!(state.hop, 0);
    assert!(!state.verified);
    assert_eq!(exchange.broadcast_count(), 0);
}

// ---- Session loop ----

#[tokio::test]
async fn test_session_loop_runs_cycles_with_cooldowns() {
    let exchange = paper_book();
    exchange.add_inventory(2);
    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Amend);
    let runner = Arc::new(BookSession::new(
        engine,
        exchange.clone(),
        TargetState::balanced(4),
    ));
    let scheduler = Arc::new(CooldownScheduler::with_seed(
        CooldownWindows::default(),
        clock.clone(),
        7,
    ));
    let notifier = Arc::new(CollectingNotifier::default());

    let session = SessionLoop::new(runner, scheduler, notifier.clone(), StopSignal::never());
    let cycles = session.run(Some(3)).await;

    assert_eq!(cycles, 3);
    let events = notifier.events();
    assert!(matches!(events.first(), Some(Event::SessionStarted { .. })));
    assert!(matches!(events.last(), Some(Event::SessionStopped { cycles: 3, .. })));
    let completed = events
        .iter()
        .filter(|e| matches!(e, Event::CycleCompleted(_)))
        .count();
    assert_eq!(completed, 3);

    let inter_cycle = clock
        .sleeps()
        .into_iter()
        .filter(|d| *d >= Duration::from_secs(420))
        .count();
    assert_eq!(inter_cycle, 2);
    assert!(clock.now() > chrono::Utc::now());
}

#[tokio::test]
async fn test_stopped_session_runs_no_cycle() {
    let exchange = paper_book();
    let clock = Arc::new(RecordingClock::new());
    let (engine, _) = engine_on(&exchange, &clock, RefreshMode::Replace);
    let runner = Arc::new(BookSession::new(
        engine,
        exchange.clone(),
        TargetState::balanced(4),
    ));
    let scheduler = Arc::new(CooldownScheduler::new(CooldownWindows::default(), clock.clone()));
    let notifier = Arc::new(CollectingNotifier::default());
    let (handle, stop) = stop_pair();
    handle.stop();

    let session = SessionLoop::new(runner, scheduler, notifier.clone(), stop);
    assert_eq!(session.run(None).await, 0);
    assert_eq!(exchange.broadcast_count(), 0);
    assert!(matches!(
        notifier.events().last(),
        Some(Event::SessionStopped { cycles: 0, .. })
    ));
}

#[tokio::test]
async fn test_pair_session_emits_asymmetric_exposure() {
    let exchange = Arc::new(PaperExchange::new("pair-a"));
    exchange.set_perp_market("SOL-PERP", dec!(150));
    exchange.set_mode("short", LedgerMode::Reject);
    let clock = Arc::new(RecordingClock::new());
    let coordinator = Arc::new(pair_on(&exchange, &clock, StopSignal::never()));
    let scheduler = Arc::new(CooldownScheduler::with_seed(
        CooldownWindows::default(),
        clock.clone(),
        3,
    ));
    let notifier = Arc::new(CollectingNotifier::default());

    let session = SessionLoop::new(coordinator, scheduler, notifier.clone(), StopSignal::never());
    assert_eq!(session.run(Some(1)).await, 1);

    let events = notifier.events();
    let round = events
        .iter()
        .position(|e| matches!(e, Event::RoundCompleted(_)))
        .expect("round event");
    match &events[round + 1] {
        Event::AsymmetricExposure { session, detail } => {
            assert_eq!(session, "pair-a");
            assert!(detail.contains("asymmetric leg failure"), "{detail}");
        }
        other => panic!("expected AsymmetricExposure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_sessions() {
    let (release, released) = tokio::sync::oneshot::channel::<()>();
    let finished = Arc::new(AtomicBool::new(false));
    let f = Arc::clone(&finished);
    let in_flight = tokio::spawn(async move {
        let _ = released.await;
        f.store(true, Ordering::SeqCst);
    });

    let drain = tokio::spawn(drain_sessions(vec![in_flight], std::future::pending()));
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert!(!drain.is_finished());

    release.send(()).unwrap();
    assert!(drain.await.unwrap());
    assert!(finished.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_drain_can_be_abandoned() {
    let stuck = tokio::spawn(std::future::pending::<()>());
    assert!(!drain_sessions(vec![stuck], async {}).await);
}
