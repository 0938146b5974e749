//! Property-Based Tests for the Planner, Scheduler, and Engine
//!
//! Uses proptest to check convergence and bounds across many generated
//! book states. Engine properties run whole cycles against the paper
//! exchange on a virtual clock.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use venue_reconciler::adapters::paper::PaperExchange;
use venue_reconciler::domain::planner::{
    bound_by_inventory, plan_side, split_units, PricingPolicy, RefreshMode, SellMode,
};
use venue_reconciler::domain::types::{unit_count, Commitment, Layout, Side, TargetState};
use venue_reconciler::usecases::engine::{BookPolicy, ReconciliationEngine};
use venue_reconciler::usecases::retry::FetchPolicy;
use venue_reconciler::usecases::scheduler::{
    CooldownKind, CooldownScheduler, CooldownWindows, RecordingClock, Window,
};
use venue_reconciler::usecases::submitter::{SubmitterConfig, TransactionSubmitter};

fn commitments(qtys: &[u64]) -> Vec<Commitment> {
    let base = Utc::now();
    qtys.iter()
        .enumerate()
        .map(|(i, &qty)| Commitment {
            id: format!("c-{i}"),
            side: Side::Buy,
            price: dec!(1),
            qty,
            created_at: base + chrono::Duration::seconds(i64::try_from(i).unwrap()),
            item: None,
        })
        .collect()
}

fn refresh_mode() -> impl Strategy<Value = RefreshMode> {
    prop_oneof![Just(RefreshMode::Replace), Just(RefreshMode::Amend)]
}

fn engine_on(exchange: &Arc<PaperExchange>, clock: &Arc<RecordingClock>) -> ReconciliationEngine {
    let submitter = Arc::new(TransactionSubmitter::new(
        exchange.clone(),
        clock.clone(),
        SubmitterConfig {
            validity_window_blocks: 3,
            poll_interval: Duration::from_secs(2),
            max_status_errors: 3,
        },
    ));
    ReconciliationEngine::new(
        "prop",
        submitter,
        clock.clone(),
        BookPolicy {
            buy_layout: Layout::Pooled,
            sell_layout: Layout::Unit,
            pricing: PricingPolicy {
                buy_offset: dec!(0.01),
                sell_offset: dec!(0.03),
                sell_mode: SellMode::Above,
            },
            refresh_mode: RefreshMode::Replace,
            max_actions_per_cycle: 40,
            fetch: FetchPolicy::default(),
        },
    )
}

fn seeded_exchange(buy_pools: &[u64], sell_units: u64, held: usize) -> Arc<PaperExchange> {
    let exchange = Arc::new(PaperExchange::new("prop-owner"));
    exchange.set_quote(dec!(10), dec!(12));
    for &qty in buy_pools {
        exchange.seed_commitment(Side::Buy, dec!(9), qty);
    }
    for _ in 0..sell_units {
        exchange.seed_commitment(Side::Sell, dec!(13), 1);
    }
    exchange.add_inventory(held);
    exchange
}

proptest! {
    /// Applying a side plan always lands exactly on the desired count.
    #[test]
    fn plan_converges_on_desired(
        qtys in prop::collection::vec(1u64..5, 0..8),
        desired in 0u64..12,
        mode in refresh_mode(),
    ) {
        let existing = commitments(&qtys);
        let plan = plan_side(Side::Buy, &existing, desired, mode, dec!(1));
        let remaining = unit_count(&existing) - plan.cancelled_units();
        prop_assert_eq!(remaining + plan.place_units, desired);
    }

    /// Cancels never touch a newer commitment while an older one survives.
    #[test]
    fn plan_cancels_oldest_first(
        qtys in prop::collection::vec(1u64..4, 1..8),
        desired in 0u64..6,
    ) {
        let existing = commitments(&qtys);
        let plan = plan_side(Side::Buy, &existing, desired, RefreshMode::Replace, dec!(1));
        let cancelled: Vec<&str> = plan.cancels.iter().map(|c| c.id.as_str()).collect();
        let expected: Vec<&str> = existing.iter().take(cancelled.len()).map(|c| c.id.as_str()).collect();
        prop_assert_eq!(cancelled, expected);
    }

    /// Split quantities always sum back to the requested units.
    #[test]
    fn split_preserves_units(units in 0u64..50, pooled in any::<bool>()) {
        let layout = if pooled { Layout::Pooled } else { Layout::Unit };
        prop_assert_eq!(split_units(units, layout).iter().sum::<u64>(), units);
    }

    /// Placed units never exceed inventory, and any shortfall is reported.
    #[test]
    fn inventory_bound_holds(units in 0u64..20, available in 0u64..20) {
        let (placed, shortfall) = bound_by_inventory(units, available);
        prop_assert!(placed <= available);
        prop_assert_eq!(placed, units.min(available));
        prop_assert_eq!(shortfall.is_some(), available < units);
    }

    /// Cooldowns stay inside their configured window.
    #[test]
    fn cooldown_within_window(seed in any::<u64>(), min in 0u64..600, span in 0u64..600) {
        let windows = CooldownWindows {
            inter_cycle: Window::secs(min, min + span),
            ..CooldownWindows::default()
        };
        let scheduler = CooldownScheduler::with_seed(windows, Arc::new(RecordingClock::new()), seed);
        let delay = scheduler.next_delay(CooldownKind::InterCycle);
        prop_assert!(delay >= Duration::from_secs(min));
        prop_assert!(delay <= Duration::from_secs(min + span));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// One cycle against a venue that reflects every action reaches the
    /// target on both sides, bounded by inventory on the sell side.
    #[test]
    fn one_cycle_converges(
        half in 1u64..5,
        buy_pools in prop::collection::vec(1u64..4, 0..3),
        sell_units in 0u64..6,
        held in 0usize..6,
    ) {
        let exchange = seeded_exchange(&buy_pools, sell_units, held);
        let clock = Arc::new(RecordingClock::new());
        let engine = engine_on(&exchange, &clock);

        let report = tokio_test::block_on(
            engine.reconcile_cycle(exchange.as_ref(), &TargetState::balanced(half * 2)),
        );

        let state = exchange.snapshot();
        let sellable = held as u64 + sell_units;
        prop_assert_eq!(state.count(Side::Buy), half);
        prop_assert_eq!(state.count(Side::Sell), half.min(sellable));
        prop_assert_eq!(report.has_error("insufficient_inventory"), sellable < half);
        prop_assert_eq!(report.counts_after_intent.buy, half);
    }

    /// Re-running cycles against an unchanged target never overshoots it.
    #[test]
    fn repeated_cycles_never_double(
        half in 1u64..4,
        held in 0usize..8,
        cycles in 2usize..5,
    ) {
        let exchange = seeded_exchange(&[], 0, held);
        let clock = Arc::new(RecordingClock::new());
        let engine = engine_on(&exchange, &clock);
        let target = TargetState::balanced(half * 2);

        for _ in 0..cycles {
            tokio_test::block_on(engine.reconcile_cycle(exchange.as_ref(), &target));
            let state = exchange.snapshot();
            prop_assert!(state.count(Side::Buy) <= half);
            prop_assert!(state.count(Side::Sell) <= half);
        }
        prop_assert_eq!(exchange.snapshot().count(Side::Buy), half);
        prop_assert_eq!(
            exchange.snapshot().count(Side::Sell),
            half.min(held as u64)
        );
    }
}

#[test]
fn prices_follow_reference_quote() {
    let policy = PricingPolicy {
        buy_offset: dec!(0.1),
        sell_offset: dec!(0.1),
        sell_mode: SellMode::Below,
    };
    let quote = venue_reconciler::domain::types::ReferenceQuote {
        bid: dec!(10),
        ask: dec!(20),
    };
    assert_eq!(policy.price(Side::Buy, &quote), dec!(9));
    assert_eq!(policy.price(Side::Sell, &quote), dec!(18));
    assert!(policy.price(Side::Sell, &quote) > Decimal::ZERO);
}
