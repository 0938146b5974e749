//! Side Planner - Pure Reconciliation Decision Table
//!
//! Computes, for one book side, which commitments to cancel and how many
//! units to place so the side converges on its desired count. The planner
//! never performs I/O and never looks at outcomes of earlier cycles: it is
//! always evaluated against a freshly observed snapshot.
//!
//! Decision table (count = units on the side, desired = target units):
//! - count > desired: cancel oldest commitments until at least
//!   `count - desired` units are removed; re-place any overshoot
//! - count < desired: cancel every existing commitment (if any), then
//!   place `desired` fresh units
//! - count == desired: refresh, cancel everything and re-place `desired`
//!   (or amend each commitment in place when the venue supports it)

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::types::{Commitment, InventoryItem, Layout, PlaceOrder, ReferenceQuote, Side};

/// How a balanced side keeps its quoted price current.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Cancel every commitment and place fresh ones.
    #[default]
    Replace,
    /// Amend every stale-priced commitment in place.
    Amend,
}

/// Which side of the ask sell-side commitments are quoted on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellMode {
    #[default]
    Above,
    Below,
}

/// Offsets applied to the reference quote when pricing new commitments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Fraction below the reference bid for buy-side commitments.
    pub buy_offset: Decimal,
    /// Fraction away from the reference ask for sell-side commitments.
    pub sell_offset: Decimal,
    pub sell_mode: SellMode,
}

impl PricingPolicy {
    /// Price for new commitments on `side` given the current quote.
    #[must_use]
    pub fn price(&self, side: Side, quote: &ReferenceQuote) -> Decimal {
        let price = match (side, self.sell_mode) {
            (Side::Buy, _) => quote.bid * (Decimal::ONE - self.buy_offset),
            (Side::Sell, SellMode::Above) => quote.ask * (Decimal::ONE + self.sell_offset),
            (Side::Sell, SellMode::Below) => quote.ask * (Decimal::ONE - self.sell_offset),
        };
        price.round_dp(9)
    }
}

/// Which row of the decision table a side fell into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Over,
    Under,
    Balanced,
}

/// Planned corrections for one side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidePlan {
    pub side: Side,
    pub branch: Branch,
    /// Commitments to cancel, oldest first.
    pub cancels: Vec<Commitment>,
    /// Commitments to re-price in place.
    pub amends: Vec<Commitment>,
    /// Units to place after the cancels.
    pub place_units: u64,
}

impl SidePlan {
    /// Units removed by the planned cancels.
    #[must_use]
    pub fn cancelled_units(&self) -> u64 {
        self.cancels.iter().map(|c| c.qty).sum()
    }
}

/// Evaluate the decision table for one side.
#[must_use]
pub fn plan_side(
    side: Side,
    commitments: &[Commitment],
    desired: u64,
    mode: RefreshMode,
    price: Decimal,
) -> SidePlan {
    let count: u64 = commitments.iter().map(|c| c.qty).sum();

    if count > desired {
        let excess = count - desired;
        let mut oldest_first: Vec<&Commitment> = commitments.iter().collect();
        oldest_first.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        let mut removed = 0u64;
        let mut cancels = Vec::new();
        for commitment in oldest_first {
            if removed >= excess {
                break;
            }
            removed += commitment.qty;
            cancels.push(commitment.clone());
        }

        return SidePlan {
            side,
            branch: Branch::Over,
            cancels,
            amends: Vec::new(),
            // Whole pooled commitments can remove more than the excess.
            place_units: removed - excess,
        };
    }

    if count < desired {
        return SidePlan {
            side,
            branch: Branch::Under,
            cancels: commitments.to_vec(),
            amends: Vec::new(),
            place_units: desired,
        };
    }

    match mode {
        RefreshMode::Replace => SidePlan {
            side,
            branch: Branch::Balanced,
            cancels: commitments.to_vec(),
            amends: Vec::new(),
            place_units: desired,
        },
        RefreshMode::Amend => SidePlan {
            side,
            branch: Branch::Balanced,
            cancels: Vec::new(),
            amends: commitments
                .iter()
                .filter(|c| c.price != price)
                .cloned()
                .collect(),
            place_units: 0,
        },
    }
}

/// Split `units` into per-commitment quantities for a layout.
#[must_use]
pub fn split_units(units: u64, layout: Layout) -> Vec<u64> {
    match (units, layout) {
        (0, _) => Vec::new(),
        (n, Layout::Pooled) => vec![n],
        (n, Layout::Unit) => vec![1; usize::try_from(n).unwrap_or(usize::MAX)],
    }
}

/// Build place orders for `units`, assigning inventory items to unit
/// sell-side listings in order.
#[must_use]
pub fn place_orders(
    side: Side,
    units: u64,
    layout: Layout,
    price: Decimal,
    items: &[InventoryItem],
) -> Vec<PlaceOrder> {
    let assign_items = side == Side::Sell && layout == Layout::Unit;
    split_units(units, layout)
        .into_iter()
        .enumerate()
        .map(|(i, qty)| PlaceOrder {
            side,
            price,
            qty,
            item: if assign_items {
                items.get(i).map(|item| item.id.clone())
            } else {
                None
            },
        })
        .collect()
}

/// Bound sell-side place units by available inventory.
///
/// Returns the units that can be placed and, when short, the unit count
/// that was needed.
#[must_use]
pub const fn bound_by_inventory(units: u64, available: u64) -> (u64, Option<u64>) {
    if available < units {
        (available, Some(units))
    } else {
        (units, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    fn commitments(side: Side, qtys: &[u64]) -> Vec<Commitment> {
        let base = Utc::now();
        qtys.iter()
            .enumerate()
            .map(|(i, &qty)| Commitment {
                id: format!("c-{i}"),
                side,
                price: dec!(1.0),
                qty,
                created_at: base + Duration::seconds(i as i64),
                item: None,
            })
            .collect()
    }

    #[test]
    fn test_over_target_unit_layout_cancels_oldest_only() {
        let existing = commitments(Side::Sell, &[1, 1, 1]);
        let plan = plan_side(Side::Sell, &existing, 2, RefreshMode::Replace, dec!(1));
        assert_eq!(plan.branch, Branch::Over);
        assert_eq!(plan.cancels.len(), 1);
        assert_eq!(plan.cancels[0].id, "c-0");
        assert_eq!(plan.place_units, 0);
    }

    #[test]
    fn test_over_target_pool_replaces_overshoot() {
        let existing = commitments(Side::Buy, &[3]);
        let plan = plan_side(Side::Buy, &existing, 2, RefreshMode::Replace, dec!(1));
        assert_eq!(plan.cancels.len(), 1);
        assert_eq!(plan.place_units, 2);
        assert_eq!(split_units(plan.place_units, Layout::Pooled), vec![2]);
    }

    #[test]
    fn test_under_target_cancels_all_then_places_desired() {
        let existing = commitments(Side::Buy, &[1]);
        let plan = plan_side(Side::Buy, &existing, 2, RefreshMode::Replace, dec!(1));
        assert_eq!(plan.branch, Branch::Under);
        assert_eq!(plan.cancels.len(), 1);
        assert_eq!(plan.place_units, 2);
    }

    #[test]
    fn test_under_target_from_empty_skips_cancellation() {
        let plan = plan_side(Side::Buy, &[], 2, RefreshMode::Replace, dec!(1));
        assert!(plan.cancels.is_empty());
        assert_eq!(plan.place_units, 2);
    }

    #[test]
    fn test_balanced_replace_refreshes_everything() {
        let existing = commitments(Side::Sell, &[1, 1]);
        let plan = plan_side(Side::Sell, &existing, 2, RefreshMode::Replace, dec!(1));
        assert_eq!(plan.branch, Branch::Balanced);
        assert_eq!(plan.cancels.len(), 2);
        assert_eq!(plan.place_units, 2);
    }

    #[test]
    fn test_balanced_amend_touches_only_stale_prices() {
        let mut existing = commitments(Side::Sell, &[1, 1]);
        existing[1].price = dec!(1.5);
        let plan = plan_side(Side::Sell, &existing, 2, RefreshMode::Amend, dec!(1.5));
        assert!(plan.cancels.is_empty());
        assert_eq!(plan.amends.len(), 1);
        assert_eq!(plan.amends[0].id, "c-0");
        assert_eq!(plan.place_units, 0);
    }

    #[test]
    fn test_pricing_offsets() {
        let quote = ReferenceQuote {
            bid: dec!(10),
            ask: dec!(12),
        };
        let above = PricingPolicy {
            buy_offset: dec!(0.1),
            sell_offset: dec!(0.05),
            sell_mode: SellMode::Above,
        };
        assert_eq!(above.price(Side::Buy, &quote), dec!(9));
        assert_eq!(above.price(Side::Sell, &quote), dec!(12.6));

        let below = PricingPolicy {
            sell_mode: SellMode::Below,
            ..above
        };
        assert_eq!(below.price(Side::Sell, &quote), dec!(11.4));
    }

    #[test]
    fn test_place_orders_assigns_items_to_unit_listings() {
        let items = vec![
            InventoryItem { id: "a".into() },
            InventoryItem { id: "b".into() },
        ];
        let orders = place_orders(Side::Sell, 2, Layout::Unit, dec!(3), &items);
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].item.as_deref(), Some("a"));
        assert_eq!(orders[1].item.as_deref(), Some("b"));

        let bids = place_orders(Side::Buy, 2, Layout::Pooled, dec!(3), &items);
        assert_eq!(bids.len(), 1);
        assert_eq!(bids[0].qty, 2);
        assert!(bids[0].item.is_none());
    }

    #[test]
    fn test_inventory_bound() {
        assert_eq!(bound_by_inventory(2, 1), (1, Some(2)));
        assert_eq!(bound_by_inventory(2, 5), (2, None));
    }
}
