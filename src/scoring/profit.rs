//! Profit calculator and repair cost estimator.
//!
//! All amounts are currency-scale decimals rounded to 2 places with
//! half-even rounding.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::RepairFeasibility;

/// Labor used when neither feasibility nor repair keywords are known.
pub const DEFAULT_LABOR: Decimal = dec!(50);

/// Keyword groups used to infer labor when feasibility is absent.
/// Checked in order; first match wins.
const LABOR_KEYWORDS: &[(&[&str], RepairFeasibility)] = &[
    (&["screen", "battery", "back glass"], RepairFeasibility::Moderate),
    (&["port", "charging", "button"], RepairFeasibility::Difficult),
    (&["board", "water", "motherboard"], RepairFeasibility::Professional),
    (&["cosmetic", "scratch", "dent"], RepairFeasibility::Easy),
];

/// Parts plus labor breakdown for a repair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairEstimate {
    pub part_cost: Decimal,
    pub labor_estimate: Decimal,
    pub total_estimate: Decimal,
}

fn currency(value: Decimal) -> Decimal {
    value.round_dp(2)
}

/// `market − asking − market × fee_pct/100 − shipping`.
///
/// `None` when either price is missing.
pub fn estimated_profit(
    asking_price: Option<Decimal>,
    market_value: Option<Decimal>,
    fee_pct: Decimal,
    shipping: Decimal,
) -> Option<Decimal> {
    let asking = asking_price?;
    let market = market_value?;
    let fees = market * fee_pct / dec!(100);
    Some(currency(market - asking - fees - shipping))
}

/// Realised profit on a completed sale. `Flip::calculate_profit` goes
/// through here as well.
pub fn actual_profit(
    buy_price: Decimal,
    sell_price: Decimal,
    fees_paid: Decimal,
    shipping_cost: Decimal,
) -> Decimal {
    currency(sell_price - buy_price - fees_paid - shipping_cost)
}

/// Labor cost for a repair tier.
pub fn labor_for(feasibility: RepairFeasibility) -> Decimal {
    match feasibility {
        RepairFeasibility::Easy => dec!(15),
        RepairFeasibility::Moderate => dec!(35),
        RepairFeasibility::Difficult => dec!(75),
        RepairFeasibility::Professional => dec!(150),
    }
}

/// Labor from feasibility, else from keywords in the repair description,
/// else `DEFAULT_LABOR`.
pub fn estimate_labor(feasibility: Option<RepairFeasibility>, repair_type: Option<&str>) -> Decimal {
    if let Some(f) = feasibility {
        return labor_for(f);
    }

    let Some(description) = repair_type.map(str::to_lowercase) else {
        return DEFAULT_LABOR;
    };

    LABOR_KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| description.contains(w)))
        .map(|(_, tier)| labor_for(*tier))
        .unwrap_or(DEFAULT_LABOR)
}

/// Part cost (zero when unknown) plus estimated labor.
pub fn repair_estimate(
    part_cost: Option<Decimal>,
    feasibility: Option<RepairFeasibility>,
    repair_type: Option<&str>,
) -> RepairEstimate {
    let labor = estimate_labor(feasibility, repair_type);
    let part = part_cost.unwrap_or(Decimal::ZERO);
    RepairEstimate {
        part_cost: currency(part),
        labor_estimate: currency(labor),
        total_estimate: currency(part + labor),
    }
}

/// Estimated profit net of repair. Unchanged when no repair total is known.
pub fn true_profit(estimated_profit: Option<Decimal>, repair_total: Option<Decimal>) -> Option<Decimal> {
    let profit = estimated_profit?;
    match repair_total {
        Some(total) => Some(currency(profit - total)),
        None => Some(profit),
    }
}

/// Whether the estimated profit clears `min_profit`. False when profit
/// cannot be computed.
pub fn is_profitable(
    asking_price: Option<Decimal>,
    market_value: Option<Decimal>,
    fee_pct: Decimal,
    min_profit: Decimal,
) -> bool {
    estimated_profit(asking_price, market_value, fee_pct, Decimal::ZERO)
        .map(|p| p >= min_profit)
        .unwrap_or(false)
}
