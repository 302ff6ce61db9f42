//! Composite deal score.
//!
//! Four sub-scores are summed into a 0–100 total:
//!   profit (0–40), risk (0–20), effort (0–20), market confidence (0–20).
//! Demand and flip-speed labels are derived from the same inputs.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::{
    Condition, Deal, FlipSpeed, Level, PhotoQuality, PriceStatus, RepairFeasibility,
};

/// Everything the scorer looks at. Built from a `Deal` on both the
/// standard and repair paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreInputs {
    pub estimated_profit: Option<Decimal>,
    pub market_value: Option<Decimal>,
    pub condition: Option<Condition>,
    pub repair_needed: Option<bool>,
    pub repair_feasibility: Option<RepairFeasibility>,
    pub has_photos: Option<bool>,
    pub photo_quality: Option<PhotoQuality>,
    pub price_status: Option<PriceStatus>,
    pub num_listings: Option<u32>,
}

impl ScoreInputs {
    pub fn from_deal(deal: &Deal) -> Self {
        Self {
            estimated_profit: deal.estimated_profit,
            market_value: deal.market_value,
            condition: deal.condition,
            repair_needed: deal.repair_needed,
            repair_feasibility: deal.repair_feasibility,
            has_photos: deal.has_product_photos,
            photo_quality: deal.photo_quality,
            price_status: deal.price_status,
            num_listings: deal.num_listings(),
        }
    }
}

/// Score breakdown plus labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealScore {
    pub deal_score: u8,
    pub profit_score: u8,
    pub risk_score: u8,
    pub effort_score: u8,
    pub market_score: u8,
    pub risk_level: Level,
    pub effort_level: Level,
    pub demand_indicator: Level,
    pub flip_speed: FlipSpeed,
}

/// Profit-percentage bands, highest first.
const PROFIT_BANDS: &[(Decimal, i32)] = &[
    (dec!(50), 40),
    (dec!(35), 35),
    (dec!(25), 30),
    (dec!(15), 22),
    (dec!(10), 15),
    (dec!(5), 8),
];

pub fn profit_score(estimated_profit: Option<Decimal>, market_value: Option<Decimal>) -> i32 {
    let (Some(profit), Some(market)) = (estimated_profit, market_value) else {
        return 0;
    };
    if market <= Decimal::ZERO {
        return 0;
    }

    let pct = profit / market * dec!(100);
    PROFIT_BANDS
        .iter()
        .find(|(threshold, _)| pct >= *threshold)
        .map(|(_, points)| *points)
        .unwrap_or(0)
}

pub fn risk_score(inputs: &ScoreInputs) -> i32 {
    let mut score = 20;

    if inputs.repair_needed == Some(true) {
        score -= match inputs.repair_feasibility {
            Some(RepairFeasibility::Professional) => 15,
            Some(RepairFeasibility::Difficult) => 10,
            Some(RepairFeasibility::Moderate) => 5,
            Some(RepairFeasibility::Easy) | None => 3,
        };
    }

    if inputs.condition == Some(Condition::Unknown) {
        score -= 5;
    }

    // Photos count only when positively reported.
    if inputs.has_photos != Some(true) {
        score -= 8;
    } else if inputs.photo_quality == Some(PhotoQuality::Poor) {
        score -= 3;
    }

    score.max(0)
}

pub fn effort_score(inputs: &ScoreInputs) -> i32 {
    let mut score = 20;

    if inputs.repair_needed == Some(true) {
        score -= match inputs.repair_feasibility {
            Some(RepairFeasibility::Professional | RepairFeasibility::Difficult) => 12,
            Some(RepairFeasibility::Moderate) => 6,
            Some(RepairFeasibility::Easy) | None => 3,
        };
    }

    score.max(0)
}

pub fn market_score(price_status: Option<PriceStatus>, num_listings: Option<u32>) -> i32 {
    let mut score = match price_status {
        Some(PriceStatus::Accurate) => 20,
        Some(PriceStatus::SimilarPrices) => 15,
        Some(PriceStatus::NoData) => 5,
        None => 10,
    };

    match num_listings {
        Some(n) if n >= 10 => score = (score + 5).min(20),
        Some(n) if (1..3).contains(&n) => score = (score - 5).max(0),
        _ => {}
    }

    score
}

/// ≥16 low, ≥10 medium, else high. Shared by risk and effort.
fn level_for(sub_score: i32) -> Level {
    if sub_score >= 16 {
        Level::Low
    } else if sub_score >= 10 {
        Level::Medium
    } else {
        Level::High
    }
}

pub fn demand_for(num_listings: Option<u32>) -> Level {
    match num_listings.unwrap_or(0) {
        n if n >= 10 => Level::High,
        n if n >= 5 => Level::Medium,
        _ => Level::Low,
    }
}

pub fn flip_speed_for(demand: Level, risk: Level) -> FlipSpeed {
    match (demand, risk) {
        (Level::High, Level::Low) => FlipSpeed::Fast,
        (Level::Low, _) | (_, Level::High) => FlipSpeed::Slow,
        _ => FlipSpeed::Medium,
    }
}

/// Compute the full score. Pure: identical inputs give identical output.
pub fn score_deal(inputs: &ScoreInputs) -> DealScore {
    let profit = profit_score(inputs.estimated_profit, inputs.market_value);
    let risk = risk_score(inputs);
    let effort = effort_score(inputs);
    let market = market_score(inputs.price_status, inputs.num_listings);

    let total = (profit + risk + effort + market).clamp(0, 100);

    let risk_level = level_for(risk);
    let demand = demand_for(inputs.num_listings);

    DealScore {
        deal_score: total as u8,
        profit_score: profit as u8,
        risk_score: risk as u8,
        effort_score: effort as u8,
        market_score: market as u8,
        risk_level,
        effort_level: level_for(effort),
        demand_indicator: demand,
        flip_speed: flip_speed_for(demand, risk_level),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_inputs() -> ScoreInputs {
        ScoreInputs {
            estimated_profit: Some(dec!(120)),
            market_value: Some(dec!(200)),
            condition: Some(Condition::Used),
            repair_needed: Some(false),
            repair_feasibility: None,
            has_photos: Some(true),
            photo_quality: Some(PhotoQuality::Good),
            price_status: Some(PriceStatus::Accurate),
            num_listings: Some(12),
        }
    }

    #[test]
    fn test_perfect_score_example() {
        let score = score_deal(&clean_inputs());
        assert_eq!(score.profit_score, 40);
        assert_eq!(score.risk_score, 20);
        assert_eq!(score.effort_score, 20);
        assert_eq!(score.market_score, 20);
        assert_eq!(score.deal_score, 100);
        assert_eq!(score.risk_level, Level::Low);
        assert_eq!(score.effort_level, Level::Low);
        assert_eq!(score.demand_indicator, Level::High);
        assert_eq!(score.flip_speed, FlipSpeed::Fast);
    }

    #[test]
    fn test_profit_bands() {
        let market = Some(dec!(100));
        assert_eq!(profit_score(Some(dec!(50)), market), 40);
        assert_eq!(profit_score(Some(dec!(49.99)), market), 35);
        assert_eq!(profit_score(Some(dec!(25)), market), 30);
        assert_eq!(profit_score(Some(dec!(15)), market), 22);
        assert_eq!(profit_score(Some(dec!(10)), market), 15);
        assert_eq!(profit_score(Some(dec!(5)), market), 8);
        assert_eq!(profit_score(Some(dec!(4.99)), market), 0);
        assert_eq!(profit_score(Some(dec!(-20)), market), 0);
    }

    #[test]
    fn test_profit_score_missing_or_zero_market() {
        assert_eq!(profit_score(None, Some(dec!(100))), 0);
        assert_eq!(profit_score(Some(dec!(10)), None), 0);
        assert_eq!(profit_score(Some(dec!(10)), Some(Decimal::ZERO)), 0);
    }

    #[test]
    fn test_risk_penalties() {
        let mut inputs = clean_inputs();
        inputs.repair_needed = Some(true);
        inputs.repair_feasibility = Some(RepairFeasibility::Professional);
        inputs.condition = Some(Condition::Unknown);
        inputs.has_photos = Some(false);
        // 20 - 15 - 5 - 8 floors at 0
        assert_eq!(risk_score(&inputs), 0);

        let mut inputs = clean_inputs();
        inputs.photo_quality = Some(PhotoQuality::Poor);
        assert_eq!(risk_score(&inputs), 17);
    }

    #[test]
    fn test_repair_penalty_needs_repair_flag() {
        let mut inputs = clean_inputs();
        inputs.repair_feasibility = Some(RepairFeasibility::Difficult);
        assert_eq!(risk_score(&inputs), 20);
        assert_eq!(effort_score(&inputs), 20);

        inputs.repair_needed = Some(true);
        assert_eq!(risk_score(&inputs), 10);
        assert_eq!(effort_score(&inputs), 8);
    }

    #[test]
    fn test_repair_without_feasibility() {
        let mut inputs = clean_inputs();
        inputs.repair_needed = Some(true);
        assert_eq!(risk_score(&inputs), 17);
        assert_eq!(effort_score(&inputs), 17);
    }

    #[test]
    fn test_missing_photo_signal_is_penalised() {
        let mut inputs = clean_inputs();
        inputs.has_photos = None;
        assert_eq!(risk_score(&inputs), 12);
        assert_eq!(level_for(risk_score(&inputs)), Level::Medium);
    }

    #[test]
    fn test_market_score_adjustments() {
        assert_eq!(market_score(Some(PriceStatus::Accurate), Some(12)), 20);
        assert_eq!(market_score(Some(PriceStatus::SimilarPrices), Some(10)), 20);
        assert_eq!(market_score(Some(PriceStatus::SimilarPrices), Some(2)), 10);
        assert_eq!(market_score(Some(PriceStatus::NoData), Some(1)), 0);
        assert_eq!(market_score(None, None), 10);
        // zero listings means no adjustment
        assert_eq!(market_score(Some(PriceStatus::NoData), Some(0)), 5);
        assert_eq!(market_score(Some(PriceStatus::Accurate), Some(5)), 20);
    }

    #[test]
    fn test_demand_and_speed() {
        assert_eq!(demand_for(Some(10)), Level::High);
        assert_eq!(demand_for(Some(5)), Level::Medium);
        assert_eq!(demand_for(Some(4)), Level::Low);
        assert_eq!(demand_for(None), Level::Low);

        assert_eq!(flip_speed_for(Level::High, Level::Low), FlipSpeed::Fast);
        assert_eq!(flip_speed_for(Level::High, Level::Medium), FlipSpeed::Medium);
        assert_eq!(flip_speed_for(Level::Medium, Level::Low), FlipSpeed::Medium);
        assert_eq!(flip_speed_for(Level::Low, Level::Low), FlipSpeed::Slow);
        assert_eq!(flip_speed_for(Level::High, Level::High), FlipSpeed::Slow);
    }

    #[test]
    fn test_score_bounds_over_input_grid() {
        let profits = [None, Some(dec!(-500)), Some(dec!(0)), Some(dec!(30)), Some(dec!(1000))];
        let markets = [None, Some(dec!(0)), Some(dec!(-5)), Some(dec!(100))];
        let conditions = [
            None,
            Some(Condition::New),
            Some(Condition::Used),
            Some(Condition::NeedsRepair),
            Some(Condition::Unknown),
        ];
        let feasibilities = [
            None,
            Some(RepairFeasibility::Easy),
            Some(RepairFeasibility::Moderate),
            Some(RepairFeasibility::Difficult),
            Some(RepairFeasibility::Professional),
        ];
        let statuses = [
            None,
            Some(PriceStatus::Accurate),
            Some(PriceStatus::SimilarPrices),
            Some(PriceStatus::NoData),
        ];
        let listings = [None, Some(0), Some(2), Some(7), Some(50)];

        for p in profits {
            for m in markets {
                for c in conditions {
                    for f in feasibilities {
                        for s in statuses {
                            for n in listings {
                                for repair in [None, Some(true), Some(false)] {
                                    let inputs = ScoreInputs {
                                        estimated_profit: p,
                                        market_value: m,
                                        condition: c,
                                        repair_needed: repair,
                                        repair_feasibility: f,
                                        has_photos: Some(false),
                                        photo_quality: Some(PhotoQuality::Poor),
                                        price_status: s,
                                        num_listings: n,
                                    };
                                    let score = score_deal(&inputs);
                                    assert!(score.deal_score <= 100);
                                    assert_eq!(score, score_deal(&inputs));
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}
