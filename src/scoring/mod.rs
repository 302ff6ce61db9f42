//! Scoring engine: profit arithmetic, repair estimates and the composite
//! deal score. Everything here is pure and deterministic.

pub mod profit;
pub mod score;

pub use profit::{
    actual_profit, estimate_labor, estimated_profit, is_profitable, repair_estimate, true_profit,
    RepairEstimate,
};
pub use score::{score_deal, DealScore, ScoreInputs};
