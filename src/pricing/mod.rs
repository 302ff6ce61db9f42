//! Market pricing.
//!
//! Defines the `PricingResolver` trait used by the deal pipeline for
//! market values, parts pricing, replacement-part costs, price trends and
//! local-pickup availability, plus the eBay Browse implementation.

pub mod ebay;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{DealScoutError, MarketCondition, PartQuote, PriceTrend, PricingResult, TrendDirection};

pub use ebay::EbayPricingClient;

/// Percentage move of recent listings vs. market that counts as a trend.
pub const TREND_THRESHOLD_PCT: Decimal = dec!(10);

/// Note stored on deals priced from broken/for-parts listings.
pub const PARTS_PRICE_NOTE: &str = "Based on similar broken/parts listings";

/// Resolves prices for a search term. `Ok(None)` means "no data".
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PricingResolver: Send + Sync {
    /// Aggregate prices of comparable listings in the given condition.
    async fn market_value(
        &self,
        search_term: &str,
        condition: MarketCondition,
        limit: u32,
    ) -> Result<Option<PricingResult>, DealScoutError>;

    /// Aggregate prices of broken / for-parts listings.
    async fn parts_market_value(
        &self,
        search_term: &str,
        limit: u32,
    ) -> Result<Option<PricingResult>, DealScoutError>;

    /// Cheapest source for a named replacement part.
    async fn part_cost(&self, part_name: &str) -> Result<Option<PartQuote>, DealScoutError>;

    /// Direction of recent listing prices relative to `market_avg`.
    async fn price_trend(
        &self,
        search_term: &str,
        condition: MarketCondition,
        market_avg: Decimal,
    ) -> Result<Option<PriceTrend>, DealScoutError>;

    /// Whether any matching listing offers local pickup within the radius.
    async fn local_pickup_available(
        &self,
        search_term: &str,
        condition: MarketCondition,
        radius_miles: f64,
    ) -> Result<bool, DealScoutError>;
}

/// Compare the average of recent listings against the market average.
pub fn classify_trend(recent_avg: Decimal, market_avg: Decimal) -> PriceTrend {
    if market_avg <= Decimal::ZERO {
        return PriceTrend {
            direction: TrendDirection::Stable,
            note: "Not enough data for a trend".to_string(),
        };
    }

    let pct = ((recent_avg - market_avg) / market_avg * dec!(100)).round_dp(0);

    if pct >= TREND_THRESHOLD_PCT {
        PriceTrend {
            direction: TrendDirection::Rising,
            note: format!("Recent listings {pct}% above market average"),
        }
    } else if pct <= -TREND_THRESHOLD_PCT {
        PriceTrend {
            direction: TrendDirection::Falling,
            note: format!("Recent listings {}% below market average", pct.abs()),
        }
    } else {
        PriceTrend {
            direction: TrendDirection::Stable,
            note: "Prices stable relative to market average".to_string(),
        }
    }
}
