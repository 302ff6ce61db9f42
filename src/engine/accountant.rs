//! Accountant: profit report over sold flips.
//!
//! A pure reduction over flip snapshots. Only flips with status `sold`
//! and a recorded profit contribute.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::types::{Flip, FlipStatus};

/// Bucket for flips without a category.
pub const UNCATEGORIZED: &str = "uncategorized";

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Totals {
    pub profit: Decimal,
    pub flips: usize,
    pub avg_profit: Decimal,
    pub best_profit: Option<Decimal>,
    pub invested: Decimal,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodTotals {
    pub profit: Decimal,
    pub flips: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotals {
    pub category: String,
    pub profit: Decimal,
    pub flips: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProfitReport {
    pub totals: Totals,
    pub this_week: PeriodTotals,
    pub this_month: PeriodTotals,
    /// Sorted by profit, highest first.
    pub by_category: Vec<CategoryTotals>,
}

// ---------------------------------------------------------------------------
// Reduction
// ---------------------------------------------------------------------------

fn sold(flip: &Flip) -> Option<(Decimal, Decimal)> {
    if flip.status != FlipStatus::Sold {
        return None;
    }
    Some((flip.profit?, flip.sell_price?))
}

/// Build the report as of `today`. The week starts on Monday.
pub fn profit_report<'a>(flips: impl IntoIterator<Item = &'a Flip>, today: NaiveDate) -> ProfitReport {
    let week_start = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let month_start = today.with_day(1).unwrap_or(today);

    let mut report = ProfitReport::default();
    let mut categories: BTreeMap<String, (Decimal, usize)> = BTreeMap::new();

    for flip in flips {
        let Some((profit, sell_price)) = sold(flip) else {
            continue;
        };

        let t = &mut report.totals;
        t.profit += profit;
        t.flips += 1;
        t.invested += flip.buy_price;
        t.revenue += sell_price;
        t.best_profit = Some(t.best_profit.map_or(profit, |best| best.max(profit)));

        if let Some(sold_on) = flip.sell_date {
            if sold_on >= week_start && sold_on <= today {
                report.this_week.profit += profit;
                report.this_week.flips += 1;
            }
            if sold_on >= month_start && sold_on <= today {
                report.this_month.profit += profit;
                report.this_month.flips += 1;
            }
        }

        let key = flip
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        let entry = categories.entry(key).or_insert((Decimal::ZERO, 0));
        entry.0 += profit;
        entry.1 += 1;
    }

    if report.totals.flips > 0 {
        report.totals.avg_profit =
            (report.totals.profit / Decimal::from(report.totals.flips)).round_dp(2);
    }

    report.by_category = categories
        .into_iter()
        .map(|(category, (profit, flips))| CategoryTotals { category, profit, flips })
        .collect();
    report.by_category.sort_by(|a, b| b.profit.cmp(&a.profit));

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NewFlip, SaleDetails};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn flip(id: i64, category: Option<&str>, buy: Decimal, sale: Option<(Decimal, NaiveDate)>) -> Flip {
        let mut f = Flip::new(
            id,
            None,
            NewFlip {
                item_name: format!("Item {id}"),
                category: category.map(str::to_string),
                buy_price: buy,
                buy_date: date(2026, 1, 1),
                buy_source: None,
                notes: None,
            },
            Utc::now(),
        );
        if let Some((sell_price, sell_date)) = sale {
            f.mark_sold(SaleDetails {
                sell_price,
                sell_date,
                sell_platform: "ebay".to_string(),
                fees_paid: Decimal::ZERO,
                shipping_cost: Decimal::ZERO,
            })
            .unwrap();
        }
        f
    }

    #[test]
    fn test_empty_report() {
        let report = profit_report(&Vec::<Flip>::new(), date(2026, 10, 14));
        assert_eq!(report, ProfitReport::default());
    }

    #[test]
    fn test_totals_periods_and_categories() {
        // Wednesday 2026-10-14; week starts Monday 2026-10-12.
        let today = date(2026, 10, 14);
        let flips = vec![
            flip(1, Some("electronics"), dec!(100), Some((dec!(180), date(2026, 10, 13)))),
            flip(2, Some("electronics"), dec!(50), Some((dec!(70), date(2026, 10, 2)))),
            flip(3, None, dec!(20), Some((dec!(130), date(2026, 9, 30)))),
            flip(4, Some("tools"), dec!(40), None),
        ];

        let report = profit_report(&flips, today);

        assert_eq!(report.totals.flips, 3);
        assert_eq!(report.totals.profit, dec!(210));
        assert_eq!(report.totals.avg_profit, dec!(70.00));
        assert_eq!(report.totals.best_profit, Some(dec!(110)));
        assert_eq!(report.totals.invested, dec!(170));
        assert_eq!(report.totals.revenue, dec!(380));

        assert_eq!(report.this_week, PeriodTotals { profit: dec!(80), flips: 1 });
        assert_eq!(report.this_month, PeriodTotals { profit: dec!(100), flips: 2 });

        let names: Vec<_> = report.by_category.iter().map(|c| c.category.as_str()).collect();
        assert_eq!(names, vec![UNCATEGORIZED, "electronics"]);
        assert_eq!(report.by_category[1].flips, 2);
    }

    #[test]
    fn test_loss_is_counted() {
        let flips = vec![flip(1, Some("toys"), dec!(60), Some((dec!(45), date(2026, 10, 12))))];
        let report = profit_report(&flips, date(2026, 10, 12));
        assert_eq!(report.totals.profit, dec!(-15));
        assert_eq!(report.totals.best_profit, Some(dec!(-15)));
        assert_eq!(report.this_week.flips, 1);
    }
}
