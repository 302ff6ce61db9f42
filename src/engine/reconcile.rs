//! Order reconciliation: mark active flips sold when their linked
//! marketplace listing shows up in a completed order.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bounded;
use crate::orders::{ExternalOrder, OrderFeed};
use crate::storage::{SharedStore, Store};
use crate::types::SaleDetails;

/// Platform recorded on flips sold through reconciliation.
pub const SELL_PLATFORM: &str = "ebay";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncedItem {
    pub flip_id: i64,
    pub item_name: String,
    pub sell_price: Decimal,
    pub profit: Option<Decimal>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileReport {
    pub orders_checked: usize,
    pub synced: usize,
    pub items: Vec<SyncedItem>,
    /// Set when the order feed could not be read.
    pub fetch_error: Option<String>,
}

/// Fee charged on a sale: `sell_price × fee_pct / 100`, currency-scale.
pub fn sale_fees(sell_price: Decimal, fee_pct: Decimal) -> Decimal {
    (sell_price * fee_pct / Decimal::ONE_HUNDRED).round_dp(2)
}

pub struct OrderReconciler {
    feed: Option<Arc<dyn OrderFeed>>,
    store: SharedStore,
    days_back: u32,
    call_timeout: Duration,
}

impl OrderReconciler {
    pub fn new(
        feed: Option<Arc<dyn OrderFeed>>,
        store: SharedStore,
        days_back: u32,
        call_timeout: Duration,
    ) -> Self {
        Self {
            feed,
            store,
            days_back,
            call_timeout,
        }
    }

    pub async fn run(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        let Some(feed) = self.feed.as_ref() else {
            debug!("Order feed not configured, skipping reconciliation");
            return report;
        };

        let orders = match bounded("orders", self.call_timeout, feed.recent_orders(self.days_back)).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Order feed unavailable, skipping run");
                report.fetch_error = Some(e.to_string());
                return report;
            }
        };

        let mut store = self.store.lock().await;
        report = apply_orders(&mut store, &orders);

        if report.synced > 0 {
            if let Err(e) = store.commit() {
                warn!(error = %format!("{e:#}"), "Failed to commit reconciliation");
            }
        }

        info!(
            orders_checked = report.orders_checked,
            synced = report.synced,
            "Order reconciliation complete"
        );
        report
    }
}

/// Match completed order line items to active flips by listing id and
/// sell them. A flip is matched at most once.
pub fn apply_orders(store: &mut Store, orders: &[ExternalOrder]) -> ReconcileReport {
    let fee_pct = store.settings().fee_percentage;
    let mut active = store.active_flips_by_listing();
    let mut report = ReconcileReport {
        orders_checked: orders.len(),
        ..ReconcileReport::default()
    };

    for order in orders {
        if !order.status.is_complete() {
            debug!(order_id = %order.order_id, status = %order.status, "Order not complete, skipping");
            continue;
        }
        let sell_date = order.order_date.unwrap_or_else(|| Utc::now().date_naive());

        for item in &order.line_items {
            let Some(flip_id) = item.listing_id.as_deref().and_then(|id| active.remove(id)) else {
                continue;
            };

            let sale = SaleDetails {
                sell_price: item.sell_price,
                sell_date,
                sell_platform: SELL_PLATFORM.to_string(),
                fees_paid: sale_fees(item.sell_price, fee_pct),
                shipping_cost: Decimal::ZERO,
            };

            match store.sell_flip(flip_id, sale) {
                Ok(flip) => {
                    info!(
                        flip_id,
                        order_id = %order.order_id,
                        sell_price = %item.sell_price,
                        buyer_shipping = %item.shipping_paid_by_buyer,
                        "Flip synced from order"
                    );
                    report.items.push(SyncedItem {
                        flip_id,
                        item_name: flip.item_name.clone(),
                        sell_price: item.sell_price,
                        profit: flip.profit,
                    });
                    report.synced += 1;
                }
                Err(e) => warn!(flip_id, order_id = %order.order_id, error = %e, "Failed to sync flip"),
            }
        }
    }

    report
}
