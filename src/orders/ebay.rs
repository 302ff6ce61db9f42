//! eBay Fulfillment API order feed.
//!
//! Fetches orders created within the last `days_back` days using a seller
//! user token supplied through the environment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, SecondsFormat, Utc};
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use super::{ExternalOrder, FulfillmentStatus, OrderFeed, OrderLineItem};
use crate::types::DealScoutError;

const PRODUCTION_URL: &str = "https://api.ebay.com/sell/fulfillment/v1";
const SANDBOX_URL: &str = "https://api.sandbox.ebay.com/sell/fulfillment/v1";

/// Maximum orders per request.
const ORDER_LIMIT: u32 = 50;

const SERVICE: &str = "orders";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrdersResponse {
    #[serde(default)]
    orders: Vec<RawOrder>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOrder {
    #[serde(default)]
    order_id: String,
    #[serde(default)]
    creation_date: Option<String>,
    #[serde(default)]
    order_fulfillment_status: Option<String>,
    #[serde(default)]
    line_items: Vec<RawLineItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLineItem {
    #[serde(default)]
    legacy_item_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    line_item_cost: Option<RawAmount>,
    #[serde(default)]
    delivery_cost: Option<RawDeliveryCost>,
    #[serde(default)]
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDeliveryCost {
    #[serde(default)]
    shipping_cost: Option<RawAmount>,
}

#[derive(Debug, Deserialize)]
struct RawAmount {
    #[serde(default)]
    value: Option<String>,
}

fn amount(raw: Option<&RawAmount>) -> Decimal {
    raw.and_then(|a| a.value.as_deref())
        .and_then(|v| Decimal::from_str(v.trim()).ok())
        .unwrap_or(Decimal::ZERO)
}

impl RawOrder {
    fn into_order(self) -> ExternalOrder {
        let order_date = self
            .creation_date
            .as_deref()
            .and_then(|d| d.get(..10))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        let line_items = self
            .line_items
            .into_iter()
            .map(|item| OrderLineItem {
                listing_id: item.legacy_item_id.filter(|id| !id.is_empty()),
                title: item.title,
                sell_price: amount(item.line_item_cost.as_ref()),
                shipping_paid_by_buyer: amount(
                    item.delivery_cost.as_ref().and_then(|d| d.shipping_cost.as_ref()),
                ),
                quantity: item.quantity.unwrap_or(1),
            })
            .collect();

        ExternalOrder {
            order_id: self.order_id,
            order_date,
            status: FulfillmentStatus::parse(self.order_fulfillment_status.as_deref().unwrap_or("")),
            line_items,
        }
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct EbayOrderFeed {
    http: Client,
    access_token: SecretString,
    base_url: String,
}

impl EbayOrderFeed {
    pub fn new(access_token: SecretString, sandbox: bool) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("DealScout/0.1.0")
            .build()
            .context("Failed to build HTTP client for eBay orders")?;

        Ok(Self {
            http,
            access_token,
            base_url: if sandbox { SANDBOX_URL } else { PRODUCTION_URL }.to_string(),
        })
    }

    /// `creationdate:[start..end]` filter for the trailing window.
    fn date_filter(days_back: u32) -> String {
        let end = Utc::now();
        let start = end - ChronoDuration::days(i64::from(days_back));
        format!(
            "creationdate:[{}..{}]",
            start.to_rfc3339_opts(SecondsFormat::Millis, true),
            end.to_rfc3339_opts(SecondsFormat::Millis, true),
        )
    }

    async fn fetch(&self, days_back: u32) -> Result<Vec<ExternalOrder>> {
        let url = format!(
            "{}/order?filter={}&limit={}",
            self.base_url,
            urlencoding::encode(&Self::date_filter(days_back)),
            ORDER_LIMIT,
        );
        debug!(days_back, "Fetching eBay orders");

        let resp = self
            .http
            .get(&url)
            .bearer_auth(self.access_token.expose_secret())
            .send()
            .await
            .context("eBay orders request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("eBay orders API error {status}: {body}");
        }

        let body: OrdersResponse = resp.json().await.context("Failed to parse eBay orders")?;
        Ok(body.orders.into_iter().map(RawOrder::into_order).collect())
    }
}

#[async_trait]
impl OrderFeed for EbayOrderFeed {
    async fn recent_orders(&self, days_back: u32) -> Result<Vec<ExternalOrder>, DealScoutError> {
        let orders = self
            .fetch(days_back)
            .await
            .map_err(|e| DealScoutError::transient(SERVICE, format!("{e:#}")))?;
        info!(count = orders.len(), days_back, "eBay orders fetched");
        Ok(orders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_orders() {
        let json = r#"{
            "orders": [
                {
                    "orderId": "12-345",
                    "creationDate": "2026-04-02T18:20:11.000Z",
                    "orderFulfillmentStatus": "FULFILLED",
                    "lineItems": [
                        {
                            "legacyItemId": "3344",
                            "title": "RTX 3080",
                            "lineItemCost": {"value": "450.00", "currency": "USD"},
                            "deliveryCost": {"shippingCost": {"value": "15.25", "currency": "USD"}},
                            "quantity": 1
                        },
                        {"title": "No id"}
                    ]
                }
            ]
        }"#;
        let body: OrdersResponse = serde_json::from_str(json).unwrap();
        let orders: Vec<_> = body.orders.into_iter().map(RawOrder::into_order).collect();

        assert_eq!(orders.len(), 1);
        let order = &orders[0];
        assert_eq!(order.order_id, "12-345");
        assert_eq!(order.order_date, NaiveDate::from_ymd_opt(2026, 4, 2));
        assert_eq!(order.status, FulfillmentStatus::Fulfilled);

        let item = &order.line_items[0];
        assert_eq!(item.listing_id.as_deref(), Some("3344"));
        assert_eq!(item.sell_price, dec!(450.00));
        assert_eq!(item.shipping_paid_by_buyer, dec!(15.25));

        let bare = &order.line_items[1];
        assert_eq!(bare.listing_id, None);
        assert_eq!(bare.sell_price, Decimal::ZERO);
        assert_eq!(bare.quantity, 1);
    }

    #[test]
    fn test_missing_status_and_date() {
        let order = RawOrder {
            order_id: "x".to_string(),
            creation_date: Some("bad".to_string()),
            order_fulfillment_status: None,
            line_items: Vec::new(),
        }
        .into_order();
        assert_eq!(order.order_date, None);
        assert!(!order.status.is_complete());
    }

    #[test]
    fn test_date_filter_shape() {
        let filter = EbayOrderFeed::date_filter(7);
        assert!(filter.starts_with("creationdate:["));
        assert!(filter.contains(".."));
        assert!(filter.ends_with("Z]"));
    }
}
