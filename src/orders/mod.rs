//! External marketplace orders.
//!
//! Defines the order value types consumed by reconciliation and the
//! `OrderFeed` trait that supplies them, plus the eBay Fulfillment
//! implementation.

pub mod ebay;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::DealScoutError;

pub use ebay::EbayOrderFeed;

/// Fulfillment state as reported by the marketplace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FulfillmentStatus {
    NotStarted,
    InProgress,
    Fulfilled,
    Other(String),
}

impl FulfillmentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "NOT_STARTED" => FulfillmentStatus::NotStarted,
            "IN_PROGRESS" => FulfillmentStatus::InProgress,
            "FULFILLED" => FulfillmentStatus::Fulfilled,
            other => FulfillmentStatus::Other(other.to_string()),
        }
    }

    /// Paid orders count as sales once fulfillment has started.
    pub fn is_complete(&self) -> bool {
        matches!(self, FulfillmentStatus::Fulfilled | FulfillmentStatus::InProgress)
    }
}

impl fmt::Display for FulfillmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FulfillmentStatus::NotStarted => write!(f, "NOT_STARTED"),
            FulfillmentStatus::InProgress => write!(f, "IN_PROGRESS"),
            FulfillmentStatus::Fulfilled => write!(f, "FULFILLED"),
            FulfillmentStatus::Other(s) => write!(f, "{s}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLineItem {
    /// External listing id used to match a Flip.
    pub listing_id: Option<String>,
    pub title: Option<String>,
    pub sell_price: Decimal,
    pub shipping_paid_by_buyer: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalOrder {
    pub order_id: String,
    pub order_date: Option<NaiveDate>,
    pub status: FulfillmentStatus,
    pub line_items: Vec<OrderLineItem>,
}

/// Supplies recent orders from the marketplace.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderFeed: Send + Sync {
    async fn recent_orders(&self, days_back: u32) -> Result<Vec<ExternalOrder>, DealScoutError>;
}
