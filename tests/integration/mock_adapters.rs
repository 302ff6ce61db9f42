//! In-memory adapters for integration testing.
//!
//! Deterministic implementations of the listing source, classifier,
//! pricing resolver, notifier and order feed. All state lives in memory
//! and is controllable from test code.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use dealscout::classify::Classifier;
use dealscout::listings::ListingSource;
use dealscout::notify::{Notifier, PushMessage};
use dealscout::orders::{ExternalOrder, OrderFeed};
use dealscout::pricing::PricingResolver;
use dealscout::types::*;

// ---------------------------------------------------------------------------
// Listing source
// ---------------------------------------------------------------------------

/// Hands out queued batches, one per fetch. Empty once drained.
#[derive(Default)]
pub struct ScriptedSource {
    batches: Mutex<VecDeque<Vec<RawListing>>>,
    /// When set, each fetch waits for a permit before returning.
    gate: Option<Arc<Notify>>,
}

impl ScriptedSource {
    pub fn new(batches: Vec<Vec<RawListing>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            gate: None,
        }
    }

    pub fn gated(batches: Vec<Vec<RawListing>>, gate: Arc<Notify>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            gate: Some(gate),
        }
    }
}

#[async_trait]
impl ListingSource for ScriptedSource {
    async fn fetch_batch(&self, max: usize) -> Result<Vec<RawListing>, DealScoutError> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let mut batch = self.batches.lock().unwrap().pop_front().unwrap_or_default();
        batch.truncate(max);
        Ok(batch)
    }
}

pub fn listing(url: &str, title: &str, price: Decimal) -> RawListing {
    RawListing {
        title: title.to_string(),
        asking_price: Some(price),
        listing_url: url.to_string(),
        source: "facebook".to_string(),
        location: Some("Round Rock, TX".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Classifier
// ---------------------------------------------------------------------------

/// Returns a fixed classification per listing title.
#[derive(Default)]
pub struct TableClassifier {
    by_title: HashMap<String, Classification>,
    calls: Mutex<usize>,
}

impl TableClassifier {
    pub fn with(mut self, title: &str, classification: Classification) -> Self {
        self.by_title.insert(title.to_string(), classification);
        self
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl Classifier for TableClassifier {
    async fn classify(&self, listing_text: &str) -> Result<Classification, DealScoutError> {
        *self.calls.lock().unwrap() += 1;
        self.by_title
            .get(listing_text)
            .cloned()
            .ok_or_else(|| DealScoutError::malformed("classifier", "no table entry"))
    }
}

/// Signals `entered`, then never answers.
pub struct StalledClassifier {
    pub entered: Arc<Notify>,
}

#[async_trait]
impl Classifier for StalledClassifier {
    async fn classify(&self, _listing_text: &str) -> Result<Classification, DealScoutError> {
        self.entered.notify_one();
        std::future::pending().await
    }
}

pub fn classified(brand: &str, model: &str, condition: Condition) -> Classification {
    Classification {
        category: Some("electronics".to_string()),
        brand: Some(brand.to_string()),
        model: Some(model.to_string()),
        condition,
        has_product_photos: Some(true),
        photo_quality: Some(PhotoQuality::Good),
        ..Classification::unknown()
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Market values keyed by search term; everything else is "no data".
#[derive(Default)]
pub struct TablePricing {
    market: HashMap<String, Decimal>,
    lookups: Mutex<usize>,
}

impl TablePricing {
    pub fn with(mut self, term: &str, avg: Decimal) -> Self {
        self.market.insert(term.to_string(), avg);
        self
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

fn result_at(avg: Decimal, n: usize) -> Option<PricingResult> {
    let samples = (0..n)
        .map(|i| PriceSample {
            title: Some(format!("comp {i}")),
            price: avg,
            condition: None,
            item_id: Some(i.to_string()),
        })
        .collect();
    PricingResult::from_samples(samples)
}

#[async_trait]
impl PricingResolver for TablePricing {
    async fn market_value(
        &self,
        search_term: &str,
        _condition: MarketCondition,
        _limit: u32,
    ) -> Result<Option<PricingResult>, DealScoutError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(self.market.get(search_term).and_then(|avg| result_at(*avg, 12)))
    }

    async fn parts_market_value(
        &self,
        _search_term: &str,
        _limit: u32,
    ) -> Result<Option<PricingResult>, DealScoutError> {
        *self.lookups.lock().unwrap() += 1;
        Ok(None)
    }

    async fn part_cost(&self, _part_name: &str) -> Result<Option<PartQuote>, DealScoutError> {
        Ok(None)
    }

    async fn price_trend(
        &self,
        _search_term: &str,
        _condition: MarketCondition,
        _market_avg: Decimal,
    ) -> Result<Option<PriceTrend>, DealScoutError> {
        Ok(None)
    }

    async fn local_pickup_available(
        &self,
        _search_term: &str,
        _condition: MarketCondition,
        _radius_miles: f64,
    ) -> Result<bool, DealScoutError> {
        Ok(false)
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Records every delivered message. Tokens listed in `failing` error.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, PushMessage)>>,
    failing: Vec<String>,
}

impl RecordingNotifier {
    pub fn failing_for(tokens: &[&str]) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: tokens.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn sent(&self) -> Vec<(String, PushMessage)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, token: &str, message: &PushMessage) -> Result<(), DealScoutError> {
        if self.failing.iter().any(|t| t == token) {
            return Err(DealScoutError::transient("notifier", "unregistered token"));
        }
        self.sent.lock().unwrap().push((token.to_string(), message.clone()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Order feed
// ---------------------------------------------------------------------------

/// Returns the same order window on every call.
pub struct FixedOrders {
    orders: Vec<ExternalOrder>,
}

impl FixedOrders {
    pub fn new(orders: Vec<ExternalOrder>) -> Self {
        Self { orders }
    }
}

#[async_trait]
impl OrderFeed for FixedOrders {
    async fn recent_orders(&self, _days_back: u32) -> Result<Vec<ExternalOrder>, DealScoutError> {
        Ok(self.orders.clone())
    }
}
