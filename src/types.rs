//! Shared types for DealScout.
//!
//! These types form the data model used across all modules: the raw
//! listing as delivered upstream, the value objects returned by the
//! external adapters (classification, pricing), the `Deal` and `Flip`
//! records driven through their lifecycles, and the domain error.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::scoring::profit;
use crate::scoring::score::DealScore;

/// Maximum number of sample listings kept on a `PricingResult`.
pub const MAX_PRICE_SAMPLES: usize = 10;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Item condition as classified (or confirmed by the user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    New,
    Used,
    NeedsRepair,
    Unknown,
}

impl Condition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Condition::New => "new",
            Condition::Used => "used",
            Condition::NeedsRepair => "needs_repair",
            Condition::Unknown => "unknown",
        }
    }

    /// The market-pricing condition for this item, if it can be priced
    /// on the standard path.
    pub fn market_condition(&self) -> Option<MarketCondition> {
        match self {
            Condition::New => Some(MarketCondition::New),
            Condition::Used => Some(MarketCondition::Used),
            Condition::NeedsRepair | Condition::Unknown => None,
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Condition {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "new" => Ok(Condition::New),
            "used" => Ok(Condition::Used),
            "needs_repair" | "repair" | "for_parts" => Ok(Condition::NeedsRepair),
            "unknown" => Ok(Condition::Unknown),
            _ => Err(anyhow::anyhow!("Unknown condition: {s}")),
        }
    }
}

/// Condition filter accepted by the market pricing lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketCondition {
    New,
    Used,
}

impl MarketCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketCondition::New => "new",
            MarketCondition::Used => "used",
        }
    }
}

impl From<MarketCondition> for Condition {
    fn from(c: MarketCondition) -> Self {
        match c {
            MarketCondition::New => Condition::New,
            MarketCondition::Used => Condition::Used,
        }
    }
}

impl fmt::Display for MarketCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the condition was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionConfidence {
    Explicit,
    Unclear,
    UserConfirmed,
}

impl std::str::FromStr for ConditionConfidence {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "explicit" => Ok(ConditionConfidence::Explicit),
            "unclear" => Ok(ConditionConfidence::Unclear),
            "user_confirmed" => Ok(ConditionConfidence::UserConfirmed),
            _ => Err(anyhow::anyhow!("Unknown condition confidence: {s}")),
        }
    }
}

/// Qualitative repair-difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairFeasibility {
    Easy,
    Moderate,
    Difficult,
    Professional,
}

impl RepairFeasibility {
    pub const ALL: &'static [RepairFeasibility] = &[
        RepairFeasibility::Easy,
        RepairFeasibility::Moderate,
        RepairFeasibility::Difficult,
        RepairFeasibility::Professional,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepairFeasibility::Easy => "easy",
            RepairFeasibility::Moderate => "moderate",
            RepairFeasibility::Difficult => "difficult",
            RepairFeasibility::Professional => "professional",
        }
    }
}

impl fmt::Display for RepairFeasibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepairFeasibility {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "easy" => Ok(RepairFeasibility::Easy),
            "moderate" => Ok(RepairFeasibility::Moderate),
            "difficult" | "hard" => Ok(RepairFeasibility::Difficult),
            "professional" | "pro" => Ok(RepairFeasibility::Professional),
            _ => Err(anyhow::anyhow!("Unknown repair feasibility: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhotoQuality {
    Good,
    Fair,
    Poor,
    None,
}

impl std::str::FromStr for PhotoQuality {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "good" => Ok(PhotoQuality::Good),
            "fair" => Ok(PhotoQuality::Fair),
            "poor" => Ok(PhotoQuality::Poor),
            "none" => Ok(PhotoQuality::None),
            _ => Err(anyhow::anyhow!("Unknown photo quality: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SellerReputation {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl std::str::FromStr for SellerReputation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalise(s).as_str() {
            "excellent" => Ok(SellerReputation::Excellent),
            "good" => Ok(SellerReputation::Good),
            "fair" => Ok(SellerReputation::Fair),
            "poor" => Ok(SellerReputation::Poor),
            _ => Err(anyhow::anyhow!("Unknown seller reputation: {s}")),
        }
    }
}

/// Quality of the pricing data behind a market value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceStatus {
    Accurate,
    SimilarPrices,
    NoData,
}

/// Deal lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStatus {
    New,
    NeedsCondition,
    Dismissed,
    Purchased,
}

impl DealStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DealStatus::New => "new",
            DealStatus::NeedsCondition => "needs_condition",
            DealStatus::Dismissed => "dismissed",
            DealStatus::Purchased => "purchased",
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flip lifecycle status (one-way).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipStatus {
    Active,
    Sold,
}

impl fmt::Display for FlipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlipStatus::Active => write!(f, "active"),
            FlipStatus::Sold => write!(f, "sold"),
        }
    }
}

/// Three-band label used for risk, effort and demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Low,
    Medium,
    High,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Low => write!(f, "low"),
            Level::Medium => write!(f, "medium"),
            Level::High => write!(f, "high"),
        }
    }
}

/// Predicted time-to-sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlipSpeed {
    Fast,
    Medium,
    Slow,
}

impl fmt::Display for FlipSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlipSpeed::Fast => write!(f, "fast"),
            FlipSpeed::Medium => write!(f, "medium"),
            FlipSpeed::Slow => write!(f, "slow"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Rising,
    Stable,
    Falling,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Rising => write!(f, "rising"),
            TrendDirection::Stable => write!(f, "stable"),
            TrendDirection::Falling => write!(f, "falling"),
        }
    }
}

/// Lower-case, trim, and fold spaces/hyphens to underscores so that
/// "Needs Repair", "needs-repair" and "needs_repair" compare equal.
fn normalise(s: &str) -> String {
    s.trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

// ---------------------------------------------------------------------------
// Raw listing
// ---------------------------------------------------------------------------

/// A listing alert as delivered by the upstream listing source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawListing {
    pub title: String,
    #[serde(default)]
    pub asking_price: Option<Decimal>,
    /// Dedup key.
    pub listing_url: String,
    /// Marketplace name: "facebook", "craigslist", "ebay", ...
    pub source: String,
    #[serde(default)]
    pub location: Option<String>,
}

impl fmt::Display for RawListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.asking_price {
            Some(p) => write!(f, "[{}] {} (${:.2})", self.source, self.title, p),
            None => write!(f, "[{}] {} (no price)", self.source, self.title),
        }
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Structured classification of a listing, produced once per Deal by the
/// classification adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub item_details: BTreeMap<String, serde_json::Value>,
    pub condition: Condition,
    pub condition_confidence: ConditionConfidence,

    pub repair_needed: Option<bool>,
    pub repair_keywords: Vec<String>,
    pub repair_feasibility: Option<RepairFeasibility>,
    pub repair_notes: Option<String>,
    pub repair_part_needed: Option<String>,

    pub part_numbers: Vec<String>,
    pub variants: Option<String>,
    pub is_bundle: Option<bool>,
    pub bundle_items: Vec<String>,
    pub accessory_completeness: Option<String>,

    pub has_product_photos: Option<bool>,
    pub photo_quality: Option<PhotoQuality>,

    pub seller_username: Option<String>,
    pub seller_rating: Option<String>,
    pub seller_reputation: Option<SellerReputation>,
}

impl Classification {
    /// An empty classification with unknown condition.
    pub fn unknown() -> Self {
        Self {
            category: None,
            subcategory: None,
            brand: None,
            model: None,
            item_details: BTreeMap::new(),
            condition: Condition::Unknown,
            condition_confidence: ConditionConfidence::Unclear,
            repair_needed: None,
            repair_keywords: Vec::new(),
            repair_feasibility: None,
            repair_notes: None,
            repair_part_needed: None,
            part_numbers: Vec::new(),
            variants: None,
            is_bundle: None,
            bundle_items: Vec::new(),
            accessory_completeness: None,
            has_product_photos: None,
            photo_quality: None,
            seller_username: None,
            seller_rating: None,
            seller_reputation: None,
        }
    }

    /// Whether the listing explicitly reports no product photos.
    pub fn lacks_photos(&self) -> bool {
        self.has_product_photos == Some(false)
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// One comparable listing behind a price estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub title: Option<String>,
    pub price: Decimal,
    pub condition: Option<String>,
    pub item_id: Option<String>,
}

/// Aggregate price statistics for a search term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingResult {
    pub avg_price: Decimal,
    pub low_price: Decimal,
    pub high_price: Decimal,
    pub num_sales: u32,
    /// At most `MAX_PRICE_SAMPLES` entries.
    pub samples: Vec<PriceSample>,
}

impl PricingResult {
    /// Aggregate a set of samples. Non-positive prices are ignored;
    /// returns `None` when nothing usable remains.
    pub fn from_samples(samples: Vec<PriceSample>) -> Option<Self> {
        let mut samples: Vec<PriceSample> =
            samples.into_iter().filter(|s| s.price > Decimal::ZERO).collect();
        if samples.is_empty() {
            return None;
        }

        let count = samples.len();
        let sum: Decimal = samples.iter().map(|s| s.price).sum();
        let low = samples.iter().map(|s| s.price).min()?;
        let high = samples.iter().map(|s| s.price).max()?;
        samples.truncate(MAX_PRICE_SAMPLES);

        Some(Self {
            avg_price: (sum / Decimal::from(count)).round_dp(2),
            low_price: low,
            high_price: high,
            num_sales: count as u32,
            samples,
        })
    }
}

impl fmt::Display for PricingResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "avg=${:.2} low=${:.2} high=${:.2} (n={})",
            self.avg_price, self.low_price, self.high_price, self.num_sales,
        )
    }
}

/// Direction of recent prices relative to the market average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceTrend {
    pub direction: TrendDirection,
    pub note: String,
}

/// Cheapest known source for a replacement part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartQuote {
    pub part_cost: Decimal,
    pub part_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Deal
// ---------------------------------------------------------------------------

/// A candidate listing under evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deal {
    pub id: i64,
    pub listing_url: String,
    pub title: String,
    pub asking_price: Option<Decimal>,
    pub source: String,
    pub location: Option<String>,
    pub distance_miles: Option<f64>,

    // Classification
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub item_details: BTreeMap<String, serde_json::Value>,
    pub condition: Option<Condition>,
    pub condition_confidence: Option<ConditionConfidence>,
    #[serde(default)]
    pub part_numbers: Vec<String>,
    pub variants: Option<String>,
    pub is_bundle: Option<bool>,
    #[serde(default)]
    pub bundle_items: Vec<String>,
    pub accessory_completeness: Option<String>,
    pub has_product_photos: Option<bool>,
    pub photo_quality: Option<PhotoQuality>,
    pub seller_username: Option<String>,
    pub seller_rating: Option<String>,
    pub seller_reputation: Option<SellerReputation>,

    // Repair
    pub repair_needed: Option<bool>,
    #[serde(default)]
    pub repair_keywords: Vec<String>,
    pub repair_feasibility: Option<RepairFeasibility>,
    pub repair_notes: Option<String>,
    pub repair_part_needed: Option<String>,
    pub repair_part_cost: Option<Decimal>,
    pub repair_part_url: Option<String>,
    pub repair_labor_estimate: Option<Decimal>,
    pub repair_total_estimate: Option<Decimal>,

    // Pricing
    pub market_value: Option<Decimal>,
    pub price_status: Option<PriceStatus>,
    pub price_note: Option<String>,
    pub pricing_data: Option<PricingResult>,
    pub price_trend: Option<TrendDirection>,
    pub price_trend_note: Option<String>,

    // Derived
    pub estimated_profit: Option<Decimal>,
    pub true_profit: Option<Decimal>,
    pub deal_score: Option<u8>,
    pub risk_level: Option<Level>,
    pub effort_level: Option<Level>,
    pub demand_indicator: Option<Level>,
    pub flip_speed_prediction: Option<FlipSpeed>,
    pub local_pickup_available: Option<bool>,

    pub status: DealStatus,
    pub created_at: DateTime<Utc>,
    pub notified_at: Option<DateTime<Utc>>,
}

impl fmt::Display for Deal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [{}] {}", self.id, self.status, self.title)?;
        if let Some(p) = self.estimated_profit {
            write!(f, " profit=${p:.2}")?;
        }
        if let Some(s) = self.deal_score {
            write!(f, " score={s}")?;
        }
        Ok(())
    }
}

impl Deal {
    /// Create a fresh, unclassified deal in status `new`.
    pub fn new(id: i64, listing: &RawListing, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            listing_url: listing.listing_url.clone(),
            title: listing.title.clone(),
            asking_price: listing.asking_price,
            source: listing.source.clone(),
            location: listing.location.clone(),
            distance_miles: None,
            category: None,
            subcategory: None,
            brand: None,
            model: None,
            item_details: BTreeMap::new(),
            condition: None,
            condition_confidence: None,
            part_numbers: Vec::new(),
            variants: None,
            is_bundle: None,
            bundle_items: Vec::new(),
            accessory_completeness: None,
            has_product_photos: None,
            photo_quality: None,
            seller_username: None,
            seller_rating: None,
            seller_reputation: None,
            repair_needed: None,
            repair_keywords: Vec::new(),
            repair_feasibility: None,
            repair_notes: None,
            repair_part_needed: None,
            repair_part_cost: None,
            repair_part_url: None,
            repair_labor_estimate: None,
            repair_total_estimate: None,
            market_value: None,
            price_status: None,
            price_note: None,
            pricing_data: None,
            price_trend: None,
            price_trend_note: None,
            estimated_profit: None,
            true_profit: None,
            deal_score: None,
            risk_level: None,
            effort_level: None,
            demand_indicator: None,
            flip_speed_prediction: None,
            local_pickup_available: None,
            status: DealStatus::New,
            created_at,
            notified_at: None,
        }
    }

    /// Copy every classification field onto the deal.
    pub fn apply_classification(&mut self, c: &Classification) {
        self.category = c.category.clone();
        self.subcategory = c.subcategory.clone();
        self.brand = c.brand.clone();
        self.model = c.model.clone();
        self.item_details = c.item_details.clone();
        self.condition = Some(c.condition);
        self.condition_confidence = Some(c.condition_confidence);

        self.repair_needed = c.repair_needed;
        self.repair_keywords = c.repair_keywords.clone();
        self.repair_feasibility = c.repair_feasibility;
        self.repair_notes = c.repair_notes.clone();
        self.repair_part_needed = c.repair_part_needed.clone();

        self.part_numbers = c.part_numbers.clone();
        self.variants = c.variants.clone();
        self.is_bundle = c.is_bundle;
        self.bundle_items = c.bundle_items.clone();
        self.accessory_completeness = c.accessory_completeness.clone();

        self.has_product_photos = c.has_product_photos;
        self.photo_quality = c.photo_quality;

        self.seller_username = c.seller_username.clone();
        self.seller_rating = c.seller_rating.clone();
        self.seller_reputation = c.seller_reputation;
    }

    /// Whether classification has populated this deal.
    pub fn is_classified(&self) -> bool {
        self.condition.is_some()
    }

    /// Repair signals present: condition says so, or the classifier
    /// flagged a repair.
    pub fn needs_repair(&self) -> bool {
        self.condition == Some(Condition::NeedsRepair) || self.repair_needed == Some(true)
    }

    /// Build the pricing search term: brand followed by model (or
    /// subcategory when no model is known), refined by the first part
    /// number. `None` when nothing identifying is known.
    pub fn search_term(&self) -> Option<String> {
        let item = self.model.as_deref().or(self.subcategory.as_deref());
        let base = [self.brand.as_deref(), item]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if base.is_empty() {
            return None;
        }

        match self.part_numbers.iter().map(|p| p.trim()).find(|p| !p.is_empty()) {
            Some(part) => Some(format!("{base} {part}")),
            None => Some(base),
        }
    }

    /// Store a computed score and its labels.
    pub fn apply_score(&mut self, score: &DealScore) {
        self.deal_score = Some(score.deal_score);
        self.risk_level = Some(score.risk_level);
        self.effort_level = Some(score.effort_level);
        self.demand_indicator = Some(score.demand_indicator);
        self.flip_speed_prediction = Some(score.flip_speed);
    }

    /// Take the evaluated fields from a copy computed while the store was
    /// unlocked. Listing identity, an earlier push timestamp and a
    /// user-confirmed condition already on `self` are kept.
    pub fn merge_evaluation(&mut self, evaluated: Deal) {
        let stored = std::mem::replace(self, evaluated);
        self.id = stored.id;
        self.listing_url = stored.listing_url;
        self.title = stored.title;
        self.asking_price = stored.asking_price;
        self.source = stored.source;
        self.location = stored.location;
        self.created_at = stored.created_at;
        if stored.notified_at.is_some() {
            self.notified_at = stored.notified_at;
        }

        let confirmed = Some(ConditionConfidence::UserConfirmed);
        if stored.condition_confidence == confirmed && self.condition_confidence != confirmed {
            self.condition = stored.condition;
            self.condition_confidence = stored.condition_confidence;
            self.status = stored.status;
        }
    }

    /// Number of comparable listings behind the current market value.
    pub fn num_listings(&self) -> Option<u32> {
        self.pricing_data.as_ref().map(|p| p.num_sales)
    }

    /// Helper to build a test/sample deal with sensible defaults.
    #[cfg(test)]
    pub fn sample() -> Self {
        let listing = RawListing {
            title: "Sony PS5 Disc Edition".to_string(),
            asking_price: Some(rust_decimal_macros::dec!(250)),
            listing_url: "https://facebook.com/marketplace/item/1".to_string(),
            source: "facebook".to_string(),
            location: Some("Austin, TX".to_string()),
        };
        Deal::new(1, &listing, Utc::now())
    }
}

// ---------------------------------------------------------------------------
// Flip
// ---------------------------------------------------------------------------

/// Purchase details for a flip created by hand or from a deal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFlip {
    pub item_name: String,
    pub category: Option<String>,
    pub buy_price: Decimal,
    pub buy_date: NaiveDate,
    pub buy_source: Option<String>,
    pub notes: Option<String>,
}

/// Sale details recorded when a flip is sold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleDetails {
    pub sell_price: Decimal,
    pub sell_date: NaiveDate,
    pub sell_platform: String,
    pub fees_paid: Decimal,
    pub shipping_cost: Decimal,
}

/// A purchase tracked from acquisition to sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flip {
    pub id: i64,
    pub deal_id: Option<i64>,
    pub item_name: String,
    pub category: Option<String>,
    pub buy_price: Decimal,
    pub buy_date: NaiveDate,
    pub buy_source: Option<String>,
    pub status: FlipStatus,
    pub sell_price: Option<Decimal>,
    pub sell_date: Option<NaiveDate>,
    pub sell_platform: Option<String>,
    pub fees_paid: Decimal,
    pub shipping_cost: Decimal,
    /// `None` while active.
    pub profit: Option<Decimal>,
    pub ebay_listing_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl fmt::Display for Flip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} ({}) bought ${:.2}",
            self.id, self.item_name, self.status, self.buy_price
        )?;
        if let (Some(sell), Some(profit)) = (self.sell_price, self.profit) {
            write!(f, " sold ${sell:.2} profit ${profit:.2}")?;
        }
        Ok(())
    }
}

impl Flip {
    pub fn new(id: i64, deal_id: Option<i64>, data: NewFlip, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            deal_id,
            item_name: data.item_name,
            category: data.category,
            buy_price: data.buy_price,
            buy_date: data.buy_date,
            buy_source: data.buy_source,
            status: FlipStatus::Active,
            sell_price: None,
            sell_date: None,
            sell_platform: None,
            fees_paid: Decimal::ZERO,
            shipping_cost: Decimal::ZERO,
            profit: None,
            ebay_listing_id: None,
            notes: data.notes,
            created_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == FlipStatus::Active
    }

    /// Profit from the recorded sale; `None` until a sell price exists.
    pub fn calculate_profit(&self) -> Option<Decimal> {
        self.sell_price.map(|sell| {
            profit::actual_profit(self.buy_price, sell, self.fees_paid, self.shipping_cost)
        })
    }

    /// Transition `active → sold`. Selling twice is rejected and leaves
    /// the flip untouched.
    pub fn mark_sold(&mut self, sale: SaleDetails) -> Result<(), DealScoutError> {
        if self.status == FlipStatus::Sold {
            return Err(DealScoutError::AlreadySold(self.id));
        }
        self.sell_price = Some(sale.sell_price);
        self.sell_date = Some(sale.sell_date);
        self.sell_platform = Some(sale.sell_platform);
        self.fees_paid = sale.fees_paid;
        self.shipping_cost = sale.shipping_cost;
        self.status = FlipStatus::Sold;
        self.profit = self.calculate_profit();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Device tokens & settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceToken {
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
}

/// Runtime-adjustable settings consumed by the pipeline and jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Minimum estimated profit (USD) before a deal is pushed.
    pub profit_threshold: Decimal,
    /// Platform fee as a percentage of sale price (13 = 13%).
    pub fee_percentage: Decimal,
    pub needs_review_interval_mins: u64,
    pub local_pickup_radius_miles: f64,
    #[serde(default = "default_true")]
    pub notifications_enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            profit_threshold: Decimal::from(50),
            fee_percentage: Decimal::from(13),
            needs_review_interval_mins: 15,
            local_pickup_radius_miles: 100.0,
            notifications_enabled: true,
        }
    }
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub profit_threshold: Option<Decimal>,
    pub fee_percentage: Option<Decimal>,
    pub needs_review_interval_mins: Option<u64>,
    pub local_pickup_radius_miles: Option<f64>,
    pub notifications_enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for DealScout.
#[derive(Debug, thiserror::Error)]
pub enum DealScoutError {
    #[error("{service} call failed: {message}")]
    Transient { service: String, message: String },

    #[error("{service} call timed out after {secs}s")]
    Timeout { service: String, secs: u64 },

    #[error("Malformed response from {service}: {message}")]
    MalformedResponse { service: String, message: String },

    #[error("{0} is not configured")]
    NotConfigured(String),

    #[error("Deal not found: {0}")]
    DealNotFound(i64),

    #[error("Flip not found: {0}")]
    FlipNotFound(i64),

    #[error("Deal {0} already purchased")]
    AlreadyPurchased(i64),

    #[error("Flip {0} already sold")]
    AlreadySold(i64),

    #[error("Listing {0} already tracked")]
    DuplicateListing(String),

    #[error("Listing id {listing_id} already linked to active flip {flip_id}")]
    ListingAlreadyLinked { listing_id: String, flip_id: i64 },

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DealScoutError {
    pub fn transient(service: &str, err: impl fmt::Display) -> Self {
        DealScoutError::Transient {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub fn malformed(service: &str, err: impl fmt::Display) -> Self {
        DealScoutError::MalformedResponse {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    /// Recoverable per-call failure (logged, field left unset).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DealScoutError::Transient { .. }
                | DealScoutError::Timeout { .. }
                | DealScoutError::MalformedResponse { .. }
                | DealScoutError::NotConfigured(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
