//! Persistence layer.
//!
//! Deals, flips, device tokens and settings are held in memory by `Store`
//! and written to a JSON snapshot by `commit`, once per job run. The
//! lifecycle transitions (dismiss, confirm condition, purchase, sell) live
//! here so that their invariants are checked against the records they
//! mutate.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::types::{
    Condition, ConditionConfidence, Deal, DealScoutError, DealStatus, DeviceToken, Flip,
    FlipStatus, NewFlip, RawListing, SaleDetails, Settings, SettingsUpdate,
};

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "dealscout_state.json";

/// Everything that is persisted between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreState {
    pub next_deal_id: i64,
    pub next_flip_id: i64,
    pub deals: BTreeMap<i64, Deal>,
    pub flips: BTreeMap<i64, Flip>,
    pub device_tokens: Vec<DeviceToken>,
    pub settings: Settings,
}

/// Save store state to a JSON file.
pub fn save_state(state: &StoreState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = serde_json::to_string_pretty(state).context("Failed to serialise store state")?;

    if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create state directory for {path}"))?;
    }

    // The previous snapshot survives a failed write.
    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).with_context(|| format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path).with_context(|| format!("Failed to move state into {path}"))?;

    debug!(path, deals = state.deals.len(), flips = state.flips.len(), "State saved");
    Ok(())
}

/// Load store state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<StoreState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read state from {path}"))?;

    let state: StoreState =
        serde_json::from_str(&json).with_context(|| format!("Failed to parse state from {path}"))?;

    info!(
        path,
        deals = state.deals.len(),
        flips = state.flips.len(),
        tokens = state.device_tokens.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

/// Delete the state file (for testing or reset).
pub fn delete_state(path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    if Path::new(path).exists() {
        std::fs::remove_file(path).with_context(|| format!("Failed to delete state file {path}"))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Store handle shared between jobs. Hold the lock only around record
/// reads and writes, never across an external call.
pub type SharedStore = Arc<Mutex<Store>>;

/// In-memory record store with an optional backing file.
#[derive(Debug)]
pub struct Store {
    state: StoreState,
    path: Option<PathBuf>,
}

impl Store {
    /// A store that never touches disk.
    pub fn in_memory(settings: Settings) -> Self {
        Self {
            state: StoreState {
                settings,
                ..StoreState::default()
            },
            path: None,
        }
    }

    /// Load the snapshot at `path`, or start fresh with `settings`.
    pub fn open(path: impl Into<PathBuf>, settings: Settings) -> Result<Self> {
        let path = path.into();
        let loaded = load_state(Some(&path.to_string_lossy()))?;
        let state = loaded.unwrap_or_else(|| StoreState {
            settings,
            ..StoreState::default()
        });
        Ok(Self {
            state,
            path: Some(path),
        })
    }

    /// Write the snapshot. No-op for in-memory stores.
    pub fn commit(&self) -> Result<()> {
        match &self.path {
            Some(path) => save_state(&self.state, Some(&path.to_string_lossy())),
            None => Ok(()),
        }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn snapshot(&self) -> &StoreState {
        &self.state
    }

    // -- Settings & device tokens --

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) -> &Settings {
        let s = &mut self.state.settings;
        if let Some(v) = update.profit_threshold {
            s.profit_threshold = v;
        }
        if let Some(v) = update.fee_percentage {
            s.fee_percentage = v;
        }
        if let Some(v) = update.needs_review_interval_mins {
            s.needs_review_interval_mins = v;
        }
        if let Some(v) = update.local_pickup_radius_miles {
            s.local_pickup_radius_miles = v;
        }
        if let Some(v) = update.notifications_enabled {
            s.notifications_enabled = v;
        }
        info!(
            profit_threshold = %s.profit_threshold,
            fee_percentage = %s.fee_percentage,
            "Settings updated"
        );
        &self.state.settings
    }

    /// Register a device token; an existing token only has its
    /// `last_used` refreshed.
    pub fn register_device_token(&mut self, token: &str, now: DateTime<Utc>) -> &DeviceToken {
        let idx = match self.state.device_tokens.iter().position(|t| t.token == token) {
            Some(idx) => {
                self.state.device_tokens[idx].last_used = now;
                idx
            }
            None => {
                self.state.device_tokens.push(DeviceToken {
                    token: token.to_string(),
                    created_at: now,
                    last_used: now,
                });
                info!(tokens = self.state.device_tokens.len(), "Device token registered");
                self.state.device_tokens.len() - 1
            }
        };
        &self.state.device_tokens[idx]
    }

    pub fn device_tokens(&self) -> Vec<String> {
        self.state.device_tokens.iter().map(|t| t.token.clone()).collect()
    }

    // -- Deals --

    /// Dedup keys of every deal ever recorded.
    pub fn seen_listing_urls(&self) -> HashSet<String> {
        self.state.deals.values().map(|d| d.listing_url.clone()).collect()
    }

    pub fn contains_listing(&self, listing_url: &str) -> bool {
        self.state.deals.values().any(|d| d.listing_url == listing_url)
    }

    /// Create a new deal in status `new`.
    pub fn insert_deal(
        &mut self,
        listing: &RawListing,
        now: DateTime<Utc>,
    ) -> Result<Deal, DealScoutError> {
        if self.contains_listing(&listing.listing_url) {
            return Err(DealScoutError::DuplicateListing(listing.listing_url.clone()));
        }
        self.state.next_deal_id += 1;
        let deal = Deal::new(self.state.next_deal_id, listing, now);
        self.state.deals.insert(deal.id, deal.clone());
        Ok(deal)
    }

    pub fn deal(&self, id: i64) -> Option<&Deal> {
        self.state.deals.get(&id)
    }

    pub fn deals(&self) -> impl Iterator<Item = &Deal> {
        self.state.deals.values()
    }

    /// Write back an evaluation computed without the lock held. A deal
    /// purchased or dismissed in the meantime keeps its stored record and
    /// `Ok(false)` is returned.
    pub fn apply_evaluation(&mut self, evaluated: Deal) -> Result<bool, DealScoutError> {
        let stored = self
            .state
            .deals
            .get_mut(&evaluated.id)
            .ok_or(DealScoutError::DealNotFound(evaluated.id))?;
        if matches!(stored.status, DealStatus::Purchased | DealStatus::Dismissed) {
            debug!(deal_id = stored.id, status = %stored.status, "Deal settled during evaluation, write-back skipped");
            return Ok(false);
        }
        stored.merge_evaluation(evaluated);
        Ok(true)
    }

    pub fn count_deals(&self, status: DealStatus) -> usize {
        self.state.deals.values().filter(|d| d.status == status).count()
    }

    pub fn dismiss_deal(&mut self, id: i64) -> Result<&Deal, DealScoutError> {
        let deal = self.state.deals.get_mut(&id).ok_or(DealScoutError::DealNotFound(id))?;
        if deal.status == DealStatus::Purchased {
            return Err(DealScoutError::InvalidTransition(format!(
                "deal {id} is purchased and cannot be dismissed"
            )));
        }
        deal.status = DealStatus::Dismissed;
        info!(deal_id = id, "Deal dismissed");
        Ok(deal)
    }

    /// Record a user-confirmed condition and return the deal to `new`.
    /// Only `new` and `used` are accepted.
    pub fn confirm_condition(
        &mut self,
        id: i64,
        condition: Condition,
    ) -> Result<Deal, DealScoutError> {
        if condition.market_condition().is_none() {
            return Err(DealScoutError::InvalidCondition(condition.to_string()));
        }
        let deal = self.state.deals.get_mut(&id).ok_or(DealScoutError::DealNotFound(id))?;
        match deal.status {
            DealStatus::New | DealStatus::NeedsCondition => {}
            DealStatus::Purchased => return Err(DealScoutError::AlreadyPurchased(id)),
            DealStatus::Dismissed => {
                return Err(DealScoutError::InvalidTransition(format!(
                    "deal {id} is dismissed and cannot be re-evaluated"
                )))
            }
        }
        deal.condition = Some(condition);
        deal.condition_confidence = Some(ConditionConfidence::UserConfirmed);
        deal.status = DealStatus::New;
        info!(deal_id = id, %condition, "Condition confirmed");
        Ok(deal.clone())
    }

    /// Purchase a deal: create its Flip and move the deal to `purchased`.
    /// A second purchase fails without creating anything.
    pub fn purchase_deal(
        &mut self,
        id: i64,
        buy_price: Decimal,
        buy_date: NaiveDate,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Flip, DealScoutError> {
        let deal = self.state.deals.get(&id).ok_or(DealScoutError::DealNotFound(id))?;
        if deal.status == DealStatus::Purchased {
            return Err(DealScoutError::AlreadyPurchased(id));
        }

        let data = NewFlip {
            item_name: deal.title.clone(),
            category: deal.category.clone(),
            buy_price,
            buy_date,
            buy_source: Some(deal.source.clone()),
            notes,
        };

        self.state.next_flip_id += 1;
        let flip = Flip::new(self.state.next_flip_id, Some(id), data, now);
        self.state.flips.insert(flip.id, flip.clone());
        if let Some(deal) = self.state.deals.get_mut(&id) {
            deal.status = DealStatus::Purchased;
        }

        info!(deal_id = id, flip_id = flip.id, buy_price = %buy_price, "Deal purchased");
        Ok(flip)
    }

    // -- Flips --

    /// Record a flip that did not come from a tracked deal.
    pub fn create_flip(&mut self, data: NewFlip, now: DateTime<Utc>) -> Flip {
        self.state.next_flip_id += 1;
        let flip = Flip::new(self.state.next_flip_id, None, data, now);
        self.state.flips.insert(flip.id, flip.clone());
        info!(flip_id = flip.id, item = %flip.item_name, "Manual flip created");
        flip
    }

    pub fn flip(&self, id: i64) -> Option<&Flip> {
        self.state.flips.get(&id)
    }

    pub fn flips(&self) -> impl Iterator<Item = &Flip> {
        self.state.flips.values()
    }

    /// Attach an external listing id. At most one active flip may carry
    /// a given id.
    pub fn link_listing(&mut self, flip_id: i64, listing_id: &str) -> Result<&Flip, DealScoutError> {
        if !self.state.flips.contains_key(&flip_id) {
            return Err(DealScoutError::FlipNotFound(flip_id));
        }
        if let Some(other) = self.state.flips.values().find(|f| {
            f.id != flip_id && f.is_active() && f.ebay_listing_id.as_deref() == Some(listing_id)
        }) {
            return Err(DealScoutError::ListingAlreadyLinked {
                listing_id: listing_id.to_string(),
                flip_id: other.id,
            });
        }

        let flip = self
            .state
            .flips
            .get_mut(&flip_id)
            .ok_or(DealScoutError::FlipNotFound(flip_id))?;
        flip.ebay_listing_id = Some(listing_id.to_string());
        debug!(flip_id, listing_id, "Listing linked");
        Ok(flip)
    }

    /// Mark a flip sold. Re-selling fails and mutates nothing.
    pub fn sell_flip(&mut self, id: i64, sale: SaleDetails) -> Result<&Flip, DealScoutError> {
        let flip = self.state.flips.get_mut(&id).ok_or(DealScoutError::FlipNotFound(id))?;
        flip.mark_sold(sale)?;
        info!(
            flip_id = id,
            sell_price = ?flip.sell_price,
            profit = ?flip.profit,
            "Flip sold"
        );
        Ok(flip)
    }

    /// Active flips keyed by external listing id.
    pub fn active_flips_by_listing(&self) -> HashMap<String, i64> {
        self.state
            .flips
            .values()
            .filter(|f| f.status == FlipStatus::Active)
            .filter_map(|f| f.ebay_listing_id.clone().map(|l| (l, f.id)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
