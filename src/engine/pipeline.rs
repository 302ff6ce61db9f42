//! Deal pipeline: one intake run over a batch of raw listings.
//!
//! Per listing: record → distance → classify → auto-dismiss / route →
//! standard pricing path or needs-condition → repair-cost path → score →
//! notify. Listings are processed sequentially in delivery order. Each
//! listing yields a `Result`; a failure on one listing never aborts the
//! batch. The store is committed once at the end of the run, and only
//! then is the batch acknowledged to the listing source.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::bounded;
use super::dedup::filter_unseen;
use super::distance::DistanceEstimator;
use crate::classify::Classifier;
use crate::listings::ListingSource;
use crate::notify::{dispatch, Notifier, PushMessage};
use crate::pricing::{PricingResolver, PARTS_PRICE_NOTE};
use crate::scoring::{self, ScoreInputs};
use crate::storage::SharedStore;
use crate::types::{
    Condition, Deal, DealScoutError, DealStatus, MarketCondition, PriceStatus, RawListing, Settings,
};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// How a listing left the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingDisposition {
    /// Classification unavailable; deal stays `new` with no category.
    Unclassified { deal_id: i64 },
    /// Classifier reported no product photos.
    AutoDismissed { deal_id: i64 },
    /// Waiting for a human to confirm condition.
    NeedsCondition { deal_id: i64, score: Option<u8> },
    /// Standard path ran.
    Evaluated {
        deal_id: i64,
        estimated_profit: Option<Decimal>,
        score: Option<u8>,
        notified: bool,
    },
}

impl ListingDisposition {
    pub fn deal_id(&self) -> i64 {
        match self {
            ListingDisposition::Unclassified { deal_id }
            | ListingDisposition::AutoDismissed { deal_id }
            | ListingDisposition::NeedsCondition { deal_id, .. }
            | ListingDisposition::Evaluated { deal_id, .. } => *deal_id,
        }
    }
}

/// Pipeline stage at which a listing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Record,
    Classify,
    Save,
}

/// Typed per-listing failure.
#[derive(Debug, thiserror::Error)]
#[error("{listing_url} failed at {stage:?}: {error}")]
pub struct ListingError {
    pub listing_url: String,
    pub deal_id: Option<i64>,
    pub stage: Stage,
    #[source]
    pub error: DealScoutError,
}

/// Summary of one intake run.
#[derive(Debug, Default)]
pub struct IntakeReport {
    pub fetched: usize,
    pub duplicates: usize,
    pub results: Vec<Result<ListingDisposition, ListingError>>,
    /// Set when the listing source itself failed.
    pub fetch_error: Option<String>,
    /// Set when the run's records could not be committed. The fetched
    /// listings were not acknowledged and will be delivered again.
    pub commit_error: Option<String>,
}

impl IntakeReport {
    pub fn processed(&self) -> usize {
        self.results.len()
    }

    pub fn errored(&self) -> usize {
        self.results.iter().filter(|r| r.is_err()).count()
    }

    pub fn notified(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, Ok(ListingDisposition::Evaluated { notified: true, .. })))
            .count()
    }

    pub fn dismissed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r, Ok(ListingDisposition::AutoDismissed { .. })))
            .count()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Listings taken from the source per run.
    pub batch_size: usize,
    /// Comparable listings requested from the pricing resolver.
    pub result_limit: u32,
    pub call_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            result_limit: 20,
            call_timeout: Duration::from_secs(30),
        }
    }
}

pub struct DealPipeline {
    source: Arc<dyn ListingSource>,
    classifier: Option<Arc<dyn Classifier>>,
    pricing: Option<Arc<dyn PricingResolver>>,
    notifier: Option<Arc<dyn Notifier>>,
    distance: DistanceEstimator,
    store: SharedStore,
    config: PipelineConfig,
}

impl DealPipeline {
    pub fn new(
        source: Arc<dyn ListingSource>,
        store: SharedStore,
        distance: DistanceEstimator,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            classifier: None,
            pricing: None,
            notifier: None,
            distance,
            store,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: Option<Arc<dyn Classifier>>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_pricing(mut self, pricing: Option<Arc<dyn PricingResolver>>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_notifier(mut self, notifier: Option<Arc<dyn Notifier>>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run one intake batch. Never fails; problems are reported in the
    /// returned summary and the logs.
    pub async fn run_batch(&self) -> IntakeReport {
        let mut report = IntakeReport::default();

        let batch = match bounded(
            "listings",
            self.config.call_timeout,
            self.source.fetch_batch(self.config.batch_size),
        )
        .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Listing source unavailable, skipping run");
                report.fetch_error = Some(e.to_string());
                return report;
            }
        };
        report.fetched = batch.len();
        let fetched_urls: Vec<String> = batch.iter().map(|l| l.listing_url.clone()).collect();

        let (fresh, settings, tokens) = {
            let store = self.store.lock().await;
            let fresh = filter_unseen(batch, &store.seen_listing_urls());
            (fresh, store.settings().clone(), store.device_tokens())
        };
        report.duplicates = report.fetched - fresh.len();

        for listing in fresh {
            let result = self.process_listing(listing, &settings, &tokens).await;
            match &result {
                Ok(disposition) => debug!(?disposition, "Listing processed"),
                Err(e) => warn!(
                    listing_url = %e.listing_url,
                    stage = ?e.stage,
                    error = %e.error,
                    "Listing failed"
                ),
            }
            report.results.push(result);
        }

        let committed = self.store.lock().await.commit();
        match committed {
            Ok(()) => self.acknowledge(&fetched_urls).await,
            Err(e) => {
                let e = format!("{e:#}");
                warn!(error = %e, "Failed to commit intake run, listings stay pending");
                report.commit_error = Some(e);
            }
        }

        info!(
            fetched = report.fetched,
            duplicates = report.duplicates,
            processed = report.processed(),
            errored = report.errored(),
            dismissed = report.dismissed(),
            notified = report.notified(),
            "Intake run complete"
        );
        report
    }

    async fn acknowledge(&self, listing_urls: &[String]) {
        if listing_urls.is_empty() {
            return;
        }
        let acked = bounded(
            "listings",
            self.config.call_timeout,
            self.source.acknowledge(listing_urls),
        )
        .await;
        if let Err(e) = acked {
            warn!(error = %e, "Failed to acknowledge listings, they will be deduplicated on redelivery");
        }
    }

    async fn process_listing(
        &self,
        listing: RawListing,
        settings: &Settings,
        tokens: &[String],
    ) -> Result<ListingDisposition, ListingError> {
        let fail = |deal_id: Option<i64>, stage: Stage, error: DealScoutError| ListingError {
            listing_url: listing.listing_url.clone(),
            deal_id,
            stage,
            error,
        };

        let mut deal = self
            .store
            .lock()
            .await
            .insert_deal(&listing, Utc::now())
            .map_err(|e| fail(None, Stage::Record, e))?;

        if let Some(location) = deal.location.as_deref() {
            deal.distance_miles = self.distance.miles_from_home(location);
        }

        let Some(classifier) = self.classifier.as_ref() else {
            debug!(deal_id = deal.id, "Classifier not configured, deal left unclassified");
            let deal_id = deal.id;
            self.save(deal).await.map_err(|e| fail(Some(deal_id), Stage::Save, e))?;
            return Ok(ListingDisposition::Unclassified { deal_id });
        };

        let classification =
            bounded("classifier", self.config.call_timeout, classifier.classify(&deal.title)).await;
        let classification = match classification {
            Ok(c) => c,
            Err(error) => {
                self.save(deal.clone()).await.map_err(|e| fail(Some(deal.id), Stage::Save, e))?;
                return Err(fail(Some(deal.id), Stage::Classify, error));
            }
        };
        deal.apply_classification(&classification);

        if classification.lacks_photos() {
            deal.status = DealStatus::Dismissed;
            info!(deal_id = deal.id, title = %deal.title, "Auto-dismissed deal without product photos");
            let deal_id = deal.id;
            self.save(deal).await.map_err(|e| fail(Some(deal_id), Stage::Save, e))?;
            return Ok(ListingDisposition::AutoDismissed { deal_id });
        }

        let mut notified = false;
        let market_condition = classification.condition.market_condition();
        let needs_review = deal.needs_repair() || classification.condition == Condition::Unknown;

        if needs_review {
            deal.status = DealStatus::NeedsCondition;
        } else if let Some(condition) = market_condition {
            notified = self.price_standard(&mut deal, condition, settings, tokens).await;
        }

        if deal.needs_repair() {
            self.price_repair(&mut deal, settings).await;
        }

        let disposition = if needs_review {
            ListingDisposition::NeedsCondition {
                deal_id: deal.id,
                score: deal.deal_score,
            }
        } else {
            ListingDisposition::Evaluated {
                deal_id: deal.id,
                estimated_profit: deal.estimated_profit,
                score: deal.deal_score,
                notified,
            }
        };

        info!(
            deal_id = deal.id,
            status = %deal.status,
            market_value = ?deal.market_value,
            estimated_profit = ?deal.estimated_profit,
            score = ?deal.deal_score,
            "Deal evaluated"
        );

        let deal_id = deal.id;
        self.save(deal).await.map_err(|e| fail(Some(deal_id), Stage::Save, e))?;
        Ok(disposition)
    }

    /// Standard path. Returns whether a notification was delivered.
    async fn price_standard(
        &self,
        deal: &mut Deal,
        condition: MarketCondition,
        settings: &Settings,
        tokens: &[String],
    ) -> bool {
        let Some(pricing) = self.pricing.as_ref() else {
            debug!(deal_id = deal.id, "Pricing not configured, skipping");
            return false;
        };
        let Some(term) = deal.search_term() else {
            debug!(deal_id = deal.id, "No search term, skipping pricing");
            return false;
        };

        let mut notified = false;
        let priced = bounded(
            "pricing",
            self.config.call_timeout,
            pricing.market_value(&term, condition, self.config.result_limit),
        )
        .await;

        match priced {
            Ok(Some(result)) => {
                deal.market_value = Some(result.avg_price);
                deal.price_status = Some(PriceStatus::Accurate);
                deal.pricing_data = Some(result);
                deal.estimated_profit = scoring::estimated_profit(
                    deal.asking_price,
                    deal.market_value,
                    settings.fee_percentage,
                    Decimal::ZERO,
                );

                self.attach_trend(deal, pricing.as_ref(), &term, condition).await;
                self.rescore(deal);

                if scoring::is_profitable(
                    deal.asking_price,
                    deal.market_value,
                    settings.fee_percentage,
                    settings.profit_threshold,
                ) {
                    notified = self.notify_deal(deal, settings, tokens).await;
                }
            }
            Ok(None) => debug!(deal_id = deal.id, term = %term, "No market data"),
            Err(e) => warn!(deal_id = deal.id, term = %term, error = %e, "Market pricing failed"),
        }

        if deal.source.eq_ignore_ascii_case("ebay")
            && deal
                .distance_miles
                .map_or(true, |d| d <= settings.local_pickup_radius_miles)
        {
            let pickup = bounded(
                "pricing",
                self.config.call_timeout,
                pricing.local_pickup_available(&term, condition, settings.local_pickup_radius_miles),
            )
            .await;
            deal.local_pickup_available = match pickup {
                Ok(found) => Some(found),
                Err(e) => {
                    warn!(deal_id = deal.id, error = %e, "Local pickup check failed");
                    None
                }
            };
        }

        notified
    }

    async fn attach_trend(
        &self,
        deal: &mut Deal,
        pricing: &dyn PricingResolver,
        term: &str,
        condition: MarketCondition,
    ) {
        let Some(market_avg) = deal.market_value else {
            return;
        };
        match bounded(
            "pricing",
            self.config.call_timeout,
            pricing.price_trend(term, condition, market_avg),
        )
        .await
        {
            Ok(Some(trend)) => {
                deal.price_trend = Some(trend.direction);
                deal.price_trend_note = Some(trend.note);
            }
            Ok(None) => {}
            Err(e) => warn!(deal_id = deal.id, error = %e, "Price trend lookup failed"),
        }
    }

    /// Repair-cost path: parts pricing, part cost, repair estimate, true
    /// profit, then a fresh score.
    async fn price_repair(&self, deal: &mut Deal, settings: &Settings) {
        if let Some(pricing) = self.pricing.as_ref() {
            if let Some(term) = deal.search_term() {
                match bounded(
                    "pricing",
                    self.config.call_timeout,
                    pricing.parts_market_value(&term, self.config.result_limit),
                )
                .await
                {
                    Ok(Some(result)) => {
                        deal.market_value = Some(result.avg_price);
                        deal.price_status = Some(PriceStatus::SimilarPrices);
                        deal.price_note = Some(PARTS_PRICE_NOTE.to_string());
                        deal.pricing_data = Some(result);
                        deal.estimated_profit = scoring::estimated_profit(
                            deal.asking_price,
                            deal.market_value,
                            settings.fee_percentage,
                            Decimal::ZERO,
                        );
                    }
                    Ok(None) => debug!(deal_id = deal.id, term = %term, "No parts market data"),
                    Err(e) => warn!(deal_id = deal.id, error = %e, "Parts pricing failed"),
                }
            }

            if let Some(part) = deal.repair_part_needed.clone() {
                match bounded("pricing", self.config.call_timeout, pricing.part_cost(&part)).await {
                    Ok(Some(quote)) => {
                        let estimate = scoring::repair_estimate(
                            Some(quote.part_cost),
                            deal.repair_feasibility,
                            Some(&part),
                        );
                        deal.repair_part_cost = Some(estimate.part_cost);
                        deal.repair_part_url = quote.part_url;
                        deal.repair_labor_estimate = Some(estimate.labor_estimate);
                        deal.repair_total_estimate = Some(estimate.total_estimate);
                        deal.true_profit =
                            scoring::true_profit(deal.estimated_profit, deal.repair_total_estimate);
                    }
                    Ok(None) => debug!(deal_id = deal.id, part = %part, "No part listings"),
                    Err(e) => warn!(deal_id = deal.id, part = %part, error = %e, "Part cost lookup failed"),
                }
            }
        }

        self.rescore(deal);
    }

    fn rescore(&self, deal: &mut Deal) {
        let score = scoring::score_deal(&ScoreInputs::from_deal(deal));
        deal.apply_score(&score);
    }

    async fn notify_deal(&self, deal: &mut Deal, settings: &Settings, tokens: &[String]) -> bool {
        if deal.notified_at.is_some() || !settings.notifications_enabled {
            return false;
        }
        let Some(notifier) = self.notifier.as_ref() else {
            debug!(deal_id = deal.id, "Notifier not configured, skipping push");
            return false;
        };
        if tokens.is_empty() {
            debug!(deal_id = deal.id, "No registered devices, skipping push");
            return false;
        }

        let profit = deal.estimated_profit.unwrap_or(Decimal::ZERO);
        let message = PushMessage::deal(deal.id, &deal.title, profit);
        let outcome = dispatch(notifier.as_ref(), tokens, &message, self.config.call_timeout).await;

        if outcome.any_sent() {
            deal.notified_at = Some(Utc::now());
            info!(deal_id = deal.id, profit = %profit, sent = outcome.sent, "Deal notification sent");
            true
        } else {
            warn!(deal_id = deal.id, failed = outcome.failed, "Deal notification not delivered");
            false
        }
    }

    /// Write the evaluated copy back. Returns `false` when the deal was
    /// purchased or dismissed while the evaluation was in flight.
    async fn save(&self, deal: Deal) -> Result<bool, DealScoutError> {
        let deal_id = deal.id;
        let written = self.store.lock().await.apply_evaluation(deal)?;
        if !written {
            info!(deal_id, "Deal settled during evaluation, stored record kept");
        }
        Ok(written)
    }

    /// Record a user-confirmed condition (`new` or `used`), re-price the
    /// deal on the standard path and recompute profit and score. No push
    /// is sent.
    pub async fn confirm_condition(
        &self,
        deal_id: i64,
        condition: Condition,
    ) -> Result<Deal, DealScoutError> {
        let (mut deal, settings) = {
            let mut store = self.store.lock().await;
            let deal = store.confirm_condition(deal_id, condition)?;
            (deal, store.settings().clone())
        };

        if let (Some(pricing), Some(term), Some(market_condition)) = (
            self.pricing.as_ref(),
            deal.search_term(),
            condition.market_condition(),
        ) {
            match bounded(
                "pricing",
                self.config.call_timeout,
                pricing.market_value(&term, market_condition, self.config.result_limit),
            )
            .await
            {
                Ok(Some(result)) => {
                    deal.market_value = Some(result.avg_price);
                    deal.price_status = Some(PriceStatus::Accurate);
                    deal.price_note = None;
                    deal.pricing_data = Some(result);
                    deal.estimated_profit = scoring::estimated_profit(
                        deal.asking_price,
                        deal.market_value,
                        settings.fee_percentage,
                        Decimal::ZERO,
                    );
                    deal.true_profit =
                        scoring::true_profit(deal.estimated_profit, deal.repair_total_estimate);
                    self.rescore(&mut deal);
                }
                Ok(None) => debug!(deal_id, term = %term, "No market data after condition update"),
                Err(e) => warn!(deal_id, error = %e, "Re-pricing after condition update failed"),
            }
        }

        let mut store = self.store.lock().await;
        if !store.apply_evaluation(deal)? {
            info!(deal_id, "Deal settled during re-pricing, stored record kept");
        }
        if let Err(e) = store.commit() {
            warn!(error = %format!("{e:#}"), "Failed to commit condition update");
        }
        store.deal(deal_id).cloned().ok_or(DealScoutError::DealNotFound(deal_id))
    }
}
