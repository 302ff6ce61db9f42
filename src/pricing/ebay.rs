//! eBay Browse API pricing client.
//!
//! Market values are derived from active item summaries: USD prices only,
//! positive prices only. Authentication uses the client-credentials grant;
//! the application token is cached until shortly before it expires.
//!
//! API docs: https://developer.ebay.com/api-docs/buy/browse/overview.html

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{classify_trend, PricingResolver};
use crate::types::{
    DealScoutError, MarketCondition, PartQuote, PriceSample, PriceTrend, PricingResult,
};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const PRODUCTION_URL: &str = "https://api.ebay.com";
const SANDBOX_URL: &str = "https://api.sandbox.ebay.com";

const OAUTH_SCOPE: &str = "https://api.ebay.com/oauth/api_scope";

const SERVICE: &str = "pricing";

/// eBay condition id for "For parts or not working".
const FOR_PARTS_CONDITION_ID: &str = "7000";

/// Listings sampled for the trend comparison.
const TREND_SAMPLE_SIZE: u32 = 10;

/// Listings considered when looking for the cheapest part.
const PART_SEARCH_LIMIT: u32 = 5;

/// Refresh the cached token this long before it expires.
const TOKEN_REFRESH_MARGIN_SECS: u64 = 60;

const MAX_RETRIES: u32 = 2;
const BASE_BACKOFF_MS: u64 = 500;

/// Per request. A token fetch plus every search attempt fits inside the
/// pipeline's call timeout.
const REQUEST_TIMEOUT_SECS: u64 = 6;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_ttl")]
    expires_in: u64,
}

fn default_token_ttl() -> u64 {
    7200
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    item_summaries: Vec<ItemSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemSummary {
    #[serde(default)]
    item_id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    price: Option<Amount>,
    #[serde(default)]
    condition: Option<String>,
    #[serde(default)]
    item_web_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Amount {
    #[serde(default)]
    value: String,
    #[serde(default)]
    currency: String,
}

impl ItemSummary {
    /// USD price, if present and positive.
    fn usd_price(&self) -> Option<Decimal> {
        let amount = self.price.as_ref()?;
        if amount.currency != "USD" {
            return None;
        }
        Decimal::from_str(amount.value.trim())
            .ok()
            .filter(|p| *p > Decimal::ZERO)
    }

    fn to_sample(&self) -> Option<PriceSample> {
        Some(PriceSample {
            title: self.title.clone(),
            price: self.usd_price()?,
            condition: self.condition.clone(),
            item_id: self.item_id.clone(),
        })
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct EbayPricingClient {
    http: Client,
    app_id: SecretString,
    cert_id: SecretString,
    base_url: String,
    marketplace_id: String,
    pickup_postal_code: Option<String>,
    token: Mutex<Option<CachedToken>>,
}

impl EbayPricingClient {
    pub fn new(
        app_id: SecretString,
        cert_id: SecretString,
        marketplace_id: String,
        pickup_postal_code: Option<String>,
        sandbox: bool,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent("DealScout/0.1.0")
            .build()
            .context("Failed to build HTTP client for eBay")?;

        Ok(Self {
            http,
            app_id,
            cert_id,
            base_url: if sandbox { SANDBOX_URL } else { PRODUCTION_URL }.to_string(),
            marketplace_id,
            pickup_postal_code,
            token: Mutex::new(None),
        })
    }

    // -- Internal helpers ------------------------------------------------

    async fn access_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.expires_at {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .http
            .post(format!("{}/identity/v1/oauth2/token", self.base_url))
            .basic_auth(self.app_id.expose_secret(), Some(self.cert_id.expose_secret()))
            .form(&[("grant_type", "client_credentials"), ("scope", OAUTH_SCOPE)])
            .send()
            .await
            .context("eBay token request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("eBay auth error {status}: {body}");
        }

        let token: TokenResponse = resp.json().await.context("Failed to parse eBay token")?;
        let ttl = token.expires_in.saturating_sub(TOKEN_REFRESH_MARGIN_SECS);
        debug!(ttl_secs = ttl, "eBay application token refreshed");

        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(ttl),
        });
        Ok(token.access_token)
    }

    /// Run an item-summary search with retry on 429/5xx.
    async fn search(
        &self,
        query: &str,
        filter: &str,
        sort: Option<&str>,
        limit: u32,
    ) -> Result<Vec<ItemSummary>> {
        let token = self.access_token().await?;

        let mut url = format!(
            "{}/buy/browse/v1/item_summary/search?q={}&filter={}&limit={}",
            self.base_url,
            urlencoding::encode(query),
            urlencoding::encode(filter),
            limit,
        );
        if let Some(sort) = sort {
            url.push_str(&format!("&sort={}", urlencoding::encode(sort)));
        }

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying eBay search");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .header("X-EBAY-C-MARKETPLACE-ID", &self.marketplace_id)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body: SearchResponse = response
                            .json()
                            .await
                            .context("Failed to parse eBay search response")?;
                        debug!(query, results = body.item_summaries.len(), "eBay search complete");
                        return Ok(body.item_summaries);
                    }

                    let body = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(status = %status, attempt, "Retryable eBay error");
                        last_error = Some(format!("HTTP {status}: {body}"));
                        continue;
                    }
                    anyhow::bail!("eBay search error {status}: {body}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "eBay request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "eBay search failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_default()
        )
    }

    fn condition_filter(condition: MarketCondition) -> &'static str {
        match condition {
            MarketCondition::New => "conditions:{NEW}",
            MarketCondition::Used => "conditions:{USED}",
        }
    }

    fn aggregate(items: &[ItemSummary]) -> Option<PricingResult> {
        PricingResult::from_samples(items.iter().filter_map(ItemSummary::to_sample).collect())
    }

    fn to_domain_error(e: anyhow::Error) -> DealScoutError {
        DealScoutError::transient(SERVICE, format!("{e:#}"))
    }
}

#[async_trait]
impl PricingResolver for EbayPricingClient {
    async fn market_value(
        &self,
        search_term: &str,
        condition: MarketCondition,
        limit: u32,
    ) -> Result<Option<PricingResult>, DealScoutError> {
        let filter = format!(
            "{},buyingOptions:{{FIXED_PRICE|AUCTION}},priceCurrency:USD",
            Self::condition_filter(condition)
        );
        let items = self
            .search(search_term, &filter, Some("endingSoonest"), limit)
            .await
            .map_err(Self::to_domain_error)?;

        let result = Self::aggregate(&items);
        match &result {
            Some(r) => info!(search_term, %condition, pricing = %r, "Market value resolved"),
            None => debug!(search_term, %condition, "No market data"),
        }
        Ok(result)
    }

    async fn parts_market_value(
        &self,
        search_term: &str,
        limit: u32,
    ) -> Result<Option<PricingResult>, DealScoutError> {
        let filter = format!("conditionIds:{{{FOR_PARTS_CONDITION_ID}}},priceCurrency:USD");
        let items = self
            .search(search_term, &filter, None, limit)
            .await
            .map_err(Self::to_domain_error)?;
        Ok(Self::aggregate(&items))
    }

    async fn part_cost(&self, part_name: &str) -> Result<Option<PartQuote>, DealScoutError> {
        let items = self
            .search(part_name, "conditions:{NEW},priceCurrency:USD", Some("price"), PART_SEARCH_LIMIT)
            .await
            .map_err(Self::to_domain_error)?;

        let cheapest = items
            .iter()
            .filter_map(|item| item.usd_price().map(|p| (p, item)))
            .min_by_key(|(p, _)| *p);

        Ok(cheapest.map(|(price, item)| PartQuote {
            part_cost: price,
            part_url: item.item_web_url.clone(),
        }))
    }

    async fn price_trend(
        &self,
        search_term: &str,
        condition: MarketCondition,
        market_avg: Decimal,
    ) -> Result<Option<PriceTrend>, DealScoutError> {
        let filter = format!("{},priceCurrency:USD", Self::condition_filter(condition));
        let items = self
            .search(search_term, &filter, Some("newlyListed"), TREND_SAMPLE_SIZE)
            .await
            .map_err(Self::to_domain_error)?;

        Ok(Self::aggregate(&items).map(|recent| classify_trend(recent.avg_price, market_avg)))
    }

    async fn local_pickup_available(
        &self,
        search_term: &str,
        condition: MarketCondition,
        radius_miles: f64,
    ) -> Result<bool, DealScoutError> {
        let postal_code = self
            .pickup_postal_code
            .as_deref()
            .ok_or_else(|| DealScoutError::NotConfigured("pickup postal code".to_string()))?;

        let filter = format!(
            "{},deliveryOptions:{{SELLER_ARRANGED_LOCAL_PICKUP}},pickupCountry:US,pickupPostalCode:{},pickupRadius:{},pickupRadiusUnit:mi",
            Self::condition_filter(condition),
            postal_code,
            radius_miles.round() as u64,
        );
        let items = self
            .search(search_term, &filter, None, 1)
            .await
            .map_err(Self::to_domain_error)?;
        Ok(!items.is_empty())
    }
}
