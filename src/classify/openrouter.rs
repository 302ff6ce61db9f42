//! OpenRouter classification client.
//!
//! Sends the listing text with a fixed system prompt to an
//! OpenAI-compatible chat completions endpoint and parses the JSON reply
//! into a `Classification`. Parsing is lenient: unknown enum strings fall
//! back to `unknown`/absent, wrong-typed fields are dropped. A reply that
//! is not a JSON object is a malformed response.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::Classifier;
use crate::types::{Classification, Condition, ConditionConfidence, DealScoutError};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

const OPENROUTER_API_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

pub const DEFAULT_MODEL: &str = "google/gemini-2.0-flash-001";

const TEMPERATURE: f64 = 0.1;

/// Per attempt. Every attempt plus backoff fits inside the pipeline's
/// call timeout.
const REQUEST_TIMEOUT_SECS: u64 = 8;

/// Maximum retries on rate limit / server errors.
const MAX_RETRIES: u32 = 2;

/// Base delay for exponential backoff (ms).
const BASE_BACKOFF_MS: u64 = 1000;

const SERVICE: &str = "classifier";

const SYSTEM_PROMPT: &str = r#"You identify items from marketplace listings.
Analyze the listing text and reply with a single JSON object with these fields:

category, subcategory, brand, model: strings or null.
item_details: object of any specs or attributes found.
condition: "new" or "used" only when explicitly stated; "needs_repair" when the listing indicates damage, "as-is", "for parts" or not working; otherwise "unknown".
condition_confidence: "explicit" if clearly stated, "unclear" otherwise.
repair_needed: boolean.
repair_keywords: array of repair-related phrases found.
repair_feasibility: "easy", "moderate", "difficult" or "professional".
repair_notes: short description of needed repairs.
repair_part_needed: the specific replacement part, if identifiable.
part_numbers: array of part numbers, SKUs or MPNs found.
variants: the specific variant (storage size, edition, trim), if mentioned.
is_bundle: boolean; bundle_items: array of included items.
accessory_completeness: "complete" or what is missing.
has_product_photos: true if the listing has real product photos.
photo_quality: "good", "fair", "poor" or "none".
seller_username, seller_rating: strings if mentioned.
seller_reputation: "excellent", "good", "fair" or "poor".

If any repair keyword is found, condition must be "needs_repair".
Respond with JSON only, no markdown."#;

// ---------------------------------------------------------------------------
// API types (OpenAI-compatible)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChatMessage>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OpenRouterClassifier {
    http: Client,
    api_key: SecretString,
    model: String,
    url: String,
}

impl OpenRouterClassifier {
    pub fn new(api_key: SecretString, model: Option<String>, base_url: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build OpenRouter HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            url: base_url.unwrap_or_else(|| OPENROUTER_API_URL.to_string()),
        })
    }

    /// Send one chat completion with retry + exponential backoff and
    /// return the reply text.
    async fn call_model(&self, listing_text: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: TEMPERATURE,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Listing to analyze:\n{listing_text}"),
                },
            ],
        };

        let mut last_error = None;

        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                let delay = BASE_BACKOFF_MS * 2u64.pow(attempt - 1);
                debug!(attempt, delay_ms = delay, "Retrying classification call");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let resp = self
                .http
                .post(&self.url)
                .bearer_auth(self.api_key.expose_secret())
                .json(&request)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let body: ChatResponse = response
                            .json()
                            .await
                            .context("Failed to parse OpenRouter response")?;

                        return Ok(body
                            .choices
                            .into_iter()
                            .next()
                            .and_then(|c| c.message)
                            .map(|m| m.content)
                            .unwrap_or_default());
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let error_text = response.text().await.unwrap_or_default();
                        warn!(status = %status, attempt, error = %error_text, "Retryable OpenRouter error");
                        last_error = Some(format!("HTTP {status}: {error_text}"));
                        continue;
                    }

                    let error_text = response.text().await.unwrap_or_default();
                    anyhow::bail!("OpenRouter API error {status}: {error_text}");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "OpenRouter request failed");
                    last_error = Some(format!("Request error: {e}"));
                }
            }
        }

        anyhow::bail!(
            "OpenRouter API failed after {} retries: {}",
            MAX_RETRIES,
            last_error.unwrap_or_default()
        )
    }
}

#[async_trait]
impl Classifier for OpenRouterClassifier {
    async fn classify(&self, listing_text: &str) -> Result<Classification, DealScoutError> {
        let reply = self
            .call_model(listing_text)
            .await
            .map_err(|e| DealScoutError::transient(SERVICE, format!("{e:#}")))?;

        let classification = parse_classification(&reply)?;
        info!(
            model = %self.model,
            category = ?classification.category,
            condition = %classification.condition,
            "Listing classified"
        );
        Ok(classification)
    }
}

// ---------------------------------------------------------------------------
// Reply parsing
// ---------------------------------------------------------------------------

/// Remove a surrounding markdown code fence (optionally tagged `json`).
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse a model reply into a `Classification`.
pub fn parse_classification(reply: &str) -> Result<Classification, DealScoutError> {
    let body = strip_code_fences(reply);
    let value: Value =
        serde_json::from_str(body).map_err(|e| DealScoutError::malformed(SERVICE, e))?;
    let Value::Object(obj) = value else {
        return Err(DealScoutError::malformed(SERVICE, "reply is not a JSON object"));
    };

    Ok(Classification {
        category: text(&obj, "category"),
        subcategory: text(&obj, "subcategory"),
        brand: text(&obj, "brand"),
        model: text(&obj, "model"),
        item_details: details(&obj),
        condition: parsed(&obj, "condition").unwrap_or(Condition::Unknown),
        condition_confidence: parsed(&obj, "condition_confidence")
            .unwrap_or(ConditionConfidence::Unclear),

        repair_needed: flag(&obj, "repair_needed"),
        repair_keywords: list(&obj, "repair_keywords"),
        repair_feasibility: parsed(&obj, "repair_feasibility"),
        repair_notes: text(&obj, "repair_notes"),
        repair_part_needed: text(&obj, "repair_part_needed"),

        part_numbers: list(&obj, "part_numbers"),
        variants: text(&obj, "variants"),
        is_bundle: flag(&obj, "is_bundle"),
        bundle_items: list(&obj, "bundle_items"),
        accessory_completeness: text(&obj, "accessory_completeness"),

        has_product_photos: flag(&obj, "has_product_photos"),
        photo_quality: parsed(&obj, "photo_quality"),

        seller_username: text(&obj, "seller_username"),
        seller_rating: text(&obj, "seller_rating"),
        seller_reputation: parsed(&obj, "seller_reputation"),
    })
}

fn text(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(s) if !s.trim().is_empty() && !s.eq_ignore_ascii_case("null") => {
            Some(s.trim().to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn flag(obj: &Map<String, Value>, key: &str) -> Option<bool> {
    match obj.get(key)? {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn list(obj: &Map<String, Value>, key: &str) -> Vec<String> {
    match obj.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    }
}

fn parsed<T: std::str::FromStr>(obj: &Map<String, Value>, key: &str) -> Option<T> {
    text(obj, key).and_then(|s| s.parse().ok())
}

fn details(obj: &Map<String, Value>) -> BTreeMap<String, Value> {
    match obj.get("item_details") {
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        _ => BTreeMap::new(),
    }
}
