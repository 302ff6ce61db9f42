//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Credentials are referenced by env-var name in the config and resolved
//! at startup into `SecretString`s. A missing credential disables the
//! adapter that needs it rather than failing startup.

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::types::Settings;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    pub home: HomeConfig,
    pub listings: ListingsConfig,
    pub classifier: ClassifierConfig,
    pub pricing: PricingConfig,
    pub notifications: NotificationsConfig,
    pub orders: OrdersConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    #[serde(default = "default_intake_secs")]
    pub intake_interval_secs: u64,
    #[serde(default = "default_reconcile_secs")]
    pub reconcile_interval_secs: u64,
    /// How long shutdown waits for in-flight runs.
    #[serde(default = "default_grace_secs")]
    pub shutdown_grace_secs: u64,
    /// Bound on every external call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

fn default_intake_secs() -> u64 {
    300
}

fn default_reconcile_secs() -> u64 {
    1800
}

fn default_grace_secs() -> u64 {
    30
}

fn default_call_timeout_secs() -> u64 {
    30
}

impl SchedulerConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// Initial values for the persisted settings. Only used when the state
/// file does not exist yet.
#[derive(Debug, Deserialize, Clone)]
pub struct SettingsConfig {
    pub profit_threshold: Decimal,
    pub fee_percentage: Decimal,
    pub needs_review_interval_mins: u64,
    pub local_pickup_radius_miles: f64,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        let s = Settings::default();
        Self {
            profit_threshold: s.profit_threshold,
            fee_percentage: s.fee_percentage,
            needs_review_interval_mins: s.needs_review_interval_mins,
            local_pickup_radius_miles: s.local_pickup_radius_miles,
        }
    }
}

impl From<&SettingsConfig> for Settings {
    fn from(cfg: &SettingsConfig) -> Self {
        Settings {
            profit_threshold: cfg.profit_threshold,
            fee_percentage: cfg.fee_percentage,
            needs_review_interval_mins: cfg.needs_review_interval_mins,
            local_pickup_radius_miles: cfg.local_pickup_radius_miles,
            notifications_enabled: true,
        }
    }
}

/// Home reference point and known places for distance estimation.
#[derive(Debug, Deserialize, Clone)]
pub struct HomeConfig {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub places: Vec<PlaceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PlaceConfig {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ListingsConfig {
    pub inbox_path: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    pub model: String,
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PricingConfig {
    pub app_id_env: String,
    pub cert_id_env: String,
    #[serde(default = "default_marketplace")]
    pub marketplace_id: String,
    #[serde(default = "default_result_limit")]
    pub result_limit: u32,
    /// Postal code used as the centre of local-pickup searches.
    #[serde(default)]
    pub pickup_postal_code: Option<String>,
    #[serde(default)]
    pub sandbox: bool,
}

fn default_marketplace() -> String {
    "EBAY_US".to_string()
}

fn default_result_limit() -> u32 {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    pub project_id_env: String,
    pub access_token_env: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OrdersConfig {
    pub access_token_env: String,
    #[serde(default = "default_days_back")]
    pub days_back: u32,
    #[serde(default)]
    pub sandbox: bool,
}

fn default_days_back() -> u32 {
    7
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub state_path: String,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Resolve a credential; empty or unset variables yield `None`.
    pub fn resolve_secret(env_name: &str) -> Option<SecretString> {
        Self::resolve_env(env_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .map(SecretString::new)
    }
}
