//! DealScout: marketplace deal intake, scoring and flip tracking
//!
//! Entry point. Loads configuration, initialises structured logging,
//! restores the record store from disk (or creates it fresh), wires the
//! external adapters that have credentials and runs the periodic jobs
//! until Ctrl+C.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use dealscout::classify::{Classifier, OpenRouterClassifier};
use dealscout::config::{self, AppConfig};
use dealscout::engine::distance::DistanceEstimator;
use dealscout::engine::pipeline::{DealPipeline, PipelineConfig};
use dealscout::engine::reconcile::OrderReconciler;
use dealscout::engine::review::ReviewSweep;
use dealscout::listings::InboxSource;
use dealscout::notify::{FcmNotifier, Notifier};
use dealscout::orders::{EbayOrderFeed, OrderFeed};
use dealscout::pricing::ebay::EbayPricingClient;
use dealscout::pricing::PricingResolver;
use dealscout::scheduler::{IntakeJob, ReconcileJob, ReviewJob, Scheduler};
use dealscout::storage::Store;
use dealscout::types::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = config::AppConfig::load("config.toml")?;

    init_logging();

    info!(
        intake_interval_secs = cfg.scheduler.intake_interval_secs,
        reconcile_interval_secs = cfg.scheduler.reconcile_interval_secs,
        state_path = %cfg.storage.state_path,
        "DealScout starting up"
    );

    // -- Restore or create the store ---------------------------------------

    let store = Store::open(&cfg.storage.state_path, Settings::from(&cfg.settings))?;
    {
        let snapshot = store.snapshot();
        info!(
            deals = snapshot.deals.len(),
            flips = snapshot.flips.len(),
            devices = snapshot.device_tokens.len(),
            profit_threshold = %snapshot.settings.profit_threshold,
            fee_percentage = %snapshot.settings.fee_percentage,
            "Store ready"
        );
    }
    let store = store.into_shared();

    // -- Adapters ---------------------------------------------------------

    let call_timeout = cfg.scheduler.call_timeout();
    let classifier = build_classifier(&cfg)?;
    let pricing = build_pricing(&cfg)?;
    let notifier = build_notifier(&cfg)?;
    let orders = build_order_feed(&cfg)?;

    // -- Jobs -------------------------------------------------------------

    let pipeline = DealPipeline::new(
        Arc::new(InboxSource::new(&cfg.listings.inbox_path)),
        store.clone(),
        DistanceEstimator::from_config(&cfg.home),
        PipelineConfig {
            batch_size: cfg.listings.batch_size,
            result_limit: cfg.pricing.result_limit,
            call_timeout,
        },
    )
    .with_classifier(classifier)
    .with_pricing(pricing)
    .with_notifier(notifier.clone());

    let mut scheduler = Scheduler::new(Duration::from_secs(cfg.scheduler.shutdown_grace_secs));
    scheduler.register(Arc::new(IntakeJob::new(
        Arc::new(pipeline),
        Duration::from_secs(cfg.scheduler.intake_interval_secs),
    )));
    scheduler.register(Arc::new(ReviewJob::new(ReviewSweep::new(
        store.clone(),
        notifier,
        call_timeout,
    ))));
    scheduler.register(Arc::new(ReconcileJob::new(
        OrderReconciler::new(orders, store.clone(), cfg.orders.days_back, call_timeout),
        Duration::from_secs(cfg.scheduler.reconcile_interval_secs),
    )));

    info!("Entering scheduler loop. Press Ctrl+C to stop.");
    scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for Ctrl+C, stopping");
            }
        })
        .await;

    // Final snapshot
    store.lock().await.commit()?;
    info!("DealScout shut down cleanly.");

    Ok(())
}

fn build_classifier(cfg: &AppConfig) -> Result<Option<Arc<dyn Classifier>>> {
    let Some(key) = AppConfig::resolve_secret(&cfg.classifier.api_key_env) else {
        warn!(env = %cfg.classifier.api_key_env, "No classifier API key, listings will stay unclassified");
        return Ok(None);
    };
    info!(model = %cfg.classifier.model, "Using OpenRouter classifier");
    Ok(Some(Arc::new(OpenRouterClassifier::new(
        key,
        Some(cfg.classifier.model.clone()),
        cfg.classifier.base_url.clone(),
    )?)))
}

fn build_pricing(cfg: &AppConfig) -> Result<Option<Arc<dyn PricingResolver>>> {
    let app_id = AppConfig::resolve_secret(&cfg.pricing.app_id_env);
    let cert_id = AppConfig::resolve_secret(&cfg.pricing.cert_id_env);
    let (Some(app_id), Some(cert_id)) = (app_id, cert_id) else {
        warn!("No eBay credentials, pricing disabled");
        return Ok(None);
    };
    info!(marketplace = %cfg.pricing.marketplace_id, sandbox = cfg.pricing.sandbox, "Using eBay pricing");
    Ok(Some(Arc::new(EbayPricingClient::new(
        app_id,
        cert_id,
        cfg.pricing.marketplace_id.clone(),
        cfg.pricing.pickup_postal_code.clone(),
        cfg.pricing.sandbox,
    )?)))
}

fn build_notifier(cfg: &AppConfig) -> Result<Option<Arc<dyn Notifier>>> {
    let project_id = AppConfig::resolve_env(&cfg.notifications.project_id_env)
        .ok()
        .filter(|p| !p.trim().is_empty());
    let token = AppConfig::resolve_secret(&cfg.notifications.access_token_env);
    let (Some(project_id), Some(token)) = (project_id, token) else {
        warn!("No FCM credentials, push notifications disabled");
        return Ok(None);
    };
    Ok(Some(Arc::new(FcmNotifier::new(project_id, token)?)))
}

fn build_order_feed(cfg: &AppConfig) -> Result<Option<Arc<dyn OrderFeed>>> {
    let Some(token) = AppConfig::resolve_secret(&cfg.orders.access_token_env) else {
        warn!("No eBay user token, order reconciliation disabled");
        return Ok(None);
    };
    Ok(Some(Arc::new(EbayOrderFeed::new(token, cfg.orders.sandbox)?)))
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("dealscout=info"));

    let json_logging = std::env::var("DEALSCOUT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
