//! End-to-end runs of the intake pipeline, lifecycle transitions,
//! reconciliation and scheduler against in-memory adapters.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use dealscout::engine::accountant::profit_report;
use dealscout::engine::distance::{DistanceEstimator, GeoPoint};
use dealscout::engine::pipeline::{DealPipeline, PipelineConfig};
use dealscout::engine::reconcile::OrderReconciler;
use dealscout::listings::{InboxSource, ListingSource};
use dealscout::orders::{ExternalOrder, FulfillmentStatus, OrderLineItem};
use dealscout::scheduler::{IntakeJob, Scheduler, TriggerOutcome};
use dealscout::storage::{SharedStore, Store};
use dealscout::types::*;

use crate::mock_adapters::*;

const PS5: &str = "Sony PS5 Disc Edition";
const SWITCH: &str = "Nintendo Switch OLED";

fn store(tokens: &[&str]) -> SharedStore {
    let mut store = Store::in_memory(Settings::default());
    for token in tokens {
        store.register_device_token(token, Utc::now());
    }
    store.into_shared()
}

fn distance() -> DistanceEstimator {
    DistanceEstimator::new(GeoPoint::new(30.2672, -97.7431))
        .with_place("Round Rock", GeoPoint::new(30.5083, -97.6789))
}

fn pipeline(
    source: ScriptedSource,
    store: SharedStore,
    classifier: Arc<TableClassifier>,
    pricing: Arc<TablePricing>,
    notifier: Arc<RecordingNotifier>,
) -> DealPipeline {
    DealPipeline::new(Arc::new(source), store, distance(), PipelineConfig::default())
        .with_classifier(Some(classifier))
        .with_pricing(Some(pricing))
        .with_notifier(Some(notifier))
}

// ---------------------------------------------------------------------------
// Intake
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_same_listing_across_runs_yields_one_deal() {
    let store = store(&[]);
    let ps5 = listing("https://fb.test/1", PS5, dec!(200));
    let source = ScriptedSource::new(vec![vec![ps5.clone(), ps5.clone()], vec![ps5]]);
    let classifier = Arc::new(TableClassifier::default().with(PS5, classified("Sony", "PS5", Condition::Used)));

    let p = pipeline(
        source,
        store.clone(),
        classifier.clone(),
        Arc::new(TablePricing::default()),
        Arc::new(RecordingNotifier::default()),
    );

    let first = p.run_batch().await;
    let second = p.run_batch().await;

    assert_eq!(first.fetched, 2);
    assert_eq!(first.processed(), 1);
    assert_eq!(second.duplicates, 1);
    assert_eq!(second.processed(), 0);
    assert_eq!(classifier.calls(), 1);
    assert_eq!(store.lock().await.deals().count(), 1);
}

#[tokio::test]
async fn test_profitable_deal_notifies_every_device_once() {
    let store = store(&["phone", "tablet", "stale"]);
    let source = ScriptedSource::new(vec![vec![
        listing("https://fb.test/ps5", PS5, dec!(200)),
        listing("https://fb.test/switch", SWITCH, dec!(250)),
    ]]);
    let classifier = Arc::new(
        TableClassifier::default()
            .with(PS5, classified("Sony", "PS5", Condition::Used))
            .with(SWITCH, classified("Nintendo", "Switch OLED", Condition::New)),
    );
    // PS5: 400 - 200 - 52 = 148 (notify). Switch: 300 - 250 - 39 = 11 (quiet).
    let pricing = Arc::new(
        TablePricing::default()
            .with("Sony PS5", dec!(400))
            .with("Nintendo Switch OLED", dec!(300)),
    );
    let notifier = Arc::new(RecordingNotifier::failing_for(&["stale"]));

    let report = pipeline(source, store.clone(), classifier, pricing, notifier.clone())
        .run_batch()
        .await;

    assert_eq!(report.errored(), 0);
    assert_eq!(report.notified(), 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|(_, m)| m.title == "$148 Profit Opportunity"));

    let store = store.lock().await;
    let ps5 = store.deals().find(|d| d.title == PS5).unwrap();
    assert!(ps5.notified_at.is_some());
    assert_eq!(ps5.estimated_profit, Some(dec!(148.00)));
    assert!(ps5.distance_miles.is_some_and(|d| d > 10.0 && d < 25.0));

    let switch = store.deals().find(|d| d.title == SWITCH).unwrap();
    assert!(switch.notified_at.is_none());
    assert_eq!(switch.estimated_profit, Some(dec!(11.00)));
    assert!(switch.deal_score.is_some());
}

#[tokio::test]
async fn test_no_photo_listing_is_dismissed_despite_profit() {
    let store = store(&["phone"]);
    let source = ScriptedSource::new(vec![vec![listing("https://fb.test/ps5", PS5, dec!(20))]]);
    let classifier = Arc::new(TableClassifier::default().with(
        PS5,
        Classification {
            has_product_photos: Some(false),
            ..classified("Sony", "PS5", Condition::New)
        },
    ));
    let pricing = Arc::new(TablePricing::default().with("Sony PS5", dec!(450)));
    let notifier = Arc::new(RecordingNotifier::default());

    pipeline(source, store.clone(), classifier, pricing.clone(), notifier.clone())
        .run_batch()
        .await;

    let store = store.lock().await;
    let deal = store.deals().next().unwrap();
    assert_eq!(deal.status, DealStatus::Dismissed);
    assert_eq!(deal.estimated_profit, None);
    assert_eq!(pricing.lookups(), 0);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_unknown_condition_waits_for_confirmation() {
    let store = store(&["phone"]);
    let source = ScriptedSource::new(vec![vec![listing("https://fb.test/ps5", PS5, dec!(200))]]);
    let classifier = Arc::new(TableClassifier::default().with(PS5, classified("Sony", "PS5", Condition::Unknown)));
    let pricing = Arc::new(TablePricing::default().with("Sony PS5", dec!(400)));
    let notifier = Arc::new(RecordingNotifier::default());

    let p = pipeline(source, store.clone(), classifier, pricing.clone(), notifier.clone());
    p.run_batch().await;

    let deal_id = {
        let store = store.lock().await;
        let deal = store.deals().next().unwrap();
        assert_eq!(deal.status, DealStatus::NeedsCondition);
        assert_eq!(deal.market_value, None);
        deal.id
    };
    assert_eq!(pricing.lookups(), 0);

    let deal = p.confirm_condition(deal_id, Condition::Used).await.unwrap();
    assert_eq!(deal.status, DealStatus::New);
    assert_eq!(deal.condition_confidence, Some(ConditionConfidence::UserConfirmed));
    assert_eq!(deal.estimated_profit, Some(dec!(148.00)));
    assert!(notifier.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_purchase_and_sale_are_one_way() {
    let shared = store(&[]);
    let mut store = shared.lock().await;
    let deal = store
        .insert_deal(&listing("https://fb.test/drill", "Milwaukee M18 drill", dec!(60)), Utc::now())
        .unwrap();

    let buy_date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
    let flip = store.purchase_deal(deal.id, dec!(55), buy_date, None, Utc::now()).unwrap();
    assert_eq!(flip.item_name, "Milwaukee M18 drill");
    assert_eq!(flip.buy_source.as_deref(), Some("facebook"));

    assert!(matches!(
        store.purchase_deal(deal.id, dec!(55), buy_date, None, Utc::now()),
        Err(DealScoutError::AlreadyPurchased(_))
    ));
    assert_eq!(store.flips().count(), 1);
    assert!(store.dismiss_deal(deal.id).is_err());

    let sale = SaleDetails {
        sell_price: dec!(120),
        sell_date: NaiveDate::from_ymd_opt(2026, 5, 9).unwrap(),
        sell_platform: "facebook".to_string(),
        fees_paid: Decimal::ZERO,
        shipping_cost: dec!(5),
    };
    let sold = store.sell_flip(flip.id, sale.clone()).unwrap();
    assert_eq!(sold.profit, Some(dec!(60.00)));

    assert!(matches!(
        store.sell_flip(flip.id, SaleDetails { sell_price: dec!(999), ..sale }),
        Err(DealScoutError::AlreadySold(_))
    ));
    assert_eq!(store.flip(flip.id).unwrap().sell_price, Some(dec!(120)));
}

// ---------------------------------------------------------------------------
// Reconciliation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_reconciliation_twice_syncs_once() {
    let shared = store(&[]);
    let flip_id = {
        let mut store = shared.lock().await;
        let flip = store.create_flip(
            NewFlip {
                item_name: "RTX 3080".to_string(),
                category: Some("electronics".to_string()),
                buy_price: dec!(300),
                buy_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
                buy_source: Some("facebook".to_string()),
                notes: None,
            },
            Utc::now(),
        );
        store.link_listing(flip.id, "3344").unwrap();
        flip.id
    };

    let orders = vec![ExternalOrder {
        order_id: "12-345".to_string(),
        order_date: NaiveDate::from_ymd_opt(2026, 4, 2),
        status: FulfillmentStatus::Fulfilled,
        line_items: vec![OrderLineItem {
            listing_id: Some("3344".to_string()),
            title: Some("RTX 3080".to_string()),
            sell_price: dec!(450),
            shipping_paid_by_buyer: dec!(15),
            quantity: 1,
        }],
    }];
    let reconciler = OrderReconciler::new(
        Some(Arc::new(FixedOrders::new(orders))),
        shared.clone(),
        7,
        Duration::from_secs(5),
    );

    let first = reconciler.run().await;
    let second = reconciler.run().await;
    assert_eq!(first.synced, 1);
    assert_eq!(first.items[0].profit, Some(dec!(91.50)));
    assert_eq!(second.orders_checked, 1);
    assert_eq!(second.synced, 0);

    let store = shared.lock().await;
    assert_eq!(store.flip(flip_id).unwrap().status, FlipStatus::Sold);

    let report = profit_report(store.flips(), NaiveDate::from_ymd_opt(2026, 4, 3).unwrap());
    assert_eq!(report.totals.flips, 1);
    assert_eq!(report.totals.profit, dec!(91.50));
    assert_eq!(report.this_week.flips, 1);
}

// ---------------------------------------------------------------------------
// Scheduling & persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_intake_never_overlaps_itself() {
    let gate = Arc::new(Notify::new());
    let source = ScriptedSource::gated(
        vec![vec![listing("https://fb.test/1", PS5, dec!(200))]],
        gate.clone(),
    );
    let p = DealPipeline::new(Arc::new(source), store(&[]), distance(), PipelineConfig::default());

    let mut scheduler = Scheduler::new(Duration::from_secs(5));
    scheduler.register(Arc::new(IntakeJob::new(Arc::new(p), Duration::from_secs(300))));

    let Some(TriggerOutcome::Started(first)) = scheduler.trigger("deal_intake") else {
        panic!("first run should start");
    };
    tokio::task::yield_now().await;
    assert!(matches!(scheduler.trigger("deal_intake"), Some(TriggerOutcome::AlreadyRunning)));

    gate.notify_one();
    let summary = first.await.unwrap();
    assert_eq!(summary.processed, 1);
    assert_eq!(scheduler.counts("deal_intake"), Some((1, 1)));
}

#[tokio::test]
async fn test_committed_state_survives_restart() {
    let path = std::env::temp_dir().join(format!("dealscout_it_{}.json", uuid::Uuid::new_v4()));

    {
        let mut store = Store::open(&path, Settings::default()).unwrap();
        store.register_device_token("phone", Utc::now());
        store
            .insert_deal(&listing("https://fb.test/1", PS5, dec!(200)), Utc::now())
            .unwrap();
        store.commit().unwrap();
    }

    let reopened = Store::open(&path, Settings::default()).unwrap();
    assert_eq!(reopened.deals().count(), 1);
    assert_eq!(reopened.device_tokens(), vec!["phone".to_string()]);
    assert!(reopened.contains_listing("https://fb.test/1"));

    let _ = std::fs::remove_file(&path);
}

fn temp_file(prefix: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("{prefix}_{}.json", uuid::Uuid::new_v4()))
}

fn write_inbox(path: &std::path::Path, listings: &[RawListing]) {
    std::fs::write(path, serde_json::to_string(listings).unwrap()).unwrap();
}

fn inbox_pipeline(inbox: &std::path::Path, store: SharedStore) -> DealPipeline {
    DealPipeline::new(Arc::new(InboxSource::new(inbox)), store, distance(), PipelineConfig::default())
}

#[tokio::test]
async fn test_failed_commit_keeps_listing_in_inbox() {
    let inbox = temp_file("dealscout_it_inbox");
    write_inbox(&inbox, &[listing("https://fb.test/1", PS5, dec!(200))]);

    let blocker = temp_file("dealscout_it_blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let broken = Store::open(blocker.join("state.json"), Settings::default())
        .unwrap()
        .into_shared();

    let report = inbox_pipeline(&inbox, broken).run_batch().await;
    assert_eq!(report.processed(), 1);
    assert!(report.commit_error.is_some());
    assert_eq!(InboxSource::new(&inbox).fetch_batch(10).await.unwrap().len(), 1);

    // Restart against a writable state file.
    let state = temp_file("dealscout_it_state");
    let store = Store::open(&state, Settings::default()).unwrap().into_shared();
    let report = inbox_pipeline(&inbox, store).run_batch().await;
    assert_eq!(report.processed(), 1);
    assert!(report.commit_error.is_none());
    assert!(InboxSource::new(&inbox).fetch_batch(10).await.unwrap().is_empty());

    let reopened = Store::open(&state, Settings::default()).unwrap();
    assert!(reopened.contains_listing("https://fb.test/1"));

    for path in [&inbox, &blocker, &state] {
        let _ = std::fs::remove_file(path);
    }
}

#[tokio::test]
async fn test_intake_aborted_at_shutdown_keeps_listing_in_inbox() {
    let inbox = temp_file("dealscout_it_inbox");
    write_inbox(&inbox, &[listing("https://fb.test/1", PS5, dec!(200))]);
    let state = temp_file("dealscout_it_state");
    let store = Store::open(&state, Settings::default()).unwrap().into_shared();

    let entered = Arc::new(Notify::new());
    let stalled = Arc::new(StalledClassifier {
        entered: entered.clone(),
    });
    let p = inbox_pipeline(&inbox, store).with_classifier(Some(stalled));

    let mut scheduler = Scheduler::new(Duration::from_millis(50));
    scheduler.register(Arc::new(IntakeJob::new(Arc::new(p), Duration::from_secs(300))));
    scheduler.run_until(async move { entered.notified().await }).await;

    assert!(!scheduler.is_running("deal_intake"));
    assert_eq!(InboxSource::new(&inbox).fetch_batch(10).await.unwrap().len(), 1);
    assert_eq!(Store::open(&state, Settings::default()).unwrap().deals().count(), 0);

    // Next start picks the listing up again.
    let store = Store::open(&state, Settings::default()).unwrap().into_shared();
    let report = inbox_pipeline(&inbox, store).run_batch().await;
    assert_eq!(report.processed(), 1);
    assert!(InboxSource::new(&inbox).fetch_batch(10).await.unwrap().is_empty());
    assert_eq!(Store::open(&state, Settings::default()).unwrap().deals().count(), 1);

    for path in [&inbox, &state] {
        let _ = std::fs::remove_file(path);
    }
}
