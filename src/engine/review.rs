//! Needs-review sweep: remind registered devices when deals are waiting
//! for a condition decision.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::notify::{dispatch, Notifier, PushMessage};
use crate::storage::SharedStore;
use crate::types::DealStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReviewReport {
    pub pending: usize,
    pub sent: usize,
    pub failed: usize,
}

pub struct ReviewSweep {
    store: SharedStore,
    notifier: Option<Arc<dyn Notifier>>,
    call_timeout: Duration,
}

impl ReviewSweep {
    pub fn new(store: SharedStore, notifier: Option<Arc<dyn Notifier>>, call_timeout: Duration) -> Self {
        Self {
            store,
            notifier,
            call_timeout,
        }
    }

    /// Current reminder interval from the stored settings.
    pub async fn interval(&self) -> Duration {
        let mins = self.store.lock().await.settings().needs_review_interval_mins.max(1);
        Duration::from_secs(mins * 60)
    }

    pub async fn run(&self) -> ReviewReport {
        let (pending, tokens, enabled) = {
            let store = self.store.lock().await;
            (
                store.count_deals(DealStatus::NeedsCondition),
                store.device_tokens(),
                store.settings().notifications_enabled,
            )
        };

        let mut report = ReviewReport {
            pending,
            ..ReviewReport::default()
        };

        if pending == 0 {
            debug!("No deals awaiting review");
            return report;
        }
        if !enabled {
            debug!(pending, "Notifications disabled, skipping review reminder");
            return report;
        }
        let Some(notifier) = self.notifier.as_ref() else {
            debug!(pending, "Notifier not configured, skipping review reminder");
            return report;
        };

        let outcome = dispatch(
            notifier.as_ref(),
            &tokens,
            &PushMessage::needs_review(pending),
            self.call_timeout,
        )
        .await;
        report.sent = outcome.sent;
        report.failed = outcome.failed;

        info!(pending, sent = report.sent, failed = report.failed, "Review reminder sent");
        report
    }
}
