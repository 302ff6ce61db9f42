//! The three periodic jobs: deal intake, needs-review sweep and order
//! reconciliation.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use super::{Job, JobSummary};
use crate::engine::pipeline::DealPipeline;
use crate::engine::reconcile::OrderReconciler;
use crate::engine::review::ReviewSweep;

pub struct IntakeJob {
    pipeline: Arc<DealPipeline>,
    every: Duration,
}

impl IntakeJob {
    pub fn new(pipeline: Arc<DealPipeline>, every: Duration) -> Self {
        Self { pipeline, every }
    }
}

#[async_trait]
impl Job for IntakeJob {
    fn name(&self) -> &'static str {
        "deal_intake"
    }

    async fn interval(&self) -> Duration {
        self.every
    }

    async fn run(&self) -> JobSummary {
        let report = self.pipeline.run_batch().await;
        let detail = match (&report.fetch_error, &report.commit_error) {
            (Some(e), _) => e.clone(),
            (None, Some(e)) => format!("commit failed: {e}"),
            (None, None) => format!(
                "fetched={} duplicates={} dismissed={} notified={}",
                report.fetched,
                report.duplicates,
                report.dismissed(),
                report.notified()
            ),
        };
        JobSummary {
            processed: report.processed(),
            errored: report.errored(),
            detail: Some(detail),
        }
    }
}

pub struct ReviewJob {
    sweep: ReviewSweep,
}

impl ReviewJob {
    pub fn new(sweep: ReviewSweep) -> Self {
        Self { sweep }
    }
}

#[async_trait]
impl Job for ReviewJob {
    fn name(&self) -> &'static str {
        "needs_review"
    }

    /// Follows the persisted setting, so changes apply from the next firing.
    async fn interval(&self) -> Duration {
        self.sweep.interval().await
    }

    async fn run(&self) -> JobSummary {
        let report = self.sweep.run().await;
        JobSummary {
            processed: report.pending,
            errored: report.failed,
            detail: Some(format!("sent={}", report.sent)),
        }
    }
}

pub struct ReconcileJob {
    reconciler: OrderReconciler,
    every: Duration,
}

impl ReconcileJob {
    pub fn new(reconciler: OrderReconciler, every: Duration) -> Self {
        Self { reconciler, every }
    }
}

#[async_trait]
impl Job for ReconcileJob {
    fn name(&self) -> &'static str {
        "order_reconciliation"
    }

    async fn interval(&self) -> Duration {
        self.every
    }

    async fn run(&self) -> JobSummary {
        let report = self.reconciler.run().await;
        JobSummary {
            processed: report.orders_checked,
            errored: usize::from(report.fetch_error.is_some()),
            detail: report
                .fetch_error
                .or_else(|| Some(format!("synced={}", report.synced))),
        }
    }
}
