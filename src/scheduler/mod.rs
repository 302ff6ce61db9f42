//! Periodic job driver.
//!
//! Each registered job fires on its own interval. A job never runs
//! twice at once: a firing that finds the previous run still in flight
//! is skipped. On shutdown no new runs start and in-flight runs get a
//! grace period to finish.

pub mod jobs;

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use jobs::{IntakeJob, ReconcileJob, ReviewJob};

/// Outcome of one job run, for the completion log line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobSummary {
    pub processed: usize,
    pub errored: usize,
    pub detail: Option<String>,
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> &'static str;

    /// Delay before the next firing. Read again after every firing.
    async fn interval(&self) -> Duration;

    /// Run once. Never fails; problems are logged and summarised.
    async fn run(&self) -> JobSummary;
}

pub enum TriggerOutcome {
    Started(JoinHandle<JobSummary>),
    AlreadyRunning,
}

struct JobSlot {
    job: Arc<dyn Job>,
    running: AtomicBool,
    runs: AtomicU64,
    skipped: AtomicU64,
}

/// Clears the in-flight flag when a run ends, including by panic or abort.
struct RunGuard(Arc<JobSlot>);

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

pub struct Scheduler {
    slots: Vec<Arc<JobSlot>>,
    shutdown_grace: Duration,
}

impl Scheduler {
    pub fn new(shutdown_grace: Duration) -> Self {
        Self {
            slots: Vec::new(),
            shutdown_grace,
        }
    }

    pub fn register(&mut self, job: Arc<dyn Job>) {
        info!(job = job.name(), "Job registered");
        self.slots.push(Arc::new(JobSlot {
            job,
            running: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }));
    }

    fn slot(&self, name: &str) -> Option<&Arc<JobSlot>> {
        self.slots.iter().find(|s| s.job.name() == name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.slot(name).is_some_and(|s| s.running.load(Ordering::SeqCst))
    }

    /// Completed-or-started runs and skipped firings for a job.
    pub fn counts(&self, name: &str) -> Option<(u64, u64)> {
        self.slot(name)
            .map(|s| (s.runs.load(Ordering::SeqCst), s.skipped.load(Ordering::SeqCst)))
    }

    /// Start a run of `name` now unless one is already in flight.
    /// `None` when no such job is registered.
    pub fn trigger(&self, name: &str) -> Option<TriggerOutcome> {
        self.slot(name).map(|slot| Self::start(slot))
    }

    fn start(slot: &Arc<JobSlot>) -> TriggerOutcome {
        let name = slot.job.name();
        if slot
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            slot.skipped.fetch_add(1, Ordering::SeqCst);
            warn!(job = name, "Previous run still in flight, skipping");
            return TriggerOutcome::AlreadyRunning;
        }
        slot.runs.fetch_add(1, Ordering::SeqCst);

        let guard = RunGuard(Arc::clone(slot));
        let job = Arc::clone(&slot.job);
        TriggerOutcome::Started(tokio::spawn(async move {
            let _guard = guard;
            let started = Instant::now();
            info!(job = name, "Job started");

            let summary = job.run().await;

            info!(
                job = name,
                processed = summary.processed,
                errored = summary.errored,
                detail = summary.detail.as_deref().unwrap_or(""),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Job finished"
            );
            summary
        }))
    }

    /// Fire jobs on their intervals until `shutdown` resolves, then wait
    /// up to the grace period for in-flight runs. Every job fires once
    /// immediately.
    pub async fn run_until<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if self.slots.is_empty() {
            warn!("No jobs registered");
            return;
        }

        let now = Instant::now();
        let mut next_due: Vec<Instant> = vec![now; self.slots.len()];
        let mut in_flight: Vec<JoinHandle<JobSummary>> = Vec::new();
        tokio::pin!(shutdown);

        info!(jobs = self.slots.len(), "Scheduler running");

        loop {
            let (idx, due) = next_due
                .iter()
                .copied()
                .enumerate()
                .min_by_key(|(_, due)| *due)
                .unwrap_or((0, now));

            tokio::select! {
                _ = tokio::time::sleep_until(due) => {
                    let slot = &self.slots[idx];
                    if let TriggerOutcome::Started(handle) = Self::start(slot) {
                        in_flight.push(handle);
                    }
                    next_due[idx] = Instant::now() + slot.job.interval().await;
                    in_flight.retain(|h| !h.is_finished());
                }
                _ = &mut shutdown => {
                    info!("Shutdown requested, no new runs will start");
                    break;
                }
            }
        }

        self.drain(in_flight).await;
    }

    async fn drain(&self, in_flight: Vec<JoinHandle<JobSummary>>) {
        let mut pending: Vec<_> = in_flight.into_iter().filter(|h| !h.is_finished()).collect();
        if pending.is_empty() {
            info!("Scheduler stopped");
            return;
        }

        debug!(pending = pending.len(), grace_secs = self.shutdown_grace.as_secs(), "Waiting for in-flight runs");
        let finished =
            tokio::time::timeout(self.shutdown_grace, futures::future::join_all(pending.iter_mut())).await;

        if finished.is_ok() {
            info!("In-flight runs finished, scheduler stopped");
            return;
        }

        warn!(
            grace_secs = self.shutdown_grace.as_secs(),
            "In-flight runs exceeded shutdown grace, abandoning"
        );
        for handle in pending {
            handle.abort();
            let _ = handle.await;
        }
    }
}
