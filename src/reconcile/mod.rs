// Copyright (c) 2025 Nikolay Denev <ndenev@gmail.com>
// SPDX-License-Identifier: BSD-3-Clause

//! Periodic convergence of persisted state with live cluster state.
//!
//! Each job runs on its own task. A pass is awaited before the next tick is
//! taken, so a job never overlaps itself; ticks missed while a pass runs are
//! coalesced, and a tick later than the misfire grace is skipped outright.

pub mod allocation;
pub mod inventory;
mod locks;
pub mod workload;

pub use allocation::AllocationAdjuster;
pub use inventory::{InventorySettings, NodeInventoryJob};
pub use locks::ClusterLocks;
pub use workload::{WorkloadJob, WorkloadSettings};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Counts produced by one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub clusters: usize,
    pub failed_clusters: usize,
    pub changes: usize,
}

#[async_trait]
pub trait ReconcileJob: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// One full pass over every connectable cluster
    async fn run_pass(&self) -> anyhow::Result<PassSummary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSchedule {
    pub interval: Duration,
    /// Ticks delivered later than this are skipped
    pub misfire_grace: Duration,
}

impl JobSchedule {
    pub fn every(interval: Duration) -> Self {
        Self {
            interval,
            misfire_grace: interval,
        }
    }

    pub fn with_grace(mut self, misfire_grace: Duration) -> Self {
        self.misfire_grace = misfire_grace;
        self
    }
}

/// Per-job counters
#[derive(Debug, Default)]
pub struct JobStats {
    passes: AtomicU64,
    failed_passes: AtomicU64,
    misfires: AtomicU64,
    changes: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatsSnapshot {
    pub passes: u64,
    pub failed_passes: u64,
    pub misfires: u64,
    pub changes: u64,
}

impl JobStats {
    pub fn snapshot(&self) -> JobStatsSnapshot {
        JobStatsSnapshot {
            passes: self.passes.load(Ordering::Relaxed),
            failed_passes: self.failed_passes.load(Ordering::Relaxed),
            misfires: self.misfires.load(Ordering::Relaxed),
            changes: self.changes.load(Ordering::Relaxed),
        }
    }
}

struct RegisteredJob {
    job: Arc<dyn ReconcileJob>,
    schedule: JobSchedule,
    stats: Arc<JobStats>,
}

/// Owns the job loops; explicit `start` / `stop`
pub struct Scheduler {
    jobs: Vec<RegisteredJob>,
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown,
            handles: Vec::new(),
        }
    }

    pub fn add_job(&mut self, job: Arc<dyn ReconcileJob>, schedule: JobSchedule) -> Arc<JobStats> {
        let stats = Arc::new(JobStats::default());
        self.jobs.push(RegisteredJob {
            job,
            schedule,
            stats: stats.clone(),
        });
        stats
    }

    pub fn is_running(&self) -> bool {
        !self.handles.is_empty()
    }

    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.shutdown.send_replace(false);
        for registered in &self.jobs {
            info!(
                job = registered.job.name(),
                interval_secs = registered.schedule.interval.as_secs_f64(),
                "Starting reconcile job"
            );
            self.handles.push(tokio::spawn(run_job_loop(
                registered.job.clone(),
                registered.schedule,
                registered.stats.clone(),
                self.shutdown.subscribe(),
            )));
        }
    }

    /// Signal every loop and wait for in-flight passes to finish
    pub async fn stop(&mut self) {
        self.shutdown.send_replace(true);
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Reconcile loop terminated abnormally");
            }
        }
        info!("Scheduler stopped");
    }
}

async fn run_job_loop(
    job: Arc<dyn ReconcileJob>,
    schedule: JobSchedule,
    stats: Arc<JobStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = interval(schedule.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        let scheduled = tokio::select! {
            _ = shutdown.changed() => break,
            tick = ticker.tick() => tick,
        };
        if *shutdown.borrow() {
            break;
        }

        let lateness = scheduled.elapsed();
        if lateness > schedule.misfire_grace {
            stats.misfires.fetch_add(1, Ordering::Relaxed);
            warn!(
                job = job.name(),
                late_ms = lateness.as_millis(),
                "Trigger missed its grace period, skipping"
            );
            continue;
        }

        run_guarded(&job, &stats).await;
    }

    debug!(job = job.name(), "Reconcile loop exiting");
}

/// Run one pass on its own task so a panic cannot take down the loop
async fn run_guarded(job: &Arc<dyn ReconcileJob>, stats: &JobStats) {
    let name = job.name();
    let pass_job = job.clone();
    let outcome = tokio::spawn(async move { pass_job.run_pass().await }).await;
    stats.passes.fetch_add(1, Ordering::Relaxed);

    match outcome {
        Ok(Ok(summary)) => {
            stats
                .changes
                .fetch_add(summary.changes as u64, Ordering::Relaxed);
            debug!(
                job = name,
                clusters = summary.clusters,
                failed_clusters = summary.failed_clusters,
                changes = summary.changes,
                "Pass complete"
            );
        }
        Ok(Err(e)) => {
            stats.failed_passes.fetch_add(1, Ordering::Relaxed);
            warn!(job = name, error = %e, "Pass failed");
        }
        Err(e) => {
            stats.failed_passes.fetch_add(1, Ordering::Relaxed);
            error!(job = name, error = %e, "Pass crashed");
        }
    }
}
