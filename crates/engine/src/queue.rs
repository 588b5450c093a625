// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Persistent job queue: a thin contract layer over the store.
//!
//! The store does the conditional single-row transitions; this layer
//! decides what a missed condition means (idempotent terminal success
//! vs. invalid transition) and logs the lifecycle.

use kestrel_core::{
    Clock, JobId, JobResult, JobStatus, JobType, ScanId, ScanJob, SystemClock, WorkerId,
};
use kestrel_storage::{JobStats, JobStore, Store};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::EngineError;

pub struct JobQueue<C: Clock = SystemClock> {
    store: Arc<dyn Store>,
    clock: C,
}

impl<C: Clock> JobQueue<C> {
    pub fn with_clock(store: Arc<dyn Store>, clock: C) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Insert one pending job.
    pub async fn enqueue(&self, job: ScanJob) -> Result<(), EngineError> {
        self.enqueue_batch(vec![job]).await
    }

    /// Insert a batch of pending jobs. Insertion order within the batch is
    /// preserved but not externally observable.
    pub async fn enqueue_batch(&self, jobs: Vec<ScanJob>) -> Result<(), EngineError> {
        if jobs.is_empty() {
            return Ok(());
        }
        debug!(count = jobs.len(), scan_id = %jobs[0].scan_id, "enqueueing jobs");
        self.store.insert_jobs(&jobs).await?;
        Ok(())
    }

    /// Claim the oldest pending job of any scan, or None when no work is
    /// available. Never returns a job belonging to a cancelled scan.
    pub async fn claim(&self, worker: &WorkerId) -> Result<Option<ScanJob>, EngineError> {
        self.claim_kinds(worker, None).await
    }

    /// Claim restricted to specific job types (pool segregation).
    pub async fn claim_kinds(
        &self,
        worker: &WorkerId,
        kinds: Option<&[JobType]>,
    ) -> Result<Option<ScanJob>, EngineError> {
        let job = self
            .store
            .claim_next_job(worker, kinds, self.clock.epoch_ms())
            .await?;
        if let Some(job) = &job {
            debug!(job_id = %job.id, scan_id = %job.scan_id, worker = %worker, "claimed job");
        }
        Ok(job)
    }

    /// claimed → running.
    pub async fn mark_running(&self, id: &JobId) -> Result<ScanJob, EngineError> {
        match self.store.mark_job_running(id).await? {
            Some(job) => Ok(job),
            None => self.transition_miss(id, JobStatus::Running).await,
        }
    }

    /// claimed/running → completed, storing the result.
    pub async fn complete(&self, id: &JobId, result: JobResult) -> Result<ScanJob, EngineError> {
        match self
            .store
            .complete_job(id, &result, self.clock.epoch_ms())
            .await?
        {
            Some(job) => {
                info!(job_id = %job.id, issues = result.issues_found, "job completed");
                Ok(job)
            }
            None => self.transition_miss(id, JobStatus::Completed).await,
        }
    }

    /// Record a failure: retried while the attempt budget lasts, terminal
    /// afterwards. The returned job's status tells which happened.
    pub async fn fail(
        &self,
        id: &JobId,
        error_type: &str,
        error_message: &str,
    ) -> Result<ScanJob, EngineError> {
        match self
            .store
            .fail_job(id, error_type, error_message, self.clock.epoch_ms())
            .await?
        {
            Some(job) => {
                info!(
                    job_id = %job.id,
                    attempts = job.attempts,
                    status = %job.status,
                    error_type,
                    "job failed"
                );
                Ok(job)
            }
            None => self.transition_miss(id, JobStatus::Failed).await,
        }
    }

    /// claimed → pending: give a claim back untouched (pause observed
    /// before execution started). Idempotent on terminal rows.
    pub async fn release(&self, id: &JobId) -> Result<ScanJob, EngineError> {
        match self.store.release_job(id).await? {
            Some(job) => {
                debug!(job_id = %job.id, "released claim");
                Ok(job)
            }
            None => self.transition_miss(id, JobStatus::Pending).await,
        }
    }

    /// Any non-terminal status → cancelled. Queued rows are cancelled by
    /// the command path; running rows by the worker that observed the
    /// cancellation.
    pub async fn cancel(&self, id: &JobId) -> Result<ScanJob, EngineError> {
        match self.store.cancel_job(id, self.clock.epoch_ms()).await? {
            Some(job) => Ok(job),
            None => self.transition_miss(id, JobStatus::Cancelled).await,
        }
    }

    /// Bulk-cancel a scan's pending and claimed jobs.
    pub async fn cancel_scan(&self, scan: &ScanId) -> Result<u64, EngineError> {
        let count = self
            .store
            .cancel_jobs_for_scan(scan, self.clock.epoch_ms())
            .await?;
        if count > 0 {
            info!(scan_id = %scan, cancelled = count, "cancelled queued jobs");
        }
        Ok(count)
    }

    pub async fn stats(&self, scan: &ScanId) -> Result<JobStats, EngineError> {
        Ok(self.store.job_stats(scan).await?)
    }

    /// Release claims held by `worker` (restart recovery).
    pub async fn reset_stale(&self, worker: &WorkerId) -> Result<u64, EngineError> {
        let count = self.store.reset_stale_jobs(worker).await?;
        if count > 0 {
            info!(worker = %worker, released = count, "reset stale claims");
        }
        Ok(count)
    }

    /// Release claims older than `age`, regardless of worker.
    pub async fn reset_stale_older_than(&self, age: Duration) -> Result<u64, EngineError> {
        let cutoff = self.clock.epoch_ms().saturating_sub(age.as_millis() as u64);
        Ok(self.store.reset_stale_jobs_older_than(cutoff).await?)
    }

    /// A conditional update matched no row: either the job is already
    /// terminal (idempotent success) or the transition is invalid.
    async fn transition_miss(&self, id: &JobId, target: JobStatus) -> Result<ScanJob, EngineError> {
        let job = self
            .store
            .get_job(id)
            .await?
            .ok_or(EngineError::JobNotFound(*id))?;
        if job.status.is_terminal() {
            return Ok(job);
        }
        Err(EngineError::InvalidJobTransition { id: *id, status: job.status, target })
    }
}

impl JobQueue {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
