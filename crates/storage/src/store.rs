// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store traits: the persistence seam between the engine and its
//! relational backing store.
//!
//! Transition methods are conditional single-row updates: they return
//! `Some(updated)` when the row was in an eligible state and `None`
//! otherwise. Callers (the job queue, the command layer) decide whether
//! a `None` is an idempotent success or an invalid transition.

use async_trait::async_trait;
use kestrel_core::{
    HistoryItem, JobId, JobResult, JobType, Scan, ScanId, ScanJob, ScanStatus, Task, TaskId,
    TaskJob, TaskJobId, TaskJobStatus, TaskStatus, WorkerId, WsConnection,
};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Per-status job counts for one scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStats {
    pub pending: u64,
    pub claimed: u64,
    pub running: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl JobStats {
    pub fn total(&self) -> u64 {
        self.pending + self.claimed + self.running + self.completed + self.failed + self.cancelled
    }

    /// Jobs not yet in a terminal state.
    pub fn open(&self) -> u64 {
        self.pending + self.claimed + self.running
    }

    /// Completed / total × 100, or 0 when the scan has no jobs.
    pub fn progress(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.completed as f32 / total as f32) * 100.0
    }
}

/// Durable multi-producer, multi-consumer job queue operations.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert pending jobs. Within the batch, insertion order is preserved.
    async fn insert_jobs(&self, jobs: &[ScanJob]) -> Result<(), StorageError>;

    async fn get_job(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError>;

    /// Atomically claim the oldest pending job across all scans, skipping
    /// rows held by concurrent claimers and jobs of cancelled scans.
    /// Ordering: `(created_at, id)`; the id tie-break tolerates clock skew.
    /// `kinds` narrows the claim to specific job types (pool segregation);
    /// `None` claims any type.
    async fn claim_next_job(
        &self,
        worker: &WorkerId,
        kinds: Option<&[JobType]>,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError>;

    /// claimed → running.
    async fn mark_job_running(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError>;

    /// claimed/running → completed.
    async fn complete_job(
        &self,
        id: &JobId,
        result: &JobResult,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError>;

    /// claimed/running → pending (retry) or failed (attempt budget spent).
    /// Increments `attempts` first; retries while `attempts < max_attempts`.
    async fn fail_job(
        &self,
        id: &JobId,
        error_type: &str,
        error_message: &str,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError>;

    /// claimed → pending without spending an attempt (pause observed
    /// before the job started running).
    async fn release_job(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError>;

    /// pending/claimed/running → cancelled. The command path only touches
    /// pending and claimed rows (see
    /// [`cancel_jobs_for_scan`](Self::cancel_jobs_for_scan)); the running
    /// case is for the worker that observed cancellation mid-flight.
    async fn cancel_job(&self, id: &JobId, now_ms: u64) -> Result<Option<ScanJob>, StorageError>;

    /// Bulk form of [`cancel_job`](Self::cancel_job) for one scan.
    /// Returns the number of rows transitioned.
    async fn cancel_jobs_for_scan(
        &self,
        scan: &ScanId,
        now_ms: u64,
    ) -> Result<u64, StorageError>;

    async fn job_stats(&self, scan: &ScanId) -> Result<JobStats, StorageError>;

    /// claimed → pending for every job held by `worker` (crash recovery).
    async fn reset_stale_jobs(&self, worker: &WorkerId) -> Result<u64, StorageError>;

    /// claimed → pending for every job claimed before `cutoff_ms`.
    async fn reset_stale_jobs_older_than(&self, cutoff_ms: u64) -> Result<u64, StorageError>;
}

/// Scan row operations: the control plane's persisted form.
#[async_trait]
pub trait ScanStore: Send + Sync {
    async fn insert_scan(&self, scan: &Scan) -> Result<(), StorageError>;

    async fn get_scan(&self, id: &ScanId) -> Result<Option<Scan>, StorageError>;

    async fn list_scans_in(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>, StorageError>;

    /// Set `status`, recording the old value in `previous_status`.
    async fn update_scan_status(
        &self,
        id: &ScanId,
        status: ScanStatus,
        now_ms: u64,
    ) -> Result<Option<Scan>, StorageError>;

    async fn update_scan_phase(
        &self,
        id: &ScanId,
        phase: &str,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    async fn update_scan_progress(
        &self,
        id: &ScanId,
        progress: f32,
        now_ms: u64,
    ) -> Result<(), StorageError>;
}

/// Task/task-job projection written by the lifecycle tracker.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert_task(&self, task: &Task) -> Result<(), StorageError>;

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError>;

    /// Sets `completed_at` when `status` is terminal.
    async fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        now_ms: u64,
    ) -> Result<(), StorageError>;

    async fn insert_task_job(&self, job: &TaskJob) -> Result<(), StorageError>;

    async fn get_task_job(&self, id: &TaskJobId) -> Result<Option<TaskJob>, StorageError>;

    /// Sets `completed_at` when `status` is terminal. Terminal rows are
    /// left unchanged (returns the stored row).
    async fn update_task_job_status(
        &self,
        id: &TaskJobId,
        status: TaskJobStatus,
        now_ms: u64,
    ) -> Result<Option<TaskJob>, StorageError>;

    async fn list_task_jobs(&self, task: &TaskId) -> Result<Vec<TaskJob>, StorageError>;
}

/// History items captured by the crawler, resolved by workers.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn upsert_history_items(&self, items: &[HistoryItem]) -> Result<(), StorageError>;

    async fn get_history_item(&self, id: i64) -> Result<Option<HistoryItem>, StorageError>;
}

/// WebSocket connections recorded as a crawl side effect.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn insert_connections(&self, conns: &[WsConnection]) -> Result<(), StorageError>;

    async fn get_connection(&self, id: i64) -> Result<Option<WsConnection>, StorageError>;

    async fn list_connections(&self, workspace_id: i64) -> Result<Vec<WsConnection>, StorageError>;
}

/// The full store capability handed to the engine.
pub trait Store: JobStore + ScanStore + TaskStore + HistoryStore + ConnectionStore {}

impl<T> Store for T where T: JobStore + ScanStore + TaskStore + HistoryStore + ConnectionStore {}
