// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory store: the transition semantics of the relational store
//! under one mutex. Used by tests and ephemeral scans.

use async_trait::async_trait;
use kestrel_core::{
    HistoryItem, JobId, JobResult, JobStatus, JobType, Scan, ScanId, ScanJob, ScanStatus, Task,
    TaskId, TaskJob, TaskJobId, TaskJobStatus, TaskStatus, WorkerId, WsConnection,
};
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::StorageError;
use crate::store::{
    ConnectionStore, HistoryStore, JobStats, JobStore, ScanStore, TaskStore,
};

#[derive(Default)]
struct Inner {
    scans: HashMap<ScanId, Scan>,
    jobs: HashMap<JobId, ScanJob>,
    tasks: HashMap<TaskId, Task>,
    task_jobs: HashMap<TaskJobId, TaskJob>,
    history: HashMap<i64, HistoryItem>,
    connections: HashMap<i64, WsConnection>,
}

/// A [`Store`](crate::Store) kept entirely in process memory.
///
/// Claim atomicity comes from the single mutex: a claim observes and
/// transitions a job in one critical section, which is the in-memory
/// equivalent of the skip-locked row claim.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_jobs(&self, jobs: &[ScanJob]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        for job in jobs {
            inner.jobs.insert(job.id, job.clone());
        }
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError> {
        Ok(self.inner.lock().jobs.get(id).cloned())
    }

    async fn claim_next_job(
        &self,
        worker: &WorkerId,
        kinds: Option<&[JobType]>,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError> {
        let mut inner = self.inner.lock();
        let next = inner
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .filter(|j| kinds.is_none_or(|ks| ks.contains(&j.job_type)))
            .filter(|j| {
                inner
                    .scans
                    .get(&j.scan_id)
                    .is_none_or(|s| s.status != ScanStatus::Cancelled)
            })
            .min_by_key(|j| (j.created_at_ms, j.id))
            .map(|j| j.id);
        let Some(id) = next else {
            return Ok(None);
        };
        let Some(job) = inner.jobs.get_mut(&id) else {
            return Ok(None);
        };
        job.status = JobStatus::Claimed;
        job.worker_id = Some(worker.clone());
        job.claimed_at_ms = Some(now_ms);
        Ok(Some(job.clone()))
    }

    async fn mark_job_running(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Claimed {
            return Ok(None);
        }
        job.status = JobStatus::Running;
        Ok(Some(job.clone()))
    }

    async fn complete_job(
        &self,
        id: &JobId,
        result: &JobResult,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(None);
        };
        if !job.status.is_held() {
            return Ok(None);
        }
        job.status = JobStatus::Completed;
        job.completed_at_ms = Some(now_ms);
        job.issues_found = result.issues_found;
        job.http_status = result.http_status;
        Ok(Some(job.clone()))
    }

    async fn fail_job(
        &self,
        id: &JobId,
        error_type: &str,
        error_message: &str,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(None);
        };
        if !job.status.is_held() {
            return Ok(None);
        }
        job.attempts += 1;
        job.error_type = Some(error_type.to_string());
        job.error_message = Some(error_message.to_string());
        if job.attempts < job.max_attempts {
            job.status = JobStatus::Pending;
            job.worker_id = None;
            job.claimed_at_ms = None;
        } else {
            job.status = JobStatus::Failed;
            job.completed_at_ms = Some(now_ms);
        }
        Ok(Some(job.clone()))
    }

    async fn release_job(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(None);
        };
        if job.status != JobStatus::Claimed {
            return Ok(None);
        }
        job.status = JobStatus::Pending;
        job.worker_id = None;
        job.claimed_at_ms = None;
        Ok(Some(job.clone()))
    }

    async fn cancel_job(&self, id: &JobId, now_ms: u64) -> Result<Option<ScanJob>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.jobs.get_mut(id) else {
            return Ok(None);
        };
        if job.status.is_terminal() {
            return Ok(None);
        }
        job.status = JobStatus::Cancelled;
        job.completed_at_ms = Some(now_ms);
        Ok(Some(job.clone()))
    }

    async fn cancel_jobs_for_scan(
        &self,
        scan: &ScanId,
        now_ms: u64,
    ) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for job in inner.jobs.values_mut() {
            if job.scan_id == *scan
                && matches!(job.status, JobStatus::Pending | JobStatus::Claimed)
            {
                job.status = JobStatus::Cancelled;
                job.completed_at_ms = Some(now_ms);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn job_stats(&self, scan: &ScanId) -> Result<JobStats, StorageError> {
        let inner = self.inner.lock();
        let mut stats = JobStats::default();
        for job in inner.jobs.values().filter(|j| j.scan_id == *scan) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Claimed => stats.claimed += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
        }
        Ok(stats)
    }

    async fn reset_stale_jobs(&self, worker: &WorkerId) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Claimed && job.worker_id.as_ref() == Some(worker) {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.claimed_at_ms = None;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn reset_stale_jobs_older_than(&self, cutoff_ms: u64) -> Result<u64, StorageError> {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for job in inner.jobs.values_mut() {
            if job.status == JobStatus::Claimed
                && job.claimed_at_ms.is_some_and(|at| at < cutoff_ms)
            {
                job.status = JobStatus::Pending;
                job.worker_id = None;
                job.claimed_at_ms = None;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl ScanStore for MemoryStore {
    async fn insert_scan(&self, scan: &Scan) -> Result<(), StorageError> {
        self.inner.lock().scans.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get_scan(&self, id: &ScanId) -> Result<Option<Scan>, StorageError> {
        Ok(self.inner.lock().scans.get(id).cloned())
    }

    async fn list_scans_in(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>, StorageError> {
        let inner = self.inner.lock();
        let mut scans: Vec<Scan> = inner
            .scans
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect();
        scans.sort_by_key(|s| (s.created_at_ms, s.id));
        Ok(scans)
    }

    async fn update_scan_status(
        &self,
        id: &ScanId,
        status: ScanStatus,
        now_ms: u64,
    ) -> Result<Option<Scan>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(scan) = inner.scans.get_mut(id) else {
            return Ok(None);
        };
        scan.previous_status = Some(scan.status);
        scan.status = status;
        scan.updated_at_ms = now_ms;
        Ok(Some(scan.clone()))
    }

    async fn update_scan_phase(
        &self,
        id: &ScanId,
        phase: &str,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if let Some(scan) = inner.scans.get_mut(id) {
            scan.phase = phase.to_string();
            scan.updated_at_ms = now_ms;
        }
        Ok(())
    }

    async fn update_scan_progress(
        &self,
        id: &ScanId,
        progress: f32,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        if let Some(scan) = inner.scans.get_mut(id) {
            scan.progress = progress;
            scan.updated_at_ms = now_ms;
        }
        Ok(())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        self.inner.lock().tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        Ok(self.inner.lock().tasks.get(id).cloned())
    }

    async fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let Some(task) = inner.tasks.get_mut(id) else {
            return Err(StorageError::TaskNotFound(id.to_string()));
        };
        task.status = status;
        if status.is_terminal() {
            task.completed_at_ms = Some(now_ms);
        }
        Ok(())
    }

    async fn insert_task_job(&self, job: &TaskJob) -> Result<(), StorageError> {
        self.inner.lock().task_jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_task_job(&self, id: &TaskJobId) -> Result<Option<TaskJob>, StorageError> {
        Ok(self.inner.lock().task_jobs.get(id).cloned())
    }

    async fn update_task_job_status(
        &self,
        id: &TaskJobId,
        status: TaskJobStatus,
        now_ms: u64,
    ) -> Result<Option<TaskJob>, StorageError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.task_jobs.get_mut(id) else {
            return Ok(None);
        };
        if !job.status.is_terminal() {
            job.status = status;
            if status.is_terminal() {
                job.completed_at_ms = Some(now_ms);
            }
        }
        Ok(Some(job.clone()))
    }

    async fn list_task_jobs(&self, task: &TaskId) -> Result<Vec<TaskJob>, StorageError> {
        let inner = self.inner.lock();
        let mut jobs: Vec<TaskJob> = inner
            .task_jobs
            .values()
            .filter(|j| j.task_id == *task)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.created_at_ms, j.id));
        Ok(jobs)
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn upsert_history_items(&self, items: &[HistoryItem]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        for item in items {
            inner.history.insert(item.id, item.clone());
        }
        Ok(())
    }

    async fn get_history_item(&self, id: i64) -> Result<Option<HistoryItem>, StorageError> {
        Ok(self.inner.lock().history.get(&id).cloned())
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn insert_connections(&self, conns: &[WsConnection]) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        for conn in conns {
            inner.connections.insert(conn.id, conn.clone());
        }
        Ok(())
    }

    async fn get_connection(&self, id: i64) -> Result<Option<WsConnection>, StorageError> {
        Ok(self.inner.lock().connections.get(&id).cloned())
    }

    async fn list_connections(&self, workspace_id: i64) -> Result<Vec<WsConnection>, StorageError> {
        let inner = self.inner.lock();
        let mut conns: Vec<WsConnection> = inner
            .connections
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect();
        conns.sort_by_key(|c| c.id);
        Ok(conns)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
