// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task/job lifecycle tracker: the user-visible projection of a scan's
//! progress, plus the task-scoped open-jobs counter the orchestrator
//! waits on for completion.
//!
//! The tracker records execution; it never drives it.

use kestrel_core::{
    Clock, JobTarget, JobType, Scan, SystemClock, Task, TaskId, TaskJob, TaskJobId, TaskJobStatus,
    TaskStatus,
};
use kestrel_storage::{Store, TaskStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::error::EngineError;

pub struct TaskTracker<C: Clock = SystemClock> {
    store: Arc<dyn Store>,
    clock: C,
    open: watch::Sender<u64>,
}

impl<C: Clock> TaskTracker<C> {
    pub fn with_clock(store: Arc<dyn Store>, clock: C) -> Self {
        let (open, _) = watch::channel(0);
        Self { store, clock, open }
    }

    /// Create the task row for a scan, in status crawling.
    pub async fn create_task(&self, scan: &Scan) -> Result<Task, EngineError> {
        let task = Task::new(scan.id, scan.workspace_id, scan.title.clone(), self.clock.epoch_ms());
        self.store.insert_task(&task).await?;
        info!(task_id = %task.id, scan_id = %scan.id, "task created");
        Ok(task)
    }

    pub async fn set_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
    ) -> Result<(), EngineError> {
        self.store
            .update_task_status(id, status, self.clock.epoch_ms())
            .await?;
        info!(task_id = %id, status = %status, "task status");
        Ok(())
    }

    /// Record one scheduled work unit. Increments the open-jobs counter;
    /// the matching decrement happens on the unit's terminal transition.
    pub async fn create_task_job(
        &self,
        task_id: TaskId,
        job_type: JobType,
        target: JobTarget,
    ) -> Result<TaskJob, EngineError> {
        let job = TaskJob::new(task_id, job_type, target, self.clock.epoch_ms());
        self.store.insert_task_job(&job).await?;
        self.open.send_modify(|n| *n += 1);
        info!(task_job_id = %job.id, %task_id, job_type = %job_type, "task job scheduled");
        Ok(job)
    }

    /// Record a status transition. The counter is decremented exactly once
    /// per job, on its first terminal transition; later updates are no-ops.
    pub async fn set_task_job_status(
        &self,
        id: &TaskJobId,
        status: TaskJobStatus,
    ) -> Result<(), EngineError> {
        let before = self.store.get_task_job(id).await?;
        let was_terminal = before.as_ref().is_some_and(|j| j.status.is_terminal());
        let updated = self
            .store
            .update_task_job_status(id, status, self.clock.epoch_ms())
            .await?;
        if let Some(job) = updated {
            info!(task_job_id = %id, status = %job.status, "task job status");
            if job.status.is_terminal() && !was_terminal {
                self.open.send_modify(|n| *n = n.saturating_sub(1));
            }
        }
        Ok(())
    }

    /// Mark every non-terminal task job of `task` with `status`
    /// (cancel/failure finalization). Returns how many were transitioned.
    pub async fn finalize_open_jobs(
        &self,
        task: &TaskId,
        status: TaskJobStatus,
    ) -> Result<u64, EngineError> {
        let mut count = 0;
        for job in self.store.list_task_jobs(task).await? {
            if !job.status.is_terminal() {
                self.set_task_job_status(&job.id, status).await?;
                count += 1;
            }
        }
        Ok(count)
    }

    /// Currently open (scheduled or running) task jobs.
    pub fn open_jobs(&self) -> u64 {
        *self.open.borrow()
    }

    /// Wait until every scheduled job reached a terminal state. Covers
    /// jobs spawned by other jobs, because every scheduled unit passes
    /// through [`create_task_job`](Self::create_task_job).
    pub async fn wait_idle(&self) {
        let mut rx = self.open.subscribe();
        loop {
            if *rx.borrow_and_update() == 0 {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl TaskTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

#[cfg(test)]
#[path = "tracker_tests.rs"]
mod tests;
