// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task and task job: the user-facing projection of a scan's activity.
//!
//! These mirror Scan and Scan Job for progress display; they are a
//! reporting surface, not the execution substrate.

use crate::job::{JobTarget, JobType};
use crate::scan::ScanId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a task.
    pub struct TaskId("tsk-");
}

crate::define_id! {
    /// Unique identifier for a task job.
    pub struct TaskJobId("tjb-");
}

/// Display status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Crawling,
    Nuclei,
    Scanning,
    Finished,
    Failed,
    Cancelled,
}

crate::simple_display! {
    TaskStatus {
        Crawling => "crawling",
        Nuclei => "nuclei",
        Scanning => "scanning",
        Finished => "finished",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

crate::parse_enum! {
    TaskStatus as "task status" {
        Crawling => "crawling",
        Nuclei => "nuclei",
        Scanning => "scanning",
        Finished => "finished",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Finished | TaskStatus::Failed | TaskStatus::Cancelled)
    }
}

/// Display status of a task job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskJobStatus {
    Scheduled,
    Running,
    Finished,
    Failed,
    Cancelled,
}

crate::simple_display! {
    TaskJobStatus {
        Scheduled => "scheduled",
        Running => "running",
        Finished => "finished",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

crate::parse_enum! {
    TaskJobStatus as "task job status" {
        Scheduled => "scheduled",
        Running => "running",
        Finished => "finished",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl TaskJobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskJobStatus::Finished | TaskJobStatus::Failed | TaskJobStatus::Cancelled
        )
    }
}

/// User-facing aggregate of one scan's activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub scan_id: ScanId,
    pub workspace_id: i64,
    pub title: String,
    pub status: TaskStatus,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl Task {
    pub fn new(
        scan_id: ScanId,
        workspace_id: i64,
        title: impl Into<String>,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id: TaskId::new(),
            scan_id,
            workspace_id,
            title: title.into(),
            status: TaskStatus::Crawling,
            created_at_ms: epoch_ms,
            completed_at_ms: None,
        }
    }
}

/// One scheduled work item, shown under its task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskJob {
    pub id: TaskJobId,
    pub task_id: TaskId,
    pub job_type: JobType,
    pub target: JobTarget,
    pub status: TaskJobStatus,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
}

impl TaskJob {
    pub fn new(task_id: TaskId, job_type: JobType, target: JobTarget, epoch_ms: u64) -> Self {
        Self {
            id: TaskJobId::new(),
            task_id,
            job_type,
            target,
            status: TaskJobStatus::Scheduled,
            created_at_ms: epoch_ms,
            completed_at_ms: None,
        }
    }
}
