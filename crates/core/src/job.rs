// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan job: the durable unit of work claimed and completed by workers.

use crate::clock::Clock;
use crate::options::AuditInput;
use crate::scan::ScanId;
use crate::worker::WorkerId;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a scan job.
    pub struct JobId("sjb-");
}

/// Attempt budget applied when job configuration doesn't set one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Kind of work a job represents. Determines which worker pool executes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    Passive,
    Active,
    WebsocketActive,
    WebsocketPassive,
    Discovery,
}

crate::simple_display! {
    JobType {
        Passive => "passive",
        Active => "active",
        WebsocketActive => "websocket-active",
        WebsocketPassive => "websocket-passive",
        Discovery => "discovery",
    }
}

crate::parse_enum! {
    JobType as "job type" {
        Passive => "passive",
        Active => "active",
        WebsocketActive => "websocket-active",
        WebsocketPassive => "websocket-passive",
        Discovery => "discovery",
    }
}

impl JobType {
    /// Job types executed by the active (network-heavy) pool.
    pub fn is_active_kind(&self) -> bool {
        matches!(self, JobType::Active | JobType::WebsocketActive | JobType::Discovery)
    }
}

/// Queue status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Claimed,
    Running,
    Completed,
    Failed,
    Cancelled,
}

crate::simple_display! {
    JobStatus {
        Pending => "pending",
        Claimed => "claimed",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

crate::parse_enum! {
    JobStatus as "job status" {
        Pending => "pending",
        Claimed => "claimed",
        Running => "running",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl JobStatus {
    /// Terminal states are immutable except for cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled)
    }

    /// A job currently attributed to a worker.
    pub fn is_held(&self) -> bool {
        matches!(self, JobStatus::Claimed | JobStatus::Running)
    }
}

/// Opaque reference to the thing a job audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobTarget {
    History { history_id: i64 },
    WebSocket { connection_id: i64 },
}

impl JobTarget {
    pub fn history(id: i64) -> Self {
        JobTarget::History { history_id: id }
    }

    pub fn websocket(id: i64) -> Self {
        JobTarget::WebSocket { connection_id: id }
    }
}

/// Job payload persisted as JSON in the scan-jobs row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub target: JobTarget,
    pub audit: AuditInput,
}

/// Outcome recorded when a job completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub issues_found: u32,
    pub http_status: Option<u16>,
}

impl JobResult {
    pub fn new(issues_found: u32) -> Self {
        Self { issues_found, http_status: None }
    }

    pub fn with_http_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }
}

/// A unit of work inside a scan.
///
/// Invariants enforced by the stores:
/// - any non-pending job has a non-null `claimed_at_ms`
/// - `attempts <= max_attempts`
/// - terminal states are never transitioned out of
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanJob {
    pub id: JobId,
    pub scan_id: ScanId,
    pub job_type: JobType,
    pub payload: JobPayload,
    pub status: JobStatus,
    pub worker_id: Option<WorkerId>,
    pub claimed_at_ms: Option<u64>,
    pub completed_at_ms: Option<u64>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub issues_found: u32,
    pub http_status: Option<u16>,
    pub created_at_ms: u64,
}

impl ScanJob {
    /// Create a pending job with a fresh ID.
    pub fn new(
        scan_id: ScanId,
        job_type: JobType,
        payload: JobPayload,
        clock: &impl Clock,
    ) -> Self {
        Self::new_with_epoch_ms(scan_id, job_type, payload, clock.epoch_ms())
    }

    /// Create a pending job with an explicit creation timestamp.
    pub fn new_with_epoch_ms(
        scan_id: ScanId,
        job_type: JobType,
        payload: JobPayload,
        epoch_ms: u64,
    ) -> Self {
        Self {
            id: JobId::new(),
            scan_id,
            job_type,
            payload,
            status: JobStatus::Pending,
            worker_id: None,
            claimed_at_ms: None,
            completed_at_ms: None,
            attempts: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            error_type: None,
            error_message: None,
            issues_found: 0,
            http_status: None,
            created_at_ms: epoch_ms,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Task job this work unit mirrors in the UI projection.
    pub fn task_job_id(&self) -> crate::task::TaskJobId {
        self.payload.audit.task_job_id
    }
}

crate::builder! {
    pub struct ScanJobBuilder => ScanJob {
        set {
            id: JobId = JobId::new(),
            scan_id: ScanId = ScanId::new(),
            job_type: JobType = JobType::Active,
            payload: JobPayload = JobPayload {
                target: JobTarget::history(1),
                audit: crate::options::AuditInput::from_options(
                    &crate::options::ScanOptions::default(),
                    1,
                    crate::task::TaskId::new(),
                    crate::task::TaskJobId::new(),
                ),
            },
            status: JobStatus = JobStatus::Pending,
            attempts: u32 = 0,
            max_attempts: u32 = DEFAULT_MAX_ATTEMPTS,
            issues_found: u32 = 0,
            created_at_ms: u64 = 1_000_000,
        }
        option {
            worker_id: WorkerId = None,
            claimed_at_ms: u64 = None,
            completed_at_ms: u64 = None,
            error_type: String = None,
            error_message: String = None,
            http_status: u16 = None,
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
