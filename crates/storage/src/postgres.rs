// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Postgres store.
//!
//! Claims use `FOR UPDATE SKIP LOCKED` ordered by `(created_at, id)` so N
//! concurrent claimers receive N distinct rows. All transitions are
//! conditional single-row updates; terminal rows never match the
//! condition, which is what makes the terminal operations idempotent.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use kestrel_core::{
    HistoryItem, JobId, JobResult, JobType, Scan, ScanId, ScanJob, ScanStatus, Task, TaskId,
    TaskJob, TaskJobId, TaskJobStatus, TaskStatus, WorkerId, WsConnection,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::StorageError;
use crate::store::{
    ConnectionStore, HistoryStore, JobStats, JobStore, ScanStore, TaskStore,
};

const SCHEMA: &str = include_str!("schema.sql");

fn ms_to_dt(ms: u64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms as i64).single().unwrap_or_default()
}

fn dt_to_ms(dt: DateTime<Utc>) -> u64 {
    dt.timestamp_millis().max(0) as u64
}

/// Store backed by a Postgres connection pool.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(16).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the scans/scan_jobs/tasks/task_jobs tables if missing.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        tracing::debug!("scan schema ready");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: String,
    scan_id: String,
    job_type: String,
    payload: serde_json::Value,
    status: String,
    worker_id: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    attempts: i32,
    max_attempts: i32,
    error_type: Option<String>,
    error_message: Option<String>,
    issues_found: i32,
    http_status: Option<i32>,
    created_at: DateTime<Utc>,
}

impl JobRow {
    fn into_job(self) -> Result<ScanJob, StorageError> {
        Ok(ScanJob {
            id: JobId::from_string(&self.id),
            scan_id: ScanId::from_string(&self.scan_id),
            job_type: self.job_type.parse::<JobType>()?,
            payload: serde_json::from_value(self.payload)?,
            status: self.status.parse()?,
            worker_id: self.worker_id.map(WorkerId::new),
            claimed_at_ms: self.claimed_at.map(dt_to_ms),
            completed_at_ms: self.completed_at.map(dt_to_ms),
            attempts: self.attempts.max(0) as u32,
            max_attempts: self.max_attempts.max(0) as u32,
            error_type: self.error_type,
            error_message: self.error_message,
            issues_found: self.issues_found.max(0) as u32,
            http_status: self.http_status.and_then(|s| u16::try_from(s).ok()),
            created_at_ms: dt_to_ms(self.created_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct ScanRow {
    id: String,
    workspace_id: i64,
    title: String,
    status: String,
    previous_status: Option<String>,
    phase: String,
    options: serde_json::Value,
    progress: f32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ScanRow {
    fn into_scan(self) -> Result<Scan, StorageError> {
        let previous_status = match self.previous_status {
            Some(s) => Some(s.parse::<ScanStatus>()?),
            None => None,
        };
        Ok(Scan {
            id: ScanId::from_string(&self.id),
            workspace_id: self.workspace_id,
            title: self.title,
            status: self.status.parse()?,
            previous_status,
            phase: self.phase,
            options: serde_json::from_value(self.options)?,
            progress: self.progress,
            created_at_ms: dt_to_ms(self.created_at),
            updated_at_ms: dt_to_ms(self.updated_at),
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    scan_id: String,
    workspace_id: i64,
    title: String,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, StorageError> {
        Ok(Task {
            id: TaskId::from_string(&self.id),
            scan_id: ScanId::from_string(&self.scan_id),
            workspace_id: self.workspace_id,
            title: self.title,
            status: self.status.parse()?,
            created_at_ms: dt_to_ms(self.created_at),
            completed_at_ms: self.completed_at.map(dt_to_ms),
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskJobRow {
    id: String,
    task_id: String,
    job_type: String,
    target: serde_json::Value,
    status: String,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TaskJobRow {
    fn into_task_job(self) -> Result<TaskJob, StorageError> {
        Ok(TaskJob {
            id: TaskJobId::from_string(&self.id),
            task_id: TaskId::from_string(&self.task_id),
            job_type: self.job_type.parse::<JobType>()?,
            target: serde_json::from_value(self.target)?,
            status: self.status.parse()?,
            created_at_ms: dt_to_ms(self.created_at),
            completed_at_ms: self.completed_at.map(dt_to_ms),
        })
    }
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    workspace_id: i64,
    url: String,
    method: String,
    status_code: i32,
    request_body_size: i64,
    response_body_size: i64,
    response_headers: serde_json::Value,
}

impl HistoryRow {
    fn into_item(self) -> HistoryItem {
        HistoryItem {
            id: self.id,
            workspace_id: self.workspace_id,
            url: self.url,
            method: self.method,
            status_code: u16::try_from(self.status_code).unwrap_or(0),
            request_body_size: self.request_body_size.max(0) as u64,
            response_body_size: self.response_body_size.max(0) as u64,
            response_headers: self.response_headers,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ConnRow {
    id: i64,
    workspace_id: i64,
    url: String,
}

const CLAIM_SQL: &str = r#"
WITH next AS (
    SELECT j.id
    FROM scan_jobs j
    WHERE j.status = 'pending'
      AND ($3::text[] IS NULL OR j.job_type = ANY($3))
      AND NOT EXISTS (
          SELECT 1 FROM scans s
          WHERE s.id = j.scan_id AND s.status = 'cancelled'
      )
    ORDER BY j.created_at, j.id
    LIMIT 1
    FOR UPDATE OF j SKIP LOCKED
)
UPDATE scan_jobs
SET status = 'claimed', worker_id = $1, claimed_at = $2
FROM next
WHERE scan_jobs.id = next.id
RETURNING scan_jobs.*
"#;

const FAIL_SQL: &str = r#"
UPDATE scan_jobs
SET attempts = attempts + 1,
    error_type = $2,
    error_message = $3,
    status = CASE WHEN attempts + 1 >= max_attempts THEN 'failed' ELSE 'pending' END,
    worker_id = CASE WHEN attempts + 1 >= max_attempts THEN worker_id ELSE NULL END,
    claimed_at = CASE WHEN attempts + 1 >= max_attempts THEN claimed_at ELSE NULL END,
    completed_at = CASE WHEN attempts + 1 >= max_attempts THEN $4 ELSE completed_at END
WHERE id = $1 AND status IN ('claimed', 'running')
RETURNING *
"#;

#[async_trait]
impl JobStore for PgStore {
    async fn insert_jobs(&self, jobs: &[ScanJob]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for job in jobs {
            sqlx::query(
                r#"
                INSERT INTO scan_jobs (
                    id, scan_id, job_type, payload, status, attempts,
                    max_attempts, issues_found, created_at
                )
                VALUES ($1, $2, $3, $4, 'pending', 0, $5, 0, $6)
                "#,
            )
            .bind(job.id.as_str())
            .bind(job.scan_id.as_str())
            .bind(job.job_type.to_string())
            .bind(serde_json::to_value(&job.payload)?)
            .bind(job.max_attempts as i32)
            .bind(ms_to_dt(job.created_at_ms))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>("SELECT * FROM scan_jobs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn claim_next_job(
        &self,
        worker: &WorkerId,
        kinds: Option<&[JobType]>,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError> {
        let kind_names: Option<Vec<String>> =
            kinds.map(|ks| ks.iter().map(|k| k.to_string()).collect());
        let row = sqlx::query_as::<_, JobRow>(CLAIM_SQL)
            .bind(worker.as_str())
            .bind(ms_to_dt(now_ms))
            .bind(kind_names)
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn mark_job_running(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(
            "UPDATE scan_jobs SET status = 'running' WHERE id = $1 AND status = 'claimed' RETURNING *",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn complete_job(
        &self,
        id: &JobId,
        result: &JobResult,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE scan_jobs
            SET status = 'completed', completed_at = $2, issues_found = $3, http_status = $4
            WHERE id = $1 AND status IN ('claimed', 'running')
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .bind(ms_to_dt(now_ms))
        .bind(result.issues_found as i32)
        .bind(result.http_status.map(|s| s as i32))
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn fail_job(
        &self,
        id: &JobId,
        error_type: &str,
        error_message: &str,
        now_ms: u64,
    ) -> Result<Option<ScanJob>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(FAIL_SQL)
            .bind(id.as_str())
            .bind(error_type)
            .bind(error_message)
            .bind(ms_to_dt(now_ms))
            .fetch_optional(&self.pool)
            .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn release_job(&self, id: &JobId) -> Result<Option<ScanJob>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE scan_jobs
            SET status = 'pending', worker_id = NULL, claimed_at = NULL
            WHERE id = $1 AND status = 'claimed'
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn cancel_job(&self, id: &JobId, now_ms: u64) -> Result<Option<ScanJob>, StorageError> {
        let row = sqlx::query_as::<_, JobRow>(
            r#"
            UPDATE scan_jobs
            SET status = 'cancelled', completed_at = $2
            WHERE id = $1 AND status IN ('pending', 'claimed', 'running')
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .bind(ms_to_dt(now_ms))
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn cancel_jobs_for_scan(
        &self,
        scan: &ScanId,
        now_ms: u64,
    ) -> Result<u64, StorageError> {
        let done = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'cancelled', completed_at = $2
            WHERE scan_id = $1 AND status IN ('pending', 'claimed')
            "#,
        )
        .bind(scan.as_str())
        .bind(ms_to_dt(now_ms))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    async fn job_stats(&self, scan: &ScanId) -> Result<JobStats, StorageError> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT status, COUNT(*) FROM scan_jobs WHERE scan_id = $1 GROUP BY status",
        )
        .bind(scan.as_str())
        .fetch_all(&self.pool)
        .await?;
        let mut stats = JobStats::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.as_str() {
                "pending" => stats.pending = count,
                "claimed" => stats.claimed = count,
                "running" => stats.running = count,
                "completed" => stats.completed = count,
                "failed" => stats.failed = count,
                "cancelled" => stats.cancelled = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    async fn reset_stale_jobs(&self, worker: &WorkerId) -> Result<u64, StorageError> {
        let done = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'pending', worker_id = NULL, claimed_at = NULL
            WHERE worker_id = $1 AND status = 'claimed'
            "#,
        )
        .bind(worker.as_str())
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }

    async fn reset_stale_jobs_older_than(&self, cutoff_ms: u64) -> Result<u64, StorageError> {
        let done = sqlx::query(
            r#"
            UPDATE scan_jobs
            SET status = 'pending', worker_id = NULL, claimed_at = NULL
            WHERE status = 'claimed' AND claimed_at < $1
            "#,
        )
        .bind(ms_to_dt(cutoff_ms))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl ScanStore for PgStore {
    async fn insert_scan(&self, scan: &Scan) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO scans (
                id, workspace_id, title, status, previous_status, phase,
                options, progress, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(scan.id.as_str())
        .bind(scan.workspace_id)
        .bind(&scan.title)
        .bind(scan.status.to_string())
        .bind(scan.previous_status.map(|s| s.to_string()))
        .bind(&scan.phase)
        .bind(serde_json::to_value(&scan.options)?)
        .bind(scan.progress)
        .bind(ms_to_dt(scan.created_at_ms))
        .bind(ms_to_dt(scan.updated_at_ms))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_scan(&self, id: &ScanId) -> Result<Option<Scan>, StorageError> {
        let row = sqlx::query_as::<_, ScanRow>("SELECT * FROM scans WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(ScanRow::into_scan).transpose()
    }

    async fn list_scans_in(&self, statuses: &[ScanStatus]) -> Result<Vec<Scan>, StorageError> {
        let names: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
        let rows = sqlx::query_as::<_, ScanRow>(
            "SELECT * FROM scans WHERE status = ANY($1) ORDER BY created_at, id",
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ScanRow::into_scan).collect()
    }

    async fn update_scan_status(
        &self,
        id: &ScanId,
        status: ScanStatus,
        now_ms: u64,
    ) -> Result<Option<Scan>, StorageError> {
        let row = sqlx::query_as::<_, ScanRow>(
            r#"
            UPDATE scans
            SET previous_status = status, status = $2, updated_at = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(ms_to_dt(now_ms))
        .fetch_optional(&self.pool)
        .await?;
        row.map(ScanRow::into_scan).transpose()
    }

    async fn update_scan_phase(
        &self,
        id: &ScanId,
        phase: &str,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE scans SET phase = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(phase)
            .bind(ms_to_dt(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_scan_progress(
        &self,
        id: &ScanId,
        progress: f32,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE scans SET progress = $2, updated_at = $3 WHERE id = $1")
            .bind(id.as_str())
            .bind(progress)
            .bind(ms_to_dt(now_ms))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskStore for PgStore {
    async fn insert_task(&self, task: &Task) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, scan_id, workspace_id, title, status, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(task.id.as_str())
        .bind(task.scan_id.as_str())
        .bind(task.workspace_id)
        .bind(&task.title)
        .bind(task.status.to_string())
        .bind(ms_to_dt(task.created_at_ms))
        .bind(task.completed_at_ms.map(ms_to_dt))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task(&self, id: &TaskId) -> Result<Option<Task>, StorageError> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskRow::into_task).transpose()
    }

    async fn update_task_status(
        &self,
        id: &TaskId,
        status: TaskStatus,
        now_ms: u64,
    ) -> Result<(), StorageError> {
        let done = sqlx::query(
            r#"
            UPDATE tasks
            SET status = $2, completed_at = CASE WHEN $3 THEN $4 ELSE completed_at END
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(status.is_terminal())
        .bind(ms_to_dt(now_ms))
        .execute(&self.pool)
        .await?;
        if done.rows_affected() == 0 {
            return Err(StorageError::TaskNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn insert_task_job(&self, job: &TaskJob) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO task_jobs (id, task_id, job_type, target, status, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.task_id.as_str())
        .bind(job.job_type.to_string())
        .bind(serde_json::to_value(job.target)?)
        .bind(job.status.to_string())
        .bind(ms_to_dt(job.created_at_ms))
        .bind(job.completed_at_ms.map(ms_to_dt))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_task_job(&self, id: &TaskJobId) -> Result<Option<TaskJob>, StorageError> {
        let row = sqlx::query_as::<_, TaskJobRow>("SELECT * FROM task_jobs WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TaskJobRow::into_task_job).transpose()
    }

    async fn update_task_job_status(
        &self,
        id: &TaskJobId,
        status: TaskJobStatus,
        now_ms: u64,
    ) -> Result<Option<TaskJob>, StorageError> {
        let row = sqlx::query_as::<_, TaskJobRow>(
            r#"
            UPDATE task_jobs
            SET status = $2, completed_at = CASE WHEN $3 THEN $4 ELSE completed_at END
            WHERE id = $1 AND status NOT IN ('finished', 'failed', 'cancelled')
            RETURNING *
            "#,
        )
        .bind(id.as_str())
        .bind(status.to_string())
        .bind(status.is_terminal())
        .bind(ms_to_dt(now_ms))
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => Ok(Some(row.into_task_job()?)),
            // Terminal rows are left unchanged; report the stored state.
            None => self.get_task_job(id).await,
        }
    }

    async fn list_task_jobs(&self, task: &TaskId) -> Result<Vec<TaskJob>, StorageError> {
        let rows = sqlx::query_as::<_, TaskJobRow>(
            "SELECT * FROM task_jobs WHERE task_id = $1 ORDER BY created_at, id",
        )
        .bind(task.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TaskJobRow::into_task_job).collect()
    }
}

#[async_trait]
impl HistoryStore for PgStore {
    async fn upsert_history_items(&self, items: &[HistoryItem]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for item in items {
            sqlx::query(
                r#"
                INSERT INTO history_items (
                    id, workspace_id, url, method, status_code,
                    request_body_size, response_body_size, response_headers
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (id) DO UPDATE SET
                    status_code = EXCLUDED.status_code,
                    response_body_size = EXCLUDED.response_body_size,
                    response_headers = EXCLUDED.response_headers
                "#,
            )
            .bind(item.id)
            .bind(item.workspace_id)
            .bind(&item.url)
            .bind(&item.method)
            .bind(item.status_code as i32)
            .bind(item.request_body_size as i64)
            .bind(item.response_body_size as i64)
            .bind(&item.response_headers)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_history_item(&self, id: i64) -> Result<Option<HistoryItem>, StorageError> {
        let row = sqlx::query_as::<_, HistoryRow>("SELECT * FROM history_items WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(HistoryRow::into_item))
    }
}

#[async_trait]
impl ConnectionStore for PgStore {
    async fn insert_connections(&self, conns: &[WsConnection]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        for conn in conns {
            sqlx::query(
                r#"
                INSERT INTO ws_connections (id, workspace_id, url)
                VALUES ($1, $2, $3)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(conn.id)
            .bind(conn.workspace_id)
            .bind(&conn.url)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_connection(&self, id: i64) -> Result<Option<WsConnection>, StorageError> {
        let row = sqlx::query_as::<_, ConnRow>("SELECT * FROM ws_connections WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| WsConnection { id: r.id, workspace_id: r.workspace_id, url: r.url }))
    }

    async fn list_connections(&self, workspace_id: i64) -> Result<Vec<WsConnection>, StorageError> {
        let rows = sqlx::query_as::<_, ConnRow>(
            "SELECT * FROM ws_connections WHERE workspace_id = $1 ORDER BY id",
        )
        .bind(workspace_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| WsConnection { id: r.id, workspace_id: r.workspace_id, url: r.url })
            .collect())
    }
}
