// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-scan scheduling context and the claim → checkpoint → execute loop.
//!
//! A [`ScanContext`] holds the state one scan's scheduling needs: dedup
//! registries, the lifecycle tracker, and the fingerprint tags collected
//! by passive analysis. [`ScanWorker`]s are engine-wide: they claim jobs
//! of any scan and resolve the context per job.

use kestrel_core::{
    AuditInput, Clock, HistoryItem, InsertionPoint, JobPayload, JobResult, JobStatus, JobTarget,
    JobType, ScanId, ScanJob, ScanOptions, SystemClock, TaskId, TaskJobStatus, WorkerId,
    WsConnection,
};
use kestrel_storage::{ConnectionStore, HistoryStore, JobStore, ScanStore, Store};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::collaborators::{CollaboratorError, Collaborators};
use crate::control::{ControlState, ScanControl};
use crate::dedup::{UrlPathDedup, WsDedup};
use crate::error::EngineError;
use crate::queue::JobQueue;
use crate::rate_limit::RateLimiter;
use crate::registry::ControlRegistry;
use crate::tracker::TaskTracker;

/// Shared map scan-id → context, maintained by the orchestrator.
pub type ContextMap<C> = Arc<RwLock<HashMap<ScanId, Arc<ScanContext<C>>>>>;

/// State one scan's scheduling and execution share.
pub struct ScanContext<C: Clock = SystemClock> {
    pub scan_id: ScanId,
    pub workspace_id: i64,
    pub task_id: TaskId,
    pub options: ScanOptions,
    pub tracker: Arc<TaskTracker<C>>,
    pub ws_dedup_active: Arc<WsDedup>,
    pub ws_dedup_passive: Arc<WsDedup>,
    url_dedup: UrlPathDedup,
    fingerprint_tags: Mutex<Vec<String>>,
    ignored_extensions: Vec<String>,
    store: Arc<dyn Store>,
    queue: Arc<JobQueue<C>>,
    clock: C,
}

impl<C: Clock> ScanContext<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scan_id: ScanId,
        workspace_id: i64,
        task_id: TaskId,
        options: ScanOptions,
        ignored_extensions: Vec<String>,
        store: Arc<dyn Store>,
        queue: Arc<JobQueue<C>>,
        tracker: Arc<TaskTracker<C>>,
        clock: C,
    ) -> Self {
        Self {
            scan_id,
            workspace_id,
            task_id,
            options,
            tracker,
            ws_dedup_active: Arc::new(WsDedup::new()),
            ws_dedup_passive: Arc::new(WsDedup::new()),
            url_dedup: UrlPathDedup::new(),
            fingerprint_tags: Mutex::new(Vec::new()),
            ignored_extensions,
            store,
            queue,
            clock,
        }
    }

    pub fn set_fingerprint_tags(&self, tags: Vec<String>) {
        *self.fingerprint_tags.lock() = tags;
    }

    /// Skip rules for active scanning: 404 responses and ignored extensions.
    pub fn should_skip(&self, item: &HistoryItem) -> bool {
        item.status_code == 404 || item.has_extension_in(&self.ignored_extensions)
    }

    fn audit_input(&self, task_job_id: kestrel_core::TaskJobId) -> AuditInput {
        let mut input =
            AuditInput::from_options(&self.options, self.workspace_id, self.task_id, task_job_id);
        input.fingerprint_tags = self.fingerprint_tags.lock().clone();
        input
    }

    async fn enqueue(
        &self,
        job_type: JobType,
        target: JobTarget,
        input: AuditInput,
    ) -> Result<(), EngineError> {
        let job = ScanJob::new(
            self.scan_id,
            job_type,
            JobPayload { target, audit: input },
            &self.clock,
        )
        .with_max_attempts(self.options.max_retries);
        self.queue.enqueue(job).await
    }

    /// Schedule the passive and active scans of one history item, applying
    /// the URL-path dedup policy to the active one.
    pub async fn schedule_history_item(&self, item: &HistoryItem) -> Result<(), EngineError> {
        let target = JobTarget::history(item.id);

        let passive = self
            .tracker
            .create_task_job(self.task_id, JobType::Passive, target)
            .await?;
        self.enqueue(JobType::Passive, target, self.audit_input(passive.id))
            .await?;

        let active = self
            .tracker
            .create_task_job(self.task_id, JobType::Active, target)
            .await?;
        let mut input = self.audit_input(active.id);
        if input.insertion_points.contains(&InsertionPoint::UrlPath)
            && !self.url_dedup.check_and_insert(&item.url)
        {
            debug!(url = %item.url, "repeated path shape, scanning without urlpath");
            input = input.without_insertion_point(InsertionPoint::UrlPath);
        }
        self.enqueue(JobType::Active, target, input).await
    }

    /// Schedule the active and passive WebSocket scans of one connection.
    pub async fn schedule_ws_connection(&self, conn: &WsConnection) -> Result<(), EngineError> {
        let target = JobTarget::websocket(conn.id);
        for job_type in [JobType::WebsocketPassive, JobType::WebsocketActive] {
            let task_job = self.tracker.create_task_job(self.task_id, job_type, target).await?;
            self.enqueue(job_type, target, self.audit_input(task_job.id)).await?;
        }
        Ok(())
    }

    /// Schedule a discovery probe for a base URL, anchored to one of its
    /// history items. The worker expands the results into further scans.
    pub async fn schedule_discovery(&self, anchor_item_id: i64) -> Result<(), EngineError> {
        let target = JobTarget::history(anchor_item_id);
        let task_job = self
            .tracker
            .create_task_job(self.task_id, JobType::Discovery, target)
            .await?;
        self.enqueue(JobType::Discovery, target, self.audit_input(task_job.id)).await
    }

    /// Record discovered items and schedule their scans (jobs spawned by
    /// a job; the tracker counter keeps completion accounting correct).
    pub async fn ingest_discovered(&self, items: Vec<HistoryItem>) -> Result<u32, EngineError> {
        self.store.upsert_history_items(&items).await?;
        let mut scheduled = 0;
        for item in &items {
            if self.should_skip(item) {
                continue;
            }
            self.schedule_history_item(item).await?;
            scheduled += 1;
        }
        Ok(scheduled)
    }
}

/// Job types executed by the active pool.
pub const ACTIVE_KINDS: [JobType; 3] =
    [JobType::Active, JobType::WebsocketActive, JobType::Discovery];

/// Job types executed by the passive pool.
pub const PASSIVE_KINDS: [JobType; 2] = [JobType::Passive, JobType::WebsocketPassive];

/// One claim-execute loop. Spawned through a worker pool.
pub struct ScanWorker<C: Clock = SystemClock> {
    pub id: WorkerId,
    store: Arc<dyn Store>,
    queue: Arc<JobQueue<C>>,
    registry: Arc<ControlRegistry>,
    contexts: ContextMap<C>,
    collab: Collaborators,
    rate: Arc<dyn RateLimiter>,
    kinds: Vec<JobType>,
    idle_backoff: Duration,
    clock: C,
}

impl<C: Clock> ScanWorker<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: WorkerId,
        store: Arc<dyn Store>,
        queue: Arc<JobQueue<C>>,
        registry: Arc<ControlRegistry>,
        contexts: ContextMap<C>,
        collab: Collaborators,
        rate: Arc<dyn RateLimiter>,
        kinds: Vec<JobType>,
        idle_backoff: Duration,
        clock: C,
    ) -> Self {
        Self { id, store, queue, registry, contexts, collab, rate, kinds, idle_backoff, clock }
    }

    /// Claim and process jobs until `stop` fires.
    pub async fn run(&self, stop: CancellationToken) {
        loop {
            if stop.is_cancelled() {
                return;
            }
            match self.queue.claim_kinds(&self.id, Some(self.kinds.as_slice())).await {
                Ok(Some(job)) => {
                    let job_id = job.id;
                    if let Err(e) = self.process(job).await {
                        warn!(worker = %self.id, %job_id, error = %e, "job processing error");
                    }
                }
                Ok(None) => {
                    // No work: back off, keep the loop responsive to stop
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        _ = tokio::time::sleep(self.idle_backoff) => {}
                    }
                }
                Err(e) => {
                    warn!(worker = %self.id, error = %e, "claim failed");
                    tokio::select! {
                        _ = stop.cancelled() => return,
                        _ = tokio::time::sleep(self.idle_backoff) => {}
                    }
                }
            }
        }
    }

    fn context(&self, scan_id: &ScanId) -> Option<Arc<ScanContext<C>>> {
        self.contexts.read().get(scan_id).cloned()
    }

    async fn process(&self, job: ScanJob) -> Result<(), EngineError> {
        let Some(ctx) = self.context(&job.scan_id) else {
            // Scan is not driven by this engine instance anymore; put the
            // claim back for whoever owns it.
            warn!(scan_id = %job.scan_id, job_id = %job.id, "no context for claimed job");
            self.queue.release(&job.id).await?;
            return Ok(());
        };
        let control = self.registry.get_or_create(&job.scan_id).await?;
        let task_job_id = job.task_job_id();

        match control.state() {
            ControlState::Cancelled => {
                self.queue.cancel(&job.id).await?;
                ctx.tracker
                    .set_task_job_status(&task_job_id, TaskJobStatus::Cancelled)
                    .await?;
                self.update_progress(&ctx).await;
                return Ok(());
            }
            ControlState::Paused => {
                // Give the claim back so paused scans drain to pending,
                // then park on the barrier until resume or cancel.
                self.queue.release(&job.id).await?;
                control.checkpoint().await;
                return Ok(());
            }
            ControlState::Running => {}
        }

        let job = self.queue.mark_running(&job.id).await?;
        if job.status != JobStatus::Running {
            // Cancelled between claim and start
            ctx.tracker
                .set_task_job_status(&task_job_id, TaskJobStatus::Cancelled)
                .await?;
            return Ok(());
        }
        ctx.tracker
            .set_task_job_status(&task_job_id, TaskJobStatus::Running)
            .await?;

        match self.execute(&ctx, &job, &control).await {
            Ok(result) => {
                self.queue.complete(&job.id, result).await?;
                ctx.tracker
                    .set_task_job_status(&task_job_id, TaskJobStatus::Finished)
                    .await?;
            }
            Err(err) if control.is_cancelled() => {
                // Cancellation observed mid-flight: not a failure
                debug!(job_id = %job.id, error = %err, "job stopped by cancellation");
                self.queue.cancel(&job.id).await?;
                ctx.tracker
                    .set_task_job_status(&task_job_id, TaskJobStatus::Cancelled)
                    .await?;
            }
            Err(err) => {
                let failed = self.queue.fail(&job.id, &err.kind, &err.message).await?;
                let status = if failed.status == JobStatus::Failed {
                    TaskJobStatus::Failed
                } else {
                    // Back in the queue for another attempt
                    TaskJobStatus::Scheduled
                };
                ctx.tracker.set_task_job_status(&task_job_id, status).await?;
            }
        }
        self.update_progress(&ctx).await;
        Ok(())
    }

    async fn execute(
        &self,
        ctx: &ScanContext<C>,
        job: &ScanJob,
        control: &ScanControl,
    ) -> Result<JobResult, CollaboratorError> {
        let input = &job.payload.audit;
        match job.payload.target {
            JobTarget::History { history_id } => {
                let item = self.history_item(history_id).await?;
                let host = item.base_url().unwrap_or_default();
                self.rate.acquire(&job.scan_id, &host).await;
                let result = match job.job_type {
                    JobType::Active => self.collab.active.audit(&item, input, control).await,
                    JobType::Passive => self.collab.passive.analyze(&item, input).await,
                    JobType::Discovery => self.discover(ctx, &item).await,
                    _ => Err(CollaboratorError::new(
                        "invalid",
                        "websocket job with a history target",
                    )),
                };
                self.rate.release(&job.scan_id, &host);
                result
            }
            JobTarget::WebSocket { connection_id } => {
                let conn = self
                    .store
                    .get_connection(connection_id)
                    .await
                    .map_err(|e| CollaboratorError::new("store", e.to_string()))?
                    .ok_or_else(|| {
                        CollaboratorError::new("store", format!("connection {connection_id} missing"))
                    })?;
                match job.job_type {
                    JobType::WebsocketActive => {
                        self.collab
                            .ws_active
                            .audit_connection(&conn, input, control, &ctx.ws_dedup_active)
                            .await
                    }
                    JobType::WebsocketPassive => {
                        self.collab
                            .ws_passive
                            .audit_connection(&conn, input, control, &ctx.ws_dedup_passive)
                            .await
                    }
                    _ => Err(CollaboratorError::new(
                        "invalid",
                        "history job with a websocket target",
                    )),
                }
            }
        }
    }

    /// Run the discovery probe anchored at `item` and schedule the
    /// resulting items.
    async fn discover(
        &self,
        ctx: &ScanContext<C>,
        item: &HistoryItem,
    ) -> Result<JobResult, CollaboratorError> {
        let base = item
            .base_url()
            .ok_or_else(|| CollaboratorError::new("invalid", "unparseable anchor URL"))?;
        let found = self.collab.discoverer.discover(&base).await?;
        let scheduled = ctx
            .ingest_discovered(found)
            .await
            .map_err(|e| CollaboratorError::new("store", e.to_string()))?;
        debug!(base_url = %base, scheduled, "discovery expanded");
        Ok(JobResult::new(0))
    }

    async fn history_item(&self, id: i64) -> Result<HistoryItem, CollaboratorError> {
        self.store
            .get_history_item(id)
            .await
            .map_err(|e| CollaboratorError::new("store", e.to_string()))?
            .ok_or_else(|| CollaboratorError::new("store", format!("history item {id} missing")))
    }

    async fn update_progress(&self, ctx: &ScanContext<C>) {
        match self.store.job_stats(&ctx.scan_id).await {
            Ok(stats) => {
                let _ = self
                    .store
                    .update_scan_progress(&ctx.scan_id, stats.progress(), self.clock.epoch_ms())
                    .await;
            }
            Err(e) => debug!(scan_id = %ctx.scan_id, error = %e, "progress update skipped"),
        }
    }
}

#[cfg(test)]
#[path = "scan_worker_tests.rs"]
mod tests;
