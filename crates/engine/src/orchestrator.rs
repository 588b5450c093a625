// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The scan orchestrator: end-to-end lifecycle of one full scan.
//!
//! Crawl → passive host analysis → optional Nuclei → retire.js →
//! discovery → WebSocket handling → per-item scheduling → bounded-pool
//! execution → completion. Every scheduling loop checkpoints against the
//! scan's control before submitting its next child unit.

use kestrel_core::{
    Clock, HistoryItem, Issue, JobType, Scan, ScanId, ScanOptions, ScanStatus, Severity,
    SystemClock, Task, TaskId, TaskStatus, WorkerId, WsConnection,
};
use kestrel_storage::{ConnectionStore, HistoryStore, ScanStore, Store};
use parking_lot::RwLock;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collaborators::{Collaborators, CrawlRequest};
use crate::config::EngineConfig;
use crate::control::{ControlState, ScanControl};
use crate::error::EngineError;
use crate::pool::Pool;
use crate::queue::JobQueue;
use crate::rate_limit::{NoopRateLimiter, RateLimiter};
use crate::registry::ControlRegistry;
use crate::scan_worker::{ContextMap, ScanContext, ScanWorker, ACTIVE_KINDS, PASSIVE_KINDS};
use crate::tracker::TaskTracker;

const IDLE_BACKOFF: Duration = Duration::from_millis(50);

/// Request for one full scan.
#[derive(Debug, Clone)]
pub struct FullScanOptions {
    pub workspace_id: i64,
    pub title: String,
    pub options: ScanOptions,
    /// Block until every scheduled job reached a terminal state. When
    /// false the call returns after scheduling and finalization happens
    /// in the background.
    pub await_completion: bool,
}

/// Identifiers of the scan a [`ScanEngine::full_scan`] call created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scan_id: ScanId,
    pub task_id: TaskId,
}

/// The scan execution engine: owns the queue, control registry, pools,
/// and dedup registries it creates. Collaborators are injected.
pub struct ScanEngine<C: Clock = SystemClock> {
    store: Arc<dyn Store>,
    registry: Arc<ControlRegistry>,
    queue: Arc<JobQueue<C>>,
    config: EngineConfig,
    rate: Arc<dyn RateLimiter>,
    collab: Collaborators,
    contexts: ContextMap<C>,
    clock: C,
}

impl ScanEngine<SystemClock> {
    pub fn new(store: Arc<dyn Store>, collab: Collaborators, config: EngineConfig) -> Self {
        Self::with_clock(store, collab, config, SystemClock)
    }
}

impl<C: Clock + 'static> ScanEngine<C> {
    pub fn with_clock(
        store: Arc<dyn Store>,
        collab: Collaborators,
        config: EngineConfig,
        clock: C,
    ) -> Self {
        let registry = Arc::new(ControlRegistry::new(store.clone()));
        let queue = Arc::new(JobQueue::with_clock(store.clone(), clock.clone()));
        Self {
            store,
            registry,
            queue,
            config,
            rate: Arc::new(NoopRateLimiter),
            collab,
            contexts: Arc::new(RwLock::new(HashMap::new())),
            clock,
        }
    }

    pub fn with_rate_limiter(mut self, rate: Arc<dyn RateLimiter>) -> Self {
        self.rate = rate;
        self
    }

    pub fn registry(&self) -> &Arc<ControlRegistry> {
        &self.registry
    }

    pub fn queue(&self) -> &Arc<JobQueue<C>> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Run one user-initiated full scan.
    pub async fn full_scan(
        self: &Arc<Self>,
        request: FullScanOptions,
    ) -> Result<ScanOutcome, EngineError> {
        // Stage 1: scan row, task row, control
        let mut scan = Scan::new(
            request.workspace_id,
            request.title.clone(),
            request.options.clone(),
            &self.clock,
        );
        scan.status = ScanStatus::Crawling;
        scan.phase = "crawling".to_string();
        self.store.insert_scan(&scan).await?;

        let tracker = Arc::new(TaskTracker::with_clock(self.store.clone(), self.clock.clone()));
        let task = tracker.create_task(&scan).await?;
        let control = self.registry.register(scan.id, ControlState::Running);

        let ctx = Arc::new(ScanContext::new(
            scan.id,
            scan.workspace_id,
            task.id,
            scan.options.clone(),
            self.config.crawl.ignored_extensions.clone(),
            self.store.clone(),
            self.queue.clone(),
            tracker,
            self.clock.clone(),
        ));
        self.contexts.write().insert(scan.id, ctx.clone());
        info!(scan_id = %scan.id, task_id = %task.id, "full scan started");

        let outcome = ScanOutcome { scan_id: scan.id, task_id: task.id };
        match self.drive(&scan, &task, &ctx, &control, request.await_completion).await {
            Ok(()) => Ok(outcome),
            Err(e) => {
                self.fail_scan(&ctx, &e).await;
                Err(e)
            }
        }
    }

    /// Stages 2–10. Any error that escapes is terminal for the scan.
    async fn drive(
        self: &Arc<Self>,
        scan: &Scan,
        task: &Task,
        ctx: &Arc<ScanContext<C>>,
        control: &Arc<ScanControl>,
        await_completion: bool,
    ) -> Result<(), EngineError> {
        // Stage 2: crawl
        let items = self.crawl(scan, task).await?;

        // Stage 3: dedupe near-identical captures
        let items = dedupe_items(items);
        self.store.upsert_history_items(&items).await?;
        info!(scan_id = %scan.id, items = items.len(), "crawl finished");

        if items.is_empty() {
            // Nothing to audit: early finish
            info!(scan_id = %scan.id, "crawler returned no items, finishing early");
            self.finish(ctx, true).await?;
            return Ok(());
        }

        // Stage 4: per-base-URL passive analysis
        let groups = group_by_base_url(&items);
        self.analyze_hosts(scan, ctx, control, &groups).await?;

        // Stage 5: optional Nuclei integration
        self.nuclei(scan, task, ctx, control, &groups).await?;

        // Execution pools; the passive pool also absorbs the
        // fire-and-forget retire.js scans.
        let passive_pool = Arc::new(Pool::new(scan.options.passive_pool_size));
        let active_pool = Arc::new(Pool::new(scan.options.active_pool_size));

        // Stage 6: retire.js, fire-and-forget per item
        for item in items.iter().cloned() {
            let library = self.collab.library.clone();
            passive_pool
                .go(async move {
                    if let Err(e) = library.scan(&item).await {
                        debug!(item_id = item.id, error = %e, "library scan failed");
                    }
                })
                .await;
        }

        // Stage 7: discovery probes per base URL
        if scan.options.has_category(kestrel_core::AuditCategory::Discovery) {
            for group in groups.values() {
                if !control.checkpoint().await {
                    break;
                }
                if let Some(anchor) = group.first() {
                    ctx.schedule_discovery(anchor.id).await?;
                }
            }
        }

        // Stage 8: WebSocket connections
        self.websockets(scan, ctx, control).await?;

        // Stage 9: per-history-item active+passive scheduling
        for item in &items {
            if !control.checkpoint().await {
                break;
            }
            if ctx.should_skip(item) {
                debug!(url = %item.url, "skipping item (404 or ignored extension)");
                continue;
            }
            ctx.schedule_history_item(item).await?;
        }

        // Stage 10: execution and completion
        let stop = CancellationToken::new();
        self.spawn_workers(&active_pool, scan.options.active_pool_size, &ACTIVE_KINDS, &stop)
            .await;
        self.spawn_workers(&passive_pool, scan.options.passive_pool_size, &PASSIVE_KINDS, &stop)
            .await;

        if await_completion {
            self.await_and_finalize(ctx.clone(), control.clone(), active_pool, passive_pool, stop)
                .await
        } else {
            let engine = self.clone();
            let ctx = ctx.clone();
            let control = control.clone();
            tokio::spawn(async move {
                if let Err(e) = engine
                    .await_and_finalize(ctx, control, active_pool, passive_pool, stop)
                    .await
                {
                    warn!(error = %e, "background scan finalization failed");
                }
            });
            Ok(())
        }
    }

    async fn crawl(&self, scan: &Scan, task: &Task) -> Result<Vec<HistoryItem>, EngineError> {
        let request = CrawlRequest {
            start_urls: scan.options.start_urls.clone(),
            max_pages: scan.options.max_pages,
            max_depth: scan.options.max_depth,
            pool_size: scan.options.crawl_pool_size,
            exclude_patterns: scan.options.exclude_patterns.clone(),
            workspace_id: scan.workspace_id,
            task_id: task.id,
            base_headers: scan.options.base_headers.clone(),
        };
        self.collab
            .crawler
            .crawl(request)
            .await
            .map_err(EngineError::Crawler)
    }

    async fn analyze_hosts(
        &self,
        scan: &Scan,
        ctx: &ScanContext<C>,
        control: &ScanControl,
        groups: &BTreeMap<String, Vec<HistoryItem>>,
    ) -> Result<(), EngineError> {
        self.store
            .update_scan_phase(&scan.id, "analyzing", self.clock.epoch_ms())
            .await?;
        let mut tags = BTreeSet::new();
        for (base_url, group) in groups {
            if !control.checkpoint().await {
                break;
            }
            if let Err(e) = self.collab.host.analyze_headers(base_url, group).await {
                warn!(%base_url, error = %e, "header analysis failed");
            }
            match self.collab.host.fingerprint(base_url, group).await {
                Ok(fingerprints) => tags.extend(fingerprints.iter().map(|f| f.tag())),
                Err(e) => warn!(%base_url, error = %e, "fingerprinting failed"),
            }
            if let Err(e) = self.collab.host.detect_infrastructure(base_url).await {
                warn!(%base_url, error = %e, "infrastructure detection failed");
            }
        }
        if !tags.is_empty() {
            info!(scan_id = %scan.id, fingerprints = tags.len(), "fingerprints collected");
        }
        ctx.set_fingerprint_tags(tags.into_iter().collect());
        Ok(())
    }

    async fn nuclei(
        &self,
        scan: &Scan,
        task: &Task,
        ctx: &ScanContext<C>,
        control: &ScanControl,
        groups: &BTreeMap<String, Vec<HistoryItem>>,
    ) -> Result<(), EngineError> {
        let nuclei = &self.config.integrations.nuclei;
        if nuclei.enabled && control.checkpoint().await {
            ctx.tracker.set_task_status(&task.id, TaskStatus::Nuclei).await?;
            self.store
                .update_scan_status(&scan.id, ScanStatus::NucleiIntegration, self.clock.epoch_ms())
                .await?;
            let base_urls: Vec<String> = groups.keys().cloned().collect();
            if let Err(e) = self.collab.nuclei.run(&base_urls, nuclei).await {
                // Integration errors are logged, never fatal
                warn!(scan_id = %scan.id, error = %e, "nuclei integration failed");
            }
        }
        if !control.checkpoint().await {
            // Cancelled: skip the transition into scanning
            return Ok(());
        }
        ctx.tracker.set_task_status(&task.id, TaskStatus::Scanning).await?;
        self.store
            .update_scan_status(&scan.id, ScanStatus::Scanning, self.clock.epoch_ms())
            .await?;
        self.store
            .update_scan_phase(&scan.id, "auditing", self.clock.epoch_ms())
            .await?;
        Ok(())
    }

    async fn websockets(
        &self,
        scan: &Scan,
        ctx: &ScanContext<C>,
        control: &ScanControl,
    ) -> Result<(), EngineError> {
        let connections = self.store.list_connections(scan.workspace_id).await?;
        let in_scope: Vec<WsConnection> = connections
            .into_iter()
            .filter(|c| in_scope(&c.url, &scan.options))
            .collect();
        if in_scope.is_empty() {
            return Ok(());
        }

        // One informational issue per cleartext ws:// host
        let mut reported = HashSet::new();
        for conn in &in_scope {
            let Some(host) = conn.host() else { continue };
            if conn.is_cleartext() && reported.insert(host.clone()) {
                let issue = Issue {
                    code: "websocket-cleartext".to_string(),
                    title: "Cleartext WebSocket endpoint".to_string(),
                    detail: format!("WebSocket traffic to {host} is not encrypted"),
                    severity: Severity::Info,
                    url: conn.url.clone(),
                    workspace_id: scan.workspace_id,
                    task_id: Some(ctx.task_id),
                };
                if let Err(e) = self.collab.issues.report(issue).await {
                    warn!(%host, error = %e, "cleartext websocket issue not recorded");
                }
            }
        }

        if scan.options.has_category(kestrel_core::AuditCategory::Websocket) {
            for conn in &in_scope {
                if !control.checkpoint().await {
                    break;
                }
                ctx.schedule_ws_connection(conn).await?;
            }
        }
        Ok(())
    }

    async fn spawn_workers(
        self: &Arc<Self>,
        pool: &Arc<Pool>,
        count: usize,
        kinds: &[JobType],
        stop: &CancellationToken,
    ) {
        for _ in 0..count.max(1) {
            let worker = ScanWorker::new(
                WorkerId::generate(kind_label(kinds)),
                self.store.clone(),
                self.queue.clone(),
                self.registry.clone(),
                self.contexts.clone(),
                self.collab.clone(),
                self.rate.clone(),
                kinds.to_vec(),
                IDLE_BACKOFF,
                self.clock.clone(),
            );
            let stop = stop.child_token();
            pool.go(async move { worker.run(stop).await }).await;
        }
    }

    /// Wait for the task-scoped counter to drain (or cancellation), stop
    /// the workers, drain the pools, and finalize the task and scan.
    async fn await_and_finalize(
        self: &Arc<Self>,
        ctx: Arc<ScanContext<C>>,
        control: Arc<ScanControl>,
        active_pool: Arc<Pool>,
        passive_pool: Arc<Pool>,
        stop: CancellationToken,
    ) -> Result<(), EngineError> {
        let cancelled = control.cancellation_token();
        tokio::select! {
            _ = ctx.tracker.wait_idle() => {}
            _ = cancelled.cancelled() => {}
        }
        stop.cancel();
        let active_result = active_pool.wait().await;
        let passive_result = passive_pool.wait().await;

        let active_stats = ctx.ws_dedup_active.stats();
        let passive_stats = ctx.ws_dedup_passive.stats();
        info!(
            scan_id = %ctx.scan_id,
            ws_active_messages = active_stats.messages,
            ws_active_skipped = active_stats.skipped,
            ws_passive_messages = passive_stats.messages,
            ws_passive_skipped = passive_stats.skipped,
            "websocket dedup statistics"
        );

        if let Err(e) = active_result.and(passive_result) {
            self.fail_scan(&ctx, &e).await;
            return Err(e);
        }

        if control.is_cancelled() {
            // The command path cancelled the queue rows; mirror that on
            // the task projection so the counter and UI agree.
            ctx.tracker
                .finalize_open_jobs(&ctx.task_id, kestrel_core::TaskJobStatus::Cancelled)
                .await?;
            ctx.tracker.set_task_status(&ctx.task_id, TaskStatus::Cancelled).await?;
            self.teardown(&ctx.scan_id);
            info!(scan_id = %ctx.scan_id, "scan cancelled");
            return Ok(());
        }

        self.finish(&ctx, false).await
    }

    /// Terminal success path: task finished, scan completed.
    async fn finish(&self, ctx: &ScanContext<C>, early: bool) -> Result<(), EngineError> {
        let now = self.clock.epoch_ms();
        ctx.tracker.set_task_status(&ctx.task_id, TaskStatus::Finished).await?;
        self.store.update_scan_phase(&ctx.scan_id, "finished", now).await?;
        self.store.update_scan_progress(&ctx.scan_id, 100.0, now).await?;
        self.store
            .update_scan_status(&ctx.scan_id, ScanStatus::Completed, now)
            .await?;
        self.teardown(&ctx.scan_id);
        info!(scan_id = %ctx.scan_id, early, "scan completed");
        Ok(())
    }

    /// Terminal failure path. Best-effort: the original error wins.
    async fn fail_scan(&self, ctx: &ScanContext<C>, error: &EngineError) {
        warn!(scan_id = %ctx.scan_id, error = %error, "scan failed");
        let now = self.clock.epoch_ms();
        let _ = ctx
            .tracker
            .finalize_open_jobs(&ctx.task_id, kestrel_core::TaskJobStatus::Failed)
            .await;
        let _ = ctx.tracker.set_task_status(&ctx.task_id, TaskStatus::Failed).await;
        let _ = self
            .store
            .update_scan_status(&ctx.scan_id, ScanStatus::Failed, now)
            .await;
        self.teardown(&ctx.scan_id);
    }

    fn teardown(&self, scan_id: &ScanId) {
        self.contexts.write().remove(scan_id);
        self.registry.unregister(scan_id);
    }
}

/// Drop near-identical crawl captures, keeping first occurrences.
fn dedupe_items(items: Vec<HistoryItem>) -> Vec<HistoryItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.dedup_key()))
        .collect()
}

/// Group items by `scheme://host[:port]`; unparseable URLs are dropped.
fn group_by_base_url(items: &[HistoryItem]) -> BTreeMap<String, Vec<HistoryItem>> {
    let mut groups: BTreeMap<String, Vec<HistoryItem>> = BTreeMap::new();
    for item in items {
        if let Some(base) = item.base_url() {
            groups.entry(base).or_default().push(item.clone());
        }
    }
    groups
}

/// Scope filter: the connection's host must match a start URL's host and
/// no exclude pattern may match its URL.
fn in_scope(conn_url: &str, options: &ScanOptions) -> bool {
    let Some(conn_host) = url::Url::parse(conn_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return false;
    };
    let host_matches = options.start_urls.iter().any(|start| {
        url::Url::parse(start)
            .ok()
            .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            .is_some_and(|h| h == conn_host)
    });
    if !host_matches {
        return false;
    }
    for pattern in &options.exclude_patterns {
        match Regex::new(pattern) {
            Ok(re) => {
                if re.is_match(conn_url) {
                    return false;
                }
            }
            Err(e) => debug!(pattern, error = %e, "ignoring invalid exclude pattern"),
        }
    }
    true
}

fn kind_label(kinds: &[JobType]) -> &'static str {
    if kinds.contains(&JobType::Active) {
        "active"
    } else {
        "passive"
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
