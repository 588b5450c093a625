// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Interfaces of the engine's external collaborators: crawler, audit
//! modules, fingerprinting, integrations. Only their contracts matter
//! here; implementations live elsewhere and write issues through the
//! database.

use async_trait::async_trait;
use kestrel_core::{
    AuditInput, Fingerprint, HistoryItem, Issue, JobResult, TaskId, WsConnection,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::NucleiConfig;
use crate::control::ScanControl;
use crate::dedup::WsDedup;

/// Error reported by any collaborator. Kinds are collaborator-defined
/// tags recorded on failed jobs (`error_type`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct CollaboratorError {
    pub kind: String,
    pub message: String,
}

impl CollaboratorError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new("network", message)
    }

    pub fn audit(message: impl Into<String>) -> Self {
        Self::new("audit", message)
    }
}

/// Input to the crawler collaborator.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub start_urls: Vec<String>,
    pub max_pages: u32,
    pub max_depth: u32,
    pub pool_size: usize,
    pub exclude_patterns: Vec<String>,
    pub workspace_id: i64,
    pub task_id: TaskId,
    pub base_headers: HashMap<String, String>,
}

/// Crawls the targets and returns captured history items. WebSocket
/// connections are recorded in the database as a side effect.
#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, request: CrawlRequest) -> Result<Vec<HistoryItem>, CollaboratorError>;
}

/// Active audit of one history item. Expected to checkpoint against the
/// control between payload variants and to bind network calls to its
/// cancellation token.
#[async_trait]
pub trait ActiveAuditor: Send + Sync {
    async fn audit(
        &self,
        item: &HistoryItem,
        input: &AuditInput,
        control: &ScanControl,
    ) -> Result<JobResult, CollaboratorError>;
}

/// Passive audit of one history item. Short-running, non-blocking.
#[async_trait]
pub trait PassiveAuditor: Send + Sync {
    async fn analyze(
        &self,
        item: &HistoryItem,
        input: &AuditInput,
    ) -> Result<JobResult, CollaboratorError>;
}

/// WebSocket audit of one connection. Consults the dedup manager per
/// message so repeated shapes are skipped.
#[async_trait]
pub trait WsAuditor: Send + Sync {
    async fn audit_connection(
        &self,
        connection: &WsConnection,
        input: &AuditInput,
        control: &ScanControl,
        dedup: &WsDedup,
    ) -> Result<JobResult, CollaboratorError>;
}

/// Per-base-URL passive analysis: headers, technology fingerprints,
/// CDN/cloud/WAF detection.
#[async_trait]
pub trait HostAnalyzer: Send + Sync {
    async fn analyze_headers(
        &self,
        base_url: &str,
        items: &[HistoryItem],
    ) -> Result<(), CollaboratorError>;

    async fn fingerprint(
        &self,
        base_url: &str,
        items: &[HistoryItem],
    ) -> Result<Vec<Fingerprint>, CollaboratorError>;

    async fn detect_infrastructure(&self, base_url: &str) -> Result<(), CollaboratorError>;
}

/// Nuclei gRPC integration.
#[async_trait]
pub trait NucleiRunner: Send + Sync {
    async fn run(
        &self,
        base_urls: &[String],
        config: &NucleiConfig,
    ) -> Result<(), CollaboratorError>;
}

/// Retire.js-style library scan, fire-and-forget per history item.
#[async_trait]
pub trait LibraryScanner: Send + Sync {
    async fn scan(&self, item: &HistoryItem) -> Result<(), CollaboratorError>;
}

/// File/directory enumeration and well-known endpoint probing.
#[async_trait]
pub trait Discoverer: Send + Sync {
    async fn discover(&self, base_url: &str) -> Result<Vec<HistoryItem>, CollaboratorError>;
}

/// Sink for issues the engine itself reports (e.g. cleartext WebSocket).
#[async_trait]
pub trait IssueReporter: Send + Sync {
    async fn report(&self, issue: Issue) -> Result<(), CollaboratorError>;
}

/// The full collaborator set handed to the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub crawler: Arc<dyn Crawler>,
    pub active: Arc<dyn ActiveAuditor>,
    pub passive: Arc<dyn PassiveAuditor>,
    pub ws_active: Arc<dyn WsAuditor>,
    pub ws_passive: Arc<dyn WsAuditor>,
    pub host: Arc<dyn HostAnalyzer>,
    pub nuclei: Arc<dyn NucleiRunner>,
    pub library: Arc<dyn LibraryScanner>,
    pub discoverer: Arc<dyn Discoverer>,
    pub issues: Arc<dyn IssueReporter>,
}

#[cfg(any(test, feature = "test-support"))]
pub mod fakes {
    //! Recording fakes for engine and downstream tests.

    use super::*;
    use kestrel_storage::{ConnectionStore, Store};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Returns preset items and records WebSocket connections into the
    /// store, mirroring the real crawler's side effect.
    pub struct FakeCrawler {
        store: Arc<dyn Store>,
        pub items: Mutex<Vec<HistoryItem>>,
        pub connections: Mutex<Vec<WsConnection>>,
        pub fail: std::sync::atomic::AtomicBool,
        pub requests: Mutex<Vec<CrawlRequest>>,
    }

    impl FakeCrawler {
        pub fn new(store: Arc<dyn Store>) -> Self {
            Self {
                store,
                items: Mutex::new(Vec::new()),
                connections: Mutex::new(Vec::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn set_items(&self, items: Vec<HistoryItem>) {
            *self.items.lock() = items;
        }

        pub fn set_connections(&self, connections: Vec<WsConnection>) {
            *self.connections.lock() = connections;
        }

        pub fn set_fail(&self, fail: bool) {
            self.fail.store(fail, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Crawler for FakeCrawler {
        async fn crawl(
            &self,
            request: CrawlRequest,
        ) -> Result<Vec<HistoryItem>, CollaboratorError> {
            self.requests.lock().push(request);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::network("crawler unreachable"));
            }
            let connections = self.connections.lock().clone();
            self.store
                .insert_connections(&connections)
                .await
                .map_err(|e| CollaboratorError::new("store", e.to_string()))?;
            Ok(self.items.lock().clone())
        }
    }

    /// Configurable auditor used for both active and passive seams.
    pub struct FakeAuditor {
        pub issues_per_item: AtomicU32,
        pub delay: Mutex<Option<Duration>>,
        /// Control checkpoints per audited item (simulated payload variants).
        pub checkpoints_per_item: AtomicU32,
        /// Fail the first N calls with a network error (then succeed).
        pub fail_first: AtomicU32,
        pub calls: AtomicU32,
        pub seen: Mutex<Vec<i64>>,
        pub inputs: Mutex<Vec<AuditInput>>,
    }

    impl Default for FakeAuditor {
        fn default() -> Self {
            Self {
                issues_per_item: AtomicU32::new(0),
                delay: Mutex::new(None),
                checkpoints_per_item: AtomicU32::new(2),
                fail_first: AtomicU32::new(0),
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
                inputs: Mutex::new(Vec::new()),
            }
        }
    }

    impl FakeAuditor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_checkpoints(&self, n: u32) {
            self.checkpoints_per_item.store(n, Ordering::SeqCst);
        }

        pub fn set_issues(&self, issues_per_item: u32) {
            self.issues_per_item.store(issues_per_item, Ordering::SeqCst);
        }

        pub fn set_delay(&self, delay: Duration) {
            *self.delay.lock() = Some(delay);
        }

        pub fn fail_first(&self, n: u32) {
            self.fail_first.store(n, Ordering::SeqCst);
        }

        pub fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }

        async fn run(&self, item_id: i64, input: &AuditInput) -> Result<JobResult, CollaboratorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push(item_id);
            self.inputs.lock().push(input.clone());
            let delay = *self.delay.lock();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let remaining = self.fail_first.load(Ordering::SeqCst);
            if remaining > 0 {
                self.fail_first.store(remaining - 1, Ordering::SeqCst);
                return Err(CollaboratorError::network("simulated failure"));
            }
            let issues = self.issues_per_item.load(Ordering::SeqCst);
            Ok(JobResult::new(issues).with_http_status(200))
        }
    }

    #[async_trait]
    impl ActiveAuditor for FakeAuditor {
        async fn audit(
            &self,
            item: &HistoryItem,
            input: &AuditInput,
            control: &ScanControl,
        ) -> Result<JobResult, CollaboratorError> {
            // One checkpoint per simulated payload variant
            for _ in 0..self.checkpoints_per_item.load(Ordering::SeqCst) {
                if !control.checkpoint().await {
                    return Err(CollaboratorError::new("cancelled", "scan cancelled"));
                }
            }
            self.run(item.id, input).await
        }
    }

    #[async_trait]
    impl PassiveAuditor for FakeAuditor {
        async fn analyze(
            &self,
            item: &HistoryItem,
            input: &AuditInput,
        ) -> Result<JobResult, CollaboratorError> {
            self.run(item.id, input).await
        }
    }

    /// Audits preset messages per connection through the dedup manager.
    #[derive(Default)]
    pub struct FakeWsAuditor {
        /// connection_id → message payloads
        pub messages: Mutex<HashMap<i64, Vec<String>>>,
        pub audited: AtomicU32,
    }

    impl FakeWsAuditor {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn add_messages(&self, connection_id: i64, payloads: Vec<String>) {
            self.messages.lock().insert(connection_id, payloads);
        }
    }

    #[async_trait]
    impl WsAuditor for FakeWsAuditor {
        async fn audit_connection(
            &self,
            connection: &WsConnection,
            _input: &AuditInput,
            control: &ScanControl,
            dedup: &WsDedup,
        ) -> Result<JobResult, CollaboratorError> {
            let payloads = self
                .messages
                .lock()
                .get(&connection.id)
                .cloned()
                .unwrap_or_default();
            let mut issues = 0;
            for payload in payloads {
                if !control.checkpoint().await {
                    return Err(CollaboratorError::new("cancelled", "scan cancelled"));
                }
                if dedup.should_scan(&payload) {
                    self.audited.fetch_add(1, Ordering::SeqCst);
                    issues += 1;
                }
            }
            Ok(JobResult::new(issues))
        }
    }

    /// Records analyzed hosts; returns preset fingerprints.
    #[derive(Default)]
    pub struct FakeHostAnalyzer {
        pub fingerprints: Mutex<Vec<Fingerprint>>,
        pub fail_headers: std::sync::atomic::AtomicBool,
        pub analyzed: Mutex<Vec<String>>,
    }

    impl FakeHostAnalyzer {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fingerprints(&self, fingerprints: Vec<Fingerprint>) {
            *self.fingerprints.lock() = fingerprints;
        }
    }

    #[async_trait]
    impl HostAnalyzer for FakeHostAnalyzer {
        async fn analyze_headers(
            &self,
            base_url: &str,
            _items: &[HistoryItem],
        ) -> Result<(), CollaboratorError> {
            self.analyzed.lock().push(base_url.to_string());
            if self.fail_headers.load(Ordering::SeqCst) {
                return Err(CollaboratorError::audit("header analysis failed"));
            }
            Ok(())
        }

        async fn fingerprint(
            &self,
            _base_url: &str,
            _items: &[HistoryItem],
        ) -> Result<Vec<Fingerprint>, CollaboratorError> {
            Ok(self.fingerprints.lock().clone())
        }

        async fn detect_infrastructure(&self, _base_url: &str) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeNuclei {
        pub fail: std::sync::atomic::AtomicBool,
        pub runs: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl NucleiRunner for FakeNuclei {
        async fn run(
            &self,
            base_urls: &[String],
            _config: &NucleiConfig,
        ) -> Result<(), CollaboratorError> {
            self.runs.lock().push(base_urls.to_vec());
            if self.fail.load(Ordering::SeqCst) {
                return Err(CollaboratorError::network("nuclei unavailable"));
            }
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeLibraryScanner {
        pub scanned: AtomicU32,
    }

    #[async_trait]
    impl LibraryScanner for FakeLibraryScanner {
        async fn scan(&self, _item: &HistoryItem) -> Result<(), CollaboratorError> {
            self.scanned.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Returns preset items per base URL.
    #[derive(Default)]
    pub struct FakeDiscoverer {
        pub found: Mutex<HashMap<String, Vec<HistoryItem>>>,
        pub probed: Mutex<Vec<String>>,
    }

    impl FakeDiscoverer {
        pub fn add_found(&self, base_url: &str, items: Vec<HistoryItem>) {
            self.found.lock().insert(base_url.to_string(), items);
        }
    }

    #[async_trait]
    impl Discoverer for FakeDiscoverer {
        async fn discover(&self, base_url: &str) -> Result<Vec<HistoryItem>, CollaboratorError> {
            self.probed.lock().push(base_url.to_string());
            Ok(self.found.lock().get(base_url).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct RecordingIssueReporter {
        pub issues: Mutex<Vec<Issue>>,
    }

    #[async_trait]
    impl IssueReporter for RecordingIssueReporter {
        async fn report(&self, issue: Issue) -> Result<(), CollaboratorError> {
            self.issues.lock().push(issue);
            Ok(())
        }
    }

    /// A full fake collaborator set with handles kept for assertions.
    pub struct FakeSet {
        pub crawler: Arc<FakeCrawler>,
        pub active: Arc<FakeAuditor>,
        pub passive: Arc<FakeAuditor>,
        pub ws_active: Arc<FakeWsAuditor>,
        pub ws_passive: Arc<FakeWsAuditor>,
        pub host: Arc<FakeHostAnalyzer>,
        pub nuclei: Arc<FakeNuclei>,
        pub library: Arc<FakeLibraryScanner>,
        pub discoverer: Arc<FakeDiscoverer>,
        pub issues: Arc<RecordingIssueReporter>,
    }

    impl FakeSet {
        pub fn new(store: Arc<dyn Store>) -> Self {
            Self {
                crawler: Arc::new(FakeCrawler::new(store)),
                active: Arc::new(FakeAuditor::new()),
                passive: Arc::new(FakeAuditor::new()),
                ws_active: Arc::new(FakeWsAuditor::new()),
                ws_passive: Arc::new(FakeWsAuditor::new()),
                host: Arc::new(FakeHostAnalyzer::new()),
                nuclei: Arc::new(FakeNuclei::default()),
                library: Arc::new(FakeLibraryScanner::default()),
                discoverer: Arc::new(FakeDiscoverer::default()),
                issues: Arc::new(RecordingIssueReporter::default()),
            }
        }

        pub fn collaborators(&self) -> Collaborators {
            Collaborators {
                crawler: self.crawler.clone(),
                active: self.active.clone(),
                passive: self.passive.clone(),
                ws_active: self.ws_active.clone(),
                ws_passive: self.ws_passive.clone(),
                host: self.host.clone(),
                nuclei: self.nuclei.clone(),
                library: self.library.clone(),
                discoverer: self.discoverer.clone(),
                issues: self.issues.clone(),
            }
        }
    }
}
