// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! kestrel-engine: the scan execution engine.
//!
//! Turns a scan request into a durable stream of per-work-unit jobs,
//! dispatches them across bounded worker pools, and enforces
//! pause/resume/cancel semantics with database-backed recovery.

pub mod collaborators;
pub mod commands;
pub mod config;
pub mod control;
pub mod dedup;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod queue;
pub mod rate_limit;
pub mod registry;
pub mod scan_worker;
pub mod tracker;

pub use collaborators::{
    ActiveAuditor, CollaboratorError, Collaborators, CrawlRequest, Crawler, Discoverer,
    HostAnalyzer, IssueReporter, LibraryScanner, NucleiRunner, PassiveAuditor, WsAuditor,
};
pub use dedup::{UrlPathDedup, WsDedup, WsDedupStats};
pub use commands::{cancel_scan, pause_all, pause_scan, resume_all, resume_scan, scan_stats, ScanStats};
pub use config::{CrawlConfig, EngineConfig, NucleiConfig, OobConfig};
pub use control::{ControlState, ScanControl};
pub use error::EngineError;
pub use orchestrator::{FullScanOptions, ScanEngine, ScanOutcome};
pub use pool::Pool;
pub use queue::JobQueue;
pub use rate_limit::{NoopRateLimiter, RateLimiter, ScanPermitLimiter};
pub use registry::ControlRegistry;
pub use scan_worker::{ScanContext, ScanWorker, ACTIVE_KINDS, PASSIVE_KINDS};
pub use tracker::TaskTracker;

#[cfg(any(test, feature = "test-support"))]
pub use collaborators::fakes;
