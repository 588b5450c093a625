// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan control commands: pause, resume, cancel, stats.
//!
//! Commands write the database first (the source of truth for processes
//! that don't share memory with the engine), then nudge the in-memory
//! control. An engine in another process converges through its periodic
//! refresh.

use kestrel_core::{Clock, Scan, ScanId, ScanStatus};
use kestrel_storage::{JobStats, JobStore, ScanStore, Store};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::EngineError;
use crate::registry::ControlRegistry;

/// Scan metadata plus per-status job counts, for `scanctl stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanStats {
    pub id: ScanId,
    pub title: String,
    pub status: ScanStatus,
    pub phase: String,
    pub progress: f32,
    pub jobs: JobStats,
    pub total_jobs: u64,
}

async fn require_scan(store: &Arc<dyn Store>, id: &ScanId) -> Result<Scan, EngineError> {
    store
        .get_scan(id)
        .await?
        .ok_or(EngineError::ScanNotFound(*id))
}

/// Pause an active scan. Invalid on paused or terminal scans.
pub async fn pause_scan(
    store: &Arc<dyn Store>,
    registry: &ControlRegistry,
    id: &ScanId,
    clock: &impl Clock,
) -> Result<ScanStatus, EngineError> {
    let scan = require_scan(store, id).await?;
    if !scan.status.is_active() {
        return Err(EngineError::InvalidCommand { command: "pause", id: *id, status: scan.status });
    }
    store
        .update_scan_status(id, ScanStatus::Paused, clock.epoch_ms())
        .await?;
    registry.set_paused(id);
    info!(scan_id = %id, "scan paused");
    Ok(ScanStatus::Paused)
}

/// Resume a paused scan into its pre-pause status.
pub async fn resume_scan(
    store: &Arc<dyn Store>,
    registry: &ControlRegistry,
    id: &ScanId,
    clock: &impl Clock,
) -> Result<ScanStatus, EngineError> {
    let scan = require_scan(store, id).await?;
    if scan.status != ScanStatus::Paused {
        return Err(EngineError::InvalidCommand { command: "resume", id: *id, status: scan.status });
    }
    let target = scan
        .previous_status
        .filter(ScanStatus::is_active)
        .unwrap_or(ScanStatus::Scanning);
    store.update_scan_status(id, target, clock.epoch_ms()).await?;
    registry.set_running(id);
    info!(scan_id = %id, status = %target, "scan resumed");
    Ok(target)
}

/// Cancel a non-terminal scan: persists the status, cancels queued jobs,
/// and signals the control so claimed workers unblock.
pub async fn cancel_scan(
    store: &Arc<dyn Store>,
    registry: &ControlRegistry,
    id: &ScanId,
    clock: &impl Clock,
) -> Result<ScanStatus, EngineError> {
    let scan = require_scan(store, id).await?;
    if scan.status.is_terminal() {
        return Err(EngineError::InvalidCommand { command: "cancel", id: *id, status: scan.status });
    }
    store
        .update_scan_status(id, ScanStatus::Cancelled, clock.epoch_ms())
        .await?;
    let cancelled = store.cancel_jobs_for_scan(id, clock.epoch_ms()).await?;
    registry.set_cancelled(id);
    info!(scan_id = %id, jobs_cancelled = cancelled, "scan cancelled");
    Ok(ScanStatus::Cancelled)
}

/// Pause every active scan. Returns the affected IDs.
pub async fn pause_all(
    store: &Arc<dyn Store>,
    registry: &ControlRegistry,
    clock: &impl Clock,
) -> Result<Vec<ScanId>, EngineError> {
    let active = store
        .list_scans_in(&[ScanStatus::Crawling, ScanStatus::Scanning, ScanStatus::NucleiIntegration])
        .await?;
    let mut paused = Vec::with_capacity(active.len());
    for scan in active {
        pause_scan(store, registry, &scan.id, clock).await?;
        paused.push(scan.id);
    }
    Ok(paused)
}

/// Resume every paused scan. Returns the affected IDs.
pub async fn resume_all(
    store: &Arc<dyn Store>,
    registry: &ControlRegistry,
    clock: &impl Clock,
) -> Result<Vec<ScanId>, EngineError> {
    let paused = store.list_scans_in(&[ScanStatus::Paused]).await?;
    let mut resumed = Vec::with_capacity(paused.len());
    for scan in paused {
        resume_scan(store, registry, &scan.id, clock).await?;
        resumed.push(scan.id);
    }
    Ok(resumed)
}

/// Scan metadata and job counts.
pub async fn scan_stats(store: &Arc<dyn Store>, id: &ScanId) -> Result<ScanStats, EngineError> {
    let scan = require_scan(store, id).await?;
    let jobs = store.job_stats(id).await?;
    Ok(ScanStats {
        id: scan.id,
        title: scan.title,
        status: scan.status,
        phase: scan.phase,
        progress: scan.progress,
        total_jobs: jobs.total(),
        jobs,
    })
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
