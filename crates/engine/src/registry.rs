// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-wide registry of scan controls, reconciled against the store.
//!
//! The database is the source of truth for pause/cancel commands issued
//! by CLI or API (which may not share memory with the engine); the
//! registry bridges them to the in-memory controls workers checkpoint
//! against.

use kestrel_core::{Clock, ScanId, ScanStatus};
use kestrel_storage::{JobStore, ScanStore, Store};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::control::{ControlState, ScanControl};
use crate::error::EngineError;

/// Scan statuses that must have an in-memory control.
const TRACKED: [ScanStatus; 4] = [
    ScanStatus::Crawling,
    ScanStatus::Scanning,
    ScanStatus::NucleiIntegration,
    ScanStatus::Paused,
];

pub struct ControlRegistry {
    store: Arc<dyn Store>,
    controls: RwLock<HashMap<ScanId, Arc<ScanControl>>>,
}

impl ControlRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store, controls: RwLock::new(HashMap::new()) }
    }

    /// Register a control for `scan_id`. Idempotent: an existing control
    /// is returned unchanged.
    pub fn register(&self, scan_id: ScanId, initial: ControlState) -> Arc<ScanControl> {
        let mut controls = self.controls.write();
        controls
            .entry(scan_id)
            .or_insert_with(|| Arc::new(ScanControl::new(scan_id, initial)))
            .clone()
    }

    pub fn get(&self, scan_id: &ScanId) -> Option<Arc<ScanControl>> {
        self.controls.read().get(scan_id).cloned()
    }

    /// Fetch the persisted scan status and instantiate a control for it.
    pub async fn get_or_create(&self, scan_id: &ScanId) -> Result<Arc<ScanControl>, EngineError> {
        if let Some(control) = self.get(scan_id) {
            return Ok(control);
        }
        let scan = self
            .store
            .get_scan(scan_id)
            .await?
            .ok_or(EngineError::ScanNotFound(*scan_id))?;
        Ok(self.register(*scan_id, ControlState::for_status(scan.status)))
    }

    /// Drop the control (after a terminal transition).
    pub fn unregister(&self, scan_id: &ScanId) {
        self.controls.write().remove(scan_id);
    }

    pub fn set_paused(&self, scan_id: &ScanId) -> bool {
        self.get(scan_id).map(|c| c.set_paused()).unwrap_or(false)
    }

    pub fn set_running(&self, scan_id: &ScanId) -> bool {
        self.get(scan_id).map(|c| c.set_running()).unwrap_or(false)
    }

    pub fn set_cancelled(&self, scan_id: &ScanId) -> bool {
        self.get(scan_id).map(|c| c.set_cancelled()).unwrap_or(false)
    }

    /// IDs of all registered controls.
    pub fn registered(&self) -> Vec<ScanId> {
        self.controls.read().keys().copied().collect()
    }

    /// Reconcile in-memory state with persisted status.
    ///
    /// Every active-or-paused scan in the store ends up with a control in
    /// the matching state; every control whose scan left that set is
    /// cancelled and dropped.
    pub async fn refresh_from_db(&self) -> Result<(), EngineError> {
        let persisted = self.store.list_scans_in(&TRACKED).await?;

        let mut seen = std::collections::HashSet::new();
        for scan in &persisted {
            seen.insert(scan.id);
            let control = self.register(scan.id, ControlState::for_status(scan.status));
            match scan.status {
                ScanStatus::Paused => {
                    if control.set_paused() {
                        debug!(scan_id = %scan.id, "paused by persisted status");
                    }
                }
                _ => {
                    if control.set_running() {
                        debug!(scan_id = %scan.id, "resumed by persisted status");
                    }
                }
            }
        }

        let stale: Vec<ScanId> = {
            let controls = self.controls.read();
            controls.keys().filter(|id| !seen.contains(*id)).copied().collect()
        };
        for scan_id in stale {
            info!(%scan_id, "scan left the active set, cancelling control");
            if let Some(control) = self.get(&scan_id) {
                control.set_cancelled();
            }
            self.unregister(&scan_id);
        }
        Ok(())
    }

    /// Startup hook: recreate controls for scans persisted in non-terminal
    /// status so workers can resume them. Returns how many were recovered.
    pub async fn recover_from_db(&self) -> Result<usize, EngineError> {
        let persisted = self.store.list_scans_in(&TRACKED).await?;
        let count = persisted.len();
        for scan in persisted {
            info!(scan_id = %scan.id, status = %scan.status, "recovering scan control");
            self.register(scan.id, ControlState::for_status(scan.status));
        }
        Ok(count)
    }

    /// Background loop calling [`refresh_from_db`](Self::refresh_from_db)
    /// until `stop` fires. Also sweeps stale job claims older than
    /// `stale_after`, when set.
    pub async fn run_periodic_refresh(
        self: Arc<Self>,
        interval: Duration,
        stale_after: Option<Duration>,
        clock: impl Clock,
        stop: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if let Err(e) = self.refresh_from_db().await {
                warn!(error = %e, "control refresh failed");
            }
            if let Some(age) = stale_after {
                let cutoff = clock.epoch_ms().saturating_sub(age.as_millis() as u64);
                match self.store.reset_stale_jobs_older_than(cutoff).await {
                    Ok(0) => {}
                    Ok(n) => info!(released = n, "reset stale job claims"),
                    Err(e) => warn!(error = %e, "stale claim sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
