// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-scan/per-host rate limiter seam. The default does nothing;
//! layered implementations gate network-heavy audit traffic.

use async_trait::async_trait;
use kestrel_core::ScanId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Take a permit for one request against `host` on behalf of `scan`.
    /// May block until a permit is available.
    async fn acquire(&self, scan: &ScanId, host: &str);

    /// Return the permit taken by [`acquire`](Self::acquire).
    fn release(&self, scan: &ScanId, host: &str);
}

/// Default: no limiting at all.
#[derive(Default)]
pub struct NoopRateLimiter;

#[async_trait]
impl RateLimiter for NoopRateLimiter {
    async fn acquire(&self, _scan: &ScanId, _host: &str) {}

    fn release(&self, _scan: &ScanId, _host: &str) {}
}

/// Caps in-flight requests per scan with a semaphore.
pub struct ScanPermitLimiter {
    per_scan: usize,
    scans: Mutex<HashMap<ScanId, Arc<Semaphore>>>,
}

impl ScanPermitLimiter {
    pub fn new(per_scan: usize) -> Self {
        Self { per_scan: per_scan.max(1), scans: Mutex::new(HashMap::new()) }
    }

    fn semaphore(&self, scan: &ScanId) -> Arc<Semaphore> {
        let mut scans = self.scans.lock();
        scans
            .entry(*scan)
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_scan)))
            .clone()
    }

    /// Drop a finished scan's semaphore.
    pub fn forget(&self, scan: &ScanId) {
        self.scans.lock().remove(scan);
    }
}

#[async_trait]
impl RateLimiter for ScanPermitLimiter {
    async fn acquire(&self, scan: &ScanId, _host: &str) {
        let semaphore = self.semaphore(scan);
        if let Ok(permit) = semaphore.acquire_owned().await {
            // Held until release() adds the permit back.
            permit.forget();
        }
    }

    fn release(&self, scan: &ScanId, _host: &str) {
        self.semaphore(scan).add_permits(1);
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
