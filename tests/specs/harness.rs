// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for the scenario tests.

use kestrel_core::{HistoryItem, Scan, ScanId, ScanJob, ScanStatus};
use kestrel_storage::{MemoryStore, ScanStore, Store};
use std::sync::Arc;
use std::time::Duration;

pub fn store() -> Arc<dyn Store> {
    Arc::new(MemoryStore::new())
}

pub async fn seed_scan(store: &Arc<dyn Store>, status: ScanStatus) -> ScanId {
    let scan = Scan::builder().status(status).build();
    let id = scan.id;
    store.insert_scan(&scan).await.unwrap();
    id
}

pub fn jobs_for(scan: ScanId, count: usize) -> Vec<ScanJob> {
    (0..count)
        .map(|i| ScanJob::builder().scan_id(scan).created_at_ms(i as u64).build())
        .collect()
}

pub fn history_item(id: i64, url: &str) -> HistoryItem {
    HistoryItem {
        id,
        workspace_id: 1,
        url: url.to_string(),
        method: "GET".to_string(),
        status_code: 200,
        request_body_size: 0,
        response_body_size: 64,
        response_headers: serde_json::Value::Null,
    }
}

/// Poll `probe` until it returns true or `deadline` elapses.
pub async fn wait_until<F, Fut>(deadline: Duration, mut probe: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let end = std::time::Instant::now() + deadline;
    loop {
        if probe().await {
            return true;
        }
        if std::time::Instant::now() >= end {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
