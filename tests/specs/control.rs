// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Control-plane scenarios: pause/resume/cancel against running workers,
//! registry reconciliation with the database.

use super::harness::{seed_scan, store, wait_until};
use kestrel_core::{FakeClock, ScanStatus};
use kestrel_engine::{commands, ControlRegistry, ControlState};
use kestrel_storage::ScanStore;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn registry_reconciles_with_database_status() {
    let store = store();
    let s1 = seed_scan(&store, ScanStatus::Scanning).await;
    let s2 = seed_scan(&store, ScanStatus::Scanning).await;
    let s3 = seed_scan(&store, ScanStatus::Scanning).await;
    let registry = ControlRegistry::new(store.clone());
    for id in [s1, s2, s3] {
        registry.register(id, ControlState::Running);
    }

    // Commands land in the database only (e.g. from another process)
    store.update_scan_status(&s2, ScanStatus::Paused, 10).await.unwrap();
    store.update_scan_status(&s3, ScanStatus::Cancelled, 10).await.unwrap();

    registry.refresh_from_db().await.unwrap();

    assert_eq!(registry.get(&s1).unwrap().state(), ControlState::Running);
    assert_eq!(registry.get(&s2).unwrap().state(), ControlState::Paused);
    assert!(registry.get(&s3).is_none());

    let in_memory: std::collections::HashSet<_> = registry.registered().into_iter().collect();
    let persisted: std::collections::HashSet<_> = store
        .list_scans_in(&[
            ScanStatus::Crawling,
            ScanStatus::Scanning,
            ScanStatus::NucleiIntegration,
            ScanStatus::Paused,
        ])
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(in_memory, persisted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn paused_controls_block_workers_until_resume_or_cancel() {
    let store = store();
    let id = seed_scan(&store, ScanStatus::Scanning).await;
    let registry = Arc::new(ControlRegistry::new(store.clone()));
    let control = registry.register(id, ControlState::Running);
    let clock = FakeClock::new();

    commands::pause_scan(&store, &registry, &id, &clock).await.unwrap();

    // Workers looping on checkpoint stop making progress
    let progressed = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let mut workers = Vec::new();
    for _ in 0..4 {
        let control = control.clone();
        let progressed = progressed.clone();
        workers.push(tokio::spawn(async move {
            while control.checkpoint().await {
                progressed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let before = progressed.load(std::sync::atomic::Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        progressed.load(std::sync::atomic::Ordering::SeqCst),
        before,
        "no forward progress while paused"
    );

    // Resume wakes every waiter
    commands::resume_scan(&store, &registry, &id, &clock).await.unwrap();
    let resumed = wait_until(Duration::from_secs(2), || {
        let progressed = progressed.clone();
        async move { progressed.load(std::sync::atomic::Ordering::SeqCst) > before }
    })
    .await;
    assert!(resumed, "workers resumed within bounded wake-up time");

    // Cancel stops all of them
    commands::cancel_scan(&store, &registry, &id, &clock).await.unwrap();
    for worker in workers {
        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker observed the cancel")
            .unwrap();
    }
}

#[tokio::test]
async fn cancelled_controls_are_terminal_for_commands_too() {
    let store = store();
    let id = seed_scan(&store, ScanStatus::Scanning).await;
    let registry = ControlRegistry::new(store.clone());
    let control = registry.register(id, ControlState::Running);
    let clock = FakeClock::new();

    commands::cancel_scan(&store, &registry, &id, &clock).await.unwrap();
    assert!(control.is_cancelled());
    assert!(!control.checkpoint().await);

    // Neither pause nor resume applies anymore
    assert!(commands::pause_scan(&store, &registry, &id, &clock).await.is_err());
    assert!(commands::resume_scan(&store, &registry, &id, &clock).await.is_err());
    assert!(!control.set_running());
    assert!(!control.checkpoint().await, "no spurious true after cancel");
}

#[tokio::test]
async fn recover_after_restart_rebuilds_controls() {
    let store = store();
    let paused = seed_scan(&store, ScanStatus::Paused).await;
    let crawling = seed_scan(&store, ScanStatus::Crawling).await;
    seed_scan(&store, ScanStatus::Completed).await;

    // Fresh process: empty registry, recover from persisted status
    let registry = ControlRegistry::new(store.clone());
    let recovered = registry.recover_from_db().await.unwrap();
    assert_eq!(recovered, 2);
    assert_eq!(registry.get(&paused).unwrap().state(), ControlState::Paused);
    assert_eq!(registry.get(&crawling).unwrap().state(), ControlState::Running);
}
