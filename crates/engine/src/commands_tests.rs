// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::control::ControlState;
use kestrel_core::{FakeClock, ScanJob};
use kestrel_storage::{JobStore, MemoryStore, ScanStore};

struct Fixture {
    store: Arc<dyn Store>,
    registry: ControlRegistry,
    clock: FakeClock,
}

fn fixture() -> Fixture {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = ControlRegistry::new(store.clone());
    Fixture { store, registry, clock: FakeClock::new() }
}

async fn seed(f: &Fixture, status: ScanStatus) -> ScanId {
    let scan = Scan::builder().status(status).build();
    let id = scan.id;
    f.store.insert_scan(&scan).await.unwrap();
    id
}

#[tokio::test]
async fn pause_persists_and_signals_the_control() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Scanning).await;
    let control = f.registry.register(id, ControlState::Running);

    let status = pause_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap();
    assert_eq!(status, ScanStatus::Paused);
    assert!(control.is_paused());

    let scan = f.store.get_scan(&id).await.unwrap().unwrap();
    assert_eq!(scan.status, ScanStatus::Paused);
    assert_eq!(scan.previous_status, Some(ScanStatus::Scanning));
}

#[tokio::test]
async fn pause_rejects_non_active_scans() {
    let f = fixture();
    for status in [ScanStatus::Paused, ScanStatus::Completed, ScanStatus::Pending] {
        let id = seed(&f, status).await;
        let err = pause_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidCommand { command: "pause", .. }));
    }
}

#[tokio::test]
async fn resume_restores_the_previous_status() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Crawling).await;
    f.registry.register(id, ControlState::Running);
    pause_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap();

    let status = resume_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap();
    assert_eq!(status, ScanStatus::Crawling);
    assert!(f.registry.get(&id).unwrap().is_running());
}

#[tokio::test]
async fn resume_defaults_to_scanning_without_previous_status() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Paused).await;
    let status = resume_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap();
    assert_eq!(status, ScanStatus::Scanning);
}

#[tokio::test]
async fn resume_rejects_non_paused_scans() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Scanning).await;
    let err = resume_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidCommand { command: "resume", .. }));
}

#[tokio::test]
async fn cancel_cancels_queue_and_control() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Scanning).await;
    let control = f.registry.register(id, ControlState::Running);
    f.store
        .insert_jobs(&[
            ScanJob::builder().scan_id(id).build(),
            ScanJob::builder().scan_id(id).build(),
        ])
        .await
        .unwrap();

    let status = cancel_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap();
    assert_eq!(status, ScanStatus::Cancelled);
    assert!(control.is_cancelled());
    assert!(control.cancellation_token().is_cancelled());

    let stats = f.store.job_stats(&id).await.unwrap();
    assert_eq!(stats.cancelled, 2);
}

#[tokio::test]
async fn cancel_works_while_paused() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Paused).await;
    let control = f.registry.register(id, ControlState::Paused);
    let status = cancel_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap();
    assert_eq!(status, ScanStatus::Cancelled);
    assert!(control.is_cancelled());
}

#[tokio::test]
async fn cancel_rejects_terminal_scans() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Completed).await;
    let err = cancel_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidCommand { command: "cancel", .. }));
}

#[tokio::test]
async fn commands_on_unknown_scans_fail_cleanly() {
    let f = fixture();
    let id = ScanId::new();
    assert!(matches!(
        pause_scan(&f.store, &f.registry, &id, &f.clock).await.unwrap_err(),
        EngineError::ScanNotFound(_)
    ));
}

#[tokio::test]
async fn pause_all_and_resume_all_cover_the_matching_scans() {
    let f = fixture();
    let a = seed(&f, ScanStatus::Scanning).await;
    let b = seed(&f, ScanStatus::Crawling).await;
    seed(&f, ScanStatus::Completed).await;

    let mut paused = pause_all(&f.store, &f.registry, &f.clock).await.unwrap();
    paused.sort();
    let mut expected = vec![a, b];
    expected.sort();
    assert_eq!(paused, expected);

    let mut resumed = resume_all(&f.store, &f.registry, &f.clock).await.unwrap();
    resumed.sort();
    assert_eq!(resumed, expected);
    assert_eq!(
        f.store.get_scan(&a).await.unwrap().unwrap().status,
        ScanStatus::Scanning
    );
}

#[tokio::test]
async fn stats_combine_scan_metadata_and_job_counts() {
    let f = fixture();
    let id = seed(&f, ScanStatus::Scanning).await;
    f.store
        .insert_jobs(&[ScanJob::builder().scan_id(id).build()])
        .await
        .unwrap();

    let stats = scan_stats(&f.store, &id).await.unwrap();
    assert_eq!(stats.id, id);
    assert_eq!(stats.status, ScanStatus::Scanning);
    assert_eq!(stats.jobs.pending, 1);
    assert_eq!(stats.total_jobs, 1);
}
