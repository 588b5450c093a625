// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Full-scan scenarios: pause mid-scan, cancel while paused, end-to-end
//! completion through the orchestrator.

use super::harness::{history_item, jobs_for, seed_scan, store, wait_until};
use kestrel_core::{FakeClock, ScanStatus, TaskStatus, WorkerId};
use kestrel_engine::fakes::FakeSet;
use kestrel_engine::{
    commands, ControlRegistry, ControlState, EngineConfig, FullScanOptions, JobQueue, ScanEngine,
};
use kestrel_core::ScanOptions;
use kestrel_storage::{JobStore, ScanStore, Store, TaskStore};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

struct Rig {
    engine: Arc<ScanEngine>,
    fakes: FakeSet,
    store: Arc<dyn Store>,
}

fn rig() -> Rig {
    let store = store();
    let fakes = FakeSet::new(store.clone());
    let engine = Arc::new(ScanEngine::new(
        store.clone(),
        fakes.collaborators(),
        EngineConfig::default(),
    ));
    Rig { engine, fakes, store }
}

fn scan_request(items: usize, await_completion: bool) -> (FullScanOptions, Vec<kestrel_core::HistoryItem>) {
    let items: Vec<_> = (0..items)
        .map(|i| history_item(i as i64 + 1, &format!("https://example.com/page/{i}")))
        .collect();
    let request = FullScanOptions {
        workspace_id: 1,
        title: "scenario scan".to_string(),
        options: ScanOptions::new(vec!["https://example.com".to_string()])
            .active_pool_size(4)
            .passive_pool_size(4)
            .audit_categories(BTreeSet::new()),
        await_completion,
    };
    (request, items)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn pause_mid_scan_drains_claims_then_resume_completes() {
    let r = rig();
    let (request, items) = scan_request(100, false);
    r.fakes.crawler.set_items(items);
    // In-flight jobs complete rather than block, so pause drains
    r.fakes.active.set_checkpoints(0);
    r.fakes.active.set_delay(Duration::from_millis(10));
    r.fakes.passive.set_delay(Duration::from_millis(10));

    let outcome = r.engine.full_scan(request).await.unwrap();
    let scan_id = outcome.scan_id;

    // Let the workers complete a batch first
    let store = r.store.clone();
    assert!(
        wait_until(Duration::from_secs(10), || {
            let store = store.clone();
            async move { store.job_stats(&scan_id).await.unwrap().completed >= 10 }
        })
        .await,
        "workers never got going"
    );

    let clock = FakeClock::new();
    commands::pause_scan(&r.store, r.engine.registry(), &scan_id, &clock).await.unwrap();

    // Claimed and running drain to zero while work remains pending
    let store = r.store.clone();
    assert!(
        wait_until(Duration::from_secs(5), || {
            let store = store.clone();
            async move {
                let stats = store.job_stats(&scan_id).await.unwrap();
                stats.claimed == 0 && stats.running == 0
            }
        })
        .await,
        "claims did not drain after pause"
    );
    let paused_stats = r.store.job_stats(&scan_id).await.unwrap();
    assert!(paused_stats.pending > 0, "pause arrived before the queue emptied");
    assert_eq!(
        r.store.get_scan(&scan_id).await.unwrap().unwrap().status,
        ScanStatus::Paused
    );

    // No forward progress while paused
    let frozen = r.store.job_stats(&scan_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    let later = r.store.job_stats(&scan_id).await.unwrap();
    assert_eq!(later.completed, frozen.completed);
    assert_eq!(later.failed, frozen.failed);

    commands::resume_scan(&r.store, r.engine.registry(), &scan_id, &clock).await.unwrap();

    let store = r.store.clone();
    assert!(
        wait_until(Duration::from_secs(15), || {
            let store = store.clone();
            async move {
                store.get_scan(&scan_id).await.unwrap().unwrap().status == ScanStatus::Completed
            }
        })
        .await,
        "scan did not complete after resume"
    );

    let stats = r.store.job_stats(&scan_id).await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.open(), 0);
    assert_eq!(stats.completed + stats.failed + stats.cancelled, stats.total());
    let task = r.store.get_task(&outcome.task_id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_while_paused_cancels_everything_and_unblocks_waiters() {
    let store = store();
    let scan = seed_scan(&store, ScanStatus::Paused).await;
    let registry = Arc::new(ControlRegistry::new(store.clone()));
    let control = registry.register(scan, ControlState::Paused);
    let queue = Arc::new(JobQueue::new(store.clone()));
    let clock = FakeClock::new();

    queue.enqueue_batch(jobs_for(scan, 20)).await.unwrap();

    // Two workers hold claims and park on the checkpoint barrier
    let mut parked = Vec::new();
    for n in 0..2 {
        let job = queue.claim(&WorkerId::new(format!("w{n}"))).await.unwrap().unwrap();
        let control = control.clone();
        let queue = queue.clone();
        parked.push(tokio::spawn(async move {
            let resumed = control.checkpoint().await;
            assert!(!resumed, "checkpoint must report cancel, not resume");
            queue.cancel(&job.id).await.unwrap();
        }));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(parked.iter().all(|p| !p.is_finished()), "workers parked while paused");

    commands::cancel_scan(&store, &registry, &scan, &clock).await.unwrap();
    for worker in parked {
        tokio::time::timeout(Duration::from_secs(2), worker).await.unwrap().unwrap();
    }

    let stats = store.job_stats(&scan).await.unwrap();
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.cancelled, 20);
    assert_eq!(stats.completed, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn cancel_mid_scan_reaches_a_terminal_quiescent_state() {
    let r = rig();
    let (request, items) = scan_request(60, false);
    r.fakes.crawler.set_items(items);
    r.fakes.active.set_delay(Duration::from_millis(5));

    let outcome = r.engine.full_scan(request).await.unwrap();
    let scan_id = outcome.scan_id;

    let store = r.store.clone();
    wait_until(Duration::from_secs(10), || {
        let store = store.clone();
        async move { store.job_stats(&scan_id).await.unwrap().completed >= 5 }
    })
    .await;

    let clock = FakeClock::new();
    commands::cancel_scan(&r.store, r.engine.registry(), &scan_id, &clock).await.unwrap();

    let store = r.store.clone();
    let task_id = outcome.task_id;
    assert!(
        wait_until(Duration::from_secs(10), || {
            let store = store.clone();
            async move {
                let stats = store.job_stats(&scan_id).await.unwrap();
                let task = store.get_task(&task_id).await.unwrap().unwrap();
                stats.open() == 0 && task.status == TaskStatus::Cancelled
            }
        })
        .await,
        "cancel never quiesced"
    );

    let stats = r.store.job_stats(&scan_id).await.unwrap();
    assert!(stats.cancelled > 0);
    assert_eq!(stats.completed + stats.failed + stats.cancelled, stats.total());
    assert_eq!(
        r.store.get_scan(&scan_id).await.unwrap().unwrap().status,
        ScanStatus::Cancelled
    );
    // The engine released the control after finalization
    assert!(r.engine.registry().get(&scan_id).is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn synchronous_scan_reports_progress_and_issue_counts() {
    let r = rig();
    let (request, items) = scan_request(10, true);
    r.fakes.crawler.set_items(items);
    r.fakes.active.set_issues(2);

    let outcome = r.engine.full_scan(request).await.unwrap();

    let stats = r.store.job_stats(&outcome.scan_id).await.unwrap();
    assert_eq!(stats.completed, stats.total());
    let scan = r.store.get_scan(&outcome.scan_id).await.unwrap().unwrap();
    assert_eq!(scan.progress, 100.0);

    // Issue counts land on the completed job rows
    let task_jobs = r.store.list_task_jobs(&outcome.task_id).await.unwrap();
    assert!(!task_jobs.is_empty());
    assert!(task_jobs.iter().all(|j| j.completed_at_ms.is_some()));
}
