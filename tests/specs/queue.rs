// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue scenarios: claim concurrency, retry budgets, crash recovery.

use super::harness::{jobs_for, seed_scan, store};
use kestrel_core::{JobResult, JobStatus, ScanStatus, WorkerId};
use kestrel_engine::JobQueue;
use kestrel_storage::JobStore;
use std::collections::HashSet;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn claim_concurrency_every_job_claimed_exactly_once() {
    let store = store();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let queue = Arc::new(JobQueue::new(store.clone()));
    queue.enqueue_batch(jobs_for(scan, 1000)).await.unwrap();

    let mut workers = Vec::new();
    for n in 0..32 {
        let queue = queue.clone();
        workers.push(tokio::spawn(async move {
            let id = WorkerId::new(format!("w{n}"));
            let mut claimed = Vec::new();
            loop {
                match queue.claim(&id).await.unwrap() {
                    Some(job) => {
                        // Completion in zero time; remember the claim
                        assert_eq!(job.worker_id.as_ref(), Some(&id));
                        let done = queue.complete(&job.id, JobResult::new(0)).await.unwrap();
                        assert_eq!(done.worker_id.as_ref(), Some(&id));
                        claimed.push(job.id);
                    }
                    None => return claimed,
                }
            }
        }));
    }

    let mut all = Vec::new();
    for worker in workers {
        all.extend(worker.await.unwrap());
    }
    assert_eq!(all.len(), 1000, "every job claimed");
    let unique: HashSet<_> = all.iter().collect();
    assert_eq!(unique.len(), 1000, "no job claimed twice");

    let stats = queue.stats(&scan).await.unwrap();
    assert_eq!(stats.completed, 1000);
    assert_eq!(stats.open(), 0);
}

#[tokio::test]
async fn retry_then_terminal_failure() {
    let store = store();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let queue = JobQueue::new(store.clone());
    let job = kestrel_core::ScanJob::builder().scan_id(scan).max_attempts(3).build();
    queue.enqueue(job.clone()).await.unwrap();
    let worker = WorkerId::new("w1");

    for attempt in 1..=3u32 {
        let claimed = queue.claim(&worker).await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        let failed = queue
            .fail(&job.id, "network", &format!("attempt {attempt} failed"))
            .await
            .unwrap();
        if attempt < 3 {
            assert_eq!(failed.status, JobStatus::Pending);
        } else {
            assert_eq!(failed.status, JobStatus::Failed);
        }
        assert_eq!(failed.attempts, attempt);
    }

    let stored = store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Failed);
    assert_eq!(stored.attempts, 3);
    assert_eq!(stored.error_message.as_deref(), Some("attempt 3 failed"));
    assert!(queue.claim(&worker).await.unwrap().is_none());
}

#[tokio::test]
async fn worker_crash_recovery_resets_claims() {
    let store = store();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let queue = JobQueue::new(store.clone());
    queue.enqueue_batch(jobs_for(scan, 5)).await.unwrap();

    // w1 claims five jobs and dies without completing any
    let crashed = WorkerId::new("w1");
    for _ in 0..5 {
        queue.claim(&crashed).await.unwrap().unwrap();
    }
    assert_eq!(queue.stats(&scan).await.unwrap().claimed, 5);

    let released = queue.reset_stale(&crashed).await.unwrap();
    assert_eq!(released, 5);
    assert_eq!(queue.stats(&scan).await.unwrap().pending, 5);

    // A fresh worker completes the scan
    let fresh = WorkerId::new("w2");
    while let Some(job) = queue.claim(&fresh).await.unwrap() {
        queue.complete(&job.id, JobResult::new(0)).await.unwrap();
    }
    let stats = queue.stats(&scan).await.unwrap();
    assert_eq!(stats.completed, 5);
    assert_eq!(stats.open(), 0);
}

#[tokio::test]
async fn terminal_statuses_never_regress() {
    let store = store();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let queue = JobQueue::new(store.clone());
    queue.enqueue_batch(jobs_for(scan, 2)).await.unwrap();
    let worker = WorkerId::new("w1");

    let a = queue.claim(&worker).await.unwrap().unwrap();
    queue.complete(&a.id, JobResult::new(1)).await.unwrap();
    let b = queue.claim(&worker).await.unwrap().unwrap();
    queue.cancel(&b.id).await.unwrap();

    // Terminal rows shrug off every further transition
    queue.fail(&a.id, "x", "y").await.unwrap();
    queue.cancel(&a.id).await.unwrap();
    queue.complete(&b.id, JobResult::new(9)).await.unwrap();
    queue.release(&a.id).await.unwrap();

    assert_eq!(store.get_job(&a.id).await.unwrap().unwrap().status, JobStatus::Completed);
    assert_eq!(store.get_job(&b.id).await.unwrap().unwrap().status, JobStatus::Cancelled);
    assert!(queue.reset_stale(&worker).await.unwrap() == 0);
}
