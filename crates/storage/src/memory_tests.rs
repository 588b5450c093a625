// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use kestrel_core::JobTarget;

fn job_for(scan: ScanId, created_at_ms: u64) -> ScanJob {
    ScanJob::builder().scan_id(scan).created_at_ms(created_at_ms).build()
}

fn worker(name: &str) -> WorkerId {
    WorkerId::new(name)
}

async fn seed_scan(store: &MemoryStore, status: ScanStatus) -> ScanId {
    let scan = Scan::builder().status(status).build();
    let id = scan.id;
    store.insert_scan(&scan).await.unwrap();
    id
}

// ── Claim ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn claim_returns_oldest_pending_first() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let old = job_for(scan, 100);
    let new = job_for(scan, 200);
    store.insert_jobs(&[new.clone(), old.clone()]).await.unwrap();

    let claimed = store.claim_next_job(&worker("w1"), None, 300).await.unwrap().unwrap();
    assert_eq!(claimed.id, old.id);
    assert_eq!(claimed.status, JobStatus::Claimed);
    assert_eq!(claimed.worker_id, Some(WorkerId::new("w1")));
    assert_eq!(claimed.claimed_at_ms, Some(300));
}

#[tokio::test]
async fn claim_returns_none_when_queue_is_empty() {
    let store = MemoryStore::new();
    assert!(store.claim_next_job(&worker("w1"), None, 1).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_skips_jobs_of_cancelled_scans() {
    let store = MemoryStore::new();
    let cancelled = seed_scan(&store, ScanStatus::Cancelled).await;
    let active = seed_scan(&store, ScanStatus::Scanning).await;
    store
        .insert_jobs(&[job_for(cancelled, 100), job_for(active, 200)])
        .await
        .unwrap();

    let claimed = store.claim_next_job(&worker("w1"), None, 300).await.unwrap().unwrap();
    assert_eq!(claimed.scan_id, active);
    assert!(store.claim_next_job(&worker("w1"), None, 300).await.unwrap().is_none());
}

#[tokio::test]
async fn claim_filters_by_job_type() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let passive = ScanJob::builder()
        .scan_id(scan)
        .job_type(JobType::Passive)
        .created_at_ms(100)
        .build();
    let active = ScanJob::builder()
        .scan_id(scan)
        .job_type(JobType::Active)
        .created_at_ms(200)
        .build();
    store.insert_jobs(&[passive.clone(), active.clone()]).await.unwrap();

    let claimed = store
        .claim_next_job(&worker("w1"), Some([JobType::Active].as_slice()), 300)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(claimed.id, active.id);
}

#[tokio::test]
async fn two_claims_return_distinct_jobs() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    store.insert_jobs(&[job_for(scan, 1), job_for(scan, 2)]).await.unwrap();

    let a = store.claim_next_job(&worker("w1"), None, 10).await.unwrap().unwrap();
    let b = store.claim_next_job(&worker("w2"), None, 10).await.unwrap().unwrap();
    assert_ne!(a.id, b.id);
    assert!(store.claim_next_job(&worker("w3"), None, 10).await.unwrap().is_none());
}

// ── Complete / fail / cancel ─────────────────────────────────────────────────

#[tokio::test]
async fn complete_requires_a_held_job() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let job = job_for(scan, 1);
    store.insert_jobs(&[job.clone()]).await.unwrap();

    // Pending: not claimable for completion
    let result = JobResult::new(2).with_http_status(200);
    assert!(store.complete_job(&job.id, &result, 10).await.unwrap().is_none());

    store.claim_next_job(&worker("w1"), None, 5).await.unwrap().unwrap();
    let done = store.complete_job(&job.id, &result, 10).await.unwrap().unwrap();
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.issues_found, 2);
    assert_eq!(done.http_status, Some(200));
    assert_eq!(done.completed_at_ms, Some(10));

    // Terminal rows are immutable: a second complete is a no-op
    assert!(store.complete_job(&job.id, &result, 20).await.unwrap().is_none());
}

#[tokio::test]
async fn fail_retries_until_attempt_budget_is_spent() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let job = ScanJob::builder().scan_id(scan).max_attempts(3).build();
    store.insert_jobs(&[job.clone()]).await.unwrap();

    for attempt in 1..=2u32 {
        store.claim_next_job(&worker("w1"), None, 5).await.unwrap().unwrap();
        let failed = store
            .fail_job(&job.id, "network", &format!("timeout {attempt}"), 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, JobStatus::Pending);
        assert_eq!(failed.attempts, attempt);
        assert!(failed.worker_id.is_none());
        assert!(failed.claimed_at_ms.is_none());
    }

    store.claim_next_job(&worker("w1"), None, 5).await.unwrap().unwrap();
    let terminal = store.fail_job(&job.id, "network", "timeout 3", 10).await.unwrap().unwrap();
    assert_eq!(terminal.status, JobStatus::Failed);
    assert_eq!(terminal.attempts, 3);
    assert_eq!(terminal.error_message.as_deref(), Some("timeout 3"));
    assert!(terminal.attempts <= terminal.max_attempts);
}

#[tokio::test]
async fn cancel_covers_every_non_terminal_status() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let first = job_for(scan, 1);
    let second = job_for(scan, 2);
    let third = job_for(scan, 3);
    store
        .insert_jobs(&[first.clone(), second.clone(), third.clone()])
        .await
        .unwrap();
    // Oldest job becomes claimed
    store.claim_next_job(&worker("w1"), None, 5).await.unwrap().unwrap();
    assert_eq!(store.get_job(&first.id).await.unwrap().unwrap().status, JobStatus::Claimed);

    assert!(store.cancel_job(&first.id, 10).await.unwrap().is_some());
    assert!(store.cancel_job(&second.id, 10).await.unwrap().is_some());

    // Running rows are cancellable too (worker-observed cancellation)
    let held = store.claim_next_job(&worker("w1"), None, 6).await.unwrap().unwrap();
    assert_eq!(held.id, third.id);
    store.mark_job_running(&held.id).await.unwrap().unwrap();
    assert!(store.cancel_job(&held.id, 10).await.unwrap().is_some());

    // Terminal rows are not
    assert!(store.cancel_job(&first.id, 20).await.unwrap().is_none());
}

#[tokio::test]
async fn release_returns_a_claimed_job_without_spending_an_attempt() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let job = job_for(scan, 1);
    store.insert_jobs(&[job.clone()]).await.unwrap();
    store.claim_next_job(&worker("w1"), None, 5).await.unwrap().unwrap();

    let released = store.release_job(&job.id).await.unwrap().unwrap();
    assert_eq!(released.status, JobStatus::Pending);
    assert_eq!(released.attempts, 0);
    assert!(released.worker_id.is_none());
    assert!(released.claimed_at_ms.is_none());

    // Pending and running rows are not releasable
    assert!(store.release_job(&job.id).await.unwrap().is_none());
    store.claim_next_job(&worker("w1"), None, 6).await.unwrap().unwrap();
    store.mark_job_running(&job.id).await.unwrap().unwrap();
    assert!(store.release_job(&job.id).await.unwrap().is_none());
}

#[tokio::test]
async fn cancel_jobs_for_scan_counts_transitions() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let other = seed_scan(&store, ScanStatus::Scanning).await;
    store
        .insert_jobs(&[job_for(scan, 1), job_for(scan, 2), job_for(other, 3)])
        .await
        .unwrap();

    assert_eq!(store.cancel_jobs_for_scan(&scan, 10).await.unwrap(), 2);
    let stats = store.job_stats(&scan).await.unwrap();
    assert_eq!(stats.cancelled, 2);
    assert_eq!(store.job_stats(&other).await.unwrap().pending, 1);
}

// ── Stats and recovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn job_stats_counts_every_status() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let jobs: Vec<ScanJob> = (0..4).map(|i| job_for(scan, i)).collect();
    store.insert_jobs(&jobs).await.unwrap();

    let a = store.claim_next_job(&worker("w1"), None, 10).await.unwrap().unwrap();
    store.complete_job(&a.id, &JobResult::new(0), 11).await.unwrap();
    let b = store.claim_next_job(&worker("w1"), None, 12).await.unwrap().unwrap();
    store.mark_job_running(&b.id).await.unwrap();
    let c = store.claim_next_job(&worker("w1"), None, 13).await.unwrap().unwrap();
    store.cancel_job(&c.id, 14).await.unwrap();

    let stats = store.job_stats(&scan).await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.running, 1);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.cancelled, 1);
    assert_eq!(stats.total(), 4);
    assert_eq!(stats.open(), 2);
    // Progress counts completed jobs only, not other terminal states
    assert_eq!(stats.progress(), 25.0);
}

#[tokio::test]
async fn reset_stale_jobs_releases_only_that_workers_claims() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    store
        .insert_jobs(&(0..5).map(|i| job_for(scan, i)).collect::<Vec<_>>())
        .await
        .unwrap();
    for _ in 0..3 {
        store.claim_next_job(&worker("w1"), None, 10).await.unwrap().unwrap();
    }
    store.claim_next_job(&worker("w2"), None, 10).await.unwrap().unwrap();

    assert_eq!(store.reset_stale_jobs(&worker("w1")).await.unwrap(), 3);
    let stats = store.job_stats(&scan).await.unwrap();
    assert_eq!(stats.pending, 4);
    assert_eq!(stats.claimed, 1);
}

#[tokio::test]
async fn reset_stale_jobs_older_than_uses_the_claim_timestamp() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    store.insert_jobs(&[job_for(scan, 1), job_for(scan, 2)]).await.unwrap();
    store.claim_next_job(&worker("w1"), None, 100).await.unwrap().unwrap();
    store.claim_next_job(&worker("w2"), None, 900).await.unwrap().unwrap();

    assert_eq!(store.reset_stale_jobs_older_than(500).await.unwrap(), 1);
    let stats = store.job_stats(&scan).await.unwrap();
    assert_eq!(stats.pending, 1);
    assert_eq!(stats.claimed, 1);
}

// ── Scans and tasks ──────────────────────────────────────────────────────────

#[tokio::test]
async fn update_scan_status_records_previous_status() {
    let store = MemoryStore::new();
    let scan = seed_scan(&store, ScanStatus::Scanning).await;
    let updated = store
        .update_scan_status(&scan, ScanStatus::Paused, 50)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.status, ScanStatus::Paused);
    assert_eq!(updated.previous_status, Some(ScanStatus::Scanning));
    assert_eq!(updated.updated_at_ms, 50);
}

#[tokio::test]
async fn list_scans_in_filters_by_status() {
    let store = MemoryStore::new();
    seed_scan(&store, ScanStatus::Scanning).await;
    seed_scan(&store, ScanStatus::Paused).await;
    seed_scan(&store, ScanStatus::Completed).await;

    let active = store
        .list_scans_in(&[ScanStatus::Scanning, ScanStatus::Paused])
        .await
        .unwrap();
    assert_eq!(active.len(), 2);
}

#[tokio::test]
async fn terminal_task_jobs_are_immutable() {
    let store = MemoryStore::new();
    let task = Task::new(ScanId::new(), 1, "t", 1);
    store.insert_task(&task).await.unwrap();
    let tj = TaskJob::new(task.id, JobType::Active, JobTarget::history(1), 1);
    store.insert_task_job(&tj).await.unwrap();

    store.update_task_job_status(&tj.id, TaskJobStatus::Finished, 10).await.unwrap();
    let after = store
        .update_task_job_status(&tj.id, TaskJobStatus::Failed, 20)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, TaskJobStatus::Finished);
    assert_eq!(after.completed_at_ms, Some(10));
}

// ── Properties ───────────────────────────────────────────────────────────────

mod properties {
    use super::*;
    use proptest::prelude::*;
    use proptest::test_runner::TestCaseError;

    proptest! {
        #[test]
        fn attempts_never_exceed_max_and_failed_is_terminal(
            max_attempts in 1u32..6,
            extra_fails in 0u32..4,
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .build()
                .unwrap();
            let outcome: Result<(), TestCaseError> = rt.block_on(async {
                let store = MemoryStore::new();
                let scan = seed_scan(&store, ScanStatus::Scanning).await;
                let job = ScanJob::builder()
                    .scan_id(scan)
                    .max_attempts(max_attempts)
                    .build();
                store.insert_jobs(&[job.clone()]).await.unwrap();

                let mut last_attempts = 0;
                for _ in 0..(max_attempts + extra_fails) {
                    if store.claim_next_job(&WorkerId::new("w"), None, 1).await.unwrap().is_none() {
                        break;
                    }
                    let failed = store
                        .fail_job(&job.id, "audit", "boom", 2)
                        .await
                        .unwrap()
                        .unwrap();
                    prop_assert!(failed.attempts >= last_attempts);
                    prop_assert!(failed.attempts <= failed.max_attempts);
                    last_attempts = failed.attempts;
                }

                let stored = store.get_job(&job.id).await.unwrap().unwrap();
                prop_assert_eq!(stored.status, JobStatus::Failed);
                prop_assert_eq!(stored.attempts, max_attempts);
                Ok(())
            });
            outcome?;
        }
    }
}
