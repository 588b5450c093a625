// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[tokio::test]
async fn runs_every_submitted_task() {
    let pool = Pool::new(4);
    let count = Arc::new(AtomicUsize::new(0));
    for _ in 0..20 {
        let count = count.clone();
        pool.go(async move {
            count.fetch_add(1, Ordering::SeqCst);
        })
        .await;
    }
    pool.wait().await.unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 20);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn parallelism_never_exceeds_the_limit() {
    let pool = Pool::new(3);
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    for _ in 0..12 {
        let current = current.clone();
        let peak = peak.clone();
        pool.go(async move {
            let now = current.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            current.fetch_sub(1, Ordering::SeqCst);
        })
        .await;
    }
    pool.wait().await.unwrap();
    assert!(peak.load(Ordering::SeqCst) <= 3, "peak = {}", peak.load(Ordering::SeqCst));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn go_blocks_until_a_slot_frees() {
    let pool = Arc::new(Pool::new(1));
    pool.go(async {
        tokio::time::sleep(Duration::from_millis(80)).await;
    })
    .await;

    let started = std::time::Instant::now();
    pool.go(async {}).await;
    assert!(
        started.elapsed() >= Duration::from_millis(40),
        "second submission should have waited for the slot"
    );
    pool.wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panics_surface_through_wait() {
    let pool = Pool::new(2);
    pool.go(async {
        panic!("worker exploded");
    })
    .await;
    pool.go(async {}).await;

    let err = pool.wait().await.unwrap_err();
    match err {
        EngineError::PoolTaskPanicked(message) => assert!(message.contains("worker exploded")),
        other => panic!("expected panic propagation, got {other}"),
    }
}

#[tokio::test]
async fn wait_on_an_empty_pool_returns_immediately() {
    let pool = Pool::new(2);
    pool.wait().await.unwrap();
    assert_eq!(pool.available(), 2);
}

#[tokio::test]
async fn zero_limit_is_floored_to_one() {
    let pool = Pool::new(0);
    assert_eq!(pool.available(), 1);
    pool.go(async {}).await;
    pool.wait().await.unwrap();
}
