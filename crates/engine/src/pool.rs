// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded-parallelism fan-out with panic propagation.
//!
//! `go` suspends the submitter until a slot frees, then spawns the work;
//! `wait` drains every submitted task. A panic inside a task surfaces as
//! an error from `wait`, never silently.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::{JoinError, JoinSet};

use crate::error::EngineError;

pub struct Pool {
    slots: Arc<Semaphore>,
    tasks: AsyncMutex<JoinSet<()>>,
    first_panic: Mutex<Option<String>>,
}

impl Pool {
    /// A pool running at most `limit` tasks in parallel (floored at 1).
    pub fn new(limit: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(limit.max(1))),
            tasks: AsyncMutex::new(JoinSet::new()),
            first_panic: Mutex::new(None),
        }
    }

    /// Submit work. Blocks the caller while all slots are occupied.
    pub async fn go<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Ok(permit) = self.slots.clone().acquire_owned().await else {
            // The semaphore is never closed; an error here means shutdown.
            return;
        };
        let mut tasks = self.tasks.lock().await;
        // Reap already-finished tasks so the set doesn't grow unbounded
        // on long scans; remember the first panic for wait().
        while let Some(result) = tasks.try_join_next() {
            self.record(result);
        }
        tasks.spawn(async move {
            let _permit = permit;
            fut.await;
        });
    }

    /// Block until every submitted task finished. Returns an error if any
    /// task panicked (structured-concurrency propagation).
    pub async fn wait(&self) -> Result<(), EngineError> {
        let mut tasks = self.tasks.lock().await;
        while let Some(result) = tasks.join_next().await {
            self.record(result);
        }
        match self.first_panic.lock().take() {
            Some(message) => Err(EngineError::PoolTaskPanicked(message)),
            None => Ok(()),
        }
    }

    /// Number of currently free slots.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    fn record(&self, result: Result<(), JoinError>) {
        if let Err(e) = result {
            if e.is_panic() {
                let message = panic_message(e);
                let mut first = self.first_panic.lock();
                if first.is_none() {
                    *first = Some(message);
                }
            }
        }
    }
}

fn panic_message(e: JoinError) -> String {
    let payload = e.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
