// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the scan engine.

use kestrel_core::{JobId, JobStatus, ScanId, ScanStatus};
use kestrel_storage::StorageError;
use thiserror::Error;

use crate::collaborators::CollaboratorError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("scan not found: {0}")]
    ScanNotFound(ScanId),

    #[error("job not found: {0}")]
    JobNotFound(JobId),

    #[error("job {id} is {status}, cannot transition to {target}")]
    InvalidJobTransition {
        id: JobId,
        status: JobStatus,
        target: JobStatus,
    },

    #[error("cannot {command} scan {id}: scan is {status}")]
    InvalidCommand {
        command: &'static str,
        id: ScanId,
        status: ScanStatus,
    },

    #[error("crawler failed: {0}")]
    Crawler(#[source] CollaboratorError),

    #[error("pool task panicked: {0}")]
    PoolTaskPanicked(String),

    #[error("invalid config: {0}")]
    Config(String),
}
