// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error type for store operations.

use kestrel_core::ParseEnumError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(#[from] ParseEnumError),

    #[error("scan not found: {0}")]
    ScanNotFound(String),

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("task job not found: {0}")]
    TaskJobNotFound(String),
}
