// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan: the parent lifecycle record for one user-initiated scan.

use crate::clock::Clock;
use crate::options::ScanOptions;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Unique identifier for a scan.
    pub struct ScanId("scn-");
}

/// Lifecycle status of a scan, persisted on the scans row.
///
/// The database value is the source of truth for pause/cancel commands
/// issued by CLI or API; the in-memory control mirrors it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanStatus {
    Pending,
    Crawling,
    Scanning,
    NucleiIntegration,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

crate::simple_display! {
    ScanStatus {
        Pending => "pending",
        Crawling => "crawling",
        Scanning => "scanning",
        NucleiIntegration => "nuclei-integration",
        Paused => "paused",
        Cancelled => "cancelled",
        Completed => "completed",
        Failed => "failed",
    }
}

crate::parse_enum! {
    ScanStatus as "scan status" {
        Pending => "pending",
        Crawling => "crawling",
        Scanning => "scanning",
        NucleiIntegration => "nuclei-integration",
        Paused => "paused",
        Cancelled => "cancelled",
        Completed => "completed",
        Failed => "failed",
    }
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanStatus::Cancelled | ScanStatus::Completed | ScanStatus::Failed)
    }

    /// Statuses under which workers make forward progress.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ScanStatus::Crawling | ScanStatus::Scanning | ScanStatus::NucleiIntegration
        )
    }

    /// The set the control registry reconciles against.
    pub fn is_active_or_paused(&self) -> bool {
        self.is_active() || matches!(self, ScanStatus::Paused)
    }
}

/// Parent lifecycle record for one user-initiated scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scan {
    pub id: ScanId,
    pub workspace_id: i64,
    pub title: String,
    pub status: ScanStatus,
    /// Status before the most recent transition; used to restore after resume
    pub previous_status: Option<ScanStatus>,
    /// Free-form text describing the current stage
    pub phase: String,
    pub options: ScanOptions,
    /// Completed / total jobs × 100
    pub progress: f32,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Scan {
    pub fn new(
        workspace_id: i64,
        title: impl Into<String>,
        options: ScanOptions,
        clock: &impl Clock,
    ) -> Self {
        let now = clock.epoch_ms();
        Self {
            id: ScanId::new(),
            workspace_id,
            title: title.into(),
            status: ScanStatus::Pending,
            previous_status: None,
            phase: String::new(),
            options,
            progress: 0.0,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }
}

crate::builder! {
    pub struct ScanBuilder => Scan {
        into {
            title: String = "test scan",
            phase: String = "",
        }
        set {
            id: ScanId = ScanId::new(),
            workspace_id: i64 = 1,
            status: ScanStatus = ScanStatus::Pending,
            options: ScanOptions = ScanOptions::default(),
            progress: f32 = 0.0,
            created_at_ms: u64 = 1_000_000,
            updated_at_ms: u64 = 1_000_000,
        }
        option {
            previous_status: ScanStatus = None,
        }
    }
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
