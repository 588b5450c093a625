// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan control command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use kestrel_core::{ScanId, SystemClock};
use kestrel_engine::{commands, ControlRegistry};
use kestrel_storage::Store;
use std::sync::Arc;

use crate::output::{render_stats, OutputFormat};

#[derive(Subcommand)]
pub enum ScanCommand {
    /// Pause an active scan
    Pause {
        /// Scan ID
        scan_id: String,
    },
    /// Resume a paused scan
    Resume {
        /// Scan ID
        scan_id: String,
    },
    /// Cancel a scan and its queued jobs
    Cancel {
        /// Scan ID
        scan_id: String,
    },
    /// Pause every active scan
    PauseAll,
    /// Resume every paused scan
    ResumeAll,
    /// Show scan metadata and per-status job counts
    Stats {
        /// Scan ID
        scan_id: String,
    },
}

pub async fn handle(
    command: ScanCommand,
    store: Arc<dyn Store>,
    format: OutputFormat,
) -> Result<()> {
    // The CLI has no live engine; setters on this registry are no-ops and
    // the persisted status is what running engines reconcile against.
    let registry = ControlRegistry::new(store.clone());
    let clock = SystemClock;

    match command {
        ScanCommand::Pause { scan_id } => {
            let id = ScanId::from_string(&scan_id);
            let status = commands::pause_scan(&store, &registry, &id, &clock)
                .await
                .with_context(|| format!("Failed to pause scan {scan_id}"))?;
            println!("Scan {scan_id} is now {status}");
        }
        ScanCommand::Resume { scan_id } => {
            let id = ScanId::from_string(&scan_id);
            let status = commands::resume_scan(&store, &registry, &id, &clock)
                .await
                .with_context(|| format!("Failed to resume scan {scan_id}"))?;
            println!("Scan {scan_id} is now {status}");
        }
        ScanCommand::Cancel { scan_id } => {
            let id = ScanId::from_string(&scan_id);
            let status = commands::cancel_scan(&store, &registry, &id, &clock)
                .await
                .with_context(|| format!("Failed to cancel scan {scan_id}"))?;
            println!("Scan {scan_id} is now {status}");
        }
        ScanCommand::PauseAll => {
            let paused = commands::pause_all(&store, &registry, &clock)
                .await
                .context("Failed to pause scans")?;
            match paused.len() {
                0 => println!("No active scans"),
                n => {
                    println!("Paused {n} scan{}", if n == 1 { "" } else { "s" });
                    for id in paused {
                        println!("  {id}");
                    }
                }
            }
        }
        ScanCommand::ResumeAll => {
            let resumed = commands::resume_all(&store, &registry, &clock)
                .await
                .context("Failed to resume scans")?;
            match resumed.len() {
                0 => println!("No paused scans"),
                n => {
                    println!("Resumed {n} scan{}", if n == 1 { "" } else { "s" });
                    for id in resumed {
                        println!("  {id}");
                    }
                }
            }
        }
        ScanCommand::Stats { scan_id } => {
            let id = ScanId::from_string(&scan_id);
            let stats = commands::scan_stats(&store, &id)
                .await
                .with_context(|| format!("Failed to read stats for scan {scan_id}"))?;
            print!("{}", render_stats(&stats, format)?);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "scan_tests.rs"]
mod tests;
