// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output formatting for stats: pretty key/value, JSON, or YAML.

use anyhow::Result;
use clap::ValueEnum;
use kestrel_engine::ScanStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Yaml,
}

kestrel_core::simple_display! {
    OutputFormat {
        Pretty => "pretty",
        Json => "json",
        Yaml => "yaml",
    }
}

pub fn render_stats(stats: &ScanStats, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(stats)?,
        OutputFormat::Yaml => serde_yaml::to_string(stats)?,
        OutputFormat::Pretty => render_pretty(stats),
    })
}

fn render_pretty(stats: &ScanStats) -> String {
    let mut out = String::new();
    let rows = [
        ("scan", stats.id.to_string()),
        ("title", stats.title.clone()),
        ("status", stats.status.to_string()),
        ("phase", if stats.phase.is_empty() { "-".to_string() } else { stats.phase.clone() }),
        ("progress", format!("{:.1}%", stats.progress)),
        ("pending", stats.jobs.pending.to_string()),
        ("claimed", stats.jobs.claimed.to_string()),
        ("running", stats.jobs.running.to_string()),
        ("completed", stats.jobs.completed.to_string()),
        ("failed", stats.jobs.failed.to_string()),
        ("cancelled", stats.jobs.cancelled.to_string()),
        ("total", stats.total_jobs.to_string()),
    ];
    let width = rows.iter().map(|(k, _)| k.len()).max().unwrap_or(0);
    for (key, value) in rows {
        out.push_str(&format!("{key:width$}  {value}\n"));
    }
    out
}

#[cfg(test)]
#[path = "output_tests.rs"]
mod tests;
