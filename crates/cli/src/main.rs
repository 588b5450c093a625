// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! scanctl: control plane CLI for kestrel scans.
//!
//! Commands write the scans table directly; a running engine observes
//! the change through its periodic control refresh.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use kestrel_storage::{PgStore, Store};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::commands::scan::ScanCommand;
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(name = "scanctl", version, about = "Control kestrel scans: pause, resume, cancel, stats")]
struct Cli {
    /// Postgres connection string (defaults to $DATABASE_URL)
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Output format for stats
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Pretty)]
    format: OutputFormat,

    #[command(subcommand)]
    command: ScanCommand,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let url = cli
        .database_url
        .context("no database configured: set DATABASE_URL or pass --database-url")?;
    let store = PgStore::connect(&url)
        .await
        .context("Failed to connect to the scan database")?;
    store
        .init_schema()
        .await
        .context("Failed to prepare the scan schema")?;
    let store: Arc<dyn Store> = Arc::new(store);
    commands::scan::handle(cli.command, store, cli.format).await
}
