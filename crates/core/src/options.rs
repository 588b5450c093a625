// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scan configuration: insertion points, audit categories, and per-item
//! audit inputs handed to the audit collaborators.

use crate::task::{TaskId, TaskJobId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Payload-selection strategy for active audits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Minimal payload set, fastest
    Fast,
    /// Fingerprint-steered payload set
    #[default]
    Smart,
    /// Full payload set
    Fuzz,
}

crate::simple_display! {
    ScanMode {
        Fast => "fast",
        Smart => "smart",
        Fuzz => "fuzz",
    }
}

crate::parse_enum! {
    ScanMode as "scan mode" {
        Fast => "fast",
        Smart => "smart",
        Fuzz => "fuzz",
    }
}

/// A named location in a request where active audits substitute payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertionPoint {
    Query,
    #[serde(rename = "urlpath")]
    UrlPath,
    Header,
    Cookie,
    FormField,
    JsonField,
    GraphqlVariable,
    WsMessage,
}

crate::simple_display! {
    InsertionPoint {
        Query => "query",
        UrlPath => "urlpath",
        Header => "header",
        Cookie => "cookie",
        FormField => "form_field",
        JsonField => "json_field",
        GraphqlVariable => "graphql_variable",
        WsMessage => "ws_message",
    }
}

crate::parse_enum! {
    InsertionPoint as "insertion point" {
        Query => "query",
        UrlPath => "urlpath",
        Header => "header",
        Cookie => "cookie",
        FormField => "form_field",
        JsonField => "json_field",
        GraphqlVariable => "graphql_variable",
        WsMessage => "ws_message",
    }
}

impl InsertionPoint {
    /// The default set used when scan options don't name any.
    pub fn default_set() -> Vec<InsertionPoint> {
        vec![
            InsertionPoint::Query,
            InsertionPoint::UrlPath,
            InsertionPoint::Header,
            InsertionPoint::Cookie,
            InsertionPoint::FormField,
            InsertionPoint::JsonField,
        ]
    }
}

/// Audit families that can be switched on per scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Injection,
    ClientSide,
    Authentication,
    Misconfiguration,
    InformationDisclosure,
    Discovery,
    Websocket,
}

crate::simple_display! {
    AuditCategory {
        Injection => "injection",
        ClientSide => "client_side",
        Authentication => "authentication",
        Misconfiguration => "misconfiguration",
        InformationDisclosure => "information_disclosure",
        Discovery => "discovery",
        Websocket => "websocket",
    }
}

impl AuditCategory {
    pub fn all() -> BTreeSet<AuditCategory> {
        [
            AuditCategory::Injection,
            AuditCategory::ClientSide,
            AuditCategory::Authentication,
            AuditCategory::Misconfiguration,
            AuditCategory::InformationDisclosure,
            AuditCategory::Discovery,
            AuditCategory::Websocket,
        ]
        .into_iter()
        .collect()
    }
}

/// WebSocket scan tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WsScanOptions {
    /// Concurrent connections audited per scan
    pub concurrency: usize,
    /// Upper bound on distinct message shapes tracked per task
    pub max_tracked_messages: usize,
}

impl Default for WsScanOptions {
    fn default() -> Self {
        Self { concurrency: 4, max_tracked_messages: 512 }
    }
}

/// Options attached to a scan at creation time. Stored as JSON on the scan
/// row; every stage of the orchestrator reads from here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanOptions {
    pub start_urls: Vec<String>,
    pub max_depth: u32,
    pub max_pages: u32,
    pub crawl_pool_size: usize,
    /// Regex patterns; matching URLs are out of scope
    pub exclude_patterns: Vec<String>,
    pub insertion_points: Vec<InsertionPoint>,
    pub audit_categories: BTreeSet<AuditCategory>,
    pub passive_pool_size: usize,
    pub active_pool_size: usize,
    pub websocket: WsScanOptions,
    pub mode: ScanMode,
    /// Per-job attempt budget (queue `max_attempts`)
    pub max_retries: u32,
    pub experimental_audits: bool,
    pub base_headers: HashMap<String, String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            start_urls: Vec::new(),
            max_depth: 5,
            max_pages: 500,
            crawl_pool_size: 4,
            exclude_patterns: Vec::new(),
            insertion_points: InsertionPoint::default_set(),
            audit_categories: AuditCategory::all(),
            passive_pool_size: 8,
            active_pool_size: 4,
            websocket: WsScanOptions::default(),
            mode: ScanMode::Smart,
            max_retries: crate::job::DEFAULT_MAX_ATTEMPTS,
            experimental_audits: false,
            base_headers: HashMap::new(),
        }
    }
}

impl ScanOptions {
    pub fn new(start_urls: Vec<String>) -> Self {
        Self { start_urls, ..Self::default() }
    }

    crate::setters! {
        set {
            max_depth: u32,
            max_pages: u32,
            crawl_pool_size: usize,
            exclude_patterns: Vec<String>,
            insertion_points: Vec<InsertionPoint>,
            audit_categories: BTreeSet<AuditCategory>,
            passive_pool_size: usize,
            active_pool_size: usize,
            websocket: WsScanOptions,
            mode: ScanMode,
            max_retries: u32,
            experimental_audits: bool,
            base_headers: HashMap<String, String>,
        }
    }

    pub fn has_category(&self, category: AuditCategory) -> bool {
        self.audit_categories.contains(&category)
    }
}

/// Everything an audit collaborator needs to process one work unit.
/// Serialized into the job payload so it survives restarts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditInput {
    pub workspace_id: i64,
    pub task_id: TaskId,
    pub task_job_id: TaskJobId,
    pub mode: ScanMode,
    pub insertion_points: Vec<InsertionPoint>,
    pub fingerprint_tags: Vec<String>,
    pub experimental_audits: bool,
    pub audit_categories: BTreeSet<AuditCategory>,
    pub max_retries: u32,
}

impl AuditInput {
    /// Derive the per-item audit input from scan-level options.
    pub fn from_options(
        options: &ScanOptions,
        workspace_id: i64,
        task_id: TaskId,
        task_job_id: TaskJobId,
    ) -> Self {
        Self {
            workspace_id,
            task_id,
            task_job_id,
            mode: options.mode,
            insertion_points: options.insertion_points.clone(),
            fingerprint_tags: Vec::new(),
            experimental_audits: options.experimental_audits,
            audit_categories: options.audit_categories.clone(),
            max_retries: options.max_retries,
        }
    }

    /// Drop one insertion point (used by URL-path deduplication).
    pub fn without_insertion_point(mut self, point: InsertionPoint) -> Self {
        self.insertion_points.retain(|p| *p != point);
        self
    }
}

#[cfg(test)]
#[path = "options_tests.rs"]
mod tests;
