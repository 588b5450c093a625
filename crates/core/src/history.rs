// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Records produced by the crawler and consumed by the engine: captured
//! HTTP exchanges, discovered WebSocket connections, and issues.

use crate::task::TaskId;
use serde::{Deserialize, Serialize};

/// One captured HTTP exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub id: i64,
    pub workspace_id: i64,
    pub url: String,
    pub method: String,
    pub status_code: u16,
    pub request_body_size: u64,
    pub response_body_size: u64,
    /// Raw header blobs, keyed by header name
    #[serde(default)]
    pub response_headers: serde_json::Value,
}

impl HistoryItem {
    /// Key used by the orchestrator to drop near-identical crawl results.
    pub fn dedup_key(&self) -> (String, String, u64, u64, u16) {
        (
            self.url.clone(),
            self.method.clone(),
            self.request_body_size,
            self.response_body_size,
            self.status_code,
        )
    }

    /// `scheme://host[:port]` of this item's URL, if it parses.
    pub fn base_url(&self) -> Option<String> {
        let parsed = url::Url::parse(&self.url).ok()?;
        let host = parsed.host_str()?;
        Some(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }

    /// URL path suffix check against an ignored-extension list.
    pub fn has_extension_in(&self, extensions: &[String]) -> bool {
        let path = match url::Url::parse(&self.url) {
            Ok(u) => u.path().to_ascii_lowercase(),
            Err(_) => self.url.to_ascii_lowercase(),
        };
        extensions.iter().any(|ext| path.ends_with(&ext.to_ascii_lowercase()))
    }
}

/// Direction of a WebSocket message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WsDirection {
    Sent,
    Received,
}

/// One WebSocket message observed on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsMessage {
    pub connection_id: i64,
    pub direction: WsDirection,
    pub payload: String,
    pub timestamp_ms: u64,
}

/// A WebSocket connection discovered during crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WsConnection {
    pub id: i64,
    pub workspace_id: i64,
    pub url: String,
}

impl WsConnection {
    /// True for unencrypted `ws://` endpoints.
    pub fn is_cleartext(&self) -> bool {
        self.url.starts_with("ws://")
    }

    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}

/// Severity of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

crate::simple_display! {
    Severity {
        Info => "info",
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

/// A finding reported through the issue sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub code: String,
    pub title: String,
    pub detail: String,
    pub severity: Severity,
    pub url: String,
    pub workspace_id: i64,
    pub task_id: Option<TaskId>,
}

/// Identified technology for a responding host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    pub name: String,
    pub version: Option<String>,
}

impl Fingerprint {
    /// Tag form used to steer active audits.
    pub fn tag(&self) -> String {
        self.name.to_ascii_lowercase().replace(' ', "-")
    }
}
