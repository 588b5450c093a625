// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-task WebSocket message deduplication.
//!
//! Two messages with the same shape get audited once. For JSON payloads
//! the shape is the sorted key/type structure, so `{"op":"sub","ch":1}`
//! and `{"op":"sub","ch":2}` are duplicates; non-JSON payloads compare
//! by trimmed text.

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;

/// Counters exported at task completion for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WsDedupStats {
    pub messages: u64,
    pub scanned: u64,
    pub skipped: u64,
}

#[derive(Default)]
struct WsDedupInner {
    seen: HashSet<String>,
    stats: WsDedupStats,
}

/// One instance per task and audit kind (active, passive).
#[derive(Default)]
pub struct WsDedup {
    inner: Mutex<WsDedupInner>,
}

impl WsDedup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Should this message be audited? Marks the shape as seen.
    pub fn should_scan(&self, payload: &str) -> bool {
        let signature = signature(payload);
        let mut inner = self.inner.lock();
        inner.stats.messages += 1;
        if inner.seen.insert(signature) {
            inner.stats.scanned += 1;
            true
        } else {
            inner.stats.skipped += 1;
            false
        }
    }

    pub fn stats(&self) -> WsDedupStats {
        self.inner.lock().stats
    }
}

/// Shape of a message: JSON structure with values erased, or trimmed text.
fn signature(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(value) => {
            let mut out = String::new();
            shape(&value, &mut out);
            out
        }
        Err(_) => format!("raw:{}", payload.trim()),
    }
}

fn shape(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(_) => out.push_str("bool"),
        Value::Number(_) => out.push_str("num"),
        Value::String(_) => out.push_str("str"),
        Value::Array(items) => {
            out.push('[');
            // Arrays are summarized by their first element's shape: lists
            // of homogeneous records are the common case on the wire.
            if let Some(first) = items.first() {
                shape(first, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                out.push_str(key);
                out.push(':');
                if let Some(v) = map.get(key) {
                    shape(v, out);
                }
                out.push(',');
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
#[path = "websocket_tests.rs"]
mod tests;
