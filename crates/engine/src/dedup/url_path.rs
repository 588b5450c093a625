// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-scan URL-path deduplication.
//!
//! When `urlpath` is among a scan's insertion points, the first item for
//! a given normalized path gets the full treatment; later items with the
//! same shape are scanned without the urlpath insertion point. Numeric
//! and UUID segments normalize to a placeholder so `/users/17` and
//! `/users/42` count as the same path.

use parking_lot::Mutex;
use std::collections::HashSet;
use url::Url;

const PLACEHOLDER: &str = ":id";

pub struct UrlPathDedup {
    seen: Mutex<HashSet<String>>,
}

impl UrlPathDedup {
    pub fn new() -> Self {
        Self { seen: Mutex::new(HashSet::new()) }
    }

    /// Normalized form: `scheme://host[:port]/seg1/seg2`, lowercased host,
    /// variable segments reduced to a placeholder, query and fragment
    /// dropped. None when the URL doesn't parse or has no host.
    pub fn normalize(raw: &str) -> Option<String> {
        let parsed = Url::parse(raw).ok()?;
        let host = parsed.host_str()?.to_ascii_lowercase();
        let mut normalized = match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        };
        if let Some(segments) = parsed.path_segments() {
            for segment in segments.filter(|s| !s.is_empty()) {
                normalized.push('/');
                if is_variable_segment(segment) {
                    normalized.push_str(PLACEHOLDER);
                } else {
                    normalized.push_str(segment);
                }
            }
        }
        Some(normalized)
    }

    /// True the first time a path shape is seen (scan it with urlpath);
    /// false on repeats (downgrade). Unparseable URLs are never deduped.
    pub fn check_and_insert(&self, raw: &str) -> bool {
        let Some(normalized) = Self::normalize(raw) else {
            return true;
        };
        self.seen.lock().insert(normalized)
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }
}

impl Default for UrlPathDedup {
    fn default() -> Self {
        Self::new()
    }
}

fn is_variable_segment(segment: &str) -> bool {
    is_numeric(segment) || is_uuid(segment)
}

fn is_numeric(segment: &str) -> bool {
    !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit())
}

fn is_uuid(segment: &str) -> bool {
    if segment.len() != 36 {
        return false;
    }
    segment.bytes().enumerate().all(|(i, b)| match i {
        8 | 13 | 18 | 23 => b == b'-',
        _ => b.is_ascii_hexdigit(),
    })
}

#[cfg(test)]
#[path = "url_path_tests.rs"]
mod tests;
