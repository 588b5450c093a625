// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = {
        "https://example.com/users/list",
        "https://example.com/users/list",
    },
    numeric_segment = {
        "https://example.com/users/42/edit",
        "https://example.com/users/:id/edit",
    },
    uuid_segment = {
        "https://example.com/orders/7f9c24e5-1dd1-4633-aabc-6ab9d6d09e01",
        "https://example.com/orders/:id",
    },
    host_is_lowercased = {
        "https://EXAMPLE.com/A/B",
        "https://example.com/A/B",
    },
    query_dropped = {
        "https://example.com/search?q=1&page=2",
        "https://example.com/search",
    },
    fragment_dropped = {
        "https://example.com/docs#section",
        "https://example.com/docs",
    },
    trailing_slash = {
        "https://example.com/users/",
        "https://example.com/users",
    },
    explicit_port_kept = {
        "http://example.com:8080/x",
        "http://example.com:8080/x",
    },
    root = {
        "https://example.com/",
        "https://example.com",
    },
)]
fn normalize_cases(raw: &str, expected: &str) {
    assert_eq!(UrlPathDedup::normalize(raw).as_deref(), Some(expected));
}

#[test]
fn unparseable_urls_normalize_to_none() {
    assert!(UrlPathDedup::normalize("not a url").is_none());
    assert!(UrlPathDedup::normalize("mailto:x@example.com").is_none());
}

#[test]
fn first_path_shape_wins_the_urlpath_slot() {
    let dedup = UrlPathDedup::new();
    assert!(dedup.check_and_insert("https://example.com/users/1"));
    assert!(!dedup.check_and_insert("https://example.com/users/2"));
    assert!(!dedup.check_and_insert("https://example.com/users/999"));
    assert_eq!(dedup.len(), 1);
}

#[test]
fn distinct_paths_are_independent() {
    let dedup = UrlPathDedup::new();
    assert!(dedup.check_and_insert("https://example.com/users"));
    assert!(dedup.check_and_insert("https://example.com/orders"));
    assert!(dedup.check_and_insert("https://other.com/users"));
    assert_eq!(dedup.len(), 3);
}

#[test]
fn unparseable_urls_are_never_downgraded() {
    let dedup = UrlPathDedup::new();
    assert!(dedup.check_and_insert("::::"));
    assert!(dedup.check_and_insert("::::"));
    assert!(dedup.is_empty());
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Normalization is idempotent: the normalized form normalizes
        /// to itself.
        #[test]
        fn normalize_is_idempotent(
            host in "[a-z]{1,10}\\.(com|org)",
            segs in proptest::collection::vec("[a-z0-9]{1,8}", 0..5),
        ) {
            let raw = format!("https://{}/{}", host, segs.join("/"));
            if let Some(once) = UrlPathDedup::normalize(&raw) {
                prop_assert_eq!(UrlPathDedup::normalize(&once), Some(once.clone()));
            }
        }
    }
}
