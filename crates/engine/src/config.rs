// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration, loaded from TOML. Every key has a default so a
//! missing file or table yields a working config.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::EngineError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub crawl: CrawlConfig,
    pub integrations: IntegrationsConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// History items with these URL suffixes are skipped for active scan.
    pub ignored_extensions: Vec<String>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            ignored_extensions: [
                ".png", ".jpg", ".jpeg", ".gif", ".svg", ".ico", ".webp", ".css", ".map",
                ".woff", ".woff2", ".ttf", ".eot", ".mp4", ".webm", ".pdf",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationsConfig {
    pub nuclei: NucleiConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NucleiConfig {
    /// Gates the Nuclei stage of a full scan.
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub severities: Vec<String>,
    pub protocols: Vec<String>,
    pub authors: Vec<String>,
    pub scan_timeout_secs: u64,
}

impl Default for NucleiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: 8555,
            tags: Vec::new(),
            severities: Vec::new(),
            protocols: Vec::new(),
            authors: Vec::new(),
            scan_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub oob: OobConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OobConfig {
    /// Overrides the default interactsh server list.
    pub server_urls: Vec<String>,
}

impl Default for OobConfig {
    fn default() -> Self {
        Self {
            server_urls: ["oast.pro", "oast.live", "oast.site", "oast.online", "oast.fun"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, EngineError> {
        toml::from_str(raw).map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load from a TOML file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(EngineError::Config(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
