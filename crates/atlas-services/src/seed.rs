// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Loading seed documents from a directory of JSON files.

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// Outcome of reseeding a tenant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedResult {
    pub deleted: u64,
    pub created: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

impl SeedResult {
    pub fn record_failure(&mut self, source: &str, error: impl std::fmt::Display) {
        warn!(source = %source, error = %error, "Seed document rejected");
        self.failed += 1;
        self.errors.push(format!("{}: {}", source, error));
    }
}

/// Parse every `*.json` file in `dir`, in file name order.
///
/// Unreadable or malformed files come back as errors next to their file
/// name; only failing to list the directory is fatal.
pub fn read_json_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<(String, Result<T>)>> {
    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    Ok(paths
        .into_iter()
        .map(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let parsed: Result<T> = std::fs::read(&path)
                .map_err(Error::from)
                .and_then(|bytes| serde_json::from_slice(&bytes).map_err(Error::from));
            (name, parsed)
        })
        .collect())
}
