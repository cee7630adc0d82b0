// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tenant identity.
//!
//! Every registry operation, saga, and bus message carries an ambient tenant.
//! Tenants travel out-of-band as message headers so bodies stay tenant-agnostic.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Header carrying the tenant id.
pub const HEADER_TENANT_ID: &str = "TENANT_ID";
/// Header carrying the tenant region.
pub const HEADER_REGION: &str = "REGION";
/// Header carrying the game client major version.
pub const HEADER_MAJOR_VERSION: &str = "MAJOR_VERSION";
/// Header carrying the game client minor version.
pub const HEADER_MINOR_VERSION: &str = "MINOR_VERSION";

/// A partitioning identity scoping all registries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Unique tenant identifier.
    pub id: Uuid,
    /// Region code (e.g. `GMS`).
    pub region: String,
    /// Client major version.
    pub major_version: u16,
    /// Client minor version.
    pub minor_version: u16,
}

impl Tenant {
    /// Create a tenant identity.
    pub fn new(id: Uuid, region: impl Into<String>, major_version: u16, minor_version: u16) -> Self {
        Self {
            id,
            region: region.into(),
            major_version,
            minor_version,
        }
    }

    /// Key fragment used when namespacing external storage by tenant.
    pub fn key(&self) -> String {
        self.id.to_string()
    }

    /// Render the tenant as message headers.
    pub fn to_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            (HEADER_TENANT_ID.to_string(), self.id.to_string()),
            (HEADER_REGION.to_string(), self.region.clone()),
            (HEADER_MAJOR_VERSION.to_string(), self.major_version.to_string()),
            (HEADER_MINOR_VERSION.to_string(), self.minor_version.to_string()),
        ])
    }

    /// Recover the tenant from message headers.
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self, CoreError> {
        let field = |name: &str| {
            headers
                .get(name)
                .ok_or_else(|| CoreError::ValidationError {
                    field: name.to_string(),
                    message: "missing tenant header".to_string(),
                })
        };

        let id = Uuid::parse_str(field(HEADER_TENANT_ID)?).map_err(|e| {
            CoreError::ValidationError {
                field: HEADER_TENANT_ID.to_string(),
                message: e.to_string(),
            }
        })?;
        let region = field(HEADER_REGION)?.clone();
        let major_version = parse_version(HEADER_MAJOR_VERSION, field(HEADER_MAJOR_VERSION)?)?;
        let minor_version = parse_version(HEADER_MINOR_VERSION, field(HEADER_MINOR_VERSION)?)?;

        Ok(Self {
            id,
            region,
            major_version,
            minor_version,
        })
    }
}

fn parse_version(name: &str, value: &str) -> Result<u16, CoreError> {
    value.parse().map_err(|_| CoreError::ValidationError {
        field: name.to_string(),
        message: format!("'{}' is not a valid version", value),
    })
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} v{}.{}]",
            self.id, self.region, self.major_version, self.minor_version
        )
    }
}
