// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Saga persistence.
//!
//! One row per `(tenant, transaction)`: lifecycle status, the step vector as
//! JSON, an optimistic `version`, and the `timeout_at` deadline the timeout
//! monitor sweeps on. Postgres backs the server; SQLite backs tests and
//! embedded deployments.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresPersistence;
pub use self::sqlite::SqlitePersistence;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;

use crate::error::CoreError;
use crate::migrations::{self, Backend};
use crate::saga::Saga;
use crate::tenant::Tenant;

/// Saga lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaStatus {
    /// Moving forward.
    Active,
    /// A step failed; completed steps are being undone.
    Compensating,
    /// Every step completed.
    Completed,
    /// Compensation finished, or a terminal step failed.
    Failed,
    /// A compensator failed. Needs an operator.
    Stuck,
}

impl SagaStatus {
    /// Returns the string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Compensating => "compensating",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stuck => "stuck",
        }
    }

    /// Parse a status from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "compensating" => Some(Self::Compensating),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stuck" => Some(Self::Stuck),
            _ => None,
        }
    }

    /// Whether the runtime will never touch the saga again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stuck)
    }
}

/// Saga row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SagaRecord {
    /// Tenant identifier.
    pub tenant_id: String,
    /// Saga transaction identifier.
    pub transaction_id: String,
    /// Tenant region, kept so sweeps can rebuild message headers.
    pub tenant_region: String,
    /// Tenant major version.
    pub tenant_major_version: i32,
    /// Tenant minor version.
    pub tenant_minor_version: i32,
    /// Saga type tag.
    pub saga_type: String,
    /// Attribution string.
    pub initiated_by: String,
    /// Lifecycle status (active, compensating, completed, failed, stuck).
    pub status: String,
    /// Serialized [`Saga`].
    pub saga_data: String,
    /// Why the saga failed.
    pub failure_reason: Option<String>,
    /// Optimistic concurrency version, bumped on every update.
    pub version: i32,
    /// Deadline for the next progress.
    pub timeout_at: DateTime<Utc>,
    /// When the saga was submitted.
    pub created_at: DateTime<Utc>,
    /// When the saga last changed.
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    /// Build a fresh `active` record for `saga`.
    pub fn new(
        tenant: &Tenant,
        saga: &Saga,
        timeout_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        Ok(Self {
            tenant_id: tenant.id.to_string(),
            transaction_id: saga.transaction_id.to_string(),
            tenant_region: tenant.region.clone(),
            tenant_major_version: i32::from(tenant.major_version),
            tenant_minor_version: i32::from(tenant.minor_version),
            saga_type: saga.saga_type.as_str().to_string(),
            initiated_by: saga.initiated_by.clone(),
            status: SagaStatus::Active.as_str().to_string(),
            saga_data: serde_json::to_string(saga)?,
            failure_reason: None,
            version: 1,
            timeout_at,
            created_at: now,
            updated_at: now,
        })
    }

    /// Decode the step vector.
    pub fn saga(&self) -> Result<Saga, CoreError> {
        Ok(serde_json::from_str(&self.saga_data)?)
    }

    /// Replace the step vector.
    pub fn set_saga(&mut self, saga: &Saga) -> Result<(), CoreError> {
        self.saga_data = serde_json::to_string(saga)?;
        Ok(())
    }

    /// Lifecycle status. Unknown strings read as `stuck` so they are never driven.
    pub fn lifecycle(&self) -> SagaStatus {
        SagaStatus::parse(&self.status).unwrap_or(SagaStatus::Stuck)
    }

    /// Rebuild the owning tenant.
    pub fn tenant(&self) -> Result<Tenant, CoreError> {
        let invalid = |field: &str, message: String| CoreError::ValidationError {
            field: field.to_string(),
            message,
        };
        let id = Uuid::parse_str(&self.tenant_id).map_err(|e| invalid("tenant_id", e.to_string()))?;
        let major = u16::try_from(self.tenant_major_version)
            .map_err(|e| invalid("tenant_major_version", e.to_string()))?;
        let minor = u16::try_from(self.tenant_minor_version)
            .map_err(|e| invalid("tenant_minor_version", e.to_string()))?;
        Ok(Tenant::new(id, self.tenant_region.clone(), major, minor))
    }
}

/// Durable saga storage.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Insert a new saga. Fails with `SagaAlreadyExists` on a duplicate id.
    async fn insert_saga(&self, record: &SagaRecord) -> Result<(), CoreError>;

    /// Load one saga.
    async fn get_saga(
        &self,
        tenant_id: &str,
        transaction_id: &str,
    ) -> Result<Option<SagaRecord>, CoreError>;

    /// Write `record` if the stored version still equals `record.version`.
    ///
    /// The stored version becomes `record.version + 1`. Fails with
    /// `VersionConflict` when another writer got there first.
    async fn update_saga(&self, record: &SagaRecord) -> Result<(), CoreError>;

    /// Most recent sagas of a tenant, optionally filtered by status.
    async fn list_sagas(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>, CoreError>;

    /// Live sagas whose deadline is at or before `now`, oldest deadline first.
    async fn get_timed_out_sagas(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>, CoreError>;

    /// Delete one saga. Returns whether it existed.
    async fn delete_saga(&self, tenant_id: &str, transaction_id: &str) -> Result<bool, CoreError>;

    /// Delete terminal sagas last updated before `cutoff`.
    async fn delete_terminal_sagas_before(
        &self,
        _cutoff: DateTime<Utc>,
        _limit: i64,
    ) -> Result<u64, CoreError> {
        Ok(0)
    }

    /// Whether the database answers.
    async fn health_check_db(&self) -> Result<bool, CoreError>;
}

/// Open the database named by `url`, apply migrations, and wrap it.
pub async fn connect(url: &str, max_connections: u32) -> Result<Arc<dyn Persistence>, CoreError> {
    let connect_err = |e: sqlx::Error| CoreError::DatabaseError {
        operation: "connect".to_string(),
        details: e.to_string(),
    };
    let migrate_err = |e: sqlx::migrate::MigrateError| CoreError::DatabaseError {
        operation: "migrate".to_string(),
        details: e.to_string(),
    };

    match Backend::from_url(url) {
        Some(Backend::Postgres) => {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(connect_err)?;
            migrations::run_postgres(&pool).await.map_err(migrate_err)?;
            Ok(Arc::new(PostgresPersistence::new(pool)))
        }
        Some(Backend::Sqlite) => {
            let pool = SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect(url)
                .await
                .map_err(connect_err)?;
            migrations::run_sqlite(&pool).await.map_err(migrate_err)?;
            Ok(Arc::new(SqlitePersistence::new(pool)))
        }
        None => Err(CoreError::ValidationError {
            field: "database_url".to_string(),
            message: "expected a postgres:// or sqlite: URL".to_string(),
        }),
    }
}

pub(crate) fn map_insert_error(err: sqlx::Error, transaction_id: &str) -> CoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::SagaAlreadyExists {
            transaction_id: transaction_id.to_string(),
        },
        _ => CoreError::DatabaseError {
            operation: "insert_saga".to_string(),
            details: err.to_string(),
        },
    }
}
