// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed saga storage.

use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

use crate::error::CoreError;
use crate::migrations;

use super::{Persistence, SagaRecord, map_insert_error};

const SAGA_COLUMNS: &str = r#"
    tenant_id, transaction_id, tenant_region, tenant_major_version, tenant_minor_version,
    saga_type, initiated_by, status, saga_data, failure_reason, version,
    timeout_at, created_at, updated_at
"#;

/// SQLite-backed persistence provider.
#[derive(Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Create a new SQLite persistence provider from an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a new SQLite persistence from a file path.
    ///
    /// Creates parent directories and the database file when missing, then
    /// runs migrations.
    ///
    /// ```ignore
    /// let persistence = SqlitePersistence::from_path(".data/sagas.db").await?;
    /// ```
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::DatabaseError {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {:?}: {}", path, e),
            })?;

        Self::migrated(pool).await
    }

    /// Private in-memory database, migrated. Lives as long as the pool.
    pub async fn in_memory() -> Result<Self, CoreError> {
        // A single connection that never idles out: every connection to
        // `sqlite::memory:` is a separate database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::migrated(pool).await
    }

    async fn migrated(pool: SqlitePool) -> Result<Self, CoreError> {
        migrations::run_sqlite(&pool)
            .await
            .map_err(|e| CoreError::DatabaseError {
                operation: "migrate".to_string(),
                details: format!("Failed to run migrations: {}", e),
            })?;

        Ok(Self { pool })
    }
}

#[async_trait::async_trait]
impl Persistence for SqlitePersistence {
    async fn insert_saga(&self, record: &SagaRecord) -> Result<(), CoreError> {
        sqlx::query(
            r#"
            INSERT INTO sagas (
                tenant_id, transaction_id, tenant_region, tenant_major_version, tenant_minor_version,
                saga_type, initiated_by, status, saga_data, failure_reason, version,
                timeout_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.tenant_id)
        .bind(&record.transaction_id)
        .bind(&record.tenant_region)
        .bind(record.tenant_major_version)
        .bind(record.tenant_minor_version)
        .bind(&record.saga_type)
        .bind(&record.initiated_by)
        .bind(&record.status)
        .bind(&record.saga_data)
        .bind(&record.failure_reason)
        .bind(record.version)
        .bind(record.timeout_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &record.transaction_id))?;

        Ok(())
    }

    async fn get_saga(
        &self,
        tenant_id: &str,
        transaction_id: &str,
    ) -> Result<Option<SagaRecord>, CoreError> {
        let query = format!(
            "SELECT {} FROM sagas WHERE tenant_id = ? AND transaction_id = ?",
            SAGA_COLUMNS
        );
        let record = sqlx::query_as::<_, SagaRecord>(&query)
            .bind(tenant_id)
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(record)
    }

    async fn update_saga(&self, record: &SagaRecord) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sagas
            SET status = ?,
                saga_data = ?,
                failure_reason = ?,
                timeout_at = ?,
                updated_at = ?,
                version = version + 1
            WHERE tenant_id = ? AND transaction_id = ? AND version = ?
            "#,
        )
        .bind(&record.status)
        .bind(&record.saga_data)
        .bind(&record.failure_reason)
        .bind(record.timeout_at)
        .bind(record.updated_at)
        .bind(&record.tenant_id)
        .bind(&record.transaction_id)
        .bind(record.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::VersionConflict {
                transaction_id: record.transaction_id.clone(),
                expected: record.version,
            });
        }
        Ok(())
    }

    async fn list_sagas(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>, CoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM sagas
            WHERE tenant_id = ? AND (? IS NULL OR status = ?)
            ORDER BY created_at DESC
            LIMIT ?
            "#,
            SAGA_COLUMNS
        );
        let records = sqlx::query_as::<_, SagaRecord>(&query)
            .bind(tenant_id)
            .bind(status)
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn get_timed_out_sagas(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>, CoreError> {
        let query = format!(
            r#"
            SELECT {}
            FROM sagas
            WHERE status IN ('active', 'compensating') AND timeout_at <= ?
            ORDER BY timeout_at ASC
            LIMIT ?
            "#,
            SAGA_COLUMNS
        );
        let records = sqlx::query_as::<_, SagaRecord>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    async fn delete_saga(&self, tenant_id: &str, transaction_id: &str) -> Result<bool, CoreError> {
        let result = sqlx::query("DELETE FROM sagas WHERE tenant_id = ? AND transaction_id = ?")
            .bind(tenant_id)
            .bind(transaction_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_terminal_sagas_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, CoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sagas
            WHERE rowid IN (
                SELECT rowid FROM sagas
                WHERE status IN ('completed', 'failed') AND updated_at < ?
                LIMIT ?
            )
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}
