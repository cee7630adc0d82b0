// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL saga storage.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::error::CoreError;

use super::{Persistence, SagaRecord, map_insert_error};

/// PostgreSQL-backed persistence implementation.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    /// Create a new Postgres-backed persistence implementation.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const SAGA_COLUMNS: &str = r#"
    tenant_id, transaction_id, tenant_region, tenant_major_version, tenant_minor_version,
    saga_type, initiated_by, status, saga_data, failure_reason, version,
    timeout_at, created_at, updated_at
"#;

// ============================================================================
// Saga Operations
// ============================================================================

/// Insert a new saga row.
pub async fn insert_saga(pool: &PgPool, record: &SagaRecord) -> Result<(), CoreError> {
    sqlx::query(
        r#"
        INSERT INTO sagas (
            tenant_id, transaction_id, tenant_region, tenant_major_version, tenant_minor_version,
            saga_type, initiated_by, status, saga_data, failure_reason, version,
            timeout_at, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
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
    .execute(pool)
    .await
    .map_err(|e| map_insert_error(e, &record.transaction_id))?;

    Ok(())
}

/// Load a saga row.
pub async fn get_saga(
    pool: &PgPool,
    tenant_id: &str,
    transaction_id: &str,
) -> Result<Option<SagaRecord>, CoreError> {
    let query = format!(
        "SELECT {} FROM sagas WHERE tenant_id = $1 AND transaction_id = $2",
        SAGA_COLUMNS
    );
    let record = sqlx::query_as::<_, SagaRecord>(&query)
        .bind(tenant_id)
        .bind(transaction_id)
        .fetch_optional(pool)
        .await?;

    Ok(record)
}

/// Compare-and-swap update on `version`.
pub async fn update_saga(pool: &PgPool, record: &SagaRecord) -> Result<(), CoreError> {
    let result = sqlx::query(
        r#"
        UPDATE sagas
        SET status = $1,
            saga_data = $2,
            failure_reason = $3,
            timeout_at = $4,
            updated_at = $5,
            version = version + 1
        WHERE tenant_id = $6 AND transaction_id = $7 AND version = $8
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
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::VersionConflict {
            transaction_id: record.transaction_id.clone(),
            expected: record.version,
        });
    }
    Ok(())
}

/// Most recent sagas for a tenant.
pub async fn list_sagas(
    pool: &PgPool,
    tenant_id: &str,
    status: Option<&str>,
    limit: i64,
) -> Result<Vec<SagaRecord>, CoreError> {
    let query = format!(
        r#"
        SELECT {}
        FROM sagas
        WHERE tenant_id = $1 AND ($2::TEXT IS NULL OR status = $2)
        ORDER BY created_at DESC
        LIMIT $3
        "#,
        SAGA_COLUMNS
    );
    let records = sqlx::query_as::<_, SagaRecord>(&query)
        .bind(tenant_id)
        .bind(status)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(records)
}

/// Live sagas past their deadline.
///
/// Rows locked by a concurrent sweeper are skipped rather than waited on.
pub async fn get_timed_out_sagas(
    pool: &PgPool,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<SagaRecord>, CoreError> {
    let query = format!(
        r#"
        SELECT {}
        FROM sagas
        WHERE status IN ('active', 'compensating') AND timeout_at <= $1
        ORDER BY timeout_at ASC
        LIMIT $2
        FOR UPDATE SKIP LOCKED
        "#,
        SAGA_COLUMNS
    );
    let records = sqlx::query_as::<_, SagaRecord>(&query)
        .bind(now)
        .bind(limit)
        .fetch_all(pool)
        .await?;

    Ok(records)
}

/// Delete one saga row.
pub async fn delete_saga(
    pool: &PgPool,
    tenant_id: &str,
    transaction_id: &str,
) -> Result<bool, CoreError> {
    let result = sqlx::query("DELETE FROM sagas WHERE tenant_id = $1 AND transaction_id = $2")
        .bind(tenant_id)
        .bind(transaction_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a batch of old terminal sagas.
pub async fn delete_terminal_sagas_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
    limit: i64,
) -> Result<u64, CoreError> {
    let result = sqlx::query(
        r#"
        DELETE FROM sagas
        WHERE (tenant_id, transaction_id) IN (
            SELECT tenant_id, transaction_id
            FROM sagas
            WHERE status IN ('completed', 'failed') AND updated_at < $1
            LIMIT $2
        )
        "#,
    )
    .bind(cutoff)
    .bind(limit)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

#[async_trait::async_trait]
impl Persistence for PostgresPersistence {
    async fn insert_saga(&self, record: &SagaRecord) -> Result<(), CoreError> {
        insert_saga(&self.pool, record).await
    }

    async fn get_saga(
        &self,
        tenant_id: &str,
        transaction_id: &str,
    ) -> Result<Option<SagaRecord>, CoreError> {
        get_saga(&self.pool, tenant_id, transaction_id).await
    }

    async fn update_saga(&self, record: &SagaRecord) -> Result<(), CoreError> {
        update_saga(&self.pool, record).await
    }

    async fn list_sagas(
        &self,
        tenant_id: &str,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>, CoreError> {
        list_sagas(&self.pool, tenant_id, status, limit).await
    }

    async fn get_timed_out_sagas(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SagaRecord>, CoreError> {
        get_timed_out_sagas(&self.pool, now, limit).await
    }

    async fn delete_saga(&self, tenant_id: &str, transaction_id: &str) -> Result<bool, CoreError> {
        delete_saga(&self.pool, tenant_id, transaction_id).await
    }

    async fn delete_terminal_sagas_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<u64, CoreError> {
        delete_terminal_sagas_before(&self.pool, cutoff, limit).await
    }

    async fn health_check_db(&self) -> Result<bool, CoreError> {
        let row: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&self.pool).await?;
        Ok(row.0 == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saga::action::{Action, DestroyAssetPayload};
    use crate::saga::{Saga, SagaType};
    use crate::tenant::Tenant;
    use uuid::Uuid;

    static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations/postgresql");

    // Helper to get a test database pool
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        MIGRATOR.run(&pool).await.ok()?;
        Some(pool)
    }

    fn record(timeout_at: DateTime<Utc>) -> SagaRecord {
        let tenant = Tenant::new(Uuid::new_v4(), "GMS", 83, 1);
        let saga = Saga::builder()
            .saga_type(SagaType::InventoryTransaction)
            .initiated_by("postgres-test")
            .add_step(
                "destroy",
                Action::DestroyAsset(DestroyAssetPayload {
                    character_id: 1,
                    template_id: 2000000,
                    quantity: 1,
                    remove_all: false,
                }),
            )
            .build()
            .unwrap();
        SagaRecord::new(&tenant, &saga, timeout_at, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_insert_get_and_duplicate() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let record = record(Utc::now());
        insert_saga(&pool, &record).await.unwrap();

        let loaded = get_saga(&pool, &record.tenant_id, &record.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.saga_data, record.saga_data);
        assert_eq!(loaded.status, "active");

        let err = insert_saga(&pool, &record).await.unwrap_err();
        assert_eq!(err.error_code(), "SAGA_ALREADY_EXISTS");

        delete_saga(&pool, &record.tenant_id, &record.transaction_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_detects_version_conflict() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let mut record = record(Utc::now());
        insert_saga(&pool, &record).await.unwrap();

        record.status = "compensating".to_string();
        update_saga(&pool, &record).await.unwrap();

        // Same expected version again: stale writer.
        let err = update_saga(&pool, &record).await.unwrap_err();
        assert_eq!(err.error_code(), "VERSION_CONFLICT");

        delete_saga(&pool, &record.tenant_id, &record.transaction_id)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_timed_out_only_returns_live_sagas() {
        let Some(pool) = test_pool().await else {
            eprintln!("Skipping test: TEST_DATABASE_URL not set");
            return;
        };

        let past = Utc::now() - chrono::Duration::seconds(60);
        let live = record(past);
        let mut done = record(past);
        done.status = "completed".to_string();
        insert_saga(&pool, &live).await.unwrap();
        insert_saga(&pool, &done).await.unwrap();

        let due = get_timed_out_sagas(&pool, Utc::now(), 1000).await.unwrap();
        assert!(due.iter().any(|r| r.transaction_id == live.transaction_id));
        assert!(!due.iter().any(|r| r.transaction_id == done.transaction_id));

        delete_saga(&pool, &live.tenant_id, &live.transaction_id)
            .await
            .unwrap();
        delete_saga(&pool, &done.tenant_id, &done.transaction_id)
            .await
            .unwrap();
    }
}
