// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database migrations for atlas-services.
//!
//! The services schema (map-action scripts, party-quest definitions, storage
//! compartments) sits next to atlas-core's `sagas` table. [`run`] applies both
//! sets as one migrator so SQLx tracks them together.
//!
//! # Example
//!
//! ```ignore
//! use sqlx::PgPool;
//! use atlas_services::migrations;
//!
//! let pool = PgPool::connect(&database_url).await?;
//! migrations::run(&pool).await?;
//! ```

use sqlx::migrate::{MigrateError, Migration, Migrator};
use std::borrow::Cow;

/// Services migrations embedded at compile time.
///
/// Versions start after the core ones so the merged order is stable.
static SERVICES_MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Migration source merging core and services migrations.
#[derive(Debug)]
struct CombinedMigrations;

impl<'s> sqlx::migrate::MigrationSource<'s> for CombinedMigrations {
    fn resolve(
        self,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<
                    Output = Result<Vec<Migration>, Box<dyn std::error::Error + Send + Sync>>,
                > + Send
                + 's,
        >,
    > {
        Box::pin(async move { Ok(iter().map(Cow::into_owned).collect()) })
    }
}

/// PostgreSQL migrator with core and services migrations.
pub async fn migrator() -> Result<Migrator, MigrateError> {
    Migrator::new(CombinedMigrations).await
}

/// Run all migrations (core + services).
pub async fn run(pool: &sqlx::PgPool) -> Result<(), MigrateError> {
    let migrator = migrator().await?;
    migrator.run(pool).await
}

/// All migrations sorted by version.
pub fn iter() -> impl Iterator<Item = Cow<'static, Migration>> {
    let core_iter = atlas_core::migrations::POSTGRES.iter().map(Cow::Borrowed);
    let services_iter = SERVICES_MIGRATOR.iter().map(Cow::Borrowed);

    let mut all: Vec<_> = core_iter.chain(services_iter).collect();
    all.sort_by_key(|m| m.version);
    all.into_iter()
}
