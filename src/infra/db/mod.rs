//! Postgres-backed shared tier.

mod util;

pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query, query_scalar,
};

use crate::cache::{EntryOptions, SharedStore, StoreError};

/// [`SharedStore`] over the `cache_entries` table.
///
/// Rows past `expires_at` are invisible to reads and deleted by
/// [`purge_expired`](SharedStore::purge_expired).
#[derive(Clone)]
pub struct PostgresCacheStore {
    pool: Arc<PgPool>,
}

impl PostgresCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(pool).await
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    pub async fn delete_expired(&self) -> Result<u64, sqlx::Error> {
        let result = query("DELETE FROM cache_entries WHERE expires_at <= now()")
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SharedStore for PostgresCacheStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        query_scalar::<_, String>(
            "SELECT value FROM cache_entries WHERE id = $1 AND expires_at > now()",
        )
        .bind(key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn set_string(
        &self,
        key: &str,
        value: &str,
        options: EntryOptions,
    ) -> Result<(), StoreError> {
        let ttl_seconds = options.absolute_expiration_relative_to_now.as_secs_f64();
        query(
            r#"
            INSERT INTO cache_entries (id, value, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (id) DO UPDATE
                SET value = EXCLUDED.value,
                    expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl_seconds)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        self.delete_expired().await.map_err(map_sqlx_error)
    }
}
