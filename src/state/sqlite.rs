/// SQLite-backed batch store.
///
/// Each blob is one row in `batch_blobs`, replaced wholesale on save. All
/// queries are runtime-checked so builds never need a live database.
use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use super::{BatchStore, BlobKey};
use crate::config::StoreConfig;
use crate::error::{AnchorError, Result};

fn db_err(e: sqlx::Error) -> AnchorError {
    AnchorError::Persistence(e.to_string())
}

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect and run migrations.
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&config.database_url)
            .await
            .map_err(db_err)?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run pending migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AnchorError::Persistence(format!("Migration failed: {e}")))
    }

    /// Get a reference to the underlying pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl BatchStore for SqliteStore {
    async fn read_blob(&self, key: BlobKey) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT payload FROM batch_blobs WHERE name = ?1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)
    }

    async fn write_blob(&self, key: BlobKey, blob: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_blobs (name, payload, updated_at_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT (name)
            DO UPDATE SET payload = excluded.payload, updated_at_ms = excluded.updated_at_ms
            "#,
        )
        .bind(key.as_str())
        .bind(blob)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Receipt;
    use crate::crypto::hash::Hash256;
    use crate::state::models::{OpenBatches, PendingBatch, StoredAnchoredBatch};

    async fn memory_store() -> SqliteStore {
        SqliteStore::connect(&StoreConfig {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_is_empty() {
        let store = memory_store().await;
        assert!(store.load_pending().await.unwrap().is_none());
        assert!(store.load_anchored().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_replaces_blob() {
        let store = memory_store().await;

        let mut open = OpenBatches::default();
        open.pending.day_timestamp = Some(0);
        store.save_pending(&open).await.unwrap();

        open.stall(PendingBatch {
            leaves: vec![],
            day_timestamp: Some(-86_400),
        });
        store.save_pending(&open).await.unwrap();

        assert_eq!(store.load_pending().await.unwrap(), Some(open));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM batch_blobs")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn test_anchored_roundtrip() {
        let store = memory_store().await;
        let batches = vec![StoredAnchoredBatch {
            merkle_root: Hash256::new([1; 32]),
            storage_pointer: Hash256::new([2; 32]),
            day_timestamp: 86_400,
            leaves: vec![],
            receipt: Receipt {
                external_id: "0xabc".into(),
                confirmed_at: Utc::now(),
                network: "sepolia".into(),
                is_simulated: false,
            },
            revoked: true,
        }];
        store.save_anchored(&batches).await.unwrap();
        assert_eq!(store.load_anchored().await.unwrap(), batches);
    }
}
