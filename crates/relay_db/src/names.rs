//! The node long/short display name cache (spec C9).

use chrono::Utc;
use relay_ids::MeshNodeId;
use relay_protocol::NodeNames;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

pub struct NameCacheStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> NameCacheStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert whichever of `long_name`/`short_name` was provided, leaving
    /// the other column untouched if `None`.
    pub async fn upsert(
        &self,
        node_id: MeshNodeId,
        long_name: Option<&str>,
        short_name: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO node_names (node_id, long_name, short_name, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(node_id) DO UPDATE SET \
               long_name = COALESCE(excluded.long_name, node_names.long_name), \
               short_name = COALESCE(excluded.short_name, node_names.short_name), \
               updated_at = excluded.updated_at",
        )
        .bind(node_id.0 as i64)
        .bind(long_name)
        .bind(short_name)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, node_id: MeshNodeId) -> Result<NodeNames> {
        let row = sqlx::query("SELECT long_name, short_name FROM node_names WHERE node_id = ?1")
            .bind(node_id.0 as i64)
            .fetch_optional(self.pool)
            .await?;
        Ok(match row {
            Some(row) => NodeNames {
                long_name: row.try_get("long_name").ok(),
                short_name: row.try_get("short_name").ok(),
            },
            None => NodeNames::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn unknown_node_returns_empty_names() {
        let pool = test_pool().await;
        let store = NameCacheStore::new(&pool);
        let names = store.get(MeshNodeId(1)).await.unwrap();
        assert_eq!(names, NodeNames::default());
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips() {
        let pool = test_pool().await;
        let store = NameCacheStore::new(&pool);
        store.upsert(MeshNodeId(1), Some("Basecamp"), Some("BC")).await.unwrap();
        let names = store.get(MeshNodeId(1)).await.unwrap();
        assert_eq!(names.long_name.as_deref(), Some("Basecamp"));
        assert_eq!(names.short_name.as_deref(), Some("BC"));
    }

    #[tokio::test]
    async fn partial_upsert_preserves_other_column() {
        let pool = test_pool().await;
        let store = NameCacheStore::new(&pool);
        store.upsert(MeshNodeId(1), Some("Basecamp"), Some("BC")).await.unwrap();
        store.upsert(MeshNodeId(1), Some("Basecamp Prime"), None).await.unwrap();
        let names = store.get(MeshNodeId(1)).await.unwrap();
        assert_eq!(names.long_name.as_deref(), Some("Basecamp Prime"));
        assert_eq!(names.short_name.as_deref(), Some("BC"));
    }
}
