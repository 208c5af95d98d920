//! Opaque per-plugin, per-node key/value storage (spec §4.8).
//!
//! The core never interprets `data`; it's whatever a plugin serialized.
//! Keyed by `(plugin_name, mesh_node_id)` so a plugin can also query
//! across every node it has stored data for.

use chrono::Utc;
use relay_ids::MeshNodeId;
use sqlx::{Row, SqlitePool};

use crate::error::Result;

pub struct PluginDataStore<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PluginDataStore<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn set(&self, plugin_name: &str, node_id: MeshNodeId, data: &[u8]) -> Result<()> {
        sqlx::query(
            "INSERT INTO plugin_data (plugin_name, mesh_node_id, data, updated_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(plugin_name, mesh_node_id) DO UPDATE SET \
               data = excluded.data, updated_at = excluded.updated_at",
        )
        .bind(plugin_name)
        .bind(node_id.0 as i64)
        .bind(data)
        .bind(Utc::now().to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, plugin_name: &str, node_id: MeshNodeId) -> Result<Option<Vec<u8>>> {
        let row = sqlx::query(
            "SELECT data FROM plugin_data WHERE plugin_name = ?1 AND mesh_node_id = ?2",
        )
        .bind(plugin_name)
        .bind(node_id.0 as i64)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.map(|r| r.get::<Vec<u8>, _>("data")))
    }

    /// Every node a plugin has stored data for, with that data.
    pub async fn all_for_plugin(&self, plugin_name: &str) -> Result<Vec<(MeshNodeId, Vec<u8>)>> {
        let rows = sqlx::query("SELECT mesh_node_id, data FROM plugin_data WHERE plugin_name = ?1")
            .bind(plugin_name)
            .fetch_all(self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let node_id: i64 = row.get("mesh_node_id");
                let data: Vec<u8> = row.get("data");
                (MeshNodeId(node_id as u32), data)
            })
            .collect())
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
    async fn set_then_get_round_trips() {
        let pool = test_pool().await;
        let store = PluginDataStore::new(&pool);
        store.set("weather", MeshNodeId(1), b"sunny").await.unwrap();
        let data = store.get("weather", MeshNodeId(1)).await.unwrap();
        assert_eq!(data.as_deref(), Some(b"sunny".as_slice()));
    }

    #[tokio::test]
    async fn distinct_plugins_do_not_collide_on_the_same_node() {
        let pool = test_pool().await;
        let store = PluginDataStore::new(&pool);
        store.set("weather", MeshNodeId(1), b"sunny").await.unwrap();
        store.set("telemetry", MeshNodeId(1), b"20C").await.unwrap();
        assert_eq!(store.get("weather", MeshNodeId(1)).await.unwrap().unwrap(), b"sunny");
        assert_eq!(store.get("telemetry", MeshNodeId(1)).await.unwrap().unwrap(), b"20C");
    }

    #[tokio::test]
    async fn all_for_plugin_lists_every_node() {
        let pool = test_pool().await;
        let store = PluginDataStore::new(&pool);
        store.set("weather", MeshNodeId(1), b"sunny").await.unwrap();
        store.set("weather", MeshNodeId(2), b"rainy").await.unwrap();
        let mut all = store.all_for_plugin("weather").await.unwrap();
        all.sort_by_key(|(id, _)| id.0);
        assert_eq!(all, vec![(MeshNodeId(1), b"sunny".to_vec()), (MeshNodeId(2), b"rainy".to_vec())]);
    }
}
